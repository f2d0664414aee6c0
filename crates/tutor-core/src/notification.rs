//! Admin-to-centre notifications with a read receipt per recipient centre.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
  pub centre_id: Uuid,
  /// When the centre first marked the notification read.
  pub read_at:   Option<DateTime<Utc>>,
}

/// A message from an admin to one or more centres.
///
/// A centre only ever sees its own entry in `recipients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id: Uuid,
  pub title:           String,
  pub message:         String,
  pub created_by:      Uuid,
  pub created_at:      DateTime<Utc>,
  pub recipients:      Vec<Recipient>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
  pub title:      String,
  pub message:    String,
  pub centre_ids: Vec<Uuid>,
}
