//! Level catalog types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A step in the progression sequence. `ordinal` defines the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
  pub level_id:    Uuid,
  pub name:        String,
  pub description: Option<String>,
  pub ordinal:     i64,
  /// Unpublished levels cannot be assigned to students.
  pub published:   bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::registry::Registry::create_level`]. New levels start
/// unpublished.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLevel {
  pub name:        String,
  pub description: Option<String>,
  pub ordinal:     i64,
}
