//! Centre directory types: franchise centres and their instructors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::NewCredentials;

/// A centre instructor ("CI"). Lives and dies with its centre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
  pub instructor_id: Uuid,
  pub centre_id:     Uuid,
  pub name:          String,
}

/// A franchise location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Centre {
  pub centre_id:          Uuid,
  pub name:               String,
  pub franchisee_name:    String,
  pub area:               String,
  /// Soft-delete flag. Only an admin may flip it.
  pub active:             bool,
  pub owner_principal_id: Uuid,
  pub instructors:        Vec<Instructor>,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

/// A centre together with its student head-counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentreSummary {
  #[serde(flatten)]
  pub centre:               Centre,
  pub student_count:        u64,
  pub active_student_count: u64,
}

/// Input to [`crate::store::RegistryStore::insert_centre`].
#[derive(Debug, Clone)]
pub struct NewCentre {
  pub name:             String,
  pub franchisee_name:  String,
  pub area:             String,
  pub instructor_names: Vec<String>,
  pub credentials:      NewCredentials,
}

/// Editable centre fields. `None` leaves a field unchanged.
///
/// The active flag only moves through
/// [`crate::registry::Registry::toggle_centre_active`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CentreUpdate {
  pub name:             Option<String>,
  pub franchisee_name:  Option<String>,
  pub area:             Option<String>,
  /// Replaces the instructor list by name. Instructors whose name is kept
  /// retain their id; removed instructors still assigned to a student are
  /// kept as well.
  pub instructor_names: Option<Vec<String>>,
}

impl Centre {
  pub fn owns_instructor(&self, instructor_id: Uuid) -> bool {
    self.instructors.iter().any(|i| i.instructor_id == instructor_id)
  }
}
