//! Student registry types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::NewCredentials;

/// Lifecycle status of a student. See [`crate::lifecycle`] for the
/// transitions between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
  /// Created by a centre, awaiting admin approval.
  Pending,
  Active,
  Inactive,
}

impl std::fmt::Display for StudentStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Pending => "pending",
      Self::Active => "active",
      Self::Inactive => "inactive",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
  Male,
  Female,
  Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
  pub student_id:       Uuid,
  /// Owning centre; never changes after creation.
  pub centre_id:        Uuid,
  pub principal_id:     Uuid,
  pub name:             String,
  pub dob:              NaiveDate,
  pub gender:           Gender,
  pub status:           StudentStatus,
  /// Cached copy of the open ledger entry's level. Written only in the same
  /// transaction as the ledger.
  pub current_level_id: Uuid,
  pub instructor_id:    Option<Uuid>,
  pub level_start_date: NaiveDate,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// Input to [`crate::registry::Registry::create_student`].
///
/// `centre_id` is ignored when a centre principal creates the student; the
/// principal's own centre is used instead.
#[derive(Debug, Clone)]
pub struct NewStudent {
  pub centre_id:        Option<Uuid>,
  pub name:             String,
  pub dob:              NaiveDate,
  pub gender:           Gender,
  pub level_id:         Uuid,
  pub instructor_id:    Option<Uuid>,
  pub level_start_date: NaiveDate,
  pub credentials:      NewCredentials,
}

/// Editable student fields. Status, level and centre are not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
  pub name:          Option<String>,
  pub dob:           Option<NaiveDate>,
  pub gender:        Option<Gender>,
  /// `Some(None)` clears the instructor assignment.
  #[serde(default, with = "double_option")]
  pub instructor_id: Option<Option<Uuid>>,
}

/// Filters applied on top of the access scope when listing students.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentQuery {
  /// Case-insensitive substring match on the student's name.
  pub search: Option<String>,
  pub status: Option<StudentStatus>,
}

mod double_option {
  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
  where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
  {
    Deserialize::deserialize(de).map(Some)
  }
}
