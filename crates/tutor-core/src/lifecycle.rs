//! Student lifecycle state machine.
//!
//! ```text
//!   create ──► Pending ──approve──► Active ◄──toggle──► Inactive
//! ```
//!
//! `approve` is admin-only and valid only from `Pending`. `toggle_active`
//! flips between `Active` and `Inactive` and is refused while the student is
//! still `Pending`. Who may trigger each transition is decided by
//! [`crate::access::resolve`]; this module only decides whether the
//! transition exists.

use crate::{
  Error, Result,
  error::Transition,
  student::StudentStatus,
};

/// The status every new student starts in.
pub const INITIAL_STATUS: StudentStatus = StudentStatus::Pending;

/// `Pending → Active`.
pub fn approve(from: StudentStatus) -> Result<StudentStatus> {
  match from {
    StudentStatus::Pending => Ok(StudentStatus::Active),
    other => Err(Error::InvalidTransition {
      from:   other,
      action: Transition::Approve,
    }),
  }
}

/// `Active ↔ Inactive`.
pub fn toggle_active(from: StudentStatus) -> Result<StudentStatus> {
  match from {
    StudentStatus::Active => Ok(StudentStatus::Inactive),
    StudentStatus::Inactive => Ok(StudentStatus::Active),
    StudentStatus::Pending => Err(Error::InvalidTransition {
      from,
      action: Transition::ToggleActive,
    }),
  }
}

/// Whether a student in this status may sign in.
pub fn can_authenticate(status: StudentStatus) -> bool {
  status == StudentStatus::Active
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn approve_only_from_pending() {
    assert_eq!(approve(StudentStatus::Pending).unwrap(), StudentStatus::Active);
    assert!(matches!(
      approve(StudentStatus::Active),
      Err(Error::InvalidTransition { from: StudentStatus::Active, action: Transition::Approve })
    ));
    assert!(approve(StudentStatus::Inactive).is_err());
  }

  #[test]
  fn toggle_flips_active_and_inactive() {
    assert_eq!(toggle_active(StudentStatus::Active).unwrap(), StudentStatus::Inactive);
    assert_eq!(toggle_active(StudentStatus::Inactive).unwrap(), StudentStatus::Active);
  }

  #[test]
  fn toggle_refused_while_pending() {
    assert!(matches!(
      toggle_active(StudentStatus::Pending),
      Err(Error::InvalidTransition { action: Transition::ToggleActive, .. })
    ));
  }

  #[test]
  fn only_active_students_authenticate() {
    assert!(can_authenticate(StudentStatus::Active));
    assert!(!can_authenticate(StudentStatus::Pending));
    assert!(!can_authenticate(StudentStatus::Inactive));
  }
}
