//! Error types for `tutor-core`.
//!
//! Every business-rule failure surfaces as one of these variants. Storage
//! backends fold their own failures into [`Error::Storage`] and report
//! rule violations detected inside a transaction (lost compare-and-swap,
//! missing open entry) with the matching domain variant.

use thiserror::Error;
use uuid::Uuid;

use crate::{attempt::AttemptStatus, student::StudentStatus};

/// The entity kind named by [`Error::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Centre,
  Student,
  Level,
  Assessment,
  Attempt,
  Notification,
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Centre => "centre",
      Self::Student => "student",
      Self::Level => "level",
      Self::Assessment => "assessment",
      Self::Attempt => "attempt",
      Self::Notification => "notification",
    })
  }
}

/// Which lifecycle action was refused by [`Error::InvalidTransition`] or
/// [`Error::InvalidAttemptTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  Approve,
  ToggleActive,
  Start,
  Submit,
}

impl std::fmt::Display for Transition {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Approve => "approve",
      Self::ToggleActive => "toggle active",
      Self::Start => "start",
      Self::Submit => "submit",
    })
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// Scope denial. Carries no detail about the target.
  #[error("forbidden")]
  Forbidden,

  #[error("{0} not found: {1}")]
  NotFound(EntityKind, Uuid),

  #[error("cannot {action} a student in status {from}")]
  InvalidTransition {
    from:   StudentStatus,
    action: Transition,
  },

  #[error("cannot {action} an attempt in status {from}")]
  InvalidAttemptTransition {
    from:   AttemptStatus,
    action: Transition,
  },

  /// The student already has a pending or in-progress attempt.
  #[error("attempt {0} is still open")]
  AttemptOpen(Uuid),

  #[error("invalid level: {0}")]
  InvalidLevel(String),

  #[error("invalid start date: {0}")]
  InvalidStartDate(String),

  #[error("instructor {instructor_id} does not belong to centre {centre_id}")]
  InstructorNotInCentre {
    instructor_id: Uuid,
    centre_id:     Uuid,
  },

  #[error("centre {0} is inactive")]
  CentreInactive(Uuid),

  #[error("student {0} has no open level history entry")]
  OpenEntryRequired(Uuid),

  #[error("student {student_id} ledger is corrupt: {detail}")]
  CorruptLedger {
    student_id: Uuid,
    detail:     String,
  },

  #[error("record {0} was modified concurrently; retry the request")]
  ConcurrentModification(Uuid),

  /// A request field failed validation; the message names the rule.
  #[error("invalid request: {0}")]
  Invalid(String),

  #[error("login {0:?} is already taken")]
  LoginTaken(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Ledger integrity violations are fatal and are never retried.
  pub fn is_integrity_violation(&self) -> bool {
    matches!(self, Self::OpenEntryRequired(_) | Self::CorruptLedger { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
