//! Access scope resolution.
//!
//! [`resolve`] is the single place where the platform decides what a
//! principal may see or do. It is a pure function of its inputs: no storage
//! access, no clock, no logging. Callers load the target record first (to
//! learn its owning centre), then ask for a decision.
//!
//! Rules, first match wins:
//!
//! 1. Admins may do anything, unfiltered.
//! 2. A centre may read and update its own centre record, but not toggle
//!    its active flag.
//! 3. A centre may read, update, toggle and promote its own students; it
//!    may never approve them.
//! 4. A centre may list and create students, scoped to its own centre.
//! 5. A student may read its own record.
//! 6. Levels are readable by everyone; level history is readable within
//!    the principal's scope (own student, or own centre's students).
//! 7. Assessments are readable by everyone; for a student the read is
//!    narrowed to its own current level by the caller.
//! 8. A student may begin, start and submit its own attempts. Attempts are
//!    readable within the principal's scope.
//! 9. A centre may list and read the notifications addressed to it and
//!    mark them read.
//! 10. Everything else is denied.

use serde::Serialize;
use uuid::Uuid;

use crate::principal::{Principal, Role};

/// The target of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
  /// The centre collection.
  Centres,
  Centre(Uuid),
  /// The student collection.
  Students,
  Student {
    student_id: Uuid,
    centre_id:  Uuid,
  },
  /// The level catalog.
  Levels,
  Level(Uuid),
  /// Level history across all visible students.
  Histories,
  /// One student's level history.
  History {
    student_id: Uuid,
    centre_id:  Uuid,
  },
  /// The assessment catalog.
  Assessments,
  Assessment(Uuid),
  /// Attempts across all visible students.
  Attempts,
  Attempt {
    student_id: Uuid,
    centre_id:  Uuid,
  },
  /// The notification collection.
  Notifications,
  /// A notification as addressed to one centre.
  Notification {
    centre_id: Uuid,
  },
}

/// What the principal wants to do with the [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Read,
  List,
  Create,
  Update,
  Approve,
  ToggleActive,
  Promote,
  ResetPassword,
  Publish,
  Start,
  Submit,
}

/// The visible subset for a list operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Scope {
  All,
  Centre(Uuid),
  Student(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allow(Scope),
  Deny,
}

impl Decision {
  pub fn is_allowed(&self) -> bool { matches!(self, Self::Allow(_)) }

  /// The scope filter, or [`crate::Error::Forbidden`].
  pub fn scope(self) -> crate::Result<Scope> {
    match self {
      Self::Allow(scope) => Ok(scope),
      Self::Deny => Err(crate::Error::Forbidden),
    }
  }
}

/// Decide whether `principal` may perform `action` on `resource`.
pub fn resolve(principal: &Principal, resource: Resource, action: Action) -> Decision {
  use Action as A;
  use Resource as R;

  match (principal.role, resource, action) {
    (Role::Admin, _, _) => Decision::Allow(Scope::All),

    // Level catalog: readable by everyone.
    (_, R::Levels, A::List) | (_, R::Level(_), A::Read) => {
      Decision::Allow(Scope::All)
    }

    // Assessment catalog: readable by everyone, students see their own
    // level only.
    (Role::Student(own), R::Assessments, A::List)
    | (Role::Student(own), R::Assessment(_), A::Read) => {
      Decision::Allow(Scope::Student(own))
    }
    (_, R::Assessments, A::List) | (_, R::Assessment(_), A::Read) => {
      Decision::Allow(Scope::All)
    }

    // ── Centre principals ────────────────────────────────────────────────
    (Role::Centre(own), R::Centre(id), A::Read | A::Update) if id == own => {
      Decision::Allow(Scope::Centre(own))
    }
    (
      Role::Centre(own),
      R::Student { centre_id, .. },
      A::Read | A::Update | A::ToggleActive | A::Promote | A::ResetPassword,
    ) if centre_id == own => Decision::Allow(Scope::Centre(own)),
    (Role::Centre(own), R::Students, A::List | A::Create) => {
      Decision::Allow(Scope::Centre(own))
    }
    (Role::Centre(own), R::History { centre_id, .. }, A::Read)
      if centre_id == own =>
    {
      Decision::Allow(Scope::Centre(own))
    }
    (Role::Centre(own), R::Histories | R::Attempts | R::Notifications, A::List) => {
      Decision::Allow(Scope::Centre(own))
    }
    (Role::Centre(own), R::Attempt { centre_id, .. }, A::Read) if centre_id == own => {
      Decision::Allow(Scope::Centre(own))
    }
    (Role::Centre(own), R::Notification { centre_id }, A::Read | A::Update)
      if centre_id == own =>
    {
      Decision::Allow(Scope::Centre(own))
    }

    // ── Student principals ───────────────────────────────────────────────
    (Role::Student(own), R::Student { student_id, .. }, A::Read)
      if student_id == own =>
    {
      Decision::Allow(Scope::Student(own))
    }
    (Role::Student(own), R::History { student_id, .. }, A::Read)
      if student_id == own =>
    {
      Decision::Allow(Scope::Student(own))
    }
    (Role::Student(own), R::Histories | R::Attempts, A::List) => {
      Decision::Allow(Scope::Student(own))
    }
    (Role::Student(own), R::Attempts, A::Create) => Decision::Allow(Scope::Student(own)),
    (Role::Student(own), R::Attempt { student_id, .. }, A::Read | A::Start | A::Submit)
      if student_id == own =>
    {
      Decision::Allow(Scope::Student(own))
    }

    _ => Decision::Deny,
  }
}
