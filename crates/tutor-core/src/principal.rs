//! Principals: authenticated actors and their role scope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a principal, carrying the id of the record it is bound to.
///
/// Exactly one of centre/student is linked, and it always matches the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "linked_id", rename_all = "lowercase")]
pub enum Role {
  Admin,
  Centre(Uuid),
  Student(Uuid),
}

impl Role {
  pub fn is_admin(&self) -> bool { matches!(self, Self::Admin) }
}

/// An authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub principal_id: Uuid,
  #[serde(flatten)]
  pub role:         Role,
}

impl Principal {
  pub fn new(principal_id: Uuid, role: Role) -> Self {
    Self { principal_id, role }
  }
}

/// Login credentials attached to a newly created centre or student.
/// The password is already hashed by the caller; the core never sees
/// plaintext.
#[derive(Debug, Clone)]
pub struct NewCredentials {
  pub login:         String,
  pub password_hash: String,
}
