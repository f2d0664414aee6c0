//! Route handlers, one module per resource.

pub mod assessments;
pub mod attempts;
pub mod centres;
pub mod history;
pub mod levels;
pub mod notifications;
pub mod session;
pub mod students;

use serde::Serialize;

/// Body of the `reset-password` routes. The password is shown once and
/// never stored in clear.
#[derive(Debug, Serialize)]
pub struct NewPassword {
  pub password: String,
}
