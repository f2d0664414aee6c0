//! Error type for `tutor-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A business rule detected inside a transaction (lost race, missing
  /// record, taken login).
  #[error(transparent)]
  Domain(#[from] tutor_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A column held a value that does not decode into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

impl From<Error> for tutor_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Domain(inner) => inner,
      other => tutor_core::Error::Storage(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
