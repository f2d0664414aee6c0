//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tutor_core::Error as DomainError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing, malformed, expired or revoked credentials.
  #[error("unauthorized")]
  Unauthorized,

  /// Correct credentials for a principal that may not sign in.
  #[error("account is disabled")]
  Disabled,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Domain(#[from] DomainError),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<tutor_store_sqlite::Error> for ApiError {
  fn from(e: tutor_store_sqlite::Error) -> Self { Self::Domain(e.into()) }
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::Disabled => StatusCode::FORBIDDEN,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      Self::Domain(e) => match e {
        DomainError::Forbidden => StatusCode::FORBIDDEN,
        DomainError::NotFound(..) => StatusCode::NOT_FOUND,
        DomainError::InvalidTransition { .. }
        | DomainError::InvalidLevel(_)
        | DomainError::InvalidStartDate(_)
        | DomainError::InstructorNotInCentre { .. }
        | DomainError::InvalidAttemptTransition { .. }
        | DomainError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::CentreInactive(_)
        | DomainError::AttemptOpen(_)
        | DomainError::ConcurrentModification(_)
        | DomainError::LoginTaken(_) => StatusCode::CONFLICT,
        DomainError::OpenEntryRequired(_)
        | DomainError::CorruptLedger { .. }
        | DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      // Storage details stay in the logs.
      Self::Domain(DomainError::Storage(_)) | Self::Internal(_) => {
        tracing::error!(error = %self, "request failed");
        "internal server error".to_owned()
      }
      other => other.to_string(),
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if matches!(self, Self::Unauthorized) {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}

#[cfg(test)]
mod tests {
  use tutor_core::{attempt::AttemptStatus, error::Transition};
  use uuid::Uuid;

  use super::*;

  #[test]
  fn domain_errors_map_to_status_codes() {
    let id = Uuid::new_v4();
    let cases = [
      (DomainError::Forbidden, StatusCode::FORBIDDEN),
      (DomainError::ConcurrentModification(id), StatusCode::CONFLICT),
      (DomainError::OpenEntryRequired(id), StatusCode::INTERNAL_SERVER_ERROR),
      (DomainError::InvalidLevel("same level".into()), StatusCode::UNPROCESSABLE_ENTITY),
      (DomainError::CentreInactive(id), StatusCode::CONFLICT),
      (DomainError::AttemptOpen(id), StatusCode::CONFLICT),
      (
        DomainError::InvalidAttemptTransition {
          from:   AttemptStatus::Completed,
          action: Transition::Submit,
        },
        StatusCode::UNPROCESSABLE_ENTITY,
      ),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).status(), status);
    }
  }

  #[test]
  fn unauthorized_carries_challenge() {
    let res = ApiError::Unauthorized.into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()[header::WWW_AUTHENTICATE], "Bearer");
  }
}
