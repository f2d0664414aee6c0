//! `/auth` endpoints: login, logout and the caller's identity.

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tutor_core::{
  access::{Action, Decision, Resource, Scope},
  principal::Principal,
};

use crate::{
  AppState,
  auth::{self, CurrentPrincipal},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub login:    String,
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub principal:  Principal,
}

/// `POST /auth/login`
pub async fn login(
  State(state): State<AppState>,
  Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, ApiError> {
  let principal = auth::authenticate(&state, &body.login, &body.password).await?;
  let (token, expires_at) = auth::issue_token(&state, &principal).await?;
  tracing::info!(principal_id = %principal.principal_id, "signed in");
  Ok(Json(LoginResponse { token, expires_at, principal }))
}

/// `POST /auth/logout` revokes the token the request was made with.
pub async fn logout(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
  let token = auth::bearer(&headers)?;
  auth::revoke_token(&state, token).await?;
  tracing::info!(principal_id = %by.principal_id, "signed out");
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct Me {
  pub principal:     Principal,
  /// Which students the caller can list; `None` if it cannot list any.
  pub student_scope: Option<Scope>,
}

/// `GET /auth/me`
pub async fn me(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
) -> Json<Me> {
  let decision = state.registry.resolve_access(&by, Resource::Students, Action::List);
  let student_scope = match decision {
    Decision::Allow(scope) => Some(scope),
    Decision::Deny => None,
  };
  Json(Me { principal: by, student_scope })
}
