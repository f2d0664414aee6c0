//! Handlers for `/attempts`: the pending, in-progress, finished lifecycle
//! of a student sitting an assessment.

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;
use tutor_core::attempt::{Attempt, AttemptResult, SubmittedAnswer};
use uuid::Uuid;

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

/// `GET /attempts`, newest first, within the caller's scope.
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
) -> Result<Json<Vec<Attempt>>, ApiError> {
  Ok(Json(state.registry.list_attempts(&by).await?))
}

pub async fn get_one(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Attempt>, ApiError> {
  Ok(Json(state.registry.get_attempt(&by, id).await?))
}

pub async fn start(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Attempt>, ApiError> {
  Ok(Json(state.registry.start_attempt(&by, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  #[serde(default)]
  pub answers: Vec<SubmittedAnswer>,
}

/// `POST /attempts/{id}/submit`. A late submission still succeeds, with
/// status `interrupted` and no score.
pub async fn submit(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<Json<AttemptResult>, ApiError> {
  Ok(Json(state.registry.submit_attempt(&by, id, body.answers).await?))
}

pub async fn result(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<AttemptResult>, ApiError> {
  Ok(Json(state.registry.attempt_result(&by, id).await?))
}
