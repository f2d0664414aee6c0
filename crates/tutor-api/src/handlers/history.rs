//! Read-only progression ledger endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use tutor_core::{
  ledger::{History, LevelHistoryEntry},
  level::Level,
};
use uuid::Uuid;

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

/// `GET /students/{id}/history`: chronological and verified.
pub async fn for_student(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<History>, ApiError> {
  Ok(Json(state.registry.get_history(&by, id).await?))
}

/// `GET /students/{id}/level`
pub async fn current_level(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Level>, ApiError> {
  Ok(Json(state.registry.current_level(&by, id).await?))
}

/// `GET /history`
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
) -> Result<Json<Vec<LevelHistoryEntry>>, ApiError> {
  Ok(Json(state.registry.list_history(&by).await?))
}
