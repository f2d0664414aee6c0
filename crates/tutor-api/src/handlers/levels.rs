//! Handlers for the `/levels` catalog.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use tutor_core::level::{Level, NewLevel};
use uuid::Uuid;

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

/// `GET /levels`, in ordinal order; drafts are listed for admins only.
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
) -> Result<Json<Vec<Level>>, ApiError> {
  Ok(Json(state.registry.list_levels(&by).await?))
}

/// `POST /levels` creates an unpublished level.
pub async fn create(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Json(body): Json<NewLevel>,
) -> Result<impl IntoResponse, ApiError> {
  let level = state.registry.create_level(&by, body).await?;
  Ok((StatusCode::CREATED, Json(level)))
}

pub async fn get_one(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Level>, ApiError> {
  Ok(Json(state.registry.get_level(&by, id).await?))
}

pub async fn publish(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Level>, ApiError> {
  Ok(Json(state.registry.publish_level(&by, id).await?))
}
