//! Admin-to-centre notifications.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use tutor_core::notification::{NewNotification, Notification};
use uuid::Uuid;

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

/// `GET /notifications`. A centre sees only its own read receipt.
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
) -> Result<Json<Vec<Notification>>, ApiError> {
  Ok(Json(state.registry.list_notifications(&by).await?))
}

pub async fn create(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Json(body): Json<NewNotification>,
) -> Result<impl IntoResponse, ApiError> {
  let notification = state.registry.create_notification(&by, body).await?;
  Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn get_one(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
  Ok(Json(state.registry.get_notification(&by, id).await?))
}

/// `POST /notifications/{id}/read`
pub async fn mark_read(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
  Ok(Json(state.registry.mark_notification_read(&by, id).await?))
}
