//! Handlers for `/centres` endpoints.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tutor_core::{
  centre::{Centre, CentreSummary, CentreUpdate, NewCentre},
  principal::NewCredentials,
  registry::PasswordTarget,
  student::Student,
};
use uuid::Uuid;

use super::NewPassword;
use crate::{
  AppState,
  auth::{self, CurrentPrincipal},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub search: Option<String>,
}

/// `GET /centres[?search=<text>]`
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CentreSummary>>, ApiError> {
  Ok(Json(state.registry.list_centres(&by, params.search).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:             String,
  pub franchisee_name:  String,
  pub area:             String,
  #[serde(default)]
  pub instructor_names: Vec<String>,
  pub login:            String,
  pub password:         String,
}

/// `POST /centres`
pub async fn create(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  auth::check_password_policy(&body.password)?;
  let input = NewCentre {
    name:             body.name,
    franchisee_name:  body.franchisee_name,
    area:             body.area,
    instructor_names: body.instructor_names,
    credentials:      NewCredentials {
      login:         body.login,
      password_hash: auth::hash_password(&body.password)?,
    },
  };
  let centre = state.registry.create_centre(&by, input).await?;
  Ok((StatusCode::CREATED, Json(centre)))
}

/// `GET /centres/{id}`
pub async fn get_one(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Centre>, ApiError> {
  Ok(Json(state.registry.get_centre(&by, id).await?))
}

/// `PATCH /centres/{id}`
pub async fn update(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
  Json(update): Json<CentreUpdate>,
) -> Result<Json<Centre>, ApiError> {
  Ok(Json(state.registry.update_centre(&by, id, update).await?))
}

/// `POST /centres/{id}/toggle-active`
pub async fn toggle_active(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Centre>, ApiError> {
  Ok(Json(state.registry.toggle_centre_active(&by, id).await?))
}

/// `GET /centres/{id}/students`
pub async fn students(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Student>>, ApiError> {
  Ok(Json(state.registry.list_centre_students(&by, id).await?))
}

/// `POST /centres/{id}/reset-password`
pub async fn reset_password(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<NewPassword>, ApiError> {
  let password = auth::generate_password();
  state
    .registry
    .reset_password(&by, PasswordTarget::Centre(id), auth::hash_password(&password)?)
    .await?;
  Ok(Json(NewPassword { password }))
}
