//! Handlers for `/students` endpoints.
//!
//! Status and level never change through `PATCH`; they move only through
//! `approve`, `toggle-active` and `promote`.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tutor_core::{
  ledger::LevelHistoryEntry,
  principal::NewCredentials,
  registry::{PasswordTarget, PromoteRequest},
  student::{Gender, NewStudent, Student, StudentQuery, StudentUpdate},
};
use uuid::Uuid;

use super::NewPassword;
use crate::{
  AppState,
  auth::{self, CurrentPrincipal},
  error::ApiError,
};

/// `GET /students[?search=<text>&status=<status>]`
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Query(query): Query<StudentQuery>,
) -> Result<Json<Vec<Student>>, ApiError> {
  Ok(Json(state.registry.list_students(&by, &query).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  /// Required for admins; ignored for centre callers.
  pub centre_id:        Option<Uuid>,
  pub name:             String,
  pub dob:              NaiveDate,
  pub gender:           Gender,
  pub level_id:         Uuid,
  pub instructor_id:    Option<Uuid>,
  pub level_start_date: NaiveDate,
  pub login:            String,
  pub password:         String,
}

#[derive(Debug, Serialize)]
pub struct Created {
  pub student: Student,
  pub entry:   LevelHistoryEntry,
}

/// `POST /students` creates a `pending` student.
pub async fn create(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  auth::check_password_policy(&body.password)?;
  let input = NewStudent {
    centre_id:        body.centre_id,
    name:             body.name,
    dob:              body.dob,
    gender:           body.gender,
    level_id:         body.level_id,
    instructor_id:    body.instructor_id,
    level_start_date: body.level_start_date,
    credentials:      NewCredentials {
      login:         body.login,
      password_hash: auth::hash_password(&body.password)?,
    },
  };
  let (student, entry) = state.registry.create_student(&by, input).await?;
  Ok((StatusCode::CREATED, Json(Created { student, entry })))
}

/// `GET /students/{id}`
pub async fn get_one(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Student>, ApiError> {
  Ok(Json(state.registry.get_student(&by, id).await?))
}

/// `PATCH /students/{id}`: name, dob, gender and instructor only.
pub async fn update(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
  Json(update): Json<StudentUpdate>,
) -> Result<Json<Student>, ApiError> {
  Ok(Json(state.registry.update_student(&by, id, update).await?))
}

/// `POST /students/{id}/approve`
pub async fn approve(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Student>, ApiError> {
  Ok(Json(state.registry.approve_student(&by, id).await?))
}

/// `POST /students/{id}/toggle-active`
pub async fn toggle_active(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Student>, ApiError> {
  Ok(Json(state.registry.toggle_student_active(&by, id).await?))
}

/// `POST /students/{id}/promote`, body: `{"level_id":…, "start_date":"2024-06-01"}`
pub async fn promote(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
  Json(request): Json<PromoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let entry = state.registry.promote_student(&by, id, request).await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /students/{id}/reset-password`
pub async fn reset_password(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<NewPassword>, ApiError> {
  let password = auth::generate_password();
  state
    .registry
    .reset_password(&by, PasswordTarget::Student(id), auth::hash_password(&password)?)
    .await?;
  Ok(Json(NewPassword { password }))
}
