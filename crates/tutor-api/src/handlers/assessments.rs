//! Handlers for the `/assessments` catalog.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use tutor_core::{
  assessment::{Assessment, AssessmentQuery, NewAssessment},
  attempt::TopScore,
};
use uuid::Uuid;

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

/// `GET /assessments[?level_id=<id>]`. Students only see their own level.
pub async fn list(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Query(query): Query<AssessmentQuery>,
) -> Result<Json<Vec<Assessment>>, ApiError> {
  Ok(Json(state.registry.list_assessments(&by, &query).await?))
}

pub async fn create(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Json(body): Json<NewAssessment>,
) -> Result<impl IntoResponse, ApiError> {
  let assessment = state.registry.create_assessment(&by, body).await?;
  Ok((StatusCode::CREATED, Json(assessment)))
}

pub async fn get_one(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Assessment>, ApiError> {
  Ok(Json(state.registry.get_assessment(&by, id).await?))
}

pub async fn toggle_active(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Assessment>, ApiError> {
  Ok(Json(state.registry.toggle_assessment_active(&by, id).await?))
}

/// `POST /assessments/{id}/attempts` opens a pending attempt for the
/// calling student.
pub async fn begin_attempt(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let attempt = state.registry.begin_attempt(&by, id).await?;
  Ok((StatusCode::CREATED, Json(attempt)))
}

/// `GET /assessments/{id}/top-scores`
pub async fn top_scores(
  State(state): State<AppState>,
  CurrentPrincipal(by): CurrentPrincipal,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TopScore>>, ApiError> {
  Ok(Json(state.registry.top_scores(&by, id).await?))
}
