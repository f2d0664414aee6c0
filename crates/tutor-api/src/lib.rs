//! JSON REST API for the tutoring-centre registry.
//!
//! Exposes an axum [`Router`] over a [`Registry`] backed by
//! [`SqliteStore`]. Every route except `/auth/login` requires a bearer token
//! issued by that route.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/login` | `{login, password}` → token |
//! | `POST` | `/auth/logout` | revokes the presented token |
//! | `GET`  | `/auth/me` | caller and its student scope |
//! | `GET` `POST` | `/centres` | admin; `?search=` |
//! | `GET` `PATCH` | `/centres/{id}` | |
//! | `POST` | `/centres/{id}/toggle-active` | admin |
//! | `GET`  | `/centres/{id}/students` | |
//! | `POST` | `/centres/{id}/reset-password` | admin |
//! | `GET` `POST` | `/students` | `?search=&status=` |
//! | `GET` `PATCH` | `/students/{id}` | |
//! | `POST` | `/students/{id}/approve` | admin |
//! | `POST` | `/students/{id}/toggle-active` | |
//! | `POST` | `/students/{id}/promote` | `{level_id, start_date, override?}` |
//! | `GET`  | `/students/{id}/history` | |
//! | `GET`  | `/students/{id}/level` | level of the open entry |
//! | `POST` | `/students/{id}/reset-password` | |
//! | `GET` `POST` | `/levels` | |
//! | `GET`  | `/levels/{id}` | |
//! | `POST` | `/levels/{id}/publish` | admin |
//! | `GET`  | `/history` | entries across visible students |
//! | `GET` `POST` | `/assessments` | `?level_id=`; students see their own level |
//! | `GET`  | `/assessments/{id}` | |
//! | `POST` | `/assessments/{id}/toggle-active` | admin |
//! | `POST` | `/assessments/{id}/attempts` | student; opens a pending attempt |
//! | `GET`  | `/assessments/{id}/top-scores` | best score per visible student |
//! | `GET`  | `/attempts` | attempts across visible students |
//! | `GET`  | `/attempts/{id}` | |
//! | `POST` | `/attempts/{id}/start` | student |
//! | `POST` | `/attempts/{id}/submit` | student; `{answers: [{question_id, answer_text}]}` |
//! | `GET`  | `/attempts/{id}/result` | finished attempts only |
//! | `GET` `POST` | `/notifications` | admin sends, centres receive |
//! | `GET`  | `/notifications/{id}` | |
//! | `POST` | `/notifications/{id}/read` | recipient centre |

pub mod auth;
pub mod error;
pub mod handlers;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use chrono::TimeDelta;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tutor_core::Registry;
use tutor_store_sqlite::SqliteStore;

pub use error::ApiError;

use handlers::{
  assessments, attempts, centres, history, levels, notifications, session, students,
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TUTOR_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub store_path:      PathBuf,
  /// Lifetime of issued bearer tokens, 1 to [`MAX_TOKEN_TTL_HOURS`].
  pub token_ttl_hours: i64,
}

/// Upper bound on `token_ttl_hours`: one year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

impl ServerConfig {
  /// The bearer token lifetime, or `None` when `token_ttl_hours` is out of
  /// range.
  pub fn token_ttl(&self) -> Option<TimeDelta> {
    if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
      return None;
    }
    TimeDelta::try_hours(self.token_ttl_hours)
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub registry: Registry<SqliteStore>,
  pub config:   Arc<ServerConfig>,
}

impl AppState {
  pub fn new(store: SqliteStore, config: ServerConfig) -> Self {
    Self { registry: Registry::new(store), config: Arc::new(config) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router.
pub fn router(state: AppState) -> Router {
  Router::new()
    // Session
    .route("/auth/login", post(session::login))
    .route("/auth/logout", post(session::logout))
    .route("/auth/me", get(session::me))
    // Centres
    .route("/centres", get(centres::list).post(centres::create))
    .route("/centres/{id}", get(centres::get_one).patch(centres::update))
    .route("/centres/{id}/toggle-active", post(centres::toggle_active))
    .route("/centres/{id}/students", get(centres::students))
    .route("/centres/{id}/reset-password", post(centres::reset_password))
    // Students
    .route("/students", get(students::list).post(students::create))
    .route("/students/{id}", get(students::get_one).patch(students::update))
    .route("/students/{id}/approve", post(students::approve))
    .route("/students/{id}/toggle-active", post(students::toggle_active))
    .route("/students/{id}/promote", post(students::promote))
    .route("/students/{id}/history", get(history::for_student))
    .route("/students/{id}/level", get(history::current_level))
    .route("/students/{id}/reset-password", post(students::reset_password))
    // Level catalog
    .route("/levels", get(levels::list).post(levels::create))
    .route("/levels/{id}", get(levels::get_one))
    .route("/levels/{id}/publish", post(levels::publish))
    // Ledger
    .route("/history", get(history::list))
    // Assessments
    .route("/assessments", get(assessments::list).post(assessments::create))
    .route("/assessments/{id}", get(assessments::get_one))
    .route("/assessments/{id}/toggle-active", post(assessments::toggle_active))
    .route("/assessments/{id}/attempts", post(assessments::begin_attempt))
    .route("/assessments/{id}/top-scores", get(assessments::top_scores))
    // Attempts
    .route("/attempts", get(attempts::list))
    .route("/attempts/{id}", get(attempts::get_one))
    .route("/attempts/{id}/start", post(attempts::start))
    .route("/attempts/{id}/submit", post(attempts::submit))
    .route("/attempts/{id}/result", get(attempts::result))
    // Notifications
    .route("/notifications", get(notifications::list).post(notifications::create))
    .route("/notifications/{id}", get(notifications::get_one))
    .route("/notifications/{id}/read", post(notifications::mark_read))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
