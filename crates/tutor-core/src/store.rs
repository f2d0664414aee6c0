//! The `RegistryStore` and `IdentityStore` traits.
//!
//! Storage backends (e.g. `tutor-store-sqlite`) implement these; the
//! [`Registry`](crate::registry::Registry) and the HTTP layer depend on the
//! abstraction only.
//!
//! Every method that touches more than one row runs as a single
//! transaction. Compare-and-swap methods (`set_student_status`,
//! `set_centre_active`, `record_promotion`, `start_attempt`,
//! `finish_attempt`) report a lost race as
//! [`Error::ConcurrentModification`](crate::Error::ConcurrentModification)
//! folded into the backend's error type.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  access::Scope,
  assessment::{Assessment, NewAssessment},
  attempt::{AnswerRecord, Attempt, AttemptStatus, TopScore},
  centre::{Centre, CentreSummary, CentreUpdate, NewCentre},
  ledger::{History, LevelHistoryEntry, Promotion},
  level::{Level, NewLevel},
  notification::Notification,
  principal::{NewCredentials, Principal},
  student::{Gender, Student, StudentQuery, StudentStatus, StudentUpdate},
};

/// A fully-resolved student insert: centre, level and instructor have all
/// been validated by the registry.
#[derive(Debug, Clone)]
pub struct StudentInsert {
  pub centre_id:        Uuid,
  pub name:             String,
  pub dob:              NaiveDate,
  pub gender:           Gender,
  pub level_id:         Uuid,
  pub instructor_id:    Option<Uuid>,
  pub level_start_date: NaiveDate,
  pub credentials:      NewCredentials,
  /// The principal creating the student; recorded on the first ledger
  /// entry.
  pub created_by:       Uuid,
}

/// Catalog filter resolved from the caller's scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessmentFilter {
  pub level_id:         Option<Uuid>,
  pub include_inactive: bool,
}

/// A new `Pending` attempt.
#[derive(Debug, Clone)]
pub struct AttemptInsert {
  pub assessment_id: Uuid,
  pub student_id:    Uuid,
  pub centre_id:     Uuid,
}

/// How a store closes an in-progress attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
  pub attempt_id:  Uuid,
  /// `Completed` or `Interrupted`.
  pub status:      AttemptStatus,
  pub finished_at: DateTime<Utc>,
  pub score:       Option<i64>,
  pub answers:     Vec<AnswerRecord>,
}

/// A notification whose recipient centres have been checked to exist.
#[derive(Debug, Clone)]
pub struct NotificationInsert {
  pub title:      String,
  pub message:    String,
  pub centre_ids: Vec<Uuid>,
  pub created_by: Uuid,
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Persistence for centres, students, levels and the progression ledger.
pub trait RegistryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Centres ───────────────────────────────────────────────────────────

  /// Create a centre, its instructors and its login principal.
  fn insert_centre(
    &self,
    input: NewCentre,
  ) -> impl Future<Output = Result<Centre, Self::Error>> + Send + '_;

  fn get_centre(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Centre>, Self::Error>> + Send + '_;

  /// All centres with student counts. `search` matches name, franchisee or
  /// area, case-insensitively.
  fn list_centres(
    &self,
    search: Option<String>,
  ) -> impl Future<Output = Result<Vec<CentreSummary>, Self::Error>> + Send + '_;

  fn update_centre(
    &self,
    id: Uuid,
    update: CentreUpdate,
  ) -> impl Future<Output = Result<Centre, Self::Error>> + Send + '_;

  /// Set `active` only if it currently equals `expected`.
  fn set_centre_active(
    &self,
    id: Uuid,
    expected: bool,
    active: bool,
  ) -> impl Future<Output = Result<Centre, Self::Error>> + Send + '_;

  // ── Students ──────────────────────────────────────────────────────────

  /// Create a `Pending` student, its login principal and its first open
  /// ledger entry in one transaction.
  fn insert_student(
    &self,
    input: StudentInsert,
  ) -> impl Future<Output = Result<(Student, LevelHistoryEntry), Self::Error>> + Send + '_;

  fn get_student(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn list_students<'a>(
    &'a self,
    scope: Scope,
    query: &'a StudentQuery,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + 'a;

  fn update_student(
    &self,
    id: Uuid,
    update: StudentUpdate,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  /// Set the status only if it currently equals `expected`.
  fn set_student_status(
    &self,
    id: Uuid,
    expected: StudentStatus,
    status: StudentStatus,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  // ── Levels ────────────────────────────────────────────────────────────

  fn insert_level(
    &self,
    input: NewLevel,
  ) -> impl Future<Output = Result<Level, Self::Error>> + Send + '_;

  fn get_level(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Level>, Self::Error>> + Send + '_;

  /// Levels ordered by ordinal.
  fn list_levels(
    &self,
    include_unpublished: bool,
  ) -> impl Future<Output = Result<Vec<Level>, Self::Error>> + Send + '_;

  fn publish_level(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Level, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// One student's ledger, chronological.
  fn history_for(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<History, Self::Error>> + Send + '_;

  /// Ledger entries of every student inside `scope`, grouped by student and
  /// chronological within each student.
  fn list_history(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<Vec<LevelHistoryEntry>, Self::Error>> + Send + '_;

  /// Close the expected open entry, append the new one and move the
  /// student's cached level, atomically.
  fn record_promotion(
    &self,
    promotion: Promotion,
  ) -> impl Future<Output = Result<LevelHistoryEntry, Self::Error>> + Send + '_;

  // ── Assessments ───────────────────────────────────────────────────────

  /// Insert an assessment with its sections and questions.
  fn insert_assessment(
    &self,
    input: NewAssessment,
  ) -> impl Future<Output = Result<Assessment, Self::Error>> + Send + '_;

  fn get_assessment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Assessment>, Self::Error>> + Send + '_;

  /// Assessments ordered by creation time.
  fn list_assessments(
    &self,
    filter: AssessmentFilter,
  ) -> impl Future<Output = Result<Vec<Assessment>, Self::Error>> + Send + '_;

  fn set_assessment_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<Assessment, Self::Error>> + Send + '_;

  // ── Attempts ──────────────────────────────────────────────────────────

  /// Insert a `Pending` attempt. Fails with
  /// [`Error::AttemptOpen`](crate::Error::AttemptOpen) if the student
  /// already has an open one.
  fn insert_attempt(
    &self,
    input: AttemptInsert,
  ) -> impl Future<Output = Result<Attempt, Self::Error>> + Send + '_;

  fn get_attempt(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Attempt>, Self::Error>> + Send + '_;

  /// The student's `Pending` or `InProgress` attempt, if any.
  fn open_attempt(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<Attempt>, Self::Error>> + Send + '_;

  /// Attempts inside `scope`, newest first.
  fn list_attempts(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<Vec<Attempt>, Self::Error>> + Send + '_;

  /// `Pending → InProgress`, only if still pending.
  fn start_attempt(
    &self,
    id: Uuid,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
  ) -> impl Future<Output = Result<Attempt, Self::Error>> + Send + '_;

  /// Close an `InProgress` attempt and store its answers, only if still in
  /// progress.
  fn finish_attempt(
    &self,
    outcome: AttemptOutcome,
  ) -> impl Future<Output = Result<Attempt, Self::Error>> + Send + '_;

  fn answers_for(
    &self,
    attempt_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AnswerRecord>, Self::Error>> + Send + '_;

  /// Best completed score per student inside `scope`, highest first.
  fn top_scores(
    &self,
    assessment_id: Uuid,
    scope: Scope,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<TopScore>, Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  fn insert_notification(
    &self,
    input: NotificationInsert,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;

  fn get_notification(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Notification>, Self::Error>> + Send + '_;

  /// Notifications inside `scope`, newest first. For a centre scope only
  /// that centre's recipient entry is returned.
  fn list_notifications(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Set the centre's read receipt unless already set.
  fn mark_notification_read(
    &self,
    id: Uuid,
    centre_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Credentials ───────────────────────────────────────────────────────

  /// Replace a principal's password hash and revoke its tokens.
  fn set_password_hash(
    &self,
    principal_id: Uuid,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// A principal together with its stored password hash.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
  pub principal:     Principal,
  pub password_hash: String,
}

/// Credential and token persistence for the authentication layer.
///
/// Tokens are handled as opaque digests; hashing the bearer secret is the
/// caller's job.
pub trait IdentityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn insert_admin(
    &self,
    credentials: NewCredentials,
  ) -> impl Future<Output = Result<Principal, Self::Error>> + Send + '_;

  fn find_credentials<'a>(
    &'a self,
    login: &'a str,
  ) -> impl Future<Output = Result<Option<StoredCredentials>, Self::Error>> + Send + 'a;

  /// Whether the principal may currently sign in: its centre is active and,
  /// for students, the student is `Active`.
  fn is_enabled(
    &self,
    principal: Principal,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn insert_token(
    &self,
    principal_id: Uuid,
    token_digest: String,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The principal owning an unexpired token.
  fn principal_for_token(
    &self,
    token_digest: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + '_;

  /// Returns `false` if the token did not exist.
  fn revoke_token(
    &self,
    token_digest: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
