//! [`Registry`], the operations exposed to the request layer.
//!
//! Each operation follows the same shape: load the target (to learn its
//! owning centre), ask [`access::resolve`] for a decision, check the
//! lifecycle and ledger rules, then hand a single atomic write to the
//! store.
//!
//! Non-admin callers never learn whether a record they cannot see exists:
//! a missing record is reported to them as [`Error::Forbidden`], exactly
//! like a record outside their scope.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{self, Action, Decision, Resource, Scope},
  assessment::{Assessment, AssessmentQuery, NewAssessment},
  attempt::{self, Attempt, AttemptResult, AttemptStatus, SubmittedAnswer, TopScore},
  centre::{Centre, CentreSummary, CentreUpdate, NewCentre},
  error::EntityKind,
  ledger::{self, History, LevelHistoryEntry, Promotion},
  level::{Level, NewLevel},
  lifecycle,
  notification::{NewNotification, Notification},
  principal::{Principal, Role},
  store::{
    AssessmentFilter, AttemptInsert, AttemptOutcome, NotificationInsert, RegistryStore,
    StudentInsert,
  },
  student::{NewStudent, Student, StudentQuery, StudentStatus, StudentUpdate},
};

/// How many students [`Registry::top_scores`] reports.
pub const TOP_SCORES_LIMIT: usize = 10;

/// Parameters of [`Registry::promote_student`].
#[derive(Debug, Clone, Deserialize)]
pub struct PromoteRequest {
  pub level_id:   Uuid,
  pub start_date: NaiveDate,
  /// Allow a regression or sideways move. Honoured for admins only.
  #[serde(default, rename = "override")]
  pub override_order: bool,
}

/// Whose password [`Registry::reset_password`] replaces.
#[derive(Debug, Clone, Copy)]
pub enum PasswordTarget {
  Centre(Uuid),
  Student(Uuid),
}

/// Business-rule façade over a [`RegistryStore`].
///
/// Cloning is as cheap as cloning the store.
#[derive(Debug, Clone)]
pub struct Registry<S> {
  store: S,
}

/// Convert a backend error into the domain taxonomy, logging the ones an
/// operator needs to see.
fn lift<E: Into<Error>>(e: E) -> Error {
  let e = e.into();
  match &e {
    e if e.is_integrity_violation() => {
      tracing::error!(error = %e, "level history ledger integrity violation");
    }
    Error::ConcurrentModification(id) => {
      tracing::warn!(%id, "lost a concurrent modification race");
    }
    Error::Storage(source) => {
      tracing::error!(error = %source, "storage failure");
    }
    _ => {}
  }
  e
}

impl<S> Registry<S>
where
  S: RegistryStore,
  S::Error: Into<Error>,
{
  pub fn new(store: S) -> Self { Self { store } }

  pub fn store(&self) -> &S { &self.store }

  /// Pure access decision; exposed for the request layer.
  pub fn resolve_access(
    &self,
    by: &Principal,
    resource: Resource,
    action: Action,
  ) -> Decision {
    access::resolve(by, resource, action)
  }

  // ─── Loading helpers ──────────────────────────────────────────────────────

  /// A missing record: `NotFound` for admins, `Forbidden` for everyone
  /// else.
  fn missing(by: &Principal, kind: EntityKind, id: Uuid) -> Error {
    if by.role.is_admin() {
      Error::NotFound(kind, id)
    } else {
      Error::Forbidden
    }
  }

  async fn load_centre(&self, by: &Principal, id: Uuid) -> Result<Centre> {
    self
      .store
      .get_centre(id)
      .await
      .map_err(lift)?
      .ok_or_else(|| Self::missing(by, EntityKind::Centre, id))
  }

  /// Load a student and authorize `action` on it.
  async fn load_student(
    &self,
    by: &Principal,
    id: Uuid,
    action: Action,
  ) -> Result<Student> {
    let student = self
      .store
      .get_student(id)
      .await
      .map_err(lift)?
      .ok_or_else(|| Self::missing(by, EntityKind::Student, id))?;
    access::resolve(
      by,
      Resource::Student { student_id: id, centre_id: student.centre_id },
      action,
    )
    .scope()?;
    Ok(student)
  }

  async fn require_level(&self, id: Uuid) -> Result<Level> {
    self
      .store
      .get_level(id)
      .await
      .map_err(lift)?
      .ok_or(Error::NotFound(EntityKind::Level, id))
  }

  fn require_active_centre(centre: &Centre) -> Result<()> {
    if centre.active {
      Ok(())
    } else {
      Err(Error::CentreInactive(centre.centre_id))
    }
  }

  fn require_recordable(date: NaiveDate, field: &str) -> Result<()> {
    if ledger::is_recordable(date) {
      Ok(())
    } else {
      Err(Error::Invalid(format!("{field} {date} is outside years 1 to 9999")))
    }
  }

  fn require_instructor(centre: &Centre, instructor_id: Option<Uuid>) -> Result<()> {
    match instructor_id {
      Some(id) if !centre.owns_instructor(id) => Err(Error::InstructorNotInCentre {
        instructor_id: id,
        centre_id:     centre.centre_id,
      }),
      _ => Ok(()),
    }
  }

  // ─── Centres ──────────────────────────────────────────────────────────────

  pub async fn create_centre(&self, by: &Principal, input: NewCentre) -> Result<Centre> {
    access::resolve(by, Resource::Centres, Action::Create).scope()?;
    if input.name.trim().is_empty() {
      return Err(Error::Invalid("centre name must not be empty".to_owned()));
    }
    let centre = self.store.insert_centre(input).await.map_err(lift)?;
    tracing::info!(centre_id = %centre.centre_id, by = %by.principal_id, "centre created");
    Ok(centre)
  }

  pub async fn list_centres(
    &self,
    by: &Principal,
    search: Option<String>,
  ) -> Result<Vec<CentreSummary>> {
    access::resolve(by, Resource::Centres, Action::List).scope()?;
    self.store.list_centres(search).await.map_err(lift)
  }

  pub async fn get_centre(&self, by: &Principal, id: Uuid) -> Result<Centre> {
    access::resolve(by, Resource::Centre(id), Action::Read).scope()?;
    self.load_centre(by, id).await
  }

  pub async fn update_centre(
    &self,
    by: &Principal,
    id: Uuid,
    update: CentreUpdate,
  ) -> Result<Centre> {
    access::resolve(by, Resource::Centre(id), Action::Update).scope()?;
    self.load_centre(by, id).await?;
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::Invalid("centre name must not be empty".to_owned()));
    }
    self.store.update_centre(id, update).await.map_err(lift)
  }

  /// Flip a centre's active flag. Admin only; students are not touched, but
  /// an inactive centre's principals can no longer sign in.
  pub async fn toggle_centre_active(&self, by: &Principal, id: Uuid) -> Result<Centre> {
    access::resolve(by, Resource::Centre(id), Action::ToggleActive).scope()?;
    let centre = self.load_centre(by, id).await?;
    let updated = self
      .store
      .set_centre_active(id, centre.active, !centre.active)
      .await
      .map_err(lift)?;
    tracing::info!(
      centre_id = %id,
      active = updated.active,
      by = %by.principal_id,
      "centre active flag toggled"
    );
    Ok(updated)
  }

  /// Students of one centre.
  pub async fn list_centre_students(
    &self,
    by: &Principal,
    centre_id: Uuid,
  ) -> Result<Vec<Student>> {
    access::resolve(by, Resource::Centre(centre_id), Action::Read).scope()?;
    self.load_centre(by, centre_id).await?;
    self
      .store
      .list_students(Scope::Centre(centre_id), &StudentQuery::default())
      .await
      .map_err(lift)
  }

  // ─── Students ─────────────────────────────────────────────────────────────

  /// Create a `Pending` student with one open ledger entry at its initial
  /// level.
  pub async fn create_student(
    &self,
    by: &Principal,
    input: NewStudent,
  ) -> Result<(Student, LevelHistoryEntry)> {
    let scope = access::resolve(by, Resource::Students, Action::Create).scope()?;
    let centre_id = match scope {
      Scope::Centre(own) => own,
      Scope::All => input
        .centre_id
        .ok_or_else(|| Error::Invalid("centre_id is required".to_owned()))?,
      Scope::Student(_) => return Err(Error::Forbidden),
    };

    let centre = self.load_centre(by, centre_id).await?;
    Self::require_active_centre(&centre)?;
    Self::require_instructor(&centre, input.instructor_id)?;

    let level = self.require_level(input.level_id).await?;
    if !level.published {
      return Err(Error::InvalidLevel(format!(
        "level {} is not published",
        level.level_id
      )));
    }
    if input.name.trim().is_empty() {
      return Err(Error::Invalid("student name must not be empty".to_owned()));
    }
    Self::require_recordable(input.dob, "date of birth")?;
    if !ledger::is_recordable(input.level_start_date) {
      return Err(Error::InvalidStartDate(format!(
        "{} is outside years 1 to 9999",
        input.level_start_date
      )));
    }

    let (student, entry) = self
      .store
      .insert_student(StudentInsert {
        centre_id,
        name: input.name,
        dob: input.dob,
        gender: input.gender,
        level_id: level.level_id,
        instructor_id: input.instructor_id,
        level_start_date: input.level_start_date,
        credentials: input.credentials,
        created_by: by.principal_id,
      })
      .await
      .map_err(lift)?;

    tracing::info!(
      student_id = %student.student_id,
      %centre_id,
      level_id = %level.level_id,
      by = %by.principal_id,
      "student created"
    );
    Ok((student, entry))
  }

  pub async fn get_student(&self, by: &Principal, id: Uuid) -> Result<Student> {
    self.load_student(by, id, Action::Read).await
  }

  /// Students visible to `by`, narrowed by `query`.
  pub async fn list_students(
    &self,
    by: &Principal,
    query: &StudentQuery,
  ) -> Result<Vec<Student>> {
    let scope = access::resolve(by, Resource::Students, Action::List).scope()?;
    self.store.list_students(scope, query).await.map_err(lift)
  }

  pub async fn update_student(
    &self,
    by: &Principal,
    id: Uuid,
    update: StudentUpdate,
  ) -> Result<Student> {
    let student = self.load_student(by, id, Action::Update).await?;
    let centre = self.load_centre(by, student.centre_id).await?;
    Self::require_active_centre(&centre)?;
    if let Some(instructor_id) = update.instructor_id {
      Self::require_instructor(&centre, instructor_id)?;
    }
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::Invalid("student name must not be empty".to_owned()));
    }
    if let Some(dob) = update.dob {
      Self::require_recordable(dob, "date of birth")?;
    }
    self.store.update_student(id, update).await.map_err(lift)
  }

  /// `Pending → Active`. Admin only. A second call fails with
  /// `InvalidTransition` and changes nothing.
  pub async fn approve_student(&self, by: &Principal, id: Uuid) -> Result<Student> {
    let student = self.load_student(by, id, Action::Approve).await?;
    let next = lifecycle::approve(student.status)?;
    self.apply_status(by, &student, next).await
  }

  /// `Active ↔ Inactive`. Admin or the owning centre.
  pub async fn toggle_student_active(&self, by: &Principal, id: Uuid) -> Result<Student> {
    let student = self.load_student(by, id, Action::ToggleActive).await?;
    let next = lifecycle::toggle_active(student.status)?;
    self.apply_status(by, &student, next).await
  }

  async fn apply_status(
    &self,
    by: &Principal,
    student: &Student,
    next: StudentStatus,
  ) -> Result<Student> {
    let updated = self
      .store
      .set_student_status(student.student_id, student.status, next)
      .await
      .map_err(lift)?;
    tracing::info!(
      student_id = %student.student_id,
      from = %student.status,
      to = %next,
      by = %by.principal_id,
      "student status changed"
    );
    Ok(updated)
  }

  /// Move a student to a new level.
  ///
  /// Closes the open ledger entry at `start_date`, opens a new one and
  /// moves the student's cached level, in one transaction. A concurrent
  /// promotion of the same student makes exactly one of the two fail with
  /// [`Error::ConcurrentModification`].
  pub async fn promote_student(
    &self,
    by: &Principal,
    id: Uuid,
    request: PromoteRequest,
  ) -> Result<LevelHistoryEntry> {
    let student = self.load_student(by, id, Action::Promote).await?;
    let centre = self.load_centre(by, student.centre_id).await?;
    Self::require_active_centre(&centre)?;

    let history = self.store.history_for(id).await.map_err(lift)?;
    let open = history
      .find_open(id)
      .map_err(lift)?
      .ok_or(Error::OpenEntryRequired(id))
      .map_err(lift)?;
    if open.level_id != student.current_level_id {
      return Err(lift(Error::CorruptLedger {
        student_id: id,
        detail:     format!(
          "cached level {} differs from open entry level {}",
          student.current_level_id, open.level_id
        ),
      }));
    }

    let current = self.require_level(open.level_id).await?;
    let target = self.require_level(request.level_id).await?;
    let allow_regression = request.override_order && by.role.is_admin();
    ledger::check_promotion(open, &current, &target, request.start_date, allow_regression)?;

    let entry = self
      .store
      .record_promotion(Promotion {
        student_id:          id,
        expected_open_entry: open.entry_id,
        expected_level_id:   open.level_id,
        new_level_id:        target.level_id,
        start_date:          request.start_date,
        changed_by:          by.principal_id,
      })
      .await
      .map_err(lift)?;

    tracing::info!(
      student_id = %id,
      from_level = %current.level_id,
      to_level = %target.level_id,
      start_date = %request.start_date,
      overridden = allow_regression && target.ordinal <= current.ordinal,
      by = %by.principal_id,
      "student promoted"
    );
    Ok(entry)
  }

  // ─── Ledger reads ─────────────────────────────────────────────────────────

  /// One student's verified, chronological history.
  pub async fn get_history(&self, by: &Principal, id: Uuid) -> Result<History> {
    let student = self
      .store
      .get_student(id)
      .await
      .map_err(lift)?
      .ok_or_else(|| Self::missing(by, EntityKind::Student, id))?;
    access::resolve(
      by,
      Resource::History { student_id: id, centre_id: student.centre_id },
      Action::Read,
    )
    .scope()?;

    let history = self.store.history_for(id).await.map_err(lift)?;
    history.verify(id).map_err(lift)?;
    Ok(history)
  }

  /// The level of the student's open ledger entry.
  pub async fn current_level(&self, by: &Principal, id: Uuid) -> Result<Level> {
    let history = self.get_history(by, id).await?;
    let open = history.open_entry(id).map_err(lift)?;
    self.require_level(open.level_id).await
  }

  /// History entries across every student visible to `by`.
  pub async fn list_history(&self, by: &Principal) -> Result<Vec<LevelHistoryEntry>> {
    let scope = access::resolve(by, Resource::Histories, Action::List).scope()?;
    self.store.list_history(scope).await.map_err(lift)
  }

  // ─── Level catalog ────────────────────────────────────────────────────────

  pub async fn create_level(&self, by: &Principal, input: NewLevel) -> Result<Level> {
    access::resolve(by, Resource::Levels, Action::Create).scope()?;
    if input.name.trim().is_empty() {
      return Err(Error::Invalid("level name must not be empty".to_owned()));
    }
    let level = self.store.insert_level(input).await.map_err(lift)?;
    tracing::info!(level_id = %level.level_id, ordinal = level.ordinal, "level created");
    Ok(level)
  }

  /// Publish a level. Publishing is one-way.
  pub async fn publish_level(&self, by: &Principal, id: Uuid) -> Result<Level> {
    access::resolve(by, Resource::Level(id), Action::Publish).scope()?;
    let level = self.require_level(id).await?;
    if level.published {
      return Ok(level);
    }
    let level = self.store.publish_level(id).await.map_err(lift)?;
    tracing::info!(level_id = %id, "level published");
    Ok(level)
  }

  /// The catalog in ordinal order. Non-admins see published levels only.
  pub async fn list_levels(&self, by: &Principal) -> Result<Vec<Level>> {
    access::resolve(by, Resource::Levels, Action::List).scope()?;
    self.store.list_levels(by.role.is_admin()).await.map_err(lift)
  }

  pub async fn get_level(&self, by: &Principal, id: Uuid) -> Result<Level> {
    access::resolve(by, Resource::Level(id), Action::Read).scope()?;
    let level = self.require_level(id).await?;
    if !level.published && !by.role.is_admin() {
      return Err(Error::NotFound(EntityKind::Level, id));
    }
    Ok(level)
  }

  // ─── Assessments ──────────────────────────────────────────────────────────

  /// The level of the student's open ledger entry.
  async fn student_level(&self, student_id: Uuid) -> Result<Uuid> {
    let history = self.store.history_for(student_id).await.map_err(lift)?;
    Ok(history.open_entry(student_id).map_err(lift)?.level_id)
  }

  async fn require_assessment(&self, id: Uuid) -> Result<Assessment> {
    self
      .store
      .get_assessment(id)
      .await
      .map_err(lift)?
      .ok_or(Error::NotFound(EntityKind::Assessment, id))
  }

  /// Add a test to the catalog. Admin only. The level must exist but need
  /// not be published yet.
  pub async fn create_assessment(
    &self,
    by: &Principal,
    input: NewAssessment,
  ) -> Result<Assessment> {
    access::resolve(by, Resource::Assessments, Action::Create).scope()?;
    input.validate()?;
    self.require_level(input.level_id).await?;
    let assessment = self.store.insert_assessment(input).await.map_err(lift)?;
    tracing::info!(
      assessment_id = %assessment.assessment_id,
      level_id = %assessment.level_id,
      questions = assessment.questions().count(),
      by = %by.principal_id,
      "assessment created"
    );
    Ok(assessment)
  }

  /// The catalog visible to `by`: everything for admins, active tests for
  /// centres, and active tests at the student's current level for students.
  pub async fn list_assessments(
    &self,
    by: &Principal,
    query: &AssessmentQuery,
  ) -> Result<Vec<Assessment>> {
    let filter = match access::resolve(by, Resource::Assessments, Action::List).scope()? {
      Scope::Student(student_id) => {
        let level_id = self.student_level(student_id).await?;
        if query.level_id.is_some_and(|l| l != level_id) {
          return Ok(Vec::new());
        }
        AssessmentFilter { level_id: Some(level_id), include_inactive: false }
      }
      Scope::All | Scope::Centre(_) => AssessmentFilter {
        level_id:         query.level_id,
        include_inactive: by.role.is_admin(),
      },
    };
    self.store.list_assessments(filter).await.map_err(lift)
  }

  pub async fn get_assessment(&self, by: &Principal, id: Uuid) -> Result<Assessment> {
    let scope = access::resolve(by, Resource::Assessment(id), Action::Read).scope()?;
    let assessment = self
      .store
      .get_assessment(id)
      .await
      .map_err(lift)?
      .filter(|a| a.active || by.role.is_admin())
      .ok_or_else(|| Self::missing(by, EntityKind::Assessment, id))?;
    if let Scope::Student(student_id) = scope
      && self.student_level(student_id).await? != assessment.level_id
    {
      return Err(Error::Forbidden);
    }
    Ok(assessment)
  }

  /// Show or hide an assessment. Admin only. Open attempts may still be
  /// started and submitted.
  pub async fn toggle_assessment_active(&self, by: &Principal, id: Uuid) -> Result<Assessment> {
    access::resolve(by, Resource::Assessment(id), Action::ToggleActive).scope()?;
    let assessment = self.require_assessment(id).await?;
    let updated = self
      .store
      .set_assessment_active(id, !assessment.active)
      .await
      .map_err(lift)?;
    tracing::info!(
      assessment_id = %id,
      active = updated.active,
      by = %by.principal_id,
      "assessment active flag toggled"
    );
    Ok(updated)
  }

  // ─── Attempts ─────────────────────────────────────────────────────────────

  /// Load an attempt and authorize `action` on it.
  async fn load_attempt(&self, by: &Principal, id: Uuid, action: Action) -> Result<Attempt> {
    let attempt = self
      .store
      .get_attempt(id)
      .await
      .map_err(lift)?
      .ok_or_else(|| Self::missing(by, EntityKind::Attempt, id))?;
    access::resolve(
      by,
      Resource::Attempt { student_id: attempt.student_id, centre_id: attempt.centre_id },
      action,
    )
    .scope()?;
    Ok(attempt)
  }

  /// Open a `Pending` attempt on an active assessment at the student's
  /// current level.
  ///
  /// A previous attempt left in progress past its deadline is interrupted
  /// first; any other open attempt fails with [`Error::AttemptOpen`].
  pub async fn begin_attempt(&self, by: &Principal, assessment_id: Uuid) -> Result<Attempt> {
    let student_id = match access::resolve(by, Resource::Attempts, Action::Create).scope()? {
      Scope::Student(id) => id,
      Scope::All | Scope::Centre(_) => {
        return Err(Error::Invalid("assessments are taken by students".to_owned()));
      }
    };
    let student = self.load_student(by, student_id, Action::Read).await?;
    if student.status != StudentStatus::Active {
      return Err(Error::Forbidden);
    }
    self.get_assessment(by, assessment_id).await?;

    let now = Utc::now();
    if let Some(open) = self.store.open_attempt(student_id).await.map_err(lift)? {
      if !open.is_timed_out(now) {
        return Err(Error::AttemptOpen(open.attempt_id));
      }
      self
        .store
        .finish_attempt(AttemptOutcome {
          attempt_id:  open.attempt_id,
          status:      AttemptStatus::Interrupted,
          finished_at: now,
          score:       None,
          answers:     Vec::new(),
        })
        .await
        .map_err(lift)?;
      tracing::info!(attempt_id = %open.attempt_id, %student_id, "timed-out attempt interrupted");
    }

    let attempt = self
      .store
      .insert_attempt(AttemptInsert { assessment_id, student_id, centre_id: student.centre_id })
      .await
      .map_err(lift)?;
    tracing::info!(attempt_id = %attempt.attempt_id, %assessment_id, %student_id, "attempt begun");
    Ok(attempt)
  }

  /// `Pending → InProgress`; the clock starts now.
  pub async fn start_attempt(&self, by: &Principal, id: Uuid) -> Result<Attempt> {
    let attempt = self.load_attempt(by, id, Action::Start).await?;
    let assessment = self.require_assessment(attempt.assessment_id).await?;
    let now = Utc::now();
    let deadline = attempt::start(attempt.status, assessment.duration_minutes, now)?;
    let started = self.store.start_attempt(id, now, deadline).await.map_err(lift)?;
    tracing::info!(attempt_id = %id, %deadline, "attempt started");
    Ok(started)
  }

  /// Score and close an in-progress attempt. Past the deadline the answers
  /// are discarded and the attempt ends `Interrupted`.
  pub async fn submit_attempt(
    &self,
    by: &Principal,
    id: Uuid,
    answers: Vec<SubmittedAnswer>,
  ) -> Result<AttemptResult> {
    let attempt = self.load_attempt(by, id, Action::Submit).await?;
    let assessment = self.require_assessment(attempt.assessment_id).await?;
    let now = Utc::now();
    let status = attempt::finish(&attempt, now)?;
    let (records, score) = match status {
      AttemptStatus::Completed => {
        let records = attempt::score(&assessment, answers)?;
        let score = records.iter().map(|r| r.marks_obtained).sum();
        (records, Some(score))
      }
      _ => (Vec::new(), None),
    };

    let finished = self
      .store
      .finish_attempt(AttemptOutcome {
        attempt_id: id,
        status,
        finished_at: now,
        score,
        answers: records.clone(),
      })
      .await
      .map_err(lift)?;
    tracing::info!(attempt_id = %id, %status, ?score, "attempt submitted");
    Ok(AttemptResult::new(finished, &assessment, records))
  }

  /// The breakdown of a finished attempt.
  pub async fn attempt_result(&self, by: &Principal, id: Uuid) -> Result<AttemptResult> {
    let attempt = self.load_attempt(by, id, Action::Read).await?;
    if attempt.is_open() {
      return Err(Error::Invalid(format!("attempt {id} is not finished")));
    }
    let assessment = self.require_assessment(attempt.assessment_id).await?;
    let answers = self.store.answers_for(id).await.map_err(lift)?;
    Ok(AttemptResult::new(attempt, &assessment, answers))
  }

  pub async fn get_attempt(&self, by: &Principal, id: Uuid) -> Result<Attempt> {
    self.load_attempt(by, id, Action::Read).await
  }

  /// Attempts of every student visible to `by`.
  pub async fn list_attempts(&self, by: &Principal) -> Result<Vec<Attempt>> {
    let scope = access::resolve(by, Resource::Attempts, Action::List).scope()?;
    self.store.list_attempts(scope).await.map_err(lift)
  }

  /// Highest scorers of one assessment among the students visible to `by`.
  pub async fn top_scores(&self, by: &Principal, assessment_id: Uuid) -> Result<Vec<TopScore>> {
    let scope = access::resolve(by, Resource::Attempts, Action::List).scope()?;
    self.get_assessment(by, assessment_id).await?;
    self
      .store
      .top_scores(assessment_id, scope, TOP_SCORES_LIMIT)
      .await
      .map_err(lift)
  }

  // ─── Notifications ────────────────────────────────────────────────────────

  /// Send a notification to one or more centres. Admin only.
  pub async fn create_notification(
    &self,
    by: &Principal,
    input: NewNotification,
  ) -> Result<Notification> {
    access::resolve(by, Resource::Notifications, Action::Create).scope()?;
    if input.title.trim().is_empty() || input.message.trim().is_empty() {
      return Err(Error::Invalid("notification title and message must not be empty".to_owned()));
    }
    let mut centre_ids = input.centre_ids;
    let mut seen = std::collections::HashSet::new();
    centre_ids.retain(|id| seen.insert(*id));
    if centre_ids.is_empty() {
      return Err(Error::Invalid("a notification needs at least one centre".to_owned()));
    }
    for &id in &centre_ids {
      if self.store.get_centre(id).await.map_err(lift)?.is_none() {
        return Err(Error::Invalid(format!("centre {id} does not exist")));
      }
    }

    let notification = self
      .store
      .insert_notification(NotificationInsert {
        title: input.title,
        message: input.message,
        centre_ids,
        created_by: by.principal_id,
      })
      .await
      .map_err(lift)?;
    tracing::info!(
      notification_id = %notification.notification_id,
      recipients = notification.recipients.len(),
      by = %by.principal_id,
      "notification sent"
    );
    Ok(notification)
  }

  pub async fn list_notifications(&self, by: &Principal) -> Result<Vec<Notification>> {
    let scope = access::resolve(by, Resource::Notifications, Action::List).scope()?;
    self.store.list_notifications(scope).await.map_err(lift)
  }

  /// One notification, with only the recipient entries `by` may see.
  pub async fn get_notification(&self, by: &Principal, id: Uuid) -> Result<Notification> {
    let mut notification = self
      .store
      .get_notification(id)
      .await
      .map_err(lift)?
      .ok_or_else(|| Self::missing(by, EntityKind::Notification, id))?;
    notification.recipients.retain(|r| {
      access::resolve(by, Resource::Notification { centre_id: r.centre_id }, Action::Read)
        .is_allowed()
    });
    if notification.recipients.is_empty() {
      return Err(Self::missing(by, EntityKind::Notification, id));
    }
    Ok(notification)
  }

  /// Record the calling centre's read receipt. Repeating it keeps the
  /// first timestamp.
  pub async fn mark_notification_read(&self, by: &Principal, id: Uuid) -> Result<Notification> {
    let centre_id = match by.role {
      Role::Centre(own) => own,
      Role::Admin => {
        return Err(Error::Invalid("only recipient centres mark notifications read".to_owned()));
      }
      Role::Student(_) => return Err(Error::Forbidden),
    };
    self.get_notification(by, id).await?;
    access::resolve(by, Resource::Notification { centre_id }, Action::Update).scope()?;
    self
      .store
      .mark_notification_read(id, centre_id, Utc::now())
      .await
      .map_err(lift)?;
    self.get_notification(by, id).await
  }

  // ─── Credentials ──────────────────────────────────────────────────────────

  /// Replace the password of a centre's or student's login. The caller
  /// supplies the new hash.
  pub async fn reset_password(
    &self,
    by: &Principal,
    target: PasswordTarget,
    password_hash: String,
  ) -> Result<()> {
    let principal_id = match target {
      PasswordTarget::Centre(id) => {
        access::resolve(by, Resource::Centre(id), Action::ResetPassword).scope()?;
        self.load_centre(by, id).await?.owner_principal_id
      }
      PasswordTarget::Student(id) => {
        self.load_student(by, id, Action::ResetPassword).await?.principal_id
      }
    };
    self
      .store
      .set_password_hash(principal_id, password_hash)
      .await
      .map_err(lift)?;
    tracing::info!(%principal_id, by = %by.principal_id, "password reset");
    Ok(())
  }
}
