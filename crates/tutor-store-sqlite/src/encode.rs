//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings (microseconds, `Z`), calendar
//! dates are `YYYY-MM-DD`, UUIDs are hyphenated lowercase strings.
//! Timestamps and dates sort lexicographically in chronological order only
//! for four-digit years; the registry refuses anything outside years 1 to
//! 9999 before it reaches a store.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use tutor_core::{
  assessment::{Assessment, Question, QuestionKind, Section},
  attempt::{AnswerRecord, Attempt, AttemptStatus},
  centre::{Centre, Instructor},
  notification::{Notification, Recipient},
  ledger::LevelHistoryEntry,
  level::Level,
  principal::{Principal, Role},
  student::{Gender, Student, StudentStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_status(s: StudentStatus) -> &'static str {
  match s {
    StudentStatus::Pending => "pending",
    StudentStatus::Active => "active",
    StudentStatus::Inactive => "inactive",
  }
}

pub fn decode_status(s: &str) -> Result<StudentStatus> {
  match s {
    "pending" => Ok(StudentStatus::Pending),
    "active" => Ok(StudentStatus::Active),
    "inactive" => Ok(StudentStatus::Inactive),
    other => Err(Error::Decode(format!("unknown student status: {other:?}"))),
  }
}

pub fn encode_gender(g: Gender) -> &'static str {
  match g {
    Gender::Male => "male",
    Gender::Female => "female",
    Gender::Other => "other",
  }
}

pub fn decode_gender(s: &str) -> Result<Gender> {
  match s {
    "male" => Ok(Gender::Male),
    "female" => Ok(Gender::Female),
    "other" => Ok(Gender::Other),
    other => Err(Error::Decode(format!("unknown gender: {other:?}"))),
  }
}

pub fn encode_kind(k: QuestionKind) -> &'static str {
  match k {
    QuestionKind::Plus => "plus",
    QuestionKind::Multiply => "multiply",
    QuestionKind::Divide => "divide",
  }
}

pub fn decode_kind(s: &str) -> Result<QuestionKind> {
  match s {
    "plus" => Ok(QuestionKind::Plus),
    "multiply" => Ok(QuestionKind::Multiply),
    "divide" => Ok(QuestionKind::Divide),
    other => Err(Error::Decode(format!("unknown question kind: {other:?}"))),
  }
}

pub fn encode_attempt_status(s: AttemptStatus) -> &'static str {
  match s {
    AttemptStatus::Pending => "pending",
    AttemptStatus::InProgress => "in_progress",
    AttemptStatus::Completed => "completed",
    AttemptStatus::Interrupted => "interrupted",
  }
}

pub fn decode_attempt_status(s: &str) -> Result<AttemptStatus> {
  match s {
    "pending" => Ok(AttemptStatus::Pending),
    "in_progress" => Ok(AttemptStatus::InProgress),
    "completed" => Ok(AttemptStatus::Completed),
    "interrupted" => Ok(AttemptStatus::Interrupted),
    other => Err(Error::Decode(format!("unknown attempt status: {other:?}"))),
  }
}

/// Split a role into the `(role, centre_id, student_id)` column triple.
pub fn encode_role(role: Role) -> (&'static str, Option<String>, Option<String>) {
  match role {
    Role::Admin => ("admin", None, None),
    Role::Centre(id) => ("centre", Some(encode_uuid(id)), None),
    Role::Student(id) => ("student", None, Some(encode_uuid(id))),
  }
}

pub fn decode_role(
  role: &str,
  centre_id: Option<&str>,
  student_id: Option<&str>,
) -> Result<Role> {
  match (role, centre_id, student_id) {
    ("admin", None, None) => Ok(Role::Admin),
    ("centre", Some(c), None) => Ok(Role::Centre(decode_uuid(c)?)),
    ("student", None, Some(s)) => Ok(Role::Student(decode_uuid(s)?)),
    (other, ..) => Err(Error::Decode(format!(
      "inconsistent principal role {other:?}"
    ))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const STUDENT_COLUMNS: &str = "student_id, centre_id, principal_id, name, dob, \
  gender, status, current_level_id, instructor_id, level_start_date, \
  created_at, updated_at";

/// Raw strings read directly from a `students` row.
pub struct RawStudent {
  pub student_id:       String,
  pub centre_id:        String,
  pub principal_id:     String,
  pub name:             String,
  pub dob:              String,
  pub gender:           String,
  pub status:           String,
  pub current_level_id: String,
  pub instructor_id:    Option<String>,
  pub level_start_date: String,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawStudent {
  /// Map a row selected with [`STUDENT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:       row.get(0)?,
      centre_id:        row.get(1)?,
      principal_id:     row.get(2)?,
      name:             row.get(3)?,
      dob:              row.get(4)?,
      gender:           row.get(5)?,
      status:           row.get(6)?,
      current_level_id: row.get(7)?,
      instructor_id:    row.get(8)?,
      level_start_date: row.get(9)?,
      created_at:       row.get(10)?,
      updated_at:       row.get(11)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:       decode_uuid(&self.student_id)?,
      centre_id:        decode_uuid(&self.centre_id)?,
      principal_id:     decode_uuid(&self.principal_id)?,
      name:             self.name,
      dob:              decode_date(&self.dob)?,
      gender:           decode_gender(&self.gender)?,
      status:           decode_status(&self.status)?,
      current_level_id: decode_uuid(&self.current_level_id)?,
      instructor_id:    decode_opt_uuid(self.instructor_id.as_deref())?,
      level_start_date: decode_date(&self.level_start_date)?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

pub const CENTRE_COLUMNS: &str = "centre_id, name, franchisee_name, area, active, \
  owner_principal_id, created_at, updated_at";

/// Raw strings read directly from a `centres` row, plus its instructors.
pub struct RawCentre {
  pub centre_id:          String,
  pub name:               String,
  pub franchisee_name:    String,
  pub area:               String,
  pub active:             bool,
  pub owner_principal_id: String,
  pub created_at:         String,
  pub updated_at:         String,
  pub instructors:        Vec<RawInstructor>,
}

impl RawCentre {
  /// Map a row selected with [`CENTRE_COLUMNS`]; instructors are attached
  /// separately.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      centre_id:          row.get(0)?,
      name:               row.get(1)?,
      franchisee_name:    row.get(2)?,
      area:               row.get(3)?,
      active:             row.get(4)?,
      owner_principal_id: row.get(5)?,
      created_at:         row.get(6)?,
      updated_at:         row.get(7)?,
      instructors:        Vec::new(),
    })
  }

  pub fn into_centre(self) -> Result<Centre> {
    Ok(Centre {
      centre_id:          decode_uuid(&self.centre_id)?,
      name:               self.name,
      franchisee_name:    self.franchisee_name,
      area:               self.area,
      active:             self.active,
      owner_principal_id: decode_uuid(&self.owner_principal_id)?,
      instructors:        self
        .instructors
        .into_iter()
        .map(RawInstructor::into_instructor)
        .collect::<Result<_>>()?,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawInstructor {
  pub instructor_id: String,
  pub centre_id:     String,
  pub name:          String,
}

impl RawInstructor {
  pub fn into_instructor(self) -> Result<Instructor> {
    Ok(Instructor {
      instructor_id: decode_uuid(&self.instructor_id)?,
      centre_id:     decode_uuid(&self.centre_id)?,
      name:          self.name,
    })
  }
}

pub const LEVEL_COLUMNS: &str =
  "level_id, name, description, ordinal, published, created_at";

pub struct RawLevel {
  pub level_id:    String,
  pub name:        String,
  pub description: Option<String>,
  pub ordinal:     i64,
  pub published:   bool,
  pub created_at:  String,
}

impl RawLevel {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      level_id:    row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      ordinal:     row.get(3)?,
      published:   row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  pub fn into_level(self) -> Result<Level> {
    Ok(Level {
      level_id:    decode_uuid(&self.level_id)?,
      name:        self.name,
      description: self.description,
      ordinal:     self.ordinal,
      published:   self.published,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Ledger columns over `level_history h`. The previous level is derived
/// from the preceding row of the same student, so a query must select
/// whole students for it to be right.
pub const ENTRY_COLUMNS: &str = "h.entry_id, h.student_id, h.level_id, \
  h.start_date, h.completion_date, h.changed_by, h.recorded_at, \
  LAG(h.level_id) OVER (PARTITION BY h.student_id ORDER BY h.start_date, h.rowid)";

pub struct RawEntry {
  pub entry_id:          String,
  pub student_id:        String,
  pub level_id:          String,
  pub start_date:        String,
  pub completion_date:   Option<String>,
  pub changed_by:        String,
  pub recorded_at:       String,
  pub previous_level_id: Option<String>,
}

impl RawEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:          row.get(0)?,
      student_id:        row.get(1)?,
      level_id:          row.get(2)?,
      start_date:        row.get(3)?,
      completion_date:   row.get(4)?,
      changed_by:        row.get(5)?,
      recorded_at:       row.get(6)?,
      previous_level_id: row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<LevelHistoryEntry> {
    Ok(LevelHistoryEntry {
      entry_id:          decode_uuid(&self.entry_id)?,
      student_id:        decode_uuid(&self.student_id)?,
      level_id:          decode_uuid(&self.level_id)?,
      previous_level_id: decode_opt_uuid(self.previous_level_id.as_deref())?,
      start_date:        decode_date(&self.start_date)?,
      completion_date:   self.completion_date.as_deref().map(decode_date).transpose()?,
      changed_by:        decode_uuid(&self.changed_by)?,
      recorded_at:       decode_dt(&self.recorded_at)?,
    })
  }
}

pub const ASSESSMENT_COLUMNS: &str =
  "assessment_id, title, level_id, duration_minutes, due_at, active, created_at";

/// An `assessments` row with its sections attached.
pub struct RawAssessment {
  pub assessment_id:    String,
  pub title:            String,
  pub level_id:         String,
  pub duration_minutes: i64,
  pub due_at:           Option<String>,
  pub active:           bool,
  pub created_at:       String,
  pub sections:         Vec<RawSection>,
}

impl RawAssessment {
  /// Map a row selected with [`ASSESSMENT_COLUMNS`]; sections are attached
  /// separately.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      assessment_id:    row.get(0)?,
      title:            row.get(1)?,
      level_id:         row.get(2)?,
      duration_minutes: row.get(3)?,
      due_at:           row.get(4)?,
      active:           row.get(5)?,
      created_at:       row.get(6)?,
      sections:         Vec::new(),
    })
  }

  pub fn into_assessment(self) -> Result<Assessment> {
    Ok(Assessment {
      assessment_id:    decode_uuid(&self.assessment_id)?,
      title:            self.title,
      level_id:         decode_uuid(&self.level_id)?,
      duration_minutes: self.duration_minutes,
      due_at:           decode_opt_dt(self.due_at.as_deref())?,
      active:           self.active,
      created_at:       decode_dt(&self.created_at)?,
      sections:         self
        .sections
        .into_iter()
        .map(RawSection::into_section)
        .collect::<Result<_>>()?,
    })
  }
}

pub struct RawSection {
  pub section_id:   String,
  pub section_type: String,
  pub position:     i64,
  pub questions:    Vec<RawQuestion>,
}

impl RawSection {
  pub fn into_section(self) -> Result<Section> {
    Ok(Section {
      section_id:   decode_uuid(&self.section_id)?,
      section_type: self.section_type,
      position:     self.position,
      questions:    self
        .questions
        .into_iter()
        .map(RawQuestion::into_question)
        .collect::<Result<_>>()?,
    })
  }
}

pub struct RawQuestion {
  pub question_id: String,
  pub position:    i64,
  pub kind:        String,
  pub text:        String,
  pub marks:       i64,
}

impl RawQuestion {
  pub fn into_question(self) -> Result<Question> {
    Ok(Question {
      question_id: decode_uuid(&self.question_id)?,
      position:    self.position,
      kind:        decode_kind(&self.kind)?,
      text:        self.text,
      marks:       self.marks,
    })
  }
}

pub const ATTEMPT_COLUMNS: &str = "a.attempt_id, a.assessment_id, a.student_id, \
  a.centre_id, a.status, a.created_at, a.started_at, a.deadline, a.finished_at, a.score";

pub struct RawAttempt {
  pub attempt_id:    String,
  pub assessment_id: String,
  pub student_id:    String,
  pub centre_id:     String,
  pub status:        String,
  pub created_at:    String,
  pub started_at:    Option<String>,
  pub deadline:      Option<String>,
  pub finished_at:   Option<String>,
  pub score:         Option<i64>,
}

impl RawAttempt {
  /// Map a row selected with [`ATTEMPT_COLUMNS`] over `attempts a`.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      attempt_id:    row.get(0)?,
      assessment_id: row.get(1)?,
      student_id:    row.get(2)?,
      centre_id:     row.get(3)?,
      status:        row.get(4)?,
      created_at:    row.get(5)?,
      started_at:    row.get(6)?,
      deadline:      row.get(7)?,
      finished_at:   row.get(8)?,
      score:         row.get(9)?,
    })
  }

  pub fn into_attempt(self) -> Result<Attempt> {
    Ok(Attempt {
      attempt_id:    decode_uuid(&self.attempt_id)?,
      assessment_id: decode_uuid(&self.assessment_id)?,
      student_id:    decode_uuid(&self.student_id)?,
      centre_id:     decode_uuid(&self.centre_id)?,
      status:        decode_attempt_status(&self.status)?,
      created_at:    decode_dt(&self.created_at)?,
      started_at:    decode_opt_dt(self.started_at.as_deref())?,
      deadline:      decode_opt_dt(self.deadline.as_deref())?,
      finished_at:   decode_opt_dt(self.finished_at.as_deref())?,
      score:         self.score,
    })
  }
}

pub struct RawAnswer {
  pub question_id:    String,
  pub answer_text:    String,
  pub is_correct:     bool,
  pub marks_obtained: i64,
}

impl RawAnswer {
  pub fn into_answer(self) -> Result<AnswerRecord> {
    Ok(AnswerRecord {
      question_id:    decode_uuid(&self.question_id)?,
      answer_text:    self.answer_text,
      is_correct:     self.is_correct,
      marks_obtained: self.marks_obtained,
    })
  }
}

/// A `notifications` row with its recipients attached.
pub struct RawNotification {
  pub notification_id: String,
  pub title:           String,
  pub message:         String,
  pub created_by:      String,
  pub created_at:      String,
  pub recipients:      Vec<(String, Option<String>)>,
}

impl RawNotification {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id: row.get(0)?,
      title:           row.get(1)?,
      message:         row.get(2)?,
      created_by:      row.get(3)?,
      created_at:      row.get(4)?,
      recipients:      Vec::new(),
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id: decode_uuid(&self.notification_id)?,
      title:           self.title,
      message:         self.message,
      created_by:      decode_uuid(&self.created_by)?,
      created_at:      decode_dt(&self.created_at)?,
      recipients:      self
        .recipients
        .into_iter()
        .map(|(centre_id, read_at)| {
          Ok(Recipient {
            centre_id: decode_uuid(&centre_id)?,
            read_at:   decode_opt_dt(read_at.as_deref())?,
          })
        })
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw strings read from a `principals` row.
pub struct RawPrincipal {
  pub principal_id:  String,
  pub role:          String,
  pub centre_id:     Option<String>,
  pub student_id:    Option<String>,
  pub password_hash: String,
}

impl RawPrincipal {
  pub fn into_principal(self) -> Result<(Principal, String)> {
    let role = decode_role(
      &self.role,
      self.centre_id.as_deref(),
      self.student_id.as_deref(),
    )?;
    Ok((
      Principal::new(decode_uuid(&self.principal_id)?, role),
      self.password_hash,
    ))
  }
}
