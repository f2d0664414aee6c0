//! The SQLite implementation of [`RegistryStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use tutor_core::{
  access::Scope,
  assessment::{Assessment, NewAssessment, Question, Section},
  attempt::{AnswerRecord, Attempt, AttemptStatus, TopScore},
  centre::{Centre, CentreSummary, CentreUpdate, Instructor, NewCentre},
  error::EntityKind,
  ledger::{History, LevelHistoryEntry, Promotion},
  level::{Level, NewLevel},
  notification::{Notification, Recipient},
  principal::{NewCredentials, Role},
  store::{
    AssessmentFilter, AttemptInsert, AttemptOutcome, NotificationInsert, RegistryStore,
    StudentInsert,
  },
  student::{Student, StudentQuery, StudentStatus, StudentUpdate},
};

use crate::{
  encode::{
    ASSESSMENT_COLUMNS, ATTEMPT_COLUMNS, CENTRE_COLUMNS, ENTRY_COLUMNS, LEVEL_COLUMNS,
    RawAnswer, RawAssessment, RawAttempt, RawCentre, RawEntry, RawInstructor, RawLevel,
    RawNotification, RawQuestion, RawSection, RawStudent, STUDENT_COLUMNS, decode_dt,
    decode_uuid, encode_attempt_status, encode_date, encode_dt, encode_gender, encode_kind,
    encode_role, encode_status, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A registry store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All
/// statements run on the connection's dedicated thread, so every
/// transaction below is serialized against every other write.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// Result of a guarded write that may lose a race.
pub(crate) enum Guarded<T> {
  Applied(T),
  Missing,
  Conflict,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Blocking helpers (run inside `Connection::call`) ────────────────────────

pub(crate) fn login_taken(conn: &rusqlite::Connection, login: &str) -> rusqlite::Result<bool> {
  Ok(conn
    .query_row(
      "SELECT 1 FROM principals WHERE login = ?1",
      rusqlite::params![login],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false))
}

pub(crate) fn insert_principal(
  conn: &rusqlite::Connection,
  principal_id: &str,
  credentials: &NewCredentials,
  role: Role,
  created_at: &str,
) -> rusqlite::Result<()> {
  let (tag, centre_id, student_id) = encode_role(role);
  conn.execute(
    "INSERT INTO principals
       (principal_id, login, password_hash, role, centre_id, student_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      principal_id,
      credentials.login,
      credentials.password_hash,
      tag,
      centre_id,
      student_id,
      created_at,
    ],
  )?;
  Ok(())
}

fn read_centre(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawCentre>> {
  let raw = conn
    .query_row(
      &format!("SELECT {CENTRE_COLUMNS} FROM centres WHERE centre_id = ?1"),
      rusqlite::params![id],
      RawCentre::from_row,
    )
    .optional()?;
  let Some(mut raw) = raw else { return Ok(None) };

  let mut stmt = conn.prepare(
    "SELECT instructor_id, centre_id, name FROM instructors
     WHERE centre_id = ?1 ORDER BY name, instructor_id",
  )?;
  raw.instructors = stmt
    .query_map(rusqlite::params![id], |row| {
      Ok(RawInstructor {
        instructor_id: row.get(0)?,
        centre_id:     row.get(1)?,
        name:          row.get(2)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(Some(raw))
}

fn read_student(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawStudent>> {
  conn
    .query_row(
      &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ?1"),
      rusqlite::params![id],
      RawStudent::from_row,
    )
    .optional()
}

fn read_level(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawLevel>> {
  conn
    .query_row(
      &format!("SELECT {LEVEL_COLUMNS} FROM levels WHERE level_id = ?1"),
      rusqlite::params![id],
      RawLevel::from_row,
    )
    .optional()
}

/// Sections of one assessment with their questions, in position order.
fn read_sections(
  conn: &rusqlite::Connection,
  assessment_id: &str,
) -> rusqlite::Result<Vec<RawSection>> {
  let mut stmt = conn.prepare(
    "SELECT s.section_id, s.section_type, s.position,
            q.question_id, q.position, q.kind, q.text, q.marks
     FROM assessment_sections s
     JOIN questions q ON q.section_id = s.section_id
     WHERE s.assessment_id = ?1
     ORDER BY s.position, q.position",
  )?;
  let mut rows = stmt.query(rusqlite::params![assessment_id])?;
  let mut sections: Vec<RawSection> = Vec::new();
  while let Some(row) = rows.next()? {
    let section_id: String = row.get(0)?;
    if sections.last().is_none_or(|s| s.section_id != section_id) {
      sections.push(RawSection {
        section_id,
        section_type: row.get(1)?,
        position: row.get(2)?,
        questions: Vec::new(),
      });
    }
    let question = RawQuestion {
      question_id: row.get(3)?,
      position:    row.get(4)?,
      kind:        row.get(5)?,
      text:        row.get(6)?,
      marks:       row.get(7)?,
    };
    if let Some(section) = sections.last_mut() {
      section.questions.push(question);
    }
  }
  Ok(sections)
}

fn read_assessment(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawAssessment>> {
  let raw = conn
    .query_row(
      &format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE assessment_id = ?1"),
      rusqlite::params![id],
      RawAssessment::from_row,
    )
    .optional()?;
  let Some(mut raw) = raw else { return Ok(None) };
  raw.sections = read_sections(conn, id)?;
  Ok(Some(raw))
}

fn read_attempt(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawAttempt>> {
  conn
    .query_row(
      &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts a WHERE a.attempt_id = ?1"),
      rusqlite::params![id],
      RawAttempt::from_row,
    )
    .optional()
}

/// A notification with its recipients, narrowed to `centre_id` when given.
fn read_notification(
  conn: &rusqlite::Connection,
  id: &str,
  centre_id: Option<&str>,
) -> rusqlite::Result<Option<RawNotification>> {
  let raw = conn
    .query_row(
      "SELECT notification_id, title, message, created_by, created_at
       FROM notifications WHERE notification_id = ?1",
      rusqlite::params![id],
      RawNotification::from_row,
    )
    .optional()?;
  let Some(mut raw) = raw else { return Ok(None) };

  let mut stmt = conn.prepare(
    "SELECT centre_id, read_at FROM notification_recipients
     WHERE notification_id = ?1 AND (?2 IS NULL OR centre_id = ?2)
     ORDER BY rowid",
  )?;
  raw.recipients = stmt
    .query_map(rusqlite::params![id, centre_id], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<_>>()?;
  Ok(Some(raw))
}

/// `(scope centre, scope student)` bind parameters for scoped list queries.
fn scope_params(scope: Scope) -> (Option<String>, Option<String>) {
  match scope {
    Scope::All => (None, None),
    Scope::Centre(id) => (Some(encode_uuid(id)), None),
    Scope::Student(id) => (None, Some(encode_uuid(id))),
  }
}

fn guarded<T>(outcome: Guarded<T>, kind: EntityKind, id: Uuid) -> Result<T> {
  match outcome {
    Guarded::Applied(v) => Ok(v),
    Guarded::Missing => Err(tutor_core::Error::NotFound(kind, id).into()),
    Guarded::Conflict => Err(tutor_core::Error::ConcurrentModification(id).into()),
  }
}

// ─── RegistryStore impl ──────────────────────────────────────────────────────

impl RegistryStore for SqliteStore {
  type Error = Error;

  // ── Centres ───────────────────────────────────────────────────────────────

  async fn insert_centre(&self, input: NewCentre) -> Result<Centre> {
    let now = Utc::now();
    let centre = Centre {
      centre_id:          Uuid::new_v4(),
      name:               input.name,
      franchisee_name:    input.franchisee_name,
      area:               input.area,
      active:             true,
      owner_principal_id: Uuid::new_v4(),
      instructors:        Vec::new(),
      created_at:         now,
      updated_at:         now,
    };
    let instructors: Vec<Instructor> = input
      .instructor_names
      .into_iter()
      .map(|name| Instructor {
        instructor_id: Uuid::new_v4(),
        centre_id: centre.centre_id,
        name,
      })
      .collect();

    let row = centre.clone();
    let rows = instructors.clone();
    let credentials = input.credentials;
    let login = credentials.login.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if login_taken(&tx, &credentials.login)? {
          return Ok(false);
        }
        let centre_id = encode_uuid(row.centre_id);
        let at = encode_dt(row.created_at);
        insert_principal(
          &tx,
          &encode_uuid(row.owner_principal_id),
          &credentials,
          Role::Centre(row.centre_id),
          &at,
        )?;
        tx.execute(
          "INSERT INTO centres (
             centre_id, name, franchisee_name, area, active,
             owner_principal_id, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)",
          rusqlite::params![
            centre_id,
            row.name,
            row.franchisee_name,
            row.area,
            encode_uuid(row.owner_principal_id),
            at,
          ],
        )?;
        for ci in &rows {
          tx.execute(
            "INSERT INTO instructors (instructor_id, centre_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![encode_uuid(ci.instructor_id), centre_id, ci.name, at],
          )?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(tutor_core::Error::LoginTaken(login).into());
    }
    let mut centre = centre;
    centre.instructors = instructors;
    centre.instructors.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(centre)
  }

  async fn get_centre(&self, id: Uuid) -> Result<Option<Centre>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(read_centre(conn, &id_str)?))
      .await?;
    raw.map(RawCentre::into_centre).transpose()
  }

  async fn list_centres(&self, search: Option<String>) -> Result<Vec<CentreSummary>> {
    let pattern = search.map(|s| format!("%{}%", s.to_lowercase()));

    let rows: Vec<(RawCentre, u64, u64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CENTRE_COLUMNS},
             (SELECT COUNT(*) FROM students s WHERE s.centre_id = c.centre_id),
             (SELECT COUNT(*) FROM students s
               WHERE s.centre_id = c.centre_id AND s.status = 'active')
           FROM centres c
           WHERE ?1 IS NULL
              OR lower(c.name) LIKE ?1
              OR lower(c.franchisee_name) LIKE ?1
              OR lower(c.area) LIKE ?1
           ORDER BY c.name, c.centre_id"
        ))?;
        let mut centres = stmt
          .query_map(rusqlite::params![pattern], |row| {
            let total: i64 = row.get(8)?;
            let active: i64 = row.get(9)?;
            Ok((RawCentre::from_row(row)?, total as u64, active as u64))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut by_centre: HashMap<String, Vec<RawInstructor>> = HashMap::new();
        let mut stmt = conn.prepare(
          "SELECT instructor_id, centre_id, name FROM instructors
           ORDER BY name, instructor_id",
        )?;
        let instructors = stmt.query_map([], |row| {
          Ok(RawInstructor {
            instructor_id: row.get(0)?,
            centre_id:     row.get(1)?,
            name:          row.get(2)?,
          })
        })?;
        for ci in instructors {
          let ci = ci?;
          by_centre.entry(ci.centre_id.clone()).or_default().push(ci);
        }
        for (centre, _, _) in &mut centres {
          centre.instructors = by_centre.remove(&centre.centre_id).unwrap_or_default();
        }
        Ok(centres)
      })
      .await?;

    rows
      .into_iter()
      .map(|(raw, student_count, active_student_count)| {
        Ok(CentreSummary {
          centre: raw.into_centre()?,
          student_count,
          active_student_count,
        })
      })
      .collect()
  }

  async fn update_centre(&self, id: Uuid, update: CentreUpdate) -> Result<Centre> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE centres SET
             name            = COALESCE(?1, name),
             franchisee_name = COALESCE(?2, franchisee_name),
             area            = COALESCE(?3, area),
             updated_at      = ?4
           WHERE centre_id = ?5",
          rusqlite::params![update.name, update.franchisee_name, update.area, now, id_str],
        )?;
        if changed == 0 {
          return Ok(Guarded::Missing);
        }

        if let Some(names) = update.instructor_names {
          let existing: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
              "SELECT instructor_id, name FROM instructors WHERE centre_id = ?1",
            )?;
            let rows = stmt
              .query_map(rusqlite::params![id_str], |r| Ok((r.get(0)?, r.get(1)?)))?
              .collect::<rusqlite::Result<_>>()?;
            rows
          };
          // Drop instructors no longer listed, unless a student still
          // references them.
          for (ci_id, name) in &existing {
            if names.contains(name) {
              continue;
            }
            tx.execute(
              "DELETE FROM instructors WHERE instructor_id = ?1
                 AND NOT EXISTS (SELECT 1 FROM students WHERE instructor_id = ?1)",
              rusqlite::params![ci_id],
            )?;
          }
          for name in &names {
            if existing.iter().any(|(_, n)| n == name) {
              continue;
            }
            tx.execute(
              "INSERT INTO instructors (instructor_id, centre_id, name, created_at)
               VALUES (?1, ?2, ?3, ?4)",
              rusqlite::params![encode_uuid(Uuid::new_v4()), id_str, name, now],
            )?;
          }
        }

        let raw = read_centre(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(Guarded::Missing, Guarded::Applied))
      })
      .await?;

    guarded(outcome, EntityKind::Centre, id)?.into_centre()
  }

  async fn set_centre_active(&self, id: Uuid, expected: bool, active: bool) -> Result<Centre> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE centres SET active = ?1, updated_at = ?2
           WHERE centre_id = ?3 AND active = ?4",
          rusqlite::params![active, now, id_str, expected],
        )?;
        let raw = read_centre(&tx, &id_str)?;
        tx.commit()?;
        Ok(match (changed, raw) {
          (_, None) => Guarded::Missing,
          (0, Some(_)) => Guarded::Conflict,
          (_, Some(raw)) => Guarded::Applied(raw),
        })
      })
      .await?;

    guarded(outcome, EntityKind::Centre, id)?.into_centre()
  }

  // ── Students ──────────────────────────────────────────────────────────────

  async fn insert_student(&self, input: StudentInsert) -> Result<(Student, LevelHistoryEntry)> {
    let now = Utc::now();
    let student = Student {
      student_id:       Uuid::new_v4(),
      centre_id:        input.centre_id,
      principal_id:     Uuid::new_v4(),
      name:             input.name,
      dob:              input.dob,
      gender:           input.gender,
      status:           tutor_core::lifecycle::INITIAL_STATUS,
      current_level_id: input.level_id,
      instructor_id:    input.instructor_id,
      level_start_date: input.level_start_date,
      created_at:       now,
      updated_at:       now,
    };
    let entry = LevelHistoryEntry {
      entry_id:          Uuid::new_v4(),
      student_id:        student.student_id,
      level_id:          input.level_id,
      previous_level_id: None,
      start_date:        input.level_start_date,
      completion_date:   None,
      changed_by:        input.created_by,
      recorded_at:       now,
    };

    let s = student.clone();
    let e = entry.clone();
    let credentials = input.credentials;
    let login = credentials.login.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if login_taken(&tx, &credentials.login)? {
          return Ok(false);
        }
        let at = encode_dt(s.created_at);
        let student_id = encode_uuid(s.student_id);
        insert_principal(
          &tx,
          &encode_uuid(s.principal_id),
          &credentials,
          Role::Student(s.student_id),
          &at,
        )?;
        tx.execute(
          "INSERT INTO students (
             student_id, centre_id, principal_id, name, dob, gender, status,
             current_level_id, instructor_id, level_start_date, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
          rusqlite::params![
            student_id,
            encode_uuid(s.centre_id),
            encode_uuid(s.principal_id),
            s.name,
            encode_date(s.dob),
            encode_gender(s.gender),
            encode_status(s.status),
            encode_uuid(s.current_level_id),
            s.instructor_id.map(encode_uuid),
            encode_date(s.level_start_date),
            at,
          ],
        )?;
        tx.execute(
          "INSERT INTO level_history (
             entry_id, student_id, level_id, start_date, completion_date,
             changed_by, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
          rusqlite::params![
            encode_uuid(e.entry_id),
            student_id,
            encode_uuid(e.level_id),
            encode_date(e.start_date),
            encode_uuid(e.changed_by),
            encode_dt(e.recorded_at),
          ],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(tutor_core::Error::LoginTaken(login).into());
    }
    Ok((student, entry))
  }

  async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(read_student(conn, &id_str)?))
      .await?;
    raw.map(RawStudent::into_student).transpose()
  }

  async fn list_students(&self, scope: Scope, query: &StudentQuery) -> Result<Vec<Student>> {
    let (centre_id, student_id) = scope_params(scope);
    let pattern = query.search.as_deref().map(|s| format!("%{}%", s.to_lowercase()));
    let status = query.status.map(encode_status);

    let raws: Vec<RawStudent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {STUDENT_COLUMNS} FROM students
           WHERE (?1 IS NULL OR centre_id = ?1)
             AND (?2 IS NULL OR student_id = ?2)
             AND (?3 IS NULL OR lower(name) LIKE ?3)
             AND (?4 IS NULL OR status = ?4)
           ORDER BY name, student_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![centre_id, student_id, pattern, status],
            RawStudent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn update_student(&self, id: Uuid, update: StudentUpdate) -> Result<Student> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());
    let set_instructor = update.instructor_id.is_some();
    let instructor = update.instructor_id.flatten().map(encode_uuid);
    let dob = update.dob.map(encode_date);
    let gender = update.gender.map(encode_gender);
    let name = update.name;

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "UPDATE students SET
             name          = COALESCE(?1, name),
             dob           = COALESCE(?2, dob),
             gender        = COALESCE(?3, gender),
             instructor_id = CASE WHEN ?4 THEN ?5 ELSE instructor_id END,
             updated_at    = ?6
           WHERE student_id = ?7",
          rusqlite::params![name, dob, gender, set_instructor, instructor, now, id_str],
        )?;
        let raw = read_student(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw
      .ok_or(tutor_core::Error::NotFound(EntityKind::Student, id))?
      .into_student()
  }

  async fn set_student_status(
    &self,
    id: Uuid,
    expected: StudentStatus,
    status: StudentStatus,
  ) -> Result<Student> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE students SET status = ?1, updated_at = ?2
           WHERE student_id = ?3 AND status = ?4",
          rusqlite::params![encode_status(status), now, id_str, encode_status(expected)],
        )?;
        let raw = read_student(&tx, &id_str)?;
        tx.commit()?;
        Ok(match (changed, raw) {
          (_, None) => Guarded::Missing,
          (0, Some(_)) => Guarded::Conflict,
          (_, Some(raw)) => Guarded::Applied(raw),
        })
      })
      .await?;

    guarded(outcome, EntityKind::Student, id)?.into_student()
  }

  // ── Levels ────────────────────────────────────────────────────────────────

  async fn insert_level(&self, input: NewLevel) -> Result<Level> {
    let level = Level {
      level_id:    Uuid::new_v4(),
      name:        input.name,
      description: input.description,
      ordinal:     input.ordinal,
      published:   false,
      created_at:  Utc::now(),
    };
    let row = level.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM levels WHERE ordinal = ?1",
            rusqlite::params![row.ordinal],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO levels (level_id, name, description, ordinal, published, created_at)
           VALUES (?1, ?2, ?3, ?4, 0, ?5)",
          rusqlite::params![
            encode_uuid(row.level_id),
            row.name,
            row.description,
            row.ordinal,
            encode_dt(row.created_at),
          ],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(
        tutor_core::Error::Invalid(format!("level ordinal {} is already taken", level.ordinal))
          .into(),
      );
    }
    Ok(level)
  }

  async fn get_level(&self, id: Uuid) -> Result<Option<Level>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(read_level(conn, &id_str)?))
      .await?;
    raw.map(RawLevel::into_level).transpose()
  }

  async fn list_levels(&self, include_unpublished: bool) -> Result<Vec<Level>> {
    let raws: Vec<RawLevel> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LEVEL_COLUMNS} FROM levels
           WHERE ?1 OR published = 1
           ORDER BY ordinal"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![include_unpublished], RawLevel::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLevel::into_level).collect()
  }

  async fn publish_level(&self, id: Uuid) -> Result<Level> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE levels SET published = 1 WHERE level_id = ?1 AND published = 0",
          rusqlite::params![id_str],
        )?;
        Ok(read_level(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(tutor_core::Error::NotFound(EntityKind::Level, id))?
      .into_level()
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn history_for(&self, student_id: Uuid) -> Result<History> {
    let id_str = encode_uuid(student_id);
    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTRY_COLUMNS} FROM level_history h
           WHERE h.student_id = ?1
           ORDER BY h.start_date, h.rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let entries = raws
      .into_iter()
      .map(RawEntry::into_entry)
      .collect::<Result<Vec<_>>>()?;
    Ok(History::new(entries))
  }

  async fn list_history(&self, scope: Scope) -> Result<Vec<LevelHistoryEntry>> {
    let (centre_id, student_id) = scope_params(scope);
    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTRY_COLUMNS} FROM level_history h
           JOIN students s ON s.student_id = h.student_id
           WHERE (?1 IS NULL OR s.centre_id = ?1)
             AND (?2 IS NULL OR h.student_id = ?2)
           ORDER BY h.student_id, h.start_date, h.rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![centre_id, student_id], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn record_promotion(&self, promotion: Promotion) -> Result<LevelHistoryEntry> {
    let entry = LevelHistoryEntry {
      entry_id:          Uuid::new_v4(),
      student_id:        promotion.student_id,
      level_id:          promotion.new_level_id,
      previous_level_id: Some(promotion.expected_level_id),
      start_date:        promotion.start_date,
      completion_date:   None,
      changed_by:        promotion.changed_by,
      recorded_at:       Utc::now(),
    };
    let e = entry.clone();

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let student_id = encode_uuid(promotion.student_id);
        let start = encode_date(promotion.start_date);

        // Compare-and-swap on the open entry: only the caller that saw it
        // open may close it.
        let closed = tx.execute(
          "UPDATE level_history SET completion_date = ?1
           WHERE entry_id = ?2 AND student_id = ?3 AND completion_date IS NULL",
          rusqlite::params![start, encode_uuid(promotion.expected_open_entry), student_id],
        )?;
        if closed != 1 {
          return Ok(false);
        }

        tx.execute(
          "INSERT INTO level_history (
             entry_id, student_id, level_id, start_date, completion_date,
             changed_by, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
          rusqlite::params![
            encode_uuid(e.entry_id),
            student_id,
            encode_uuid(e.level_id),
            start,
            encode_uuid(e.changed_by),
            encode_dt(e.recorded_at),
          ],
        )?;

        let moved = tx.execute(
          "UPDATE students SET current_level_id = ?1, level_start_date = ?2, updated_at = ?3
           WHERE student_id = ?4 AND current_level_id = ?5",
          rusqlite::params![
            encode_uuid(e.level_id),
            start,
            encode_dt(e.recorded_at),
            student_id,
            encode_uuid(promotion.expected_level_id),
          ],
        )?;
        if moved != 1 {
          // Dropping the transaction rolls back the close and the insert.
          return Ok(false);
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !applied {
      return Err(tutor_core::Error::ConcurrentModification(entry.student_id).into());
    }
    Ok(entry)
  }

  // ── Assessments ───────────────────────────────────────────────────────────

  async fn insert_assessment(&self, input: NewAssessment) -> Result<Assessment> {
    let assessment = Assessment {
      assessment_id:    Uuid::new_v4(),
      title:            input.title,
      level_id:         input.level_id,
      duration_minutes: input.duration_minutes,
      due_at:           input.due_at,
      active:           true,
      created_at:       Utc::now(),
      sections:         input
        .sections
        .into_iter()
        .zip(1..)
        .map(|(section, position)| Section {
          section_id: Uuid::new_v4(),
          section_type: section.section_type,
          position,
          questions: section
            .questions
            .into_iter()
            .zip(1..)
            .map(|(q, position)| Question {
              question_id: Uuid::new_v4(),
              position,
              kind: q.kind,
              text: q.text,
              marks: q.marks,
            })
            .collect(),
        })
        .collect(),
    };
    let row = assessment.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let assessment_id = encode_uuid(row.assessment_id);
        tx.execute(
          "INSERT INTO assessments (
             assessment_id, title, level_id, duration_minutes, due_at, active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
          rusqlite::params![
            assessment_id,
            row.title,
            encode_uuid(row.level_id),
            row.duration_minutes,
            row.due_at.map(encode_dt),
            encode_dt(row.created_at),
          ],
        )?;
        for section in &row.sections {
          let section_id = encode_uuid(section.section_id);
          tx.execute(
            "INSERT INTO assessment_sections (section_id, assessment_id, section_type, position)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![section_id, assessment_id, section.section_type, section.position],
          )?;
          for q in &section.questions {
            tx.execute(
              "INSERT INTO questions (question_id, section_id, position, kind, text, marks)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
              rusqlite::params![
                encode_uuid(q.question_id),
                section_id,
                q.position,
                encode_kind(q.kind),
                q.text,
                q.marks,
              ],
            )?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(assessment)
  }

  async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(read_assessment(conn, &id_str)?))
      .await?;
    raw.map(RawAssessment::into_assessment).transpose()
  }

  async fn list_assessments(&self, filter: AssessmentFilter) -> Result<Vec<Assessment>> {
    let level_id = filter.level_id.map(encode_uuid);
    let raws: Vec<RawAssessment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ASSESSMENT_COLUMNS} FROM assessments
           WHERE (?1 IS NULL OR level_id = ?1)
             AND (?2 OR active = 1)
           ORDER BY created_at, assessment_id"
        ))?;
        let mut rows = stmt
          .query_map(
            rusqlite::params![level_id, filter.include_inactive],
            RawAssessment::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for raw in &mut rows {
          raw.sections = read_sections(conn, &raw.assessment_id)?;
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAssessment::into_assessment).collect()
  }

  async fn set_assessment_active(&self, id: Uuid, active: bool) -> Result<Assessment> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE assessments SET active = ?1 WHERE assessment_id = ?2",
          rusqlite::params![active, id_str],
        )?;
        Ok(read_assessment(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(tutor_core::Error::NotFound(EntityKind::Assessment, id))?
      .into_assessment()
  }

  // ── Attempts ──────────────────────────────────────────────────────────────

  async fn insert_attempt(&self, input: AttemptInsert) -> Result<Attempt> {
    let attempt = Attempt {
      attempt_id:    Uuid::new_v4(),
      assessment_id: input.assessment_id,
      student_id:    input.student_id,
      centre_id:     input.centre_id,
      status:        AttemptStatus::Pending,
      created_at:    Utc::now(),
      started_at:    None,
      deadline:      None,
      finished_at:   None,
      score:         None,
    };
    let row = attempt.clone();

    let blocking: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let student_id = encode_uuid(row.student_id);
        let open = tx
          .query_row(
            "SELECT attempt_id FROM attempts
             WHERE student_id = ?1 AND status IN ('pending', 'in_progress')",
            rusqlite::params![student_id],
            |r| r.get(0),
          )
          .optional()?;
        if open.is_some() {
          return Ok(open);
        }
        tx.execute(
          "INSERT INTO attempts (attempt_id, assessment_id, student_id, centre_id, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            encode_uuid(row.attempt_id),
            encode_uuid(row.assessment_id),
            student_id,
            encode_uuid(row.centre_id),
            encode_attempt_status(row.status),
            encode_dt(row.created_at),
          ],
        )?;
        tx.commit()?;
        Ok(None)
      })
      .await?;

    if let Some(open) = blocking {
      return Err(tutor_core::Error::AttemptOpen(decode_uuid(&open)?).into());
    }
    Ok(attempt)
  }

  async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(read_attempt(conn, &id_str)?))
      .await?;
    raw.map(RawAttempt::into_attempt).transpose()
  }

  async fn open_attempt(&self, student_id: Uuid) -> Result<Option<Attempt>> {
    let id_str = encode_uuid(student_id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ATTEMPT_COLUMNS} FROM attempts a
                 WHERE a.student_id = ?1 AND a.status IN ('pending', 'in_progress')"
              ),
              rusqlite::params![id_str],
              RawAttempt::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAttempt::into_attempt).transpose()
  }

  async fn list_attempts(&self, scope: Scope) -> Result<Vec<Attempt>> {
    let (centre_id, student_id) = scope_params(scope);
    let raws: Vec<RawAttempt> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ATTEMPT_COLUMNS} FROM attempts a
           WHERE (?1 IS NULL OR a.centre_id = ?1)
             AND (?2 IS NULL OR a.student_id = ?2)
           ORDER BY a.created_at DESC, a.attempt_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![centre_id, student_id], RawAttempt::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttempt::into_attempt).collect()
  }

  async fn start_attempt(
    &self,
    id: Uuid,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
  ) -> Result<Attempt> {
    let id_str = encode_uuid(id);
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE attempts SET status = 'in_progress', started_at = ?1, deadline = ?2
           WHERE attempt_id = ?3 AND status = 'pending'",
          rusqlite::params![encode_dt(started_at), encode_dt(deadline), id_str],
        )?;
        let raw = read_attempt(&tx, &id_str)?;
        tx.commit()?;
        Ok(match (changed, raw) {
          (_, None) => Guarded::Missing,
          (0, Some(_)) => Guarded::Conflict,
          (_, Some(raw)) => Guarded::Applied(raw),
        })
      })
      .await?;

    guarded(outcome, EntityKind::Attempt, id)?.into_attempt()
  }

  async fn finish_attempt(&self, outcome: AttemptOutcome) -> Result<Attempt> {
    let id = outcome.attempt_id;
    let id_str = encode_uuid(id);
    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE attempts SET status = ?1, finished_at = ?2, score = ?3
           WHERE attempt_id = ?4 AND status = 'in_progress'",
          rusqlite::params![
            encode_attempt_status(outcome.status),
            encode_dt(outcome.finished_at),
            outcome.score,
            id_str,
          ],
        )?;
        if changed == 1 {
          for answer in &outcome.answers {
            tx.execute(
              "INSERT INTO answers (attempt_id, question_id, answer_text, is_correct, marks_obtained)
               VALUES (?1, ?2, ?3, ?4, ?5)",
              rusqlite::params![
                id_str,
                encode_uuid(answer.question_id),
                answer.answer_text,
                answer.is_correct,
                answer.marks_obtained,
              ],
            )?;
          }
        }
        let raw = read_attempt(&tx, &id_str)?;
        tx.commit()?;
        Ok(match (changed, raw) {
          (_, None) => Guarded::Missing,
          (0, Some(_)) => Guarded::Conflict,
          (_, Some(raw)) => Guarded::Applied(raw),
        })
      })
      .await?;

    guarded(result, EntityKind::Attempt, id)?.into_attempt()
  }

  async fn answers_for(&self, attempt_id: Uuid) -> Result<Vec<AnswerRecord>> {
    let id_str = encode_uuid(attempt_id);
    let raws: Vec<RawAnswer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT a.question_id, a.answer_text, a.is_correct, a.marks_obtained
           FROM answers a
           JOIN questions q ON q.question_id = a.question_id
           JOIN assessment_sections s ON s.section_id = q.section_id
           WHERE a.attempt_id = ?1
           ORDER BY s.position, q.position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |r| {
            Ok(RawAnswer {
              question_id:    r.get(0)?,
              answer_text:    r.get(1)?,
              is_correct:     r.get(2)?,
              marks_obtained: r.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnswer::into_answer).collect()
  }

  async fn top_scores(
    &self,
    assessment_id: Uuid,
    scope: Scope,
    limit: usize,
  ) -> Result<Vec<TopScore>> {
    let (centre_id, student_id) = scope_params(scope);
    let id_str = encode_uuid(assessment_id);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let rows: Vec<(String, String, i64, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT student_id, name, score, finished_at FROM (
             SELECT a.student_id, st.name, a.score, a.finished_at,
                    ROW_NUMBER() OVER (
                      PARTITION BY a.student_id ORDER BY a.score DESC, a.finished_at
                    ) AS nth
             FROM attempts a
             JOIN students st ON st.student_id = a.student_id
             WHERE a.assessment_id = ?1
               AND a.status = 'completed'
               AND (?2 IS NULL OR a.centre_id = ?2)
               AND (?3 IS NULL OR a.student_id = ?3)
           )
           WHERE nth = 1
           ORDER BY score DESC, finished_at, student_id
           LIMIT ?4",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, centre_id, student_id, limit], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(student_id, student_name, score, finished_at)| {
        Ok(TopScore {
          student_id: decode_uuid(&student_id)?,
          student_name,
          score,
          finished_at: decode_dt(&finished_at)?,
        })
      })
      .collect()
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn insert_notification(&self, input: NotificationInsert) -> Result<Notification> {
    let notification = Notification {
      notification_id: Uuid::new_v4(),
      title:           input.title,
      message:         input.message,
      created_by:      input.created_by,
      created_at:      Utc::now(),
      recipients:      input
        .centre_ids
        .into_iter()
        .map(|centre_id| Recipient { centre_id, read_at: None })
        .collect(),
    };
    let row = notification.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let notification_id = encode_uuid(row.notification_id);
        tx.execute(
          "INSERT INTO notifications (notification_id, title, message, created_by, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            notification_id,
            row.title,
            row.message,
            encode_uuid(row.created_by),
            encode_dt(row.created_at),
          ],
        )?;
        for recipient in &row.recipients {
          tx.execute(
            "INSERT INTO notification_recipients (notification_id, centre_id, read_at)
             VALUES (?1, ?2, NULL)",
            rusqlite::params![notification_id, encode_uuid(recipient.centre_id)],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(notification)
  }

  async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(read_notification(conn, &id_str, None)?))
      .await?;
    raw.map(RawNotification::into_notification).transpose()
  }

  async fn list_notifications(&self, scope: Scope) -> Result<Vec<Notification>> {
    let centre_id = match scope {
      Scope::All => None,
      Scope::Centre(id) => Some(encode_uuid(id)),
      Scope::Student(_) => return Ok(Vec::new()),
    };
    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let ids: Vec<String> = {
          let mut stmt = conn.prepare(
            "SELECT n.notification_id FROM notifications n
             WHERE ?1 IS NULL OR EXISTS (
               SELECT 1 FROM notification_recipients r
               WHERE r.notification_id = n.notification_id AND r.centre_id = ?1
             )
             ORDER BY n.created_at DESC, n.notification_id",
          )?;
          let ids = stmt
            .query_map(rusqlite::params![centre_id], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
          ids
        };
        let mut rows = Vec::with_capacity(ids.len());
        for id in &ids {
          if let Some(raw) = read_notification(conn, id, centre_id.as_deref())? {
            rows.push(raw);
          }
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  async fn mark_notification_read(
    &self,
    id: Uuid,
    centre_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str = encode_uuid(id);
    let centre_str = encode_uuid(centre_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE notification_recipients SET read_at = COALESCE(read_at, ?1)
           WHERE notification_id = ?2 AND centre_id = ?3",
          rusqlite::params![encode_dt(at), id_str, centre_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(tutor_core::Error::NotFound(EntityKind::Notification, id).into());
    }
    Ok(())
  }

  // ── Credentials ───────────────────────────────────────────────────────────

  async fn set_password_hash(&self, principal_id: Uuid, password_hash: String) -> Result<()> {
    let id_str = encode_uuid(principal_id);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "UPDATE principals SET password_hash = ?1 WHERE principal_id = ?2",
          rusqlite::params![password_hash, id_str],
        )?;
        tx.execute(
          "DELETE FROM tokens WHERE principal_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
