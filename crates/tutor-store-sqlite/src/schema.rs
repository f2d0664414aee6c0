//! SQL schema for the tutor SQLite store.
//!
//! Executed once at connection startup; `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS principals (
    principal_id  TEXT PRIMARY KEY,
    login         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,           -- argon2 PHC string
    role          TEXT NOT NULL,           -- 'admin' | 'centre' | 'student'
    centre_id     TEXT,
    student_id    TEXT,
    created_at    TEXT NOT NULL,
    CHECK (
         (role = 'admin'   AND centre_id IS NULL     AND student_id IS NULL)
      OR (role = 'centre'  AND centre_id IS NOT NULL AND student_id IS NULL)
      OR (role = 'student' AND centre_id IS NULL     AND student_id IS NOT NULL)
    )
);

-- Bearer tokens, stored as SHA-256 digests of the secret.
CREATE TABLE IF NOT EXISTS tokens (
    token_digest TEXT PRIMARY KEY,
    principal_id TEXT NOT NULL REFERENCES principals(principal_id),
    created_at   TEXT NOT NULL,
    expires_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS centres (
    centre_id          TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    franchisee_name    TEXT NOT NULL,
    area               TEXT NOT NULL,
    active             INTEGER NOT NULL DEFAULT 1,
    owner_principal_id TEXT NOT NULL UNIQUE REFERENCES principals(principal_id),
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS instructors (
    instructor_id TEXT PRIMARY KEY,
    centre_id     TEXT NOT NULL REFERENCES centres(centre_id),
    name          TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS levels (
    level_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    ordinal     INTEGER NOT NULL UNIQUE,
    published   INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    student_id       TEXT PRIMARY KEY,
    centre_id        TEXT NOT NULL REFERENCES centres(centre_id),
    principal_id     TEXT NOT NULL UNIQUE REFERENCES principals(principal_id),
    name             TEXT NOT NULL,
    dob              TEXT NOT NULL,     -- YYYY-MM-DD
    gender           TEXT NOT NULL,     -- 'male' | 'female' | 'other'
    status           TEXT NOT NULL,     -- 'pending' | 'active' | 'inactive'
    current_level_id TEXT NOT NULL REFERENCES levels(level_id),
    instructor_id    TEXT REFERENCES instructors(instructor_id),
    level_start_date TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- The progression ledger. Rows are inserted open and closed exactly once;
-- they are never otherwise updated and never deleted.
CREATE TABLE IF NOT EXISTS level_history (
    entry_id        TEXT PRIMARY KEY,
    student_id      TEXT NOT NULL REFERENCES students(student_id),
    level_id        TEXT NOT NULL REFERENCES levels(level_id),
    start_date      TEXT NOT NULL,
    completion_date TEXT,
    changed_by      TEXT NOT NULL REFERENCES principals(principal_id),
    recorded_at     TEXT NOT NULL,
    CHECK (completion_date IS NULL OR completion_date >= start_date)
);

-- At most one open entry per student.
CREATE UNIQUE INDEX IF NOT EXISTS level_history_one_open
    ON level_history(student_id) WHERE completion_date IS NULL;

CREATE INDEX IF NOT EXISTS level_history_student_idx
    ON level_history(student_id, start_date);
CREATE INDEX IF NOT EXISTS students_centre_idx  ON students(centre_id, status);
CREATE INDEX IF NOT EXISTS instructors_centre_idx ON instructors(centre_id);
CREATE INDEX IF NOT EXISTS tokens_principal_idx ON tokens(principal_id);

CREATE TRIGGER IF NOT EXISTS level_history_no_delete
BEFORE DELETE ON level_history
BEGIN
    SELECT RAISE(ABORT, 'level history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS level_history_close_only
BEFORE UPDATE ON level_history
WHEN OLD.completion_date IS NOT NULL
  OR NEW.completion_date IS NULL
  OR NEW.entry_id    IS NOT OLD.entry_id
  OR NEW.student_id  IS NOT OLD.student_id
  OR NEW.level_id    IS NOT OLD.level_id
  OR NEW.start_date  IS NOT OLD.start_date
  OR NEW.changed_by  IS NOT OLD.changed_by
  OR NEW.recorded_at IS NOT OLD.recorded_at
BEGIN
    SELECT RAISE(ABORT, 'level history entries may only be closed, once');
END;

CREATE TRIGGER IF NOT EXISTS levels_frozen_once_referenced
BEFORE UPDATE ON levels
WHEN EXISTS (SELECT 1 FROM level_history WHERE level_id = OLD.level_id)
BEGIN
    SELECT RAISE(ABORT, 'level is referenced by level history');
END;

CREATE TRIGGER IF NOT EXISTS students_no_delete
BEFORE DELETE ON students
BEGIN
    SELECT RAISE(ABORT, 'students are deactivated, never deleted');
END;

CREATE TRIGGER IF NOT EXISTS centres_no_delete
BEFORE DELETE ON centres
BEGIN
    SELECT RAISE(ABORT, 'centres are deactivated, never deleted');
END;

-- Assessment catalog. Sections and questions are written once with their
-- assessment; only the active flag changes afterwards.
CREATE TABLE IF NOT EXISTS assessments (
    assessment_id    TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    level_id         TEXT NOT NULL REFERENCES levels(level_id),
    duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
    due_at           TEXT,
    active           INTEGER NOT NULL DEFAULT 1,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assessment_sections (
    section_id    TEXT PRIMARY KEY,
    assessment_id TEXT NOT NULL REFERENCES assessments(assessment_id),
    section_type  TEXT NOT NULL,
    position      INTEGER NOT NULL,
    UNIQUE (assessment_id, position)
);

CREATE TABLE IF NOT EXISTS questions (
    question_id TEXT PRIMARY KEY,
    section_id  TEXT NOT NULL REFERENCES assessment_sections(section_id),
    position    INTEGER NOT NULL,
    kind        TEXT NOT NULL,           -- 'plus' | 'multiply' | 'divide'
    text        TEXT NOT NULL,           -- JSON operand list
    marks       INTEGER NOT NULL CHECK (marks >= 0),
    UNIQUE (section_id, position)
);

CREATE TABLE IF NOT EXISTS attempts (
    attempt_id    TEXT PRIMARY KEY,
    assessment_id TEXT NOT NULL REFERENCES assessments(assessment_id),
    student_id    TEXT NOT NULL REFERENCES students(student_id),
    centre_id     TEXT NOT NULL REFERENCES centres(centre_id),
    status        TEXT NOT NULL,         -- 'pending' | 'in_progress' | 'completed' | 'interrupted'
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    deadline      TEXT,
    finished_at   TEXT,
    score         INTEGER,
    CHECK (score IS NULL OR status = 'completed')
);

-- At most one open attempt per student.
CREATE UNIQUE INDEX IF NOT EXISTS attempts_one_open
    ON attempts(student_id) WHERE status IN ('pending', 'in_progress');

CREATE INDEX IF NOT EXISTS attempts_assessment_idx ON attempts(assessment_id, status);
CREATE INDEX IF NOT EXISTS attempts_centre_idx     ON attempts(centre_id);

CREATE TABLE IF NOT EXISTS answers (
    attempt_id     TEXT NOT NULL REFERENCES attempts(attempt_id),
    question_id    TEXT NOT NULL REFERENCES questions(question_id),
    answer_text    TEXT NOT NULL,
    is_correct     INTEGER NOT NULL,
    marks_obtained INTEGER NOT NULL,
    PRIMARY KEY (attempt_id, question_id)
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    created_by      TEXT NOT NULL REFERENCES principals(principal_id),
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notification_recipients (
    notification_id TEXT NOT NULL REFERENCES notifications(notification_id),
    centre_id       TEXT NOT NULL REFERENCES centres(centre_id),
    read_at         TEXT,
    PRIMARY KEY (notification_id, centre_id)
);

CREATE INDEX IF NOT EXISTS notification_recipients_centre_idx
    ON notification_recipients(centre_id);

PRAGMA user_version = 2;
";
