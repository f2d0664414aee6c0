//! Assessment catalog: level-bound tests made of ordered sections of
//! arithmetic questions, and the scoring of a single answer.
//!
//! A question's text is its operand list, e.g. `[12, 7, 30]`. The expected
//! answer is derived from the operands and the question kind, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, ledger};

/// Time limit used when a new assessment does not name one.
pub const DEFAULT_DURATION_MINUTES: i64 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
  /// Sum of all operands.
  #[default]
  Plus,
  /// Product of all operands.
  Multiply,
  /// First operand divided by the second, to two decimal places.
  Divide,
}

impl std::fmt::Display for QuestionKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Plus => "plus",
      Self::Multiply => "multiply",
      Self::Divide => "divide",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub question_id: Uuid,
  /// 1-based position within its section.
  pub position:    i64,
  pub kind:        QuestionKind,
  pub text:        String,
  pub marks:       i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
  pub section_id:   Uuid,
  pub section_type: String,
  /// 1-based position within its assessment.
  pub position:     i64,
  pub questions:    Vec<Question>,
}

/// A test designed for one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
  pub assessment_id:    Uuid,
  pub title:            String,
  pub level_id:         Uuid,
  pub duration_minutes: i64,
  pub due_at:           Option<DateTime<Utc>>,
  /// Inactive assessments are hidden from centres and students and cannot
  /// be attempted.
  pub active:           bool,
  pub created_at:       DateTime<Utc>,
  pub sections:         Vec<Section>,
}

impl Assessment {
  /// Every question, in section then question order.
  pub fn questions(&self) -> impl Iterator<Item = &Question> {
    self.sections.iter().flat_map(|s| s.questions.iter())
  }

  pub fn question(&self, id: Uuid) -> Option<&Question> {
    self.questions().find(|q| q.question_id == id)
  }

  pub fn total_marks(&self) -> i64 { self.questions().map(|q| q.marks).sum() }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

fn default_duration() -> i64 { DEFAULT_DURATION_MINUTES }

fn default_marks() -> i64 { 1 }

/// Input to [`crate::registry::Registry::create_assessment`]. Positions
/// follow list order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssessment {
  pub title:            String,
  pub level_id:         Uuid,
  #[serde(default = "default_duration")]
  pub duration_minutes: i64,
  #[serde(default)]
  pub due_at:           Option<DateTime<Utc>>,
  pub sections:         Vec<NewSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSection {
  pub section_type: String,
  pub questions:    Vec<NewQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuestion {
  #[serde(default)]
  pub kind:  QuestionKind,
  pub text:  String,
  #[serde(default = "default_marks")]
  pub marks: i64,
}

/// Filters applied on top of the access scope when listing assessments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssessmentQuery {
  pub level_id: Option<Uuid>,
}

impl NewAssessment {
  /// Reject assessments that could not be taken or scored.
  pub fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() {
      return Err(Error::Invalid("assessment title must not be empty".to_owned()));
    }
    if self.duration_minutes <= 0 {
      return Err(Error::Invalid(format!(
        "duration must be positive, got {} minutes",
        self.duration_minutes
      )));
    }
    if let Some(due) = self.due_at
      && !ledger::is_recordable(due.date_naive())
    {
      return Err(Error::Invalid(format!("due date {due} is outside years 1 to 9999")));
    }
    if self.sections.is_empty() {
      return Err(Error::Invalid("an assessment needs at least one section".to_owned()));
    }
    for (s, section) in self.sections.iter().enumerate() {
      if section.questions.is_empty() {
        return Err(Error::Invalid(format!("section {} has no questions", s + 1)));
      }
      for (q, question) in section.questions.iter().enumerate() {
        if question.marks < 0 {
          return Err(Error::Invalid(format!(
            "question {} of section {}: marks must not be negative",
            q + 1,
            s + 1
          )));
        }
        if expected_answer(question.kind, &question.text).is_none() {
          return Err(Error::Invalid(format!(
            "question {} of section {}: {:?} is not a valid {} question",
            q + 1,
            s + 1,
            question.text,
            question.kind
          )));
        }
      }
    }
    Ok(())
  }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// A numeric answer. Quotients are compared to two decimal places, so they
/// are held as hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Numeric {
  Whole(i64),
  Hundredths(i64),
}

fn operands(text: &str) -> Option<Vec<i64>> { serde_json::from_str(text).ok() }

/// `n / d` in hundredths, rounded half away from zero.
fn quotient_hundredths(n: i64, d: i64) -> Option<i64> {
  if d == 0 {
    return None;
  }
  let (n, d) = (i128::from(n) * 100, i128::from(d));
  let (q, r) = (n / d, n % d);
  let q = if 2 * r.abs() >= d.abs() {
    q + if (n < 0) == (d < 0) { 1 } else { -1 }
  } else {
    q
  };
  i64::try_from(q).ok()
}

/// The answer a question expects, or `None` when its operands are
/// malformed, too few, divide by zero or overflow.
pub fn expected_answer(kind: QuestionKind, text: &str) -> Option<Numeric> {
  let xs = operands(text)?;
  match kind {
    QuestionKind::Plus if !xs.is_empty() => {
      xs.iter().try_fold(0_i64, |acc, x| acc.checked_add(*x)).map(Numeric::Whole)
    }
    QuestionKind::Multiply if !xs.is_empty() => {
      xs.iter().try_fold(1_i64, |acc, x| acc.checked_mul(*x)).map(Numeric::Whole)
    }
    QuestionKind::Divide => match xs.as_slice() {
      [n, d] => quotient_hundredths(*n, *d).map(Numeric::Hundredths),
      _ => None,
    },
    _ => None,
  }
}

/// Read a student's answer in the form the question kind expects.
fn parse_answer(kind: QuestionKind, text: &str) -> Option<Numeric> {
  let text = text.trim();
  match kind {
    QuestionKind::Divide => {
      let x: f64 = text.parse().ok()?;
      let h = (x * 100.0).round();
      (h.is_finite() && h.abs() < i64::MAX as f64).then_some(Numeric::Hundredths(h as i64))
    }
    QuestionKind::Plus | QuestionKind::Multiply => text.parse().ok().map(Numeric::Whole),
  }
}

/// The outcome of scoring one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
  pub is_correct:     bool,
  pub marks_obtained: i64,
}

/// Score `answer_text` against `question`. Unreadable answers are simply
/// wrong.
pub fn evaluate(question: &Question, answer_text: &str) -> Evaluation {
  let expected = expected_answer(question.kind, &question.text);
  let given = parse_answer(question.kind, answer_text);
  let is_correct = expected.is_some() && expected == given;
  Evaluation {
    is_correct,
    marks_obtained: if is_correct { question.marks } else { 0 },
  }
}
