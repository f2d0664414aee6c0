//! Assessment attempts and their state machine.
//!
//! ```text
//!   begin ──► Pending ──start──► InProgress ──submit──► Completed
//!                                    │
//!                                    └──submit after deadline──► Interrupted
//! ```
//!
//! A student holds at most one open (`Pending` or `InProgress`) attempt.
//! `start` fixes the deadline from the assessment's time limit. Answers
//! submitted after the deadline are discarded and the attempt ends
//! `Interrupted` with no score. An abandoned attempt whose deadline has
//! passed is interrupted when the student begins the next one.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  assessment::{self, Assessment},
  error::Transition,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
  Pending,
  InProgress,
  Completed,
  Interrupted,
}

impl std::fmt::Display for AttemptStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Pending => "pending",
      Self::InProgress => "in_progress",
      Self::Completed => "completed",
      Self::Interrupted => "interrupted",
    })
  }
}

/// One student's sitting of one assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
  pub attempt_id:    Uuid,
  pub assessment_id: Uuid,
  pub student_id:    Uuid,
  /// The student's centre, copied at creation for scoping.
  pub centre_id:     Uuid,
  pub status:        AttemptStatus,
  pub created_at:    DateTime<Utc>,
  pub started_at:    Option<DateTime<Utc>>,
  pub deadline:      Option<DateTime<Utc>>,
  pub finished_at:   Option<DateTime<Utc>>,
  /// Sum of marks obtained; set only on `Completed` attempts.
  pub score:         Option<i64>,
}

impl Attempt {
  pub fn is_open(&self) -> bool {
    matches!(self.status, AttemptStatus::Pending | AttemptStatus::InProgress)
  }

  /// An in-progress attempt whose deadline has passed.
  pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
    self.status == AttemptStatus::InProgress && self.deadline.is_some_and(|d| now >= d)
  }
}

/// `Pending → InProgress`, returning the deadline for an assessment with
/// `duration_minutes`.
pub fn start(
  from: AttemptStatus,
  duration_minutes: i64,
  now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
  if from != AttemptStatus::Pending {
    return Err(Error::InvalidAttemptTransition { from, action: Transition::Start });
  }
  TimeDelta::try_minutes(duration_minutes)
    .and_then(|d| now.checked_add_signed(d))
    .ok_or_else(|| Error::Invalid(format!("duration of {duration_minutes} minutes is out of range")))
}

/// `InProgress → Completed`, or `Interrupted` once the deadline has
/// passed.
pub fn finish(attempt: &Attempt, now: DateTime<Utc>) -> Result<AttemptStatus> {
  match attempt.status {
    AttemptStatus::InProgress if attempt.is_timed_out(now) => Ok(AttemptStatus::Interrupted),
    AttemptStatus::InProgress => Ok(AttemptStatus::Completed),
    from => Err(Error::InvalidAttemptTransition { from, action: Transition::Submit }),
  }
}

// ─── Answers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedAnswer {
  pub question_id: Uuid,
  pub answer_text: String,
}

/// A scored answer as stored with its attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
  pub question_id:    Uuid,
  pub answer_text:    String,
  pub is_correct:     bool,
  pub marks_obtained: i64,
}

/// Score a submission. Every answer must name a distinct question of
/// `assessment`; unanswered questions earn nothing.
pub fn score(assessment: &Assessment, answers: Vec<SubmittedAnswer>) -> Result<Vec<AnswerRecord>> {
  let mut seen = HashSet::new();
  answers
    .into_iter()
    .map(|answer| {
      let question = assessment.question(answer.question_id).ok_or_else(|| {
        Error::Invalid(format!(
          "question {} is not part of assessment {}",
          answer.question_id, assessment.assessment_id
        ))
      })?;
      if !seen.insert(answer.question_id) {
        return Err(Error::Invalid(format!(
          "question {} is answered more than once",
          answer.question_id
        )));
      }
      let eval = assessment::evaluate(question, &answer.answer_text);
      Ok(AnswerRecord {
        question_id:    answer.question_id,
        answer_text:    answer.answer_text,
        is_correct:     eval.is_correct,
        marks_obtained: eval.marks_obtained,
      })
    })
    .collect()
}

/// A finished attempt with its marks broken down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptResult {
  pub attempt:             Attempt,
  pub total_questions:     usize,
  pub total_marks:         i64,
  pub marks_obtained:      i64,
  pub correct_answers:     usize,
  pub incorrect_answers:   usize,
  /// Correct answers over answers given, as a percentage to two places.
  pub accuracy_percentage: f64,
  pub completion_seconds:  Option<i64>,
  pub answers:             Vec<AnswerRecord>,
}

impl AttemptResult {
  pub fn new(attempt: Attempt, assessment: &Assessment, answers: Vec<AnswerRecord>) -> Self {
    let correct = answers.iter().filter(|a| a.is_correct).count();
    let accuracy = if answers.is_empty() {
      0.0
    } else {
      (correct as f64 * 10_000.0 / answers.len() as f64).round() / 100.0
    };
    let completion_seconds = attempt
      .started_at
      .zip(attempt.finished_at)
      .map(|(start, end)| (end - start).num_seconds());
    Self {
      total_questions: assessment.questions().count(),
      total_marks: assessment.total_marks(),
      marks_obtained: answers.iter().map(|a| a.marks_obtained).sum(),
      correct_answers: correct,
      incorrect_answers: answers.len() - correct,
      accuracy_percentage: accuracy,
      completion_seconds,
      answers,
      attempt,
    }
  }
}

/// A student's best completed score on one assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopScore {
  pub student_id:   Uuid,
  pub student_name: String,
  pub score:        i64,
  pub finished_at:  DateTime<Utc>,
}
