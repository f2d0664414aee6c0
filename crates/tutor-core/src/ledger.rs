//! Progression ledger: the append-only level history of each student.
//!
//! Entries are never edited or deleted. The only write an entry ever
//! receives after insertion is setting its `completion_date` when the
//! student is promoted, at which point a new open entry supersedes it.
//!
//! The functions in this module are pure checks over an already-loaded
//! history; backends call them on the read path so that a corrupt ledger is
//! reported rather than silently interpreted.

use chrono::{DateTime, Datelike as _, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, level::Level};

/// One (student, level, start, completion) interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHistoryEntry {
  pub entry_id:          Uuid,
  pub student_id:        Uuid,
  pub level_id:          Uuid,
  /// The level of the entry this one superseded. Derived from the
  /// preceding entry; `None` for a student's first entry.
  pub previous_level_id: Option<Uuid>,
  pub start_date:        NaiveDate,
  /// `None` marks the open entry, i.e. the student's current level.
  pub completion_date:   Option<NaiveDate>,
  /// The principal whose action opened this entry.
  pub changed_by:        Uuid,
  pub recorded_at:       DateTime<Utc>,
}

impl LevelHistoryEntry {
  pub fn is_open(&self) -> bool { self.completion_date.is_none() }
}

/// A student's full history, in chronological order.
///
/// Cheap to iterate repeatedly; holds no storage handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<LevelHistoryEntry>);

impl History {
  /// Wrap entries already sorted by `start_date`, then `recorded_at`.
  pub fn new(entries: Vec<LevelHistoryEntry>) -> Self { Self(entries) }

  pub fn iter(&self) -> std::slice::Iter<'_, LevelHistoryEntry> {
    self.0.iter()
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn into_vec(self) -> Vec<LevelHistoryEntry> { self.0 }

  /// The open entry, if any. More than one is a [`Error::CorruptLedger`].
  pub fn find_open(&self, student_id: Uuid) -> Result<Option<&LevelHistoryEntry>> {
    let mut open = self.0.iter().filter(|e| e.is_open());
    match (open.next(), open.next()) {
      (entry, None) => Ok(entry),
      (_, Some(_)) => Err(Error::CorruptLedger {
        student_id,
        detail: format!(
          "{} open entries",
          self.0.iter().filter(|e| e.is_open()).count()
        ),
      }),
    }
  }

  /// The single open entry.
  ///
  /// Fails with [`Error::CorruptLedger`] when there is none or more than
  /// one.
  pub fn open_entry(&self, student_id: Uuid) -> Result<&LevelHistoryEntry> {
    self.find_open(student_id)?.ok_or_else(|| Error::CorruptLedger {
      student_id,
      detail: "no open entry".to_owned(),
    })
  }

  /// Check ordering and the no-overlap rule:
  /// `entry[i].completion_date <= entry[i + 1].start_date`, and only the
  /// last entry may be open.
  pub fn verify(&self, student_id: Uuid) -> Result<()> {
    for pair in self.0.windows(2) {
      let (prev, next) = (&pair[0], &pair[1]);
      let Some(completed) = prev.completion_date else {
        return Err(Error::CorruptLedger {
          student_id,
          detail: format!("entry {} is open but not last", prev.entry_id),
        });
      };
      if completed > next.start_date {
        return Err(Error::CorruptLedger {
          student_id,
          detail: format!(
            "entry {} overlaps entry {}",
            prev.entry_id, next.entry_id
          ),
        });
      }
    }
    for entry in &self.0 {
      if let Some(completed) = entry.completion_date
        && completed < entry.start_date
      {
        return Err(Error::CorruptLedger {
          student_id,
          detail: format!("entry {} completes before it starts", entry.entry_id),
        });
      }
    }
    self.open_entry(student_id).map(|_| ())
  }
}

impl<'a> IntoIterator for &'a History {
  type Item = &'a LevelHistoryEntry;
  type IntoIter = std::slice::Iter<'a, LevelHistoryEntry>;

  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

// ─── Promotion plan ──────────────────────────────────────────────────────────

/// Whether `date` lies in years 1 through 9999, the range the registry
/// records.
pub fn is_recordable(date: NaiveDate) -> bool { (1..=9999).contains(&date.year()) }

/// A validated promotion, ready to be applied atomically by a store.
///
/// The store must close `expected_open_entry` only if it is still open
/// (compare-and-swap); otherwise it reports
/// [`Error::ConcurrentModification`].
#[derive(Debug, Clone)]
pub struct Promotion {
  pub student_id:          Uuid,
  pub expected_open_entry: Uuid,
  pub expected_level_id:   Uuid,
  pub new_level_id:        Uuid,
  pub start_date:          NaiveDate,
  pub changed_by:          Uuid,
}

/// Validate the date and level of a promotion against the current open
/// entry.
///
/// Regressions (and sideways moves) are refused unless `allow_regression`
/// is set; moving to the level the student is already on is always
/// refused.
pub fn check_promotion(
  open: &LevelHistoryEntry,
  current: &Level,
  target: &Level,
  start_date: NaiveDate,
  allow_regression: bool,
) -> Result<()> {
  if !target.published {
    return Err(Error::InvalidLevel(format!(
      "level {} is not published",
      target.level_id
    )));
  }
  if target.level_id == current.level_id {
    return Err(Error::InvalidLevel(format!(
      "student is already on level {}",
      target.level_id
    )));
  }
  if target.ordinal <= current.ordinal && !allow_regression {
    return Err(Error::InvalidLevel(format!(
      "level ordinal {} does not follow current ordinal {}",
      target.ordinal, current.ordinal
    )));
  }
  if !is_recordable(start_date) {
    return Err(Error::InvalidStartDate(format!(
      "{start_date} is outside years 1 to 9999"
    )));
  }
  if start_date < open.start_date {
    return Err(Error::InvalidStartDate(format!(
      "{start_date} is before the current level's start date {}",
      open.start_date
    )));
  }
  Ok(())
}
