//! Integration tests for `SqliteStore`, driven mostly through the
//! [`Registry`] so the business rules and the schema guards are exercised
//! together.

use chrono::{Duration, NaiveDate, Utc};
use tutor_core::{
  Error as CoreError, Registry,
  assessment::{Assessment, AssessmentQuery, NewAssessment, NewQuestion, NewSection, QuestionKind},
  attempt::{AttemptStatus, SubmittedAnswer},
  centre::{Centre, CentreUpdate, NewCentre},
  level::{Level, NewLevel},
  ledger::Promotion,
  notification::NewNotification,
  principal::{NewCredentials, Principal, Role},
  registry::{PasswordTarget, PromoteRequest},
  store::{IdentityStore, RegistryStore},
  student::{Gender, NewStudent, Student, StudentQuery, StudentStatus, StudentUpdate},
};
use uuid::Uuid;

use crate::SqliteStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn creds(login: &str) -> NewCredentials {
  NewCredentials { login: login.into(), password_hash: format!("hash-of-{login}") }
}

struct Fixture {
  store:    SqliteStore,
  registry: Registry<SqliteStore>,
  admin:    Principal,
  centre:   Centre,
  /// Published levels A, B, C with ordinals 1, 2, 3.
  levels:   [Level; 3],
}

impl Fixture {
  async fn new() -> Self {
    let store = SqliteStore::open_in_memory()
      .await
      .expect("in-memory store");
    let registry = Registry::new(store.clone());
    let admin = store.insert_admin(creds("admin")).await.unwrap();

    let centre = registry
      .create_centre(&admin, NewCentre {
        name:             "Northside".into(),
        franchisee_name:  "R. Tan".into(),
        area:             "North".into(),
        instructor_names: vec!["Ms Lee".into(), "Mr Ong".into()],
        credentials:      creds("northside"),
      })
      .await
      .unwrap();

    let mut levels = Vec::new();
    for (ordinal, name) in [(1, "A"), (2, "B"), (3, "C")] {
      let level = registry
        .create_level(&admin, NewLevel { name: name.into(), description: None, ordinal })
        .await
        .unwrap();
      levels.push(registry.publish_level(&admin, level.level_id).await.unwrap());
    }
    let levels: [Level; 3] = levels.try_into().unwrap();

    Self { store, registry, admin, centre, levels }
  }

  fn centre_principal(&self) -> Principal {
    Principal::new(self.centre.owner_principal_id, Role::Centre(self.centre.centre_id))
  }

  async fn other_centre(&self, login: &str) -> (Centre, Principal) {
    let centre = self
      .registry
      .create_centre(&self.admin, NewCentre {
        name:             format!("Centre {login}"),
        franchisee_name:  "K. Lim".into(),
        area:             "South".into(),
        instructor_names: vec!["Mr Goh".into()],
        credentials:      creds(login),
      })
      .await
      .unwrap();
    let principal = Principal::new(centre.owner_principal_id, Role::Centre(centre.centre_id));
    (centre, principal)
  }

  fn new_student(&self, login: &str) -> NewStudent {
    NewStudent {
      centre_id:        Some(self.centre.centre_id),
      name:             format!("Student {login}"),
      dob:              date(2015, 3, 14),
      gender:           Gender::Female,
      level_id:         self.levels[0].level_id,
      instructor_id:    Some(self.centre.instructors[0].instructor_id),
      level_start_date: date(2024, 1, 1),
      credentials:      creds(login),
    }
  }

  /// A student at level A since 2024-01-01, approved by the admin.
  async fn active_student(&self, login: &str) -> Student {
    let (student, _) = self
      .registry
      .create_student(&self.admin, self.new_student(login))
      .await
      .unwrap();
    self.registry.approve_student(&self.admin, student.student_id).await.unwrap()
  }

  fn promote(&self, level: usize, start: NaiveDate) -> PromoteRequest {
    PromoteRequest {
      level_id:       self.levels[level].level_id,
      start_date:     start,
      override_order: false,
    }
  }
}

fn student_principal(student: &Student) -> Principal {
  Principal::new(student.principal_id, Role::Student(student.student_id))
}

/// Three one-mark questions: 1 + 2, 3 × 4 and 10 ÷ 4.
fn drill(level: &Level) -> NewAssessment {
  let q = |kind, text: &str| NewQuestion { kind, text: text.into(), marks: 1 };
  NewAssessment {
    title:            format!("Level {} drill", level.name),
    level_id:         level.level_id,
    duration_minutes: 8,
    due_at:           None,
    sections:         vec![NewSection {
      section_type: "A1".into(),
      questions:    vec![
        q(QuestionKind::Plus, "[1, 2]"),
        q(QuestionKind::Multiply, "[3, 4]"),
        q(QuestionKind::Divide, "[10, 4]"),
      ],
    }],
  }
}

fn answers(assessment: &Assessment, texts: &[&str]) -> Vec<SubmittedAnswer> {
  assessment
    .questions()
    .zip(texts)
    .map(|(q, text)| SubmittedAnswer { question_id: q.question_id, answer_text: (*text).into() })
    .collect()
}

impl Fixture {
  async fn assessment(&self, level: usize) -> Assessment {
    self
      .registry
      .create_assessment(&self.admin, drill(&self.levels[level]))
      .await
      .unwrap()
  }

  /// An approved student of `centre` at level A.
  async fn student_in(&self, centre: &Centre, login: &str) -> Student {
    let input = NewStudent {
      centre_id: Some(centre.centre_id),
      instructor_id: Some(centre.instructors[0].instructor_id),
      ..self.new_student(login)
    };
    let (student, _) = self.registry.create_student(&self.admin, input).await.unwrap();
    self.registry.approve_student(&self.admin, student.student_id).await.unwrap()
  }
}

// ─── Creation and lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn created_student_is_pending_with_one_open_entry() {
  let f = Fixture::new().await;
  let (student, entry) = f
    .registry
    .create_student(&f.centre_principal(), f.new_student("amy"))
    .await
    .unwrap();

  assert_eq!(student.status, StudentStatus::Pending);
  assert_eq!(student.centre_id, f.centre.centre_id);
  assert_eq!(student.current_level_id, f.levels[0].level_id);
  assert!(entry.is_open());
  assert_eq!(entry.changed_by, f.centre.owner_principal_id);

  let history = f.registry.get_history(&f.admin, student.student_id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history.open_entry(student.student_id).unwrap().entry_id, entry.entry_id);
}

#[tokio::test]
async fn centre_principal_cannot_pick_another_centre() {
  let f = Fixture::new().await;
  let (other, _) = f.other_centre("south").await;
  let mut input = f.new_student("amy");
  input.centre_id = Some(other.centre_id);
  input.instructor_id = None;

  let (student, _) = f
    .registry
    .create_student(&f.centre_principal(), input)
    .await
    .unwrap();
  assert_eq!(student.centre_id, f.centre.centre_id);
}

#[tokio::test]
async fn admin_must_name_the_centre() {
  let f = Fixture::new().await;
  let mut input = f.new_student("amy");
  input.centre_id = None;
  let err = f.registry.create_student(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)));
}

#[tokio::test]
async fn approve_twice_is_an_invalid_transition() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  assert_eq!(student.status, StudentStatus::Active);

  let err = f
    .registry
    .approve_student(&f.admin, student.student_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { from: StudentStatus::Active, .. }));

  let fetched = f.registry.get_student(&f.admin, student.student_id).await.unwrap();
  assert_eq!(fetched.status, StudentStatus::Active);
}

#[tokio::test]
async fn centre_cannot_approve() {
  let f = Fixture::new().await;
  let (student, _) = f
    .registry
    .create_student(&f.centre_principal(), f.new_student("amy"))
    .await
    .unwrap();
  let err = f
    .registry
    .approve_student(&f.centre_principal(), student.student_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn toggle_flips_active_and_inactive_but_not_pending() {
  let f = Fixture::new().await;
  let (pending, _) = f
    .registry
    .create_student(&f.admin, f.new_student("amy"))
    .await
    .unwrap();
  let err = f
    .registry
    .toggle_student_active(&f.centre_principal(), pending.student_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { from: StudentStatus::Pending, .. }));

  let student = f.active_student("ben").await;
  let off = f
    .registry
    .toggle_student_active(&f.centre_principal(), student.student_id)
    .await
    .unwrap();
  assert_eq!(off.status, StudentStatus::Inactive);
  let on = f
    .registry
    .toggle_student_active(&f.centre_principal(), student.student_id)
    .await
    .unwrap();
  assert_eq!(on.status, StudentStatus::Active);
}

#[tokio::test]
async fn stale_status_write_is_a_concurrent_modification() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let err = f
    .store
    .set_student_status(student.student_id, StudentStatus::Pending, StudentStatus::Active)
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Domain(CoreError::ConcurrentModification(id)) if id == student.student_id));
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn promotion_closes_open_entry_and_opens_new_one() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;

  let entry = f
    .registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap();
  assert_eq!(entry.level_id, f.levels[1].level_id);
  assert!(entry.is_open());

  let history = f.registry.get_history(&f.admin, student.student_id).await.unwrap();
  let entries = history.into_vec();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0].level_id, f.levels[0].level_id);
  assert_eq!(entries[0].completion_date, Some(date(2024, 6, 1)));
  assert_eq!(entries[1].start_date, date(2024, 6, 1));
  assert_eq!(entries[1].completion_date, None);

  let student = f.registry.get_student(&f.admin, student.student_id).await.unwrap();
  assert_eq!(student.current_level_id, f.levels[1].level_id);
  assert_eq!(student.level_start_date, date(2024, 6, 1));

  let current = f.registry.current_level(&f.admin, student.student_id).await.unwrap();
  assert_eq!(current.level_id, f.levels[1].level_id);
}

#[tokio::test]
async fn second_writer_with_same_open_entry_loses() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let history = f.store.history_for(student.student_id).await.unwrap();
  let open = history.open_entry(student.student_id).unwrap().clone();

  let promotion = |level: usize| Promotion {
    student_id:          student.student_id,
    expected_open_entry: open.entry_id,
    expected_level_id:   open.level_id,
    new_level_id:        f.levels[level].level_id,
    start_date:          date(2024, 6, 1),
    changed_by:          f.admin.principal_id,
  };

  f.store.record_promotion(promotion(1)).await.unwrap();
  let err = f.store.record_promotion(promotion(2)).await.unwrap_err();
  assert!(matches!(err, crate::Error::Domain(CoreError::ConcurrentModification(_))));

  let history = f.store.history_for(student.student_id).await.unwrap();
  assert_eq!(history.len(), 2);
  history.verify(student.student_id).unwrap();
}

#[tokio::test]
async fn racing_promotions_leave_exactly_one_open_entry() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;

  let (a, b) = tokio::join!(
    f.registry
      .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1))),
    f.registry
      .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1))),
  );
  assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
  let loser = [a, b].into_iter().find_map(Result::err).unwrap();
  assert!(
    matches!(loser, CoreError::ConcurrentModification(id) if id == student.student_id),
    "unexpected loser error: {loser}"
  );

  let history = f.registry.get_history(&f.admin, student.student_id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history.iter().filter(|e| e.is_open()).count(), 1);
}

#[tokio::test]
async fn dates_past_year_9999_are_refused_before_storage() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;

  let err = f
    .registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(10000, 1, 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidStartDate(_)), "got {err}");
  assert_eq!(f.registry.get_history(&f.admin, student.student_id).await.unwrap().len(), 1);

  let input = NewStudent { level_start_date: date(10000, 1, 1), ..f.new_student("ben") };
  let err = f.registry.create_student(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidStartDate(_)), "got {err}");

  let input = NewStudent { dob: date(10000, 1, 1), ..f.new_student("cal") };
  let err = f.registry.create_student(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)), "got {err}");

  let update = StudentUpdate { dob: Some(date(10000, 1, 1)), ..Default::default() };
  let err = f
    .registry
    .update_student(&f.admin, student.student_id, update)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)), "got {err}");

  f.registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(9999, 12, 31)))
    .await
    .unwrap();
}

#[tokio::test]
async fn history_entries_carry_the_previous_level() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let entry = f
    .registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap();
  assert_eq!(entry.previous_level_id, Some(f.levels[0].level_id));
  f.registry
    .promote_student(&f.admin, student.student_id, f.promote(2, date(2024, 9, 1)))
    .await
    .unwrap();

  let history = f.registry.get_history(&f.admin, student.student_id).await.unwrap();
  let previous: Vec<_> = history.iter().map(|e| e.previous_level_id).collect();
  assert_eq!(previous, [None, Some(f.levels[0].level_id), Some(f.levels[1].level_id)]);

  let listed = f.registry.list_history(&f.centre_principal()).await.unwrap();
  let previous: Vec<_> = listed.iter().map(|e| e.previous_level_id).collect();
  assert_eq!(previous, [None, Some(f.levels[0].level_id), Some(f.levels[1].level_id)]);
}

#[tokio::test]
async fn regression_needs_admin_override() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  f.registry
    .promote_student(&f.admin, student.student_id, f.promote(2, date(2024, 6, 1)))
    .await
    .unwrap();

  let back = f.promote(1, date(2024, 9, 1));
  let err = f
    .registry
    .promote_student(&f.admin, student.student_id, back.clone())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidLevel(_)));

  let overridden = PromoteRequest { override_order: true, ..back };
  let err = f
    .registry
    .promote_student(&f.centre_principal(), student.student_id, overridden.clone())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidLevel(_)));

  let entry = f
    .registry
    .promote_student(&f.admin, student.student_id, overridden)
    .await
    .unwrap();
  assert_eq!(entry.level_id, f.levels[1].level_id);
}

#[tokio::test]
async fn start_date_before_open_entry_is_rejected() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let err = f
    .registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2023, 12, 31)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidStartDate(_)));

  let history = f.store.history_for(student.student_id).await.unwrap();
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn student_cannot_promote_themself() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let err = f
    .registry
    .promote_student(&student_principal(&student), student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn unpublished_level_is_not_a_promotion_target() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let draft = f
    .registry
    .create_level(&f.admin, NewLevel { name: "D".into(), description: None, ordinal: 4 })
    .await
    .unwrap();
  let request = PromoteRequest {
    level_id:       draft.level_id,
    start_date:     date(2024, 6, 1),
    override_order: false,
  };
  let err = f
    .registry
    .promote_student(&f.admin, student.student_id, request)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidLevel(_)));
}

// ─── Scoping ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn centre_sees_only_its_own_students() {
  let f = Fixture::new().await;
  let (_, south) = f.other_centre("south").await;
  let student = f.active_student("amy").await;

  let err = f.registry.get_student(&south, student.student_id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
  let err = f.registry.get_history(&south, student.student_id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
  let err = f
    .registry
    .promote_student(&south, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));

  let listed = f.registry.list_students(&south, &StudentQuery::default()).await.unwrap();
  assert!(listed.is_empty());
  let listed = f
    .registry
    .list_students(&f.centre_principal(), &StudentQuery::default())
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn missing_records_do_not_leak_existence() {
  let f = Fixture::new().await;
  let ghost = Uuid::new_v4();

  let err = f.registry.get_student(&f.centre_principal(), ghost).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
  let err = f.registry.get_student(&f.admin, ghost).await.unwrap_err();
  assert!(matches!(err, CoreError::NotFound(..)));
}

#[tokio::test]
async fn student_reads_only_own_records() {
  let f = Fixture::new().await;
  let amy = f.active_student("amy").await;
  let ben = f.active_student("ben").await;
  let me = student_principal(&amy);

  f.registry.get_student(&me, amy.student_id).await.unwrap();
  f.registry.get_history(&me, amy.student_id).await.unwrap();
  let err = f.registry.get_student(&me, ben.student_id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));

  let entries = f.registry.list_history(&me).await.unwrap();
  assert!(entries.iter().all(|e| e.student_id == amy.student_id));
  assert_eq!(entries.len(), 1);

  let err = f.registry.list_students(&me, &StudentQuery::default()).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn list_history_is_scoped_to_the_centre() {
  let f = Fixture::new().await;
  let (_, south) = f.other_centre("south").await;
  let student = f.active_student("amy").await;
  f.registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap();

  assert_eq!(f.registry.list_history(&f.centre_principal()).await.unwrap().len(), 2);
  assert!(f.registry.list_history(&south).await.unwrap().is_empty());
  assert_eq!(f.registry.list_history(&f.admin).await.unwrap().len(), 2);
}

// ─── Centres ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn inactive_centre_blocks_new_work() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let toggled = f.registry.toggle_centre_active(&f.admin, f.centre.centre_id).await.unwrap();
  assert!(!toggled.active);

  let err = f
    .registry
    .create_student(&f.admin, f.new_student("ben"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::CentreInactive(_)));

  let err = f
    .registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::CentreInactive(_)));

  let enabled = f.store.is_enabled(f.centre_principal()).await.unwrap();
  assert!(!enabled);
}

#[tokio::test]
async fn centre_cannot_toggle_itself() {
  let f = Fixture::new().await;
  let err = f
    .registry
    .toggle_centre_active(&f.centre_principal(), f.centre.centre_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn instructor_must_belong_to_the_centre() {
  let f = Fixture::new().await;
  let (other, _) = f.other_centre("south").await;
  let mut input = f.new_student("amy");
  input.instructor_id = Some(other.instructors[0].instructor_id);
  let err = f.registry.create_student(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::InstructorNotInCentre { .. }));

  let student = f.active_student("ben").await;
  let update = StudentUpdate {
    instructor_id: Some(Some(other.instructors[0].instructor_id)),
    ..Default::default()
  };
  let err = f
    .registry
    .update_student(&f.centre_principal(), student.student_id, update)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InstructorNotInCentre { .. }));
}

#[tokio::test]
async fn update_student_changes_only_profile_fields() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let updated = f
    .registry
    .update_student(&f.centre_principal(), student.student_id, StudentUpdate {
      name: Some("Amy Tan".into()),
      instructor_id: Some(None),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(updated.name, "Amy Tan");
  assert_eq!(updated.instructor_id, None);
  assert_eq!(updated.status, StudentStatus::Active);
  assert_eq!(updated.current_level_id, student.current_level_id);
  assert_eq!(updated.dob, student.dob);
}

#[tokio::test]
async fn list_centres_counts_and_searches() {
  let f = Fixture::new().await;
  f.other_centre("south").await;
  f.active_student("amy").await;
  f.registry.create_student(&f.admin, f.new_student("ben")).await.unwrap();

  let all = f.registry.list_centres(&f.admin, None).await.unwrap();
  assert_eq!(all.len(), 2);
  let north = all.iter().find(|c| c.centre.centre_id == f.centre.centre_id).unwrap();
  assert_eq!(north.student_count, 2);
  assert_eq!(north.active_student_count, 1);
  assert_eq!(north.centre.instructors.len(), 2);

  let found = f.registry.list_centres(&f.admin, Some("NORTH".into())).await.unwrap();
  assert_eq!(found.len(), 1);

  let err = f.registry.list_centres(&f.centre_principal(), None).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn replacing_instructors_keeps_assigned_ones() {
  let f = Fixture::new().await;
  f.active_student("amy").await;
  let assigned = f.centre.instructors[0].clone();

  let updated = f
    .registry
    .update_centre(&f.admin, f.centre.centre_id, CentreUpdate {
      instructor_names: Some(vec!["Mrs Koh".into()]),
      ..Default::default()
    })
    .await
    .unwrap();
  let names: Vec<_> = updated.instructors.iter().map(|ci| ci.name.as_str()).collect();
  assert!(names.contains(&"Mrs Koh"));
  assert!(names.contains(&assigned.name.as_str()));
  assert_eq!(updated.instructors.len(), 2);
}

#[tokio::test]
async fn duplicate_login_is_rejected() {
  let f = Fixture::new().await;
  f.active_student("amy").await;
  let err = f
    .registry
    .create_student(&f.admin, f.new_student("amy"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::LoginTaken(login) if login == "amy"));
}

// ─── Levels ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn drafts_are_hidden_from_non_admins() {
  let f = Fixture::new().await;
  let draft = f
    .registry
    .create_level(&f.admin, NewLevel { name: "D".into(), description: None, ordinal: 4 })
    .await
    .unwrap();
  assert!(!draft.published);

  assert_eq!(f.registry.list_levels(&f.admin).await.unwrap().len(), 4);
  assert_eq!(f.registry.list_levels(&f.centre_principal()).await.unwrap().len(), 3);
  let err = f
    .registry
    .get_level(&f.centre_principal(), draft.level_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::NotFound(..)));

  let mut input = f.new_student("amy");
  input.level_id = draft.level_id;
  let err = f.registry.create_student(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidLevel(_)));
}

#[tokio::test]
async fn ordinals_are_unique() {
  let f = Fixture::new().await;
  let err = f
    .registry
    .create_level(&f.admin, NewLevel { name: "A2".into(), description: None, ordinal: 1 })
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)));
}

// ─── Schema guards ───────────────────────────────────────────────────────────

#[tokio::test]
async fn ledger_rows_cannot_be_deleted_or_rewritten() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  f.registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap();
  let sid = student.student_id.hyphenated().to_string();

  let id = sid.clone();
  let deleted = f
    .store
    .conn
    .call(move |conn| {
      conn.execute("DELETE FROM level_history WHERE student_id = ?1", [id])?;
      Ok(())
    })
    .await;
  assert!(deleted.is_err());

  let id = sid.clone();
  let reopened = f
    .store
    .conn
    .call(move |conn| {
      conn.execute(
        "UPDATE level_history SET completion_date = NULL WHERE student_id = ?1",
        [id],
      )?;
      Ok(())
    })
    .await;
  assert!(reopened.is_err());

  let id = sid;
  let second_open = f
    .store
    .conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO level_history
           (entry_id, student_id, level_id, start_date, completion_date, changed_by, recorded_at)
         SELECT ?1, student_id, level_id, '2024-07-01', NULL, changed_by, recorded_at
         FROM level_history WHERE student_id = ?2 LIMIT 1",
        [Uuid::new_v4().hyphenated().to_string(), id],
      )?;
      Ok(())
    })
    .await;
  assert!(second_open.is_err());

  f.registry.get_history(&f.admin, student.student_id).await.unwrap();
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_active_students_are_enabled() {
  let f = Fixture::new().await;
  let (pending, _) = f
    .registry
    .create_student(&f.admin, f.new_student("amy"))
    .await
    .unwrap();
  assert!(!f.store.is_enabled(student_principal(&pending)).await.unwrap());

  let active = f.registry.approve_student(&f.admin, pending.student_id).await.unwrap();
  assert!(f.store.is_enabled(student_principal(&active)).await.unwrap());
  assert!(f.store.is_enabled(f.admin).await.unwrap());
}

#[tokio::test]
async fn credentials_resolve_by_login() {
  let f = Fixture::new().await;
  let found = f.store.find_credentials("northside").await.unwrap().unwrap();
  assert_eq!(found.principal, f.centre_principal());
  assert_eq!(found.password_hash, "hash-of-northside");
  assert!(f.store.find_credentials("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn tokens_expire_and_revoke() {
  let f = Fixture::new().await;
  let now = Utc::now();
  f.store
    .insert_token(f.admin.principal_id, "live".into(), now + Duration::hours(1))
    .await
    .unwrap();
  f.store
    .insert_token(f.admin.principal_id, "stale".into(), now - Duration::hours(1))
    .await
    .unwrap();

  assert_eq!(f.store.principal_for_token("live".into(), now).await.unwrap(), Some(f.admin));
  assert_eq!(f.store.principal_for_token("stale".into(), now).await.unwrap(), None);

  assert!(f.store.revoke_token("live".into()).await.unwrap());
  assert!(!f.store.revoke_token("live".into()).await.unwrap());
  assert_eq!(f.store.principal_for_token("live".into(), now).await.unwrap(), None);
}

#[tokio::test]
async fn password_reset_revokes_tokens() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let expires = Utc::now() + Duration::hours(1);
  f.store
    .insert_token(student.principal_id, "amy-token".into(), expires)
    .await
    .unwrap();

  f.registry
    .reset_password(
      &f.centre_principal(),
      PasswordTarget::Student(student.student_id),
      "new-hash".into(),
    )
    .await
    .unwrap();

  let creds = f.store.find_credentials("amy").await.unwrap().unwrap();
  assert_eq!(creds.password_hash, "new-hash");
  assert_eq!(f.store.principal_for_token("amy-token".into(), Utc::now()).await.unwrap(), None);
}

// ─── Assessments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn students_see_assessments_for_their_current_level_only() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let p = student_principal(&student);
  let on_a = f.assessment(0).await;
  let on_b = f.assessment(1).await;

  let seen = f.registry.list_assessments(&p, &AssessmentQuery::default()).await.unwrap();
  assert_eq!(seen.iter().map(|a| a.assessment_id).collect::<Vec<_>>(), [on_a.assessment_id]);
  assert_eq!(seen[0].total_marks(), 3);
  let err = f.registry.get_assessment(&p, on_b.assessment_id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
  let query = AssessmentQuery { level_id: Some(f.levels[1].level_id) };
  assert!(f.registry.list_assessments(&p, &query).await.unwrap().is_empty());

  f.registry
    .promote_student(&f.admin, student.student_id, f.promote(1, date(2024, 6, 1)))
    .await
    .unwrap();
  let seen = f.registry.list_assessments(&p, &AssessmentQuery::default()).await.unwrap();
  assert_eq!(seen.iter().map(|a| a.assessment_id).collect::<Vec<_>>(), [on_b.assessment_id]);

  let centre = f.centre_principal();
  assert_eq!(
    f.registry.list_assessments(&centre, &AssessmentQuery::default()).await.unwrap().len(),
    2
  );
  assert_eq!(f.registry.list_assessments(&centre, &query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn assessment_sections_and_questions_keep_their_order() {
  let f = Fixture::new().await;
  let mut input = drill(&f.levels[0]);
  input.sections.push(NewSection {
    section_type: "A2".into(),
    questions:    vec![NewQuestion { kind: QuestionKind::Plus, text: "[5, 5]".into(), marks: 2 }],
  });
  let created = f.registry.create_assessment(&f.admin, input).await.unwrap();
  let loaded = f.registry.get_assessment(&f.admin, created.assessment_id).await.unwrap();
  assert_eq!(loaded, created);
  assert_eq!(loaded.sections[1].position, 2);
  assert_eq!(loaded.questions().map(|q| q.position).collect::<Vec<_>>(), [1, 2, 3, 1]);
  assert_eq!(loaded.total_marks(), 5);
}

#[tokio::test]
async fn only_admins_create_assessments_and_they_must_be_scorable() {
  let f = Fixture::new().await;
  let err = f
    .registry
    .create_assessment(&f.centre_principal(), drill(&f.levels[0]))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));

  let mut input = drill(&f.levels[0]);
  input.sections[0].questions[2].text = "[10, 0]".into();
  let err = f.registry.create_assessment(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)));

  let input = NewAssessment { level_id: Uuid::new_v4(), ..drill(&f.levels[0]) };
  let err = f.registry.create_assessment(&f.admin, input).await.unwrap_err();
  assert!(matches!(err, CoreError::NotFound(..)));
}

#[tokio::test]
async fn inactive_assessments_are_hidden_from_non_admins() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let p = student_principal(&student);
  let a = f.assessment(0).await;

  let hidden = f.registry.toggle_assessment_active(&f.admin, a.assessment_id).await.unwrap();
  assert!(!hidden.active);

  let centre = f.centre_principal();
  assert!(
    f.registry.list_assessments(&centre, &AssessmentQuery::default()).await.unwrap().is_empty()
  );
  assert!(f.registry.list_assessments(&p, &AssessmentQuery::default()).await.unwrap().is_empty());
  assert!(matches!(
    f.registry.get_assessment(&centre, a.assessment_id).await,
    Err(CoreError::Forbidden)
  ));
  assert!(matches!(
    f.registry.begin_attempt(&p, a.assessment_id).await,
    Err(CoreError::Forbidden)
  ));
  assert!(f.registry.get_assessment(&f.admin, a.assessment_id).await.is_ok());
  assert!(matches!(
    f.registry.toggle_assessment_active(&centre, a.assessment_id).await,
    Err(CoreError::Forbidden)
  ));
}

// ─── Attempts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn attempt_runs_from_pending_to_completed() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let p = student_principal(&student);
  let a = f.assessment(0).await;

  let attempt = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
  assert_eq!(attempt.status, AttemptStatus::Pending);
  assert_eq!(attempt.centre_id, f.centre.centre_id);

  let err = f
    .registry
    .submit_attempt(&p, attempt.attempt_id, answers(&a, &["3"]))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidAttemptTransition { .. }));

  let started = f.registry.start_attempt(&p, attempt.attempt_id).await.unwrap();
  assert_eq!(started.status, AttemptStatus::InProgress);
  let (start, deadline) = (started.started_at.unwrap(), started.deadline.unwrap());
  assert_eq!(deadline - start, Duration::minutes(8));
  assert!(matches!(
    f.registry.start_attempt(&p, attempt.attempt_id).await,
    Err(CoreError::InvalidAttemptTransition { .. })
  ));

  let result = f
    .registry
    .submit_attempt(&p, attempt.attempt_id, answers(&a, &["3", "11", "2.50"]))
    .await
    .unwrap();
  assert_eq!(result.attempt.status, AttemptStatus::Completed);
  assert_eq!(result.attempt.score, Some(2));
  assert_eq!((result.correct_answers, result.incorrect_answers), (2, 1));
  assert_eq!(result.total_marks, 3);

  let stored = f.registry.attempt_result(&p, attempt.attempt_id).await.unwrap();
  assert_eq!(stored, result);
  assert!(matches!(
    f.registry.submit_attempt(&p, attempt.attempt_id, Vec::new()).await,
    Err(CoreError::InvalidAttemptTransition { .. })
  ));
}

#[tokio::test]
async fn a_student_holds_one_open_attempt() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let p = student_principal(&student);
  let a = f.assessment(0).await;

  let first = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
  let err = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap_err();
  assert!(matches!(err, CoreError::AttemptOpen(id) if id == first.attempt_id));
  assert!(matches!(
    f.registry.attempt_result(&p, first.attempt_id).await,
    Err(CoreError::Invalid(_))
  ));

  f.registry.start_attempt(&p, first.attempt_id).await.unwrap();
  f.registry.submit_attempt(&p, first.attempt_id, Vec::new()).await.unwrap();
  f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
}

#[tokio::test]
async fn late_submission_interrupts_the_attempt() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let p = student_principal(&student);
  let a = f.assessment(0).await;

  let attempt = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
  let now = Utc::now();
  f.store
    .start_attempt(attempt.attempt_id, now - Duration::minutes(10), now - Duration::minutes(2))
    .await
    .unwrap();

  let result = f
    .registry
    .submit_attempt(&p, attempt.attempt_id, answers(&a, &["3", "12", "2.5"]))
    .await
    .unwrap();
  assert_eq!(result.attempt.status, AttemptStatus::Interrupted);
  assert_eq!(result.attempt.score, None);
  assert!(result.answers.is_empty());
  assert!(f.store.answers_for(attempt.attempt_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn abandoned_attempt_is_interrupted_by_the_next_one() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let p = student_principal(&student);
  let a = f.assessment(0).await;

  let abandoned = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
  let now = Utc::now();
  f.store
    .start_attempt(abandoned.attempt_id, now - Duration::minutes(10), now - Duration::minutes(2))
    .await
    .unwrap();

  let next = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
  assert_eq!(next.status, AttemptStatus::Pending);
  let abandoned = f.registry.get_attempt(&p, abandoned.attempt_id).await.unwrap();
  assert_eq!(abandoned.status, AttemptStatus::Interrupted);
  assert!(abandoned.finished_at.is_some());
}

#[tokio::test]
async fn centre_sees_only_its_own_students_attempts() {
  let f = Fixture::new().await;
  let a = f.assessment(0).await;
  let amy = f.active_student("amy").await;
  let (other, other_principal) = f.other_centre("southside").await;
  let zed = f.student_in(&other, "zed").await;

  let mine = f.registry.begin_attempt(&student_principal(&amy), a.assessment_id).await.unwrap();
  let theirs = f.registry.begin_attempt(&student_principal(&zed), a.assessment_id).await.unwrap();

  let centre = f.centre_principal();
  let listed = f.registry.list_attempts(&centre).await.unwrap();
  assert_eq!(listed.iter().map(|x| x.attempt_id).collect::<Vec<_>>(), [mine.attempt_id]);
  assert!(f.registry.get_attempt(&centre, mine.attempt_id).await.is_ok());
  assert!(matches!(
    f.registry.get_attempt(&centre, theirs.attempt_id).await,
    Err(CoreError::Forbidden)
  ));
  assert_eq!(f.registry.list_attempts(&other_principal).await.unwrap().len(), 1);
  assert_eq!(f.registry.list_attempts(&f.admin).await.unwrap().len(), 2);

  // Only the student itself takes its attempt.
  assert!(matches!(
    f.registry.start_attempt(&student_principal(&zed), mine.attempt_id).await,
    Err(CoreError::Forbidden)
  ));
  assert!(matches!(
    f.registry.start_attempt(&centre, mine.attempt_id).await,
    Err(CoreError::Forbidden)
  ));
  assert!(matches!(
    f.registry.begin_attempt(&centre, a.assessment_id).await,
    Err(CoreError::Forbidden)
  ));
  assert!(matches!(
    f.registry.begin_attempt(&f.admin, a.assessment_id).await,
    Err(CoreError::Invalid(_))
  ));
}

#[tokio::test]
async fn top_scores_rank_each_students_best_attempt() {
  let f = Fixture::new().await;
  let a = f.assessment(0).await;
  let amy = f.active_student("amy").await;
  let ben = f.active_student("ben").await;
  let (other, _) = f.other_centre("southside").await;
  let zed = f.student_in(&other, "zed").await;

  let sit = |student: Student, texts: &'static [&'static str]| {
    let f = &f;
    let a = &a;
    async move {
      let p = student_principal(&student);
      let attempt = f.registry.begin_attempt(&p, a.assessment_id).await.unwrap();
      f.registry.start_attempt(&p, attempt.attempt_id).await.unwrap();
      f.registry.submit_attempt(&p, attempt.attempt_id, answers(a, texts)).await.unwrap();
    }
  };
  sit(amy.clone(), &["3"]).await;
  sit(amy.clone(), &["3", "12"]).await;
  sit(ben.clone(), &["3", "12", "2.5"]).await;
  sit(zed.clone(), &["3", "12", "2.5"]).await;

  let top = f.registry.top_scores(&f.centre_principal(), a.assessment_id).await.unwrap();
  let ranked: Vec<_> = top.iter().map(|t| (t.student_id, t.score)).collect();
  assert_eq!(ranked, [(ben.student_id, 3), (amy.student_id, 2)]);
  assert_eq!(top[1].student_name, amy.name);

  let everyone = f.registry.top_scores(&f.admin, a.assessment_id).await.unwrap();
  assert_eq!(everyone.len(), 3);
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_reach_only_addressed_centres() {
  let f = Fixture::new().await;
  let (south, south_principal) = f.other_centre("southside").await;
  let (_, east_principal) = f.other_centre("eastside").await;
  let north = f.centre_principal();

  let sent = f
    .registry
    .create_notification(&f.admin, NewNotification {
      title:      "Holiday".into(),
      message:    "Centres close on Friday".into(),
      centre_ids: vec![f.centre.centre_id, south.centre_id, f.centre.centre_id],
    })
    .await
    .unwrap();
  assert_eq!(sent.recipients.len(), 2);

  let listed = f.registry.list_notifications(&north).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].recipients.len(), 1);
  assert_eq!(listed[0].recipients[0].centre_id, f.centre.centre_id);
  assert!(f.registry.list_notifications(&east_principal).await.unwrap().is_empty());
  assert!(matches!(
    f.registry.get_notification(&east_principal, sent.notification_id).await,
    Err(CoreError::Forbidden)
  ));

  let read = f.registry.mark_notification_read(&north, sent.notification_id).await.unwrap();
  let first_read = read.recipients[0].read_at.unwrap();
  let again = f.registry.mark_notification_read(&north, sent.notification_id).await.unwrap();
  assert_eq!(again.recipients[0].read_at, Some(first_read));

  let seen_by_admin = f.registry.get_notification(&f.admin, sent.notification_id).await.unwrap();
  let south_entry = seen_by_admin
    .recipients
    .iter()
    .find(|r| r.centre_id == south.centre_id)
    .unwrap();
  assert_eq!(south_entry.read_at, None);
  assert_eq!(f.registry.list_notifications(&south_principal).await.unwrap().len(), 1);
}

#[tokio::test]
async fn only_admins_send_notifications_to_known_centres() {
  let f = Fixture::new().await;
  let student = f.active_student("amy").await;
  let input = |centre_ids| NewNotification {
    title: "Fees".into(),
    message: "Due next week".into(),
    centre_ids,
  };

  let err = f
    .registry
    .create_notification(&f.centre_principal(), input(vec![f.centre.centre_id]))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
  let err = f.registry.create_notification(&f.admin, input(vec![Uuid::new_v4()])).await.unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)));
  let err = f.registry.create_notification(&f.admin, input(Vec::new())).await.unwrap_err();
  assert!(matches!(err, CoreError::Invalid(_)));
  assert!(matches!(
    f.registry.list_notifications(&student_principal(&student)).await,
    Err(CoreError::Forbidden)
  ));
}
