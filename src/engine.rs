//! The progress aggregator: applies completion events to a user's record
//! and reports the state delta (points gained, level-up, streak change,
//! newly unlocked badges) for the notification surface.
//!
//! Every operation is a read-modify-write transaction against the store,
//! guarded by the record version and retried a bounded number of times.
//! Duplicate completions are answered with `already_recorded` instead of an
//! error; the completion log is checked before any mutation.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::badges::{self, Badge};
use crate::certificates::CertificateIssuer;
use crate::config::GamifyConfig;
use crate::domain::{
  advance_streak, level_for_xp, CompletionEvent, CompletionKey, CompletionKind, ProgressDelta,
  ProgressRecord, StreakChange,
};
use crate::error::ProgressError;
use crate::store::{ProgressStore, Version};

// Bounded optimistic retries before surfacing the conflict to the caller.
const MAX_COMMIT_ATTEMPTS: u32 = 4;

pub struct ProgressEngine {
  store: Arc<dyn ProgressStore>,
  config: GamifyConfig,
  catalog: Vec<Badge>,
  issuer: CertificateIssuer,
}

impl ProgressEngine {
  pub fn new(store: Arc<dyn ProgressStore>, mut config: GamifyConfig, issuer: CertificateIssuer) -> Self {
    // The config loader rejects these too; this covers engines built with a
    // hand-assembled config.
    if !config.points.is_valid() {
      warn!(target: "progress", "Score divisor of 0 in point values; using default point values");
      config.points = Default::default();
    }
    if !config.levels.is_valid() {
      warn!(target: "progress", "Level threshold table not ascending from 0; using default thresholds");
      config.levels = Default::default();
    }
    let catalog = badges::build_catalog(&config.badges);
    Self { store, config, catalog, issuer }
  }

  pub fn catalog(&self) -> &[Badge] {
    &self.catalog
  }

  /// Read-only view of a user's record. Unknown users get the lazy default
  /// so the UI can always render a progress panel.
  #[instrument(level = "debug", skip(self), fields(%user_id))]
  pub async fn progress(&self, user_id: &str) -> Result<ProgressRecord, ProgressError> {
    require_id("userId", user_id)?;
    let loaded = self.store.load(user_id).await?;
    Ok(loaded.map(|(r, _)| r).unwrap_or_else(|| ProgressRecord::new(user_id)))
  }

  /// Add raw points to a user (e.g. a manual grant). Not idempotent by
  /// design: this is a grant, not a completion event.
  #[instrument(level = "info", skip(self), fields(%user_id, points, %reason))]
  pub async fn award_points(
    &self,
    user_id: &str,
    points: u64,
    reason: &str,
  ) -> Result<ProgressDelta, ProgressError> {
    require_id("userId", user_id)?;
    if points == 0 {
      return Err(ProgressError::InvalidInput("points must be > 0".into()));
    }

    let delta = self
      .transact(user_id, None, |record| {
        let leveled_up = credit_points(record, points, &self.config.levels.thresholds);
        let new_badges = badges::evaluate(&self.catalog, record);
        ProgressDelta {
          points_awarded: points,
          leveled_up,
          new_level: record.current_level,
          streak: record.streak,
          new_badges,
          already_recorded: false,
        }
      })
      .await?;

    info!(target: "progress", %user_id, points, %reason, leveled_up = delta.leveled_up, level = delta.new_level, "Points awarded");
    Ok(delta)
  }

  /// Single entry point for completion events, dated "now".
  pub async fn apply(&self, event: CompletionEvent) -> Result<ProgressDelta, ProgressError> {
    self.apply_on(event, Utc::now().date_naive()).await
  }

  /// Apply a completion event for activity on `today`. Split out so tests
  /// can drive the calendar.
  #[instrument(level = "info", skip(self, event), fields(user_id = %event.user_id(), %today))]
  pub async fn apply_on(
    &self,
    event: CompletionEvent,
    today: NaiveDate,
  ) -> Result<ProgressDelta, ProgressError> {
    match event {
      CompletionEvent::LessonCompleted { user_id, course_id, lesson_id } => {
        require_id("userId", &user_id)?;
        require_id("courseId", &course_id)?;
        require_id("lessonId", &lesson_id)?;
        let key = CompletionKey::new(&user_id, CompletionKind::Lesson, &lesson_id);
        let points = self.config.points.lesson;
        self
          .complete(&user_id, key, today, points, |r| r.lessons_completed += 1)
          .await
      }
      CompletionEvent::CourseCompleted { user_id, course_id } => {
        require_id("userId", &user_id)?;
        require_id("courseId", &course_id)?;
        let key = CompletionKey::new(&user_id, CompletionKind::Course, &course_id);
        if self.store.has_completion(&key).await? {
          return self.already_recorded(&user_id, &key).await;
        }
        // Issued once, before the commit loop, so a retried commit cannot
        // mint a second certificate.
        let certificate_id = self.issuer.issue(&user_id, &course_id).await;
        info!(target: "progress", %user_id, %course_id, %certificate_id, "Course completed, certificate issued");
        let points = self.config.points.course;
        self
          .complete(&user_id, key, today, points, |r| {
            r.courses_completed += 1;
            r.certificates_earned += 1;
          })
          .await
      }
      CompletionEvent::QuizCompleted { user_id, quiz_id, score, passed } => {
        require_id("userId", &user_id)?;
        require_id("quizId", &quiz_id)?;
        require_score(score)?;
        if !passed {
          // A failed quiz is never logged; the user can pass it later.
          info!(target: "progress", %user_id, %quiz_id, score, "Quiz attempt failed; nothing recorded");
          let record = self.progress(&user_id).await?;
          return Ok(ProgressDelta {
            new_level: record.current_level,
            streak: record.streak,
            ..ProgressDelta::default()
          });
        }
        let key = CompletionKey::new(&user_id, CompletionKind::Quiz, &quiz_id);
        let points = (score / self.config.points.quiz_score_divisor) as u64;
        self
          .complete(&user_id, key, today, points, |r| r.quizzes_passed += 1)
          .await
      }
      CompletionEvent::CodeExerciseCompleted { user_id, exercise_id, score } => {
        require_id("userId", &user_id)?;
        require_id("exerciseId", &exercise_id)?;
        require_score(score)?;
        let key = CompletionKey::new(&user_id, CompletionKind::CodeExercise, &exercise_id);
        let points = (score / self.config.points.exercise_score_divisor) as u64;
        self
          .complete(&user_id, key, today, points, |r| r.code_exercises_completed += 1)
          .await
      }
    }
  }

  /// Daily check-in, dated "now".
  pub async fn update_streak(&self, user_id: &str) -> Result<ProgressDelta, ProgressError> {
    self.update_streak_on(user_id, Utc::now().date_naive()).await
  }

  /// Streak check against `today`: same day is a no-op (nothing committed),
  /// the day after extends, a larger gap resets to 1.
  #[instrument(level = "info", skip(self), fields(%user_id, %today))]
  pub async fn update_streak_on(
    &self,
    user_id: &str,
    today: NaiveDate,
  ) -> Result<ProgressDelta, ProgressError> {
    require_id("userId", user_id)?;
    for _ in 0..MAX_COMMIT_ATTEMPTS {
      let (mut record, version) = self.load_or_new(user_id).await?;
      if record.disabled {
        return Err(ProgressError::not_found("user", user_id));
      }

      let change = advance_streak(&mut record, today);
      if change == StreakChange::Unchanged {
        return Ok(ProgressDelta {
          new_level: record.current_level,
          streak: record.streak,
          ..ProgressDelta::default()
        });
      }
      let new_badges = badges::evaluate(&self.catalog, &mut record);
      let delta = ProgressDelta {
        points_awarded: 0,
        leveled_up: false,
        new_level: record.current_level,
        streak: record.streak,
        new_badges,
        already_recorded: false,
      };

      match self.store.commit(record, version, None).await {
        Ok(_) => {
          info!(target: "progress", %user_id, streak = delta.streak, ?change, "Streak updated");
          return Ok(delta);
        }
        Err(ProgressError::PersistenceConflict(_)) => continue,
        Err(e) => return Err(e),
      }
    }
    warn!(target: "progress", %user_id, "Streak update exhausted commit attempts");
    Err(ProgressError::PersistenceConflict(user_id.to_string()))
  }

  /// Soft-disable or re-enable a user's record.
  #[instrument(level = "info", skip(self), fields(%user_id, disabled))]
  pub async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), ProgressError> {
    require_id("userId", user_id)?;
    self.store.set_disabled(user_id, disabled).await
  }

  // Generic read-modify-write with bounded optimistic retries. The closure
  // mutates a fresh copy of the record on every attempt.
  async fn transact<F>(
    &self,
    user_id: &str,
    completion: Option<CompletionKey>,
    mutate: F,
  ) -> Result<ProgressDelta, ProgressError>
  where
    F: Fn(&mut ProgressRecord) -> ProgressDelta,
  {
    for _ in 0..MAX_COMMIT_ATTEMPTS {
      let (mut record, version) = self.load_or_new(user_id).await?;
      if record.disabled {
        return Err(ProgressError::not_found("user", user_id));
      }
      let delta = mutate(&mut record);
      match self.store.commit(record, version, completion.clone()).await {
        Ok(_) => return Ok(delta),
        Err(ProgressError::PersistenceConflict(_)) => continue,
        Err(e) => return Err(e),
      }
    }
    warn!(target: "progress", %user_id, "Transaction exhausted commit attempts");
    Err(ProgressError::PersistenceConflict(user_id.to_string()))
  }

  // Shared completion path: log check, counter bump, points, streak, badges,
  // atomic commit with the log entry.
  async fn complete<F>(
    &self,
    user_id: &str,
    key: CompletionKey,
    today: NaiveDate,
    points: u64,
    bump: F,
  ) -> Result<ProgressDelta, ProgressError>
  where
    F: Fn(&mut ProgressRecord),
  {
    for _ in 0..MAX_COMMIT_ATTEMPTS {
      if self.store.has_completion(&key).await? {
        return self.already_recorded(user_id, &key).await;
      }
      let (mut record, version) = self.load_or_new(user_id).await?;
      if record.disabled {
        return Err(ProgressError::not_found("user", user_id));
      }

      bump(&mut record);
      let leveled_up = if points > 0 {
        credit_points(&mut record, points, &self.config.levels.thresholds)
      } else {
        false
      };
      advance_streak(&mut record, today);
      let new_badges = badges::evaluate(&self.catalog, &mut record);
      let delta = ProgressDelta {
        points_awarded: points,
        leveled_up,
        new_level: record.current_level,
        streak: record.streak,
        new_badges,
        already_recorded: false,
      };

      match self.store.commit(record, version, Some(key.clone())).await {
        Ok(_) => {
          info!(
            target: "progress",
            %user_id,
            kind = key.kind.as_str(),
            target_id = %key.target_id,
            points,
            leveled_up = delta.leveled_up,
            level = delta.new_level,
            streak = delta.streak,
            new_badges = delta.new_badges.len(),
            "Completion recorded"
          );
          return Ok(delta);
        }
        Err(ProgressError::PersistenceConflict(_)) => continue,
        Err(e) => return Err(e),
      }
    }
    warn!(target: "progress", %user_id, kind = key.kind.as_str(), "Completion exhausted commit attempts");
    Err(ProgressError::PersistenceConflict(user_id.to_string()))
  }

  // Duplicate event: no mutation, report current state with the flag set.
  async fn already_recorded(
    &self,
    user_id: &str,
    key: &CompletionKey,
  ) -> Result<ProgressDelta, ProgressError> {
    let record = self.progress(user_id).await?;
    info!(target: "progress", %user_id, kind = key.kind.as_str(), target_id = %key.target_id, "Completion already recorded; no-op");
    Ok(ProgressDelta {
      points_awarded: 0,
      leveled_up: false,
      new_level: record.current_level,
      streak: record.streak,
      new_badges: vec![],
      already_recorded: true,
    })
  }

  async fn load_or_new(&self, user_id: &str) -> Result<(ProgressRecord, Version), ProgressError> {
    Ok(
      self
        .store
        .load(user_id)
        .await?
        .unwrap_or_else(|| (ProgressRecord::new(user_id), 0)),
    )
  }
}

/// Add points to both totals and recompute the level. Returns whether the
/// level changed. Saturating: the totals cap at u64::MAX rather than wrap,
/// keeping them monotonically non-decreasing for any grant size.
fn credit_points(record: &mut ProgressRecord, points: u64, thresholds: &[u64]) -> bool {
  record.total_points = record.total_points.saturating_add(points);
  record.experience_points = record.experience_points.saturating_add(points);
  let level = level_for_xp(thresholds, record.experience_points);
  let leveled_up = level > record.current_level;
  record.current_level = level;
  leveled_up
}

fn require_id(name: &'static str, value: &str) -> Result<(), ProgressError> {
  if value.trim().is_empty() {
    return Err(ProgressError::InvalidInput(format!("{} must not be empty", name)));
  }
  Ok(())
}

fn require_score(score: u32) -> Result<(), ProgressError> {
  if score > 100 {
    return Err(ProgressError::InvalidInput("score must be within 0-100".into()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn engine() -> ProgressEngine {
    ProgressEngine::new(
      Arc::new(MemoryStore::new()),
      GamifyConfig::default(),
      CertificateIssuer::local(),
    )
  }

  fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn lesson(user: &str, lesson: &str) -> CompletionEvent {
    CompletionEvent::LessonCompleted {
      user_id: user.into(),
      course_id: "course-1".into(),
      lesson_id: lesson.into(),
    }
  }

  #[tokio::test]
  async fn award_points_rejects_zero() {
    let e = engine();
    let res = e.award_points("u1", 0, "manual").await;
    assert!(matches!(res, Err(ProgressError::InvalidInput(_))));
  }

  #[tokio::test]
  async fn award_points_updates_totals_and_level() {
    let e = engine();
    let delta = e.award_points("u1", 50, "lesson").await.unwrap();
    assert_eq!(delta.points_awarded, 50);
    assert!(!delta.leveled_up); // level 2 starts at 100 XP
    assert_eq!(delta.new_level, 1);

    let delta = e.award_points("u1", 50, "lesson").await.unwrap();
    assert!(delta.leveled_up);
    assert_eq!(delta.new_level, 2);

    let record = e.progress("u1").await.unwrap();
    assert_eq!(record.total_points, 100);
    assert_eq!(record.experience_points, 100);
    assert_eq!(record.current_level, 2);
  }

  #[tokio::test]
  async fn huge_grants_saturate_instead_of_wrapping() {
    let e = engine();
    e.award_points("u1", u64::MAX, "import").await.unwrap();
    // A follow-up grant must not wrap the totals back toward zero.
    let delta = e.award_points("u1", 1, "manual").await.unwrap();
    assert_eq!(delta.points_awarded, 1);
    let record = e.progress("u1").await.unwrap();
    assert_eq!(record.total_points, u64::MAX);
    assert_eq!(record.experience_points, u64::MAX);
    assert_eq!(record.current_level, 12); // top of the default table
  }

  #[tokio::test]
  async fn zero_score_divisor_falls_back_to_defaults() {
    let mut config = GamifyConfig::default();
    config.points.quiz_score_divisor = 0;
    let e = ProgressEngine::new(
      Arc::new(MemoryStore::new()),
      config,
      CertificateIssuer::local(),
    );
    let event = CompletionEvent::QuizCompleted {
      user_id: "u1".into(),
      quiz_id: "q1".into(),
      score: 80,
      passed: true,
    };
    let delta = e.apply_on(event, d("2026-03-01")).await.unwrap();
    assert_eq!(delta.points_awarded, 8); // default divisor of 10
  }

  #[tokio::test]
  async fn duplicate_lesson_completion_is_noop() {
    let e = engine();
    let first = e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await.unwrap();
    assert!(!first.already_recorded);
    assert_eq!(first.points_awarded, 50);

    let second = e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await.unwrap();
    assert!(second.already_recorded);
    assert_eq!(second.points_awarded, 0);
    assert!(second.new_badges.is_empty());

    let record = e.progress("u1").await.unwrap();
    assert_eq!(record.lessons_completed, 1);
    assert_eq!(record.total_points, 50);
  }

  #[tokio::test]
  async fn lesson_completion_unlocks_first_lesson_badge_once() {
    let e = engine();
    let first = e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await.unwrap();
    assert!(first.new_badges.contains(&"first_lesson".to_string()));

    let next = e.apply_on(lesson("u1", "l2"), d("2026-03-01")).await.unwrap();
    assert!(!next.new_badges.contains(&"first_lesson".to_string()));
  }

  #[tokio::test]
  async fn course_completion_issues_certificate_and_is_idempotent() {
    let e = engine();
    let event = CompletionEvent::CourseCompleted { user_id: "u1".into(), course_id: "c1".into() };
    let delta = e.apply_on(event.clone(), d("2026-03-01")).await.unwrap();
    assert_eq!(delta.points_awarded, 500);
    assert!(delta.new_badges.contains(&"first_course".to_string()));

    let record = e.progress("u1").await.unwrap();
    assert_eq!(record.courses_completed, 1);
    assert_eq!(record.certificates_earned, 1);

    let dup = e.apply_on(event, d("2026-03-02")).await.unwrap();
    assert!(dup.already_recorded);
    let record = e.progress("u1").await.unwrap();
    assert_eq!(record.certificates_earned, 1);
  }

  #[tokio::test]
  async fn failed_quiz_records_nothing_and_can_pass_later() {
    let e = engine();
    let failed = CompletionEvent::QuizCompleted {
      user_id: "u1".into(),
      quiz_id: "q1".into(),
      score: 40,
      passed: false,
    };
    let delta = e.apply_on(failed, d("2026-03-01")).await.unwrap();
    assert_eq!(delta.points_awarded, 0);
    assert!(!delta.already_recorded);
    assert_eq!(e.progress("u1").await.unwrap().quizzes_passed, 0);

    let passed = CompletionEvent::QuizCompleted {
      user_id: "u1".into(),
      quiz_id: "q1".into(),
      score: 80,
      passed: true,
    };
    let delta = e.apply_on(passed, d("2026-03-01")).await.unwrap();
    assert_eq!(delta.points_awarded, 8); // score / 10
    assert_eq!(e.progress("u1").await.unwrap().quizzes_passed, 1);
  }

  #[tokio::test]
  async fn exercise_points_scale_with_score() {
    let e = engine();
    let event = CompletionEvent::CodeExerciseCompleted {
      user_id: "u1".into(),
      exercise_id: "x1".into(),
      score: 90,
    };
    let delta = e.apply_on(event, d("2026-03-01")).await.unwrap();
    assert_eq!(delta.points_awarded, 18); // score / 5
    assert_eq!(e.progress("u1").await.unwrap().code_exercises_completed, 1);
  }

  #[tokio::test]
  async fn score_over_100_is_invalid() {
    let e = engine();
    let event = CompletionEvent::QuizCompleted {
      user_id: "u1".into(),
      quiz_id: "q1".into(),
      score: 101,
      passed: true,
    };
    let res = e.apply_on(event, d("2026-03-01")).await;
    assert!(matches!(res, Err(ProgressError::InvalidInput(_))));
  }

  #[tokio::test]
  async fn streak_extends_resets_and_keeps_longest() {
    let e = engine();
    e.update_streak_on("u1", d("2026-03-01")).await.unwrap();
    e.update_streak_on("u1", d("2026-03-02")).await.unwrap();
    let day3 = e.update_streak_on("u1", d("2026-03-03")).await.unwrap();
    assert_eq!(day3.streak, 3);

    // Same-day repeat does not double-increment.
    let repeat = e.update_streak_on("u1", d("2026-03-03")).await.unwrap();
    assert_eq!(repeat.streak, 3);

    // Day 4 skipped; day 5 resets to 1, longest stays 3.
    let day5 = e.update_streak_on("u1", d("2026-03-05")).await.unwrap();
    assert_eq!(day5.streak, 1);
    let record = e.progress("u1").await.unwrap();
    assert_eq!(record.longest_streak, 3);
  }

  #[tokio::test]
  async fn completions_drive_the_streak_too() {
    let e = engine();
    e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await.unwrap();
    let delta = e.apply_on(lesson("u1", "l2"), d("2026-03-02")).await.unwrap();
    assert_eq!(delta.streak, 2);
  }

  #[tokio::test]
  async fn disabled_user_rejects_mutations_but_allows_reads() {
    let e = engine();
    e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await.unwrap();
    e.set_disabled("u1", true).await.unwrap();

    let res = e.apply_on(lesson("u1", "l2"), d("2026-03-02")).await;
    assert!(matches!(res, Err(ProgressError::NotFound { .. })));
    let res = e.award_points("u1", 10, "manual").await;
    assert!(matches!(res, Err(ProgressError::NotFound { .. })));

    // Reads still work for support tooling.
    let record = e.progress("u1").await.unwrap();
    assert!(record.disabled);
    assert_eq!(record.lessons_completed, 1);
  }

  #[tokio::test]
  async fn empty_ids_are_invalid() {
    let e = engine();
    let res = e.apply_on(lesson("", "l1"), d("2026-03-01")).await;
    assert!(matches!(res, Err(ProgressError::InvalidInput(_))));
    let res = e.apply_on(lesson("u1", "  "), d("2026-03-01")).await;
    assert!(matches!(res, Err(ProgressError::InvalidInput(_))));
  }

  // Store wrapper that fails the first N commits with a version conflict,
  // to exercise the engine's retry loop.
  struct FlakyStore {
    inner: MemoryStore,
    conflicts_left: AtomicU32,
  }

  #[async_trait]
  impl ProgressStore for FlakyStore {
    async fn load(
      &self,
      user_id: &str,
    ) -> Result<Option<(ProgressRecord, Version)>, ProgressError> {
      self.inner.load(user_id).await
    }

    async fn commit(
      &self,
      record: ProgressRecord,
      expected_version: Version,
      completion: Option<CompletionKey>,
    ) -> Result<Version, ProgressError> {
      if self.conflicts_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
        return Err(ProgressError::PersistenceConflict(record.user_id));
      }
      self.inner.commit(record, expected_version, completion).await
    }

    async fn has_completion(&self, key: &CompletionKey) -> Result<bool, ProgressError> {
      self.inner.has_completion(key).await
    }

    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), ProgressError> {
      self.inner.set_disabled(user_id, disabled).await
    }
  }

  #[tokio::test]
  async fn commit_conflicts_are_retried() {
    let store = Arc::new(FlakyStore { inner: MemoryStore::new(), conflicts_left: AtomicU32::new(2) });
    let e = ProgressEngine::new(store, GamifyConfig::default(), CertificateIssuer::local());
    let delta = e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await.unwrap();
    assert_eq!(delta.points_awarded, 50);
    assert_eq!(e.progress("u1").await.unwrap().lessons_completed, 1);
  }

  #[tokio::test]
  async fn persistent_conflicts_surface_to_the_caller() {
    let store = Arc::new(FlakyStore { inner: MemoryStore::new(), conflicts_left: AtomicU32::new(u32::MAX) });
    let e = ProgressEngine::new(store, GamifyConfig::default(), CertificateIssuer::local());
    let res = e.apply_on(lesson("u1", "l1"), d("2026-03-01")).await;
    assert!(matches!(res, Err(ProgressError::PersistenceConflict(_))));
  }
}
