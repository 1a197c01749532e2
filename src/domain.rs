//! Domain models for progress tracking: the per-user record, completion
//! events, the completion-log key, and the pure level/streak rules.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What kind of discrete thing was completed?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
  Lesson,
  Course,
  Quiz,
  CodeExercise,
}

impl CompletionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      CompletionKind::Lesson => "lesson",
      CompletionKind::Course => "course",
      CompletionKind::Quiz => "quiz",
      CompletionKind::CodeExercise => "code_exercise",
    }
  }
}

/// Key into the completion log. One entry per (user, kind, target) means
/// the same event can never be credited twice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompletionKey {
  pub user_id: String,
  pub kind: CompletionKind,
  pub target_id: String,
}

impl CompletionKey {
  pub fn new(user_id: &str, kind: CompletionKind, target_id: &str) -> Self {
    Self { user_id: user_id.to_string(), kind, target_id: target_id.to_string() }
  }
}

/// A completion event reported by the page/UI layer. Each variant carries
/// only the fields it needs; dispatch happens in the engine's `apply`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionEvent {
  LessonCompleted {
    user_id: String,
    course_id: String,
    lesson_id: String,
  },
  CourseCompleted {
    user_id: String,
    course_id: String,
  },
  QuizCompleted {
    user_id: String,
    quiz_id: String,
    score: u32,
    passed: bool,
  },
  CodeExerciseCompleted {
    user_id: String,
    exercise_id: String,
    score: u32,
  },
}

impl CompletionEvent {
  pub fn user_id(&self) -> &str {
    match self {
      CompletionEvent::LessonCompleted { user_id, .. } => user_id,
      CompletionEvent::CourseCompleted { user_id, .. } => user_id,
      CompletionEvent::QuizCompleted { user_id, .. } => user_id,
      CompletionEvent::CodeExerciseCompleted { user_id, .. } => user_id,
    }
  }
}

/// One progress record per user. Created lazily on the first event,
/// mutated only by the engine, soft-disabled instead of deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressRecord {
  pub user_id: String,

  pub total_points: u64,
  pub experience_points: u64,
  /// Derived from `experience_points` via the threshold table. Never set
  /// directly; the engine recomputes it after every XP change.
  pub current_level: u32,

  pub streak: u32,
  pub longest_streak: u32,
  pub last_active_date: Option<NaiveDate>,

  pub badges: BTreeSet<String>,

  pub courses_completed: u32,
  pub lessons_completed: u32,
  pub quizzes_passed: u32,
  pub code_exercises_completed: u32,
  pub certificates_earned: u32,

  pub disabled: bool,
}

impl ProgressRecord {
  pub fn new(user_id: &str) -> Self {
    Self {
      user_id: user_id.to_string(),
      total_points: 0,
      experience_points: 0,
      current_level: 1,
      streak: 0,
      longest_streak: 0,
      last_active_date: None,
      badges: BTreeSet::new(),
      courses_completed: 0,
      lessons_completed: 0,
      quizzes_passed: 0,
      code_exercises_completed: 0,
      certificates_earned: 0,
      disabled: false,
    }
  }
}

/// State deltas reported back to the caller for the on-screen notification.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProgressDelta {
  pub points_awarded: u64,
  pub leveled_up: bool,
  pub new_level: u32,
  pub streak: u32,
  pub new_badges: Vec<String>,
  pub already_recorded: bool,
}

/// Level for a given XP total: max index i with `thresholds[i] <= xp`,
/// reported 1-based. `thresholds[0]` is always 0, so the minimum level is 1.
pub fn level_for_xp(thresholds: &[u64], xp: u64) -> u32 {
  let mut level = 1u32;
  for (i, t) in thresholds.iter().enumerate() {
    if *t <= xp {
      level = (i + 1) as u32;
    } else {
      break;
    }
  }
  level
}

/// Outcome of a streak advance, for logging and the delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreakChange {
  Unchanged,
  Extended,
  Reset,
}

/// Advance the streak for activity on `today`.
/// Same day → no-op. Exactly one day later → increment. Any larger gap
/// (or first-ever activity) → reset to 1, never 0. `longest_streak` tracks
/// the running max; `last_active_date` moves in every non-no-op case.
pub fn advance_streak(record: &mut ProgressRecord, today: NaiveDate) -> StreakChange {
  let change = match record.last_active_date {
    Some(last) if last == today => return StreakChange::Unchanged,
    Some(last) if (today - last).num_days() == 1 => {
      record.streak += 1;
      StreakChange::Extended
    }
    _ => {
      record.streak = 1;
      StreakChange::Reset
    }
  };
  record.longest_streak = record.longest_streak.max(record.streak);
  record.last_active_date = Some(today);
  change
}
