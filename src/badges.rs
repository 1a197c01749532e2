//! Badge catalog: built-in milestone badges plus config-supplied extras,
//! and the predicate evaluation over a progress record.

use serde::{Deserialize, Serialize};

use crate::domain::ProgressRecord;

/// Predicate deciding whether a badge is unlocked for a record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeRule {
  LessonsCompleted { count: u32 },
  CoursesCompleted { count: u32 },
  QuizzesPassed { count: u32 },
  CodeExercisesCompleted { count: u32 },
  StreakDays { days: u32 },
  TotalPoints { amount: u64 },
  LevelReached { level: u32 },
}

impl BadgeRule {
  pub fn satisfied(&self, r: &ProgressRecord) -> bool {
    match self {
      BadgeRule::LessonsCompleted { count } => r.lessons_completed >= *count,
      BadgeRule::CoursesCompleted { count } => r.courses_completed >= *count,
      BadgeRule::QuizzesPassed { count } => r.quizzes_passed >= *count,
      BadgeRule::CodeExercisesCompleted { count } => r.code_exercises_completed >= *count,
      BadgeRule::StreakDays { days } => r.streak >= *days || r.longest_streak >= *days,
      BadgeRule::TotalPoints { amount } => r.total_points >= *amount,
      BadgeRule::LevelReached { level } => r.current_level >= *level,
    }
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct Badge {
  pub id: String,
  pub title: String,
  pub rule: BadgeRule,
}

/// Badge entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct BadgeCfg {
  pub id: String,
  pub title: String,
  pub rule: BadgeRule,
}

/// Built-in badges that ship with the platform. Config extras are merged on
/// top without overriding these ids.
pub fn builtin_badges() -> Vec<Badge> {
  fn b(id: &str, title: &str, rule: BadgeRule) -> Badge {
    Badge { id: id.into(), title: title.into(), rule }
  }
  vec![
    b("first_lesson", "First Steps", BadgeRule::LessonsCompleted { count: 1 }),
    b("ten_lessons", "Getting Serious", BadgeRule::LessonsCompleted { count: 10 }),
    b("fifty_lessons", "Lecture Hall Regular", BadgeRule::LessonsCompleted { count: 50 }),
    b("first_course", "Course Finisher", BadgeRule::CoursesCompleted { count: 1 }),
    b("five_courses", "Curriculum Climber", BadgeRule::CoursesCompleted { count: 5 }),
    b("first_quiz", "Quiz Rookie", BadgeRule::QuizzesPassed { count: 1 }),
    b("ten_quizzes", "Quiz Veteran", BadgeRule::QuizzesPassed { count: 10 }),
    b("first_exercise", "Hello World", BadgeRule::CodeExercisesCompleted { count: 1 }),
    b("twenty_exercises", "Code Warrior", BadgeRule::CodeExercisesCompleted { count: 20 }),
    b("week_streak", "One Week Strong", BadgeRule::StreakDays { days: 7 }),
    b("month_streak", "Thirty Day Flame", BadgeRule::StreakDays { days: 30 }),
    b("points_1k", "Point Collector", BadgeRule::TotalPoints { amount: 1000 }),
    b("level_5", "Level Five", BadgeRule::LevelReached { level: 5 }),
    b("level_10", "Level Ten", BadgeRule::LevelReached { level: 10 }),
  ]
}

/// Full catalog: built-ins plus config extras (extras cannot shadow a
/// built-in id; first definition wins).
pub fn build_catalog(extra: &[BadgeCfg]) -> Vec<Badge> {
  let mut catalog = builtin_badges();
  for cfg in extra {
    if catalog.iter().any(|b| b.id == cfg.id) {
      continue;
    }
    catalog.push(Badge { id: cfg.id.clone(), title: cfg.title.clone(), rule: cfg.rule.clone() });
  }
  catalog
}

/// Evaluate the catalog against `record`, unlocking anything newly
/// satisfied. Returns the ids unlocked by this call; re-evaluating an
/// unchanged record returns nothing (membership in `badges` is idempotent).
pub fn evaluate(catalog: &[Badge], record: &mut ProgressRecord) -> Vec<String> {
  let mut unlocked = Vec::new();
  for badge in catalog {
    if record.badges.contains(&badge.id) {
      continue;
    }
    if badge.rule.satisfied(record) {
      record.badges.insert(badge.id.clone());
      unlocked.push(badge.id.clone());
    }
  }
  unlocked
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_ids_are_unique() {
    let catalog = builtin_badges();
    let mut ids: Vec<_> = catalog.iter().map(|b| b.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), catalog.len());
  }

  #[test]
  fn evaluate_unlocks_each_badge_once() {
    let catalog = builtin_badges();
    let mut r = ProgressRecord::new("u1");
    r.lessons_completed = 1;
    let first = evaluate(&catalog, &mut r);
    assert_eq!(first, vec!["first_lesson".to_string()]);
    // Unchanged record: nothing is reported as newly unlocked again.
    let second = evaluate(&catalog, &mut r);
    assert!(second.is_empty());
    assert!(r.badges.contains("first_lesson"));
  }

  #[test]
  fn streak_badge_counts_longest_streak() {
    let catalog = builtin_badges();
    let mut r = ProgressRecord::new("u1");
    r.streak = 1;
    r.longest_streak = 30;
    let unlocked = evaluate(&catalog, &mut r);
    assert!(unlocked.contains(&"week_streak".to_string()));
    assert!(unlocked.contains(&"month_streak".to_string()));
  }

  #[test]
  fn config_extras_merge_without_shadowing() {
    let extra = vec![
      BadgeCfg {
        id: "first_lesson".into(), // shadow attempt, ignored
        title: "Impostor".into(),
        rule: BadgeRule::TotalPoints { amount: 1 },
      },
      BadgeCfg {
        id: "points_5k".into(),
        title: "Hoarder".into(),
        rule: BadgeRule::TotalPoints { amount: 5000 },
      },
    ];
    let catalog = build_catalog(&extra);
    let first = catalog.iter().find(|b| b.id == "first_lesson").unwrap();
    assert_eq!(first.title, "First Steps");
    assert!(catalog.iter().any(|b| b.id == "points_5k"));
  }
}
