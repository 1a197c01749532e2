//! Loading gamification tuning (point values, level thresholds, extra
//! badges) from TOML.
//!
//! See `GamifyConfig` for the expected schema. Every value has a coded
//! default; the TOML file only overrides what it names.

use serde::Deserialize;
use tracing::{error, info};

use crate::badges::BadgeCfg;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GamifyConfig {
  #[serde(default)]
  pub points: PointValues,
  #[serde(default)]
  pub levels: LevelTable,
  #[serde(default)]
  pub badges: Vec<BadgeCfg>,
}

/// Fixed point values per event kind. Product tuning, pinned here.
/// Quiz and exercise points scale linearly with the 0-100 score:
/// quiz = score / quiz_score_divisor, exercise = score / exercise_score_divisor
/// (integer floor in both cases).
#[derive(Clone, Debug, Deserialize)]
pub struct PointValues {
  #[serde(default = "default_lesson_points")]
  pub lesson: u64,
  #[serde(default = "default_course_points")]
  pub course: u64,
  #[serde(default = "default_quiz_divisor")]
  pub quiz_score_divisor: u32,
  #[serde(default = "default_exercise_divisor")]
  pub exercise_score_divisor: u32,
}

fn default_lesson_points() -> u64 { 50 }
fn default_course_points() -> u64 { 500 }
fn default_quiz_divisor() -> u32 { 10 }
fn default_exercise_divisor() -> u32 { 5 }

impl Default for PointValues {
  fn default() -> Self {
    Self {
      lesson: default_lesson_points(),
      course: default_course_points(),
      quiz_score_divisor: default_quiz_divisor(),
      exercise_score_divisor: default_exercise_divisor(),
    }
  }
}

impl PointValues {
  /// The divisors are used as divisors directly; a 0 would make every
  /// passed-quiz/exercise completion panic.
  pub fn is_valid(&self) -> bool {
    self.quiz_score_divisor > 0 && self.exercise_score_divisor > 0
  }
}

/// Ascending XP thresholds; index i (0-based) holds the XP floor of level
/// i+1. `thresholds[0]` must be 0 so every user is at least level 1.
#[derive(Clone, Debug, Deserialize)]
pub struct LevelTable {
  #[serde(default = "default_thresholds")]
  pub thresholds: Vec<u64>,
}

fn default_thresholds() -> Vec<u64> {
  vec![0, 100, 250, 500, 1000, 2000, 3500, 5500, 8000, 11000, 15000, 20000]
}

impl Default for LevelTable {
  fn default() -> Self {
    Self { thresholds: default_thresholds() }
  }
}

impl LevelTable {
  /// A usable table is non-empty, starts at 0, and is strictly ascending.
  pub fn is_valid(&self) -> bool {
    match self.thresholds.first() {
      Some(0) => self.thresholds.windows(2).all(|w| w[0] < w[1]),
      _ => false,
    }
  }
}

/// Attempt to load `GamifyConfig` from GAMIFY_CONFIG_PATH. On any parsing/IO
/// error, or an unusable level table, returns None and the caller keeps the
/// coded defaults.
pub fn load_gamify_config_from_env() -> Option<GamifyConfig> {
  let path = std::env::var("GAMIFY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GamifyConfig>(&s) {
      Ok(cfg) => {
        if !cfg.levels.is_valid() {
          error!(target: "aula_backend", %path, "Level threshold override is not ascending from 0; keeping defaults");
          return None;
        }
        if !cfg.points.is_valid() {
          error!(target: "aula_backend", %path, "Score divisor of 0 in point values; keeping defaults");
          return None;
        }
        info!(target: "aula_backend", %path, extra_badges = cfg.badges.len(), "Loaded gamification config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "aula_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "aula_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
