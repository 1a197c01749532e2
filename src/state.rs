//! Application state: the progress engine wired from config, the in-memory
//! store, and the optional certificate service client.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::certificates::CertificateIssuer;
use crate::config::{load_gamify_config_from_env, GamifyConfig};
use crate::engine::ProgressEngine;
use crate::store::MemoryStore;

pub struct AppState {
    pub engine: ProgressEngine,
}

impl AppState {
    /// Build state from env: load config, build the badge catalog, init the
    /// certificate client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        // Load TOML config if provided (point values, thresholds, badges).
        let config = load_gamify_config_from_env().unwrap_or_else(GamifyConfig::default);

        let store = Arc::new(MemoryStore::new());
        let issuer = CertificateIssuer::from_env();
        let engine = ProgressEngine::new(store, config.clone(), issuer);

        info!(
            target: "aula_backend",
            lesson_points = config.points.lesson,
            course_points = config.points.course,
            levels = config.levels.thresholds.len(),
            badges = engine.catalog().len(),
            "Progress engine ready"
        );

        Self { engine }
    }
}
