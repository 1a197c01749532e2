//! Tracing setup.
//!
//! LOG_LEVEL takes a tracing filter, either a bare level ("debug") or full
//! directives such as "info,progress=debug,aula_backend=debug,tower_http=info".
//! LOG_FORMAT switches between the default pretty output and "json".
//!
//! Targets, file and line are included in the output so engine events
//! (`progress`), service events (`aula_backend`) and tower-http's
//! per-request spans stay distinguishable.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,progress=debug,aula_backend=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The json/pretty builders are different types, so init in each arm
    // instead of storing one.
    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
