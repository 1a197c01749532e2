//! Error taxonomy for progress operations, with the HTTP mapping used by
//! the route handlers. `AlreadyRecorded` is informational: the engine
//! reports duplicate completions inside the success delta, but collaborators
//! that need it as a signal can still match on the variant.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressError {
  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("Not found: {entity} '{id}'")]
  NotFound { entity: &'static str, id: String },

  #[error("Already recorded: {0}")]
  AlreadyRecorded(String),

  #[error("Persistence conflict for user '{0}', retry the event")]
  PersistenceConflict(String),

  #[error("Upstream failure: {0}")]
  Upstream(String),
}

impl ProgressError {
  pub fn not_found(entity: &'static str, id: &str) -> Self {
    ProgressError::NotFound { entity, id: id.to_string() }
  }
}

impl IntoResponse for ProgressError {
  fn into_response(self) -> Response {
    let status = match &self {
      ProgressError::InvalidInput(_) => StatusCode::BAD_REQUEST,
      ProgressError::NotFound { .. } => StatusCode::NOT_FOUND,
      ProgressError::AlreadyRecorded(_) => StatusCode::CONFLICT,
      ProgressError::PersistenceConflict(_) => StatusCode::CONFLICT,
      ProgressError::Upstream(_) => StatusCode::BAD_GATEWAY,
    };
    let body = Json(serde_json::json!({ "error": self.to_string() }));
    (status, body).into_response()
  }
}
