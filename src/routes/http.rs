//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! progress engine. Each handler is instrumented and logs parameters and
//! basic result info; engine errors map to HTTP statuses via `ProgressError`.

use std::sync::Arc;
use axum::{extract::{State, Query}, Json};
use tracing::{info, instrument};

use crate::domain::CompletionEvent;
use crate::error::ProgressError;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> Json<HealthOut> { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state), fields(%q.user_id))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProgressQuery>,
) -> Result<Json<ProgressOut>, ProgressError> {
  let record = state.engine.progress(&q.user_id).await?;
  Ok(Json(to_progress_out(&record)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, points = body.points))]
pub async fn http_post_points(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AwardPointsIn>,
) -> Result<Json<DeltaOut>, ProgressError> {
  let delta = state.engine.award_points(&body.user_id, body.points, &body.reason).await?;
  info!(target: "progress", user_id = %body.user_id, points = body.points, leveled_up = delta.leveled_up, "HTTP points awarded");
  Ok(Json(to_delta_out(&delta)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.lesson_id))]
pub async fn http_post_lesson(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LessonIn>,
) -> Result<Json<DeltaOut>, ProgressError> {
  let delta = state
    .engine
    .apply(CompletionEvent::LessonCompleted {
      user_id: body.user_id.clone(),
      course_id: body.course_id,
      lesson_id: body.lesson_id.clone(),
    })
    .await?;
  info!(target: "progress", user_id = %body.user_id, lesson_id = %body.lesson_id, already = delta.already_recorded, "HTTP lesson completion");
  Ok(Json(to_delta_out(&delta)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.course_id))]
pub async fn http_post_course(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CourseIn>,
) -> Result<Json<DeltaOut>, ProgressError> {
  let delta = state
    .engine
    .apply(CompletionEvent::CourseCompleted {
      user_id: body.user_id.clone(),
      course_id: body.course_id.clone(),
    })
    .await?;
  info!(target: "progress", user_id = %body.user_id, course_id = %body.course_id, already = delta.already_recorded, "HTTP course completion");
  Ok(Json(to_delta_out(&delta)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.quiz_id, score = body.score, passed = body.passed))]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizIn>,
) -> Result<Json<DeltaOut>, ProgressError> {
  let delta = state
    .engine
    .apply(CompletionEvent::QuizCompleted {
      user_id: body.user_id,
      quiz_id: body.quiz_id,
      score: body.score,
      passed: body.passed,
    })
    .await?;
  Ok(Json(to_delta_out(&delta)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.exercise_id, score = body.score))]
pub async fn http_post_exercise(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExerciseIn>,
) -> Result<Json<DeltaOut>, ProgressError> {
  let delta = state
    .engine
    .apply(CompletionEvent::CodeExerciseCompleted {
      user_id: body.user_id,
      exercise_id: body.exercise_id,
      score: body.score,
    })
    .await?;
  Ok(Json(to_delta_out(&delta)))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id))]
pub async fn http_post_streak(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CheckInIn>,
) -> Result<Json<DeltaOut>, ProgressError> {
  let delta = state.engine.update_streak(&body.user_id).await?;
  info!(target: "progress", user_id = %body.user_id, streak = delta.streak, "HTTP check-in");
  Ok(Json(to_delta_out(&delta)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_badges(
  State(state): State<Arc<AppState>>,
) -> Json<Vec<crate::badges::Badge>> {
  Json(state.engine.catalog().to_vec())
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, disabled = body.disabled))]
pub async fn http_post_disable(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DisableIn>,
) -> Result<Json<OkOut>, ProgressError> {
  state.engine.set_disabled(&body.user_id, body.disabled).await?;
  Ok(Json(OkOut { ok: true }))
}
