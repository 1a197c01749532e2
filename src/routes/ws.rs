//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the progress engine. We reply with a single JSON message per
//! request; engine errors are surfaced as `Error {message}` replies.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::domain::CompletionEvent;
use crate::protocol::{to_delta_out, to_progress_out, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "aula_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "aula_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target = "aula_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "aula_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "aula_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::GetProgress { user_id } => {
      match state.engine.progress(&user_id).await {
        Ok(record) => ServerWsMessage::Progress { progress: to_progress_out(&record) },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::AwardPoints { user_id, points, reason } => {
      match state.engine.award_points(&user_id, points, &reason).await {
        Ok(delta) => {
          tracing::info!(target: "progress", %user_id, points, leveled_up = delta.leveled_up, "WS points awarded");
          ServerWsMessage::Awarded { delta: to_delta_out(&delta) }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::CompleteLesson { user_id, course_id, lesson_id } => {
      let event = CompletionEvent::LessonCompleted { user_id: user_id.clone(), course_id, lesson_id };
      match state.engine.apply(event).await {
        Ok(delta) => {
          tracing::info!(target: "progress", %user_id, already = delta.already_recorded, "WS lesson completion");
          ServerWsMessage::Completion { delta: to_delta_out(&delta) }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::CompleteCourse { user_id, course_id } => {
      let event = CompletionEvent::CourseCompleted { user_id: user_id.clone(), course_id };
      match state.engine.apply(event).await {
        Ok(delta) => {
          tracing::info!(target: "progress", %user_id, already = delta.already_recorded, "WS course completion");
          ServerWsMessage::Completion { delta: to_delta_out(&delta) }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::CompleteQuiz { user_id, quiz_id, score, passed } => {
      let event = CompletionEvent::QuizCompleted { user_id, quiz_id, score, passed };
      match state.engine.apply(event).await {
        Ok(delta) => ServerWsMessage::Completion { delta: to_delta_out(&delta) },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::CompleteExercise { user_id, exercise_id, score } => {
      let event = CompletionEvent::CodeExerciseCompleted { user_id, exercise_id, score };
      match state.engine.apply(event).await {
        Ok(delta) => ServerWsMessage::Completion { delta: to_delta_out(&delta) },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::CheckIn { user_id } => {
      match state.engine.update_streak(&user_id).await {
        Ok(delta) => {
          tracing::info!(target: "progress", %user_id, streak = delta.streak, "WS check-in");
          ServerWsMessage::Streak { delta: to_delta_out(&delta) }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::GetBadges =>
      ServerWsMessage::Badges { badges: state.engine.catalog().to_vec() },
  }
}
