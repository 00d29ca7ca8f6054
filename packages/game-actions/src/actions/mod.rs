use game_core::models::game_session::GameSession;
use game_core::models::move_request::MoveRequest;
use game_core::services::errors::game_session_service_errors::GameSessionServiceError;
use game_core::services::game_session_service::GameSessionService;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::request::{Action, ActionResponse};
use crate::state::AppState;

pub async fn dispatch(state: &AppState, player_id: &str, action: Action) -> ActionResponse {
    debug!("Player {} requested {:?}", player_id, action);
    let service = state.game_session_service.as_ref();

    let result = match action {
        Action::MakeMove {
            session_id,
            from,
            to,
            promotion,
        } => {
            let request = match promotion {
                Some(piece) => MoveRequest::with_promotion(&session_id, &from, &to, &piece),
                None => MoveRequest::new(&session_id, &from, &to),
            };
            session_body(service, service.make_move(player_id, &request).await)
        }
        Action::Resign { session_id } => {
            session_body(service, service.resign(&session_id, player_id).await)
        }
        Action::ClaimTimeout { session_id, color } => {
            session_body(service, service.expire_clock(&session_id, color).await)
        }
        Action::PersistClock { session_id } => {
            session_body(service, service.persist_clock_tick(&session_id).await)
        }
        Action::OfferDraw { session_id } => {
            session_body(service, service.offer_draw(&session_id, player_id).await)
        }
        Action::AcceptDraw { session_id } => {
            session_body(service, service.accept_draw(&session_id, player_id).await)
        }
        Action::DeclineDraw { session_id } => {
            session_body(service, service.decline_draw(&session_id, player_id).await)
        }
        Action::StartSession { room_id } => {
            session_body(service, service.start_session(&room_id, player_id).await)
        }
        Action::GetState { session_id } => get_state(service, &session_id).await,
        Action::LegalMoves { session_id, from } => {
            let moves = match from {
                Some(square) => service.legal_destinations(&session_id, &square).await,
                None => service.legal_moves(&session_id).await,
            };
            moves.map(|moves| json!({ "moves": moves }))
        }
    };

    match result {
        Ok(body) => ActionResponse::new(200, body),
        Err(e) => error_response(&e),
    }
}

fn session_body(
    service: &GameSessionService,
    result: Result<GameSession, GameSessionServiceError>,
) -> Result<Value, GameSessionServiceError> {
    let session = result?;
    let clock = service.clock_view(&session);
    Ok(json!({ "session": session, "clock": clock }))
}

async fn get_state(service: &GameSessionService, session_id: &str) -> Result<Value, GameSessionServiceError> {
    let session = service.get_session(session_id).await?;
    let moves = service.list_moves(session_id).await?;
    let summary = service.board_summary(&session)?;
    let clock = service.clock_view(&session);
    Ok(json!({
        "session": session,
        "clock": clock,
        "moves": moves,
        "board": summary,
    }))
}

pub fn error_response(error: &GameSessionServiceError) -> ActionResponse {
    if error.status() >= 500 {
        warn!("Action failed: {}", error);
    }
    ActionResponse::new(
        error.status(),
        json!({
            "error": error.code(),
            "message": error.to_string(),
            "retryable": error.is_retryable(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use game_core::clock::ManualTimeSource;
    use game_core::config::EngineConfig;
    use game_core::repositories::game_repository::GameSessionRepository;
    use game_core::repositories::memory::{MemoryGameSessionRepository, MemoryRoomRepository};
    use std::sync::Arc;

    async fn state_with_session() -> (AppState, String) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let sessions = Arc::new(MemoryGameSessionRepository::new());
        let session = GameSession::new("room-1", "alice", "bob", 10, 300, start);
        sessions.create_game_session(&session).await.unwrap();

        let service = GameSessionService::new(
            sessions,
            Arc::new(MemoryRoomRepository::new()),
            Arc::new(ManualTimeSource::new(start)),
            EngineConfig::default(),
        );
        let state = AppState {
            game_session_service: Arc::new(service),
        };
        (state, session.id)
    }

    fn body(response: &ActionResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_make_move_returns_session_and_clock() {
        let (state, session_id) = state_with_session().await;

        let response = dispatch(
            &state,
            "alice",
            Action::MakeMove {
                session_id,
                from: "e2".to_string(),
                to: "e4".to_string(),
                promotion: None,
            },
        )
        .await;

        assert_eq!(response.status_code, 200);
        let body = body(&response);
        assert_eq!(body["session"]["current_player"], "black");
        assert_eq!(body["session"]["move_count"], 1);
        assert_eq!(body["clock"]["running"], "black");
    }

    #[tokio::test]
    async fn test_rejection_maps_to_error_body() {
        let (state, session_id) = state_with_session().await;

        let response = dispatch(&state, "bob", Action::Resign { session_id: session_id.clone() }).await;
        assert_eq!(response.status_code, 200);

        let response = dispatch(
            &state,
            "alice",
            Action::MakeMove {
                session_id,
                from: "e2".to_string(),
                to: "e4".to_string(),
                promotion: None,
            },
        )
        .await;

        assert_eq!(response.status_code, 409);
        let body = body(&response);
        assert_eq!(body["error"], "not_active");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn test_get_state_and_legal_moves() {
        let (state, session_id) = state_with_session().await;

        let response = dispatch(
            &state,
            "alice",
            Action::LegalMoves {
                session_id: session_id.clone(),
                from: Some("b1".to_string()),
            },
        )
        .await;
        assert_eq!(body(&response)["moves"], json!(["a3", "c3"]));

        let response = dispatch(&state, "bob", Action::GetState { session_id }).await;
        let body = body(&response);
        assert_eq!(body["session"]["state"], "active");
        assert_eq!(body["board"]["material_advantage"], 0);
        assert_eq!(body["clock"]["white_display"], "05:00");
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (state, _) = state_with_session().await;

        let response = dispatch(
            &state,
            "alice",
            Action::GetState {
                session_id: "nope".to_string(),
            },
        )
        .await;

        assert_eq!(response.status_code, 404);
        assert_eq!(body(&response)["error"], "not_found");
    }
}
