use std::sync::Arc;

use game_core::services::game_session_service::GameSessionService;

#[derive(Clone)]
pub struct AppState {
    pub game_session_service: Arc<GameSessionService>,
}
