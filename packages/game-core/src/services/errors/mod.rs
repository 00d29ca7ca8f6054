pub mod chess_service_errors;
pub mod game_session_service_errors;
pub mod settlement_service_errors;
