pub mod game_repository_errors;
pub mod ledger_repository_errors;
pub mod room_repository_errors;
