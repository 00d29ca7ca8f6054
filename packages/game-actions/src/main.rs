use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod actions;
pub mod request;
pub mod state;

use game_core::clock::SystemTimeSource;
use game_core::config::{EngineConfig, TableNames};
use game_core::repositories::game_repository::DynamoDbGameSessionRepository;
use game_core::repositories::room_repository::DynamoDbRoomRepository;
use game_core::services::game_session_service::GameSessionService;

use request::{Action, ActionEvent, ActionResponse};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    info!("Game actions Lambda function starting");

    let tables = TableNames::from_env()?;
    let engine_config = EngineConfig::from_env()?;

    let config = aws_config::load_from_env().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);

    let game_session_service = GameSessionService::new(
        Arc::new(DynamoDbGameSessionRepository::new(dynamodb_client.clone(), &tables)),
        Arc::new(DynamoDbRoomRepository::new(dynamodb_client, &tables)),
        Arc::new(SystemTimeSource),
        engine_config,
    );

    let app_state = state::AppState {
        game_session_service: Arc::new(game_session_service),
    };

    run(service_fn(|event: LambdaEvent<ActionEvent>| {
        action_handler(event, app_state.clone())
    }))
    .await
}

async fn action_handler(
    event: LambdaEvent<ActionEvent>,
    state: state::AppState,
) -> Result<ActionResponse, Error> {
    let action_event = event.payload;

    let Some(player_id) = action_event.player_id().map(str::to_string) else {
        error!("Request without an authorized principal");
        return Ok(ActionResponse::new(
            401,
            json!({"error": "unauthorized", "message": "Missing player identity"}),
        ));
    };

    let Some(body) = action_event.body.as_deref() else {
        return Ok(ActionResponse::new(
            400,
            json!({"error": "bad_request", "message": "No message body"}),
        ));
    };

    let action: Action = match serde_json::from_str(body) {
        Ok(action) => action,
        Err(e) => {
            debug!("Failed to parse action from {}: {}", player_id, e);
            return Ok(ActionResponse::new(
                400,
                json!({"error": "bad_request", "message": format!("Invalid action: {}", e)}),
            ));
        }
    };

    Ok(actions::dispatch(&state, &player_id, action).await)
}
