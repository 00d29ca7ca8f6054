use std::sync::Arc;

use aws_lambda_events::event::dynamodb::Event;
use aws_lambda_events::event::streams::{DynamoDbBatchItemFailure, DynamoDbEventResponse};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::{info, warn};

use game_core::config::{EngineConfig, TableNames};
use game_core::repositories::game_repository::DynamoDbGameSessionRepository;
use game_core::repositories::ledger_repository::DynamoDbLedgerRepository;
use game_core::services::settlement_service::SettlementService;
use game_core::services::settlement_trigger::SettlementTrigger;

mod stream;

use stream::{process_record, RecordOutcome};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    info!("Game session notifier Lambda function starting");

    let tables = TableNames::from_env()?;
    let engine_config = EngineConfig::from_env()?;

    let config = aws_config::load_from_env().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);

    let settlement = SettlementService::new(
        Arc::new(DynamoDbGameSessionRepository::new(dynamodb_client.clone(), &tables)),
        Arc::new(DynamoDbLedgerRepository::new(dynamodb_client, &tables)),
        engine_config.platform_fee_bps,
    );
    let trigger = SettlementTrigger::new(settlement);

    run(service_fn(|event: LambdaEvent<Event>| {
        let trigger = trigger.clone();
        async move {
            let (event, _context) = event.into_parts();
            info!("Processing {} records", event.records.len());

            let mut response = DynamoDbEventResponse {
                batch_item_failures: vec![],
            };
            for record in event.records {
                let sequence_number = record.change.sequence_number.clone();
                if process_record(&trigger, record).await == RecordOutcome::Retry {
                    warn!("Reporting record {:?} for redelivery", sequence_number);
                    response.batch_item_failures.push(DynamoDbBatchItemFailure {
                        item_identifier: sequence_number,
                    });
                }
            }

            Ok::<DynamoDbEventResponse, Error>(response)
        }
    }))
    .await
}
