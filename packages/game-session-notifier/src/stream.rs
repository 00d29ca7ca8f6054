use aws_lambda_events::event::dynamodb::EventRecord;
use game_core::models::game_session::GameSession;
use game_core::services::settlement_trigger::SettlementTrigger;
use serde_dynamo::{from_item, Item};
use tracing::{debug, error, info};

#[derive(Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Ignored,
    Observed,
    Settled,
    /// Settlement failed in a way a redelivery can fix.
    Retry,
}

/// Snapshot carried by a stream record, if it carries one.
pub fn decode_session(event_name: &str, new_image: Item) -> Result<Option<GameSession>, serde_dynamo::Error> {
    match event_name {
        "INSERT" | "MODIFY" => from_item(new_image).map(Some),
        _ => Ok(None),
    }
}

pub async fn process_record(trigger: &SettlementTrigger, record: EventRecord) -> RecordOutcome {
    let session = match decode_session(&record.event_name, record.change.new_image) {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!("Ignoring {} event", record.event_name);
            return RecordOutcome::Ignored;
        }
        Err(e) => {
            // A record that cannot be decoded will not decode on retry either.
            error!("Failed to decode session image: {}", e);
            return RecordOutcome::Ignored;
        }
    };

    match trigger.on_session_change(&session).await {
        Ok(Some(outcome)) => {
            info!("Session {} settlement: {:?}", session.id, outcome);
            RecordOutcome::Settled
        }
        Ok(None) => RecordOutcome::Observed,
        Err(e) if e.is_retryable() => {
            error!("Settlement of session {} failed, will retry: {}", session.id, e);
            RecordOutcome::Retry
        }
        Err(e) => {
            error!("Settlement of session {} failed: {}", session.id, e);
            RecordOutcome::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use game_core::models::game_session::{EndReason, GameOutcome, GameStatus};
    use serde_dynamo::{to_item, AttributeValue};
    use std::collections::HashMap;

    fn image(session: &GameSession) -> Item {
        to_item(session).unwrap()
    }

    #[test]
    fn test_decodes_inserts_and_modifies_only() {
        let mut session = GameSession::new("room-1", "w", "b", 10, 600, Utc::now());
        session.finish(GameStatus::Completed, Some(GameOutcome::Draw), EndReason::Agreement, Utc::now());
        session.version = 3;

        let decoded = decode_session("MODIFY", image(&session)).unwrap().unwrap();
        assert_eq!(decoded, session);
        assert!(decode_session("INSERT", image(&session)).unwrap().is_some());
        assert!(decode_session("REMOVE", image(&session)).unwrap().is_none());
    }

    #[test]
    fn test_malformed_image_is_an_error() {
        let empty: HashMap<String, AttributeValue> = HashMap::new();
        assert!(decode_session("MODIFY", Item::from(empty)).is_err());
    }
}
