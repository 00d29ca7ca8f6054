use async_trait::async_trait;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client;
use chrono::Utc;
use serde_dynamo::{from_item, to_item};
use tracing::{debug, warn};

use crate::config::TableNames;
use crate::models::game_move::GameMove;
use crate::models::game_session::GameSession;
use crate::repositories::errors::game_repository_errors::GameSessionRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Storage for sessions and their move logs. Every write that changes a
/// session is conditional on the version the writer read, which gives each
/// session a single logical writer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GameSessionRepository: Send + Sync {
    /// Fails with `AlreadyExists` if a session with the same id is stored.
    async fn create_game_session(
        &self,
        game_session: &GameSession,
    ) -> Result<(), GameSessionRepositoryError>;

    async fn get_game_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, GameSessionRepositoryError>;

    /// Replaces the record if the stored version still equals
    /// `expected_version`, otherwise fails with `Conflict`.
    async fn update_game_session(
        &self,
        game_session: &GameSession,
        expected_version: u64,
    ) -> Result<(), GameSessionRepositoryError>;

    /// Appends `game_move` and replaces the session in one all-or-nothing
    /// write, under the same version condition as `update_game_session`.
    async fn commit_move(
        &self,
        game_session: &GameSession,
        expected_version: u64,
        game_move: &GameMove,
    ) -> Result<(), GameSessionRepositoryError>;

    /// Moves in sequence order.
    async fn list_moves(&self, session_id: &str) -> Result<Vec<GameMove>, GameSessionRepositoryError>;

    /// Sets the settlement marker. Returns false if it was already set.
    async fn mark_settled(&self, session_id: &str) -> Result<bool, GameSessionRepositoryError>;
}

pub struct DynamoDbGameSessionRepository {
    pub client: Client,
    pub sessions_table: String,
    pub moves_table: String,
}

impl DynamoDbGameSessionRepository {
    pub fn new(client: Client, tables: &TableNames) -> Self {
        Self {
            client,
            sessions_table: tables.sessions.clone(),
            moves_table: tables.moves.clone(),
        }
    }

    fn version_condition(expected_version: u64) -> &'static str {
        // Records written before versioning have no attribute at all.
        if expected_version == 0 {
            "attribute_not_exists(#version) OR #version = :expected"
        } else {
            "#version = :expected"
        }
    }

    fn session_put(
        &self,
        game_session: &GameSession,
        expected_version: u64,
    ) -> Result<Put, GameSessionRepositoryError> {
        let item = to_item(game_session)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;

        Put::builder()
            .table_name(&self.sessions_table)
            .set_item(Some(item))
            .condition_expression(Self::version_condition(expected_version))
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .build()
            .map_err(|e| GameSessionRepositoryError::DynamoDb(format!("Failed to build put: {:?}", e)))
    }

    fn move_put(&self, game_move: &GameMove) -> Result<Put, GameSessionRepositoryError> {
        let item = to_item(game_move)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;

        Put::builder()
            .table_name(&self.moves_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(move_number)")
            .build()
            .map_err(|e| GameSessionRepositoryError::DynamoDb(format!("Failed to build put: {:?}", e)))
    }
}

#[async_trait]
impl GameSessionRepository for DynamoDbGameSessionRepository {
    async fn create_game_session(
        &self,
        game_session: &GameSession,
    ) -> Result<(), GameSessionRepositoryError> {
        let item = to_item(game_session)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.sessions_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => {
                    Err(GameSessionRepositoryError::AlreadyExists)
                }
                _ => Err(GameSessionRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }

    async fn get_game_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, GameSessionRepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.sessions_table)
            .key("id", AttributeValue::S(session_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| GameSessionRepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = result.item {
            let game_session: GameSession = from_item(item)
                .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;
            Ok(Some(game_session))
        } else {
            Ok(None)
        }
    }

    async fn update_game_session(
        &self,
        game_session: &GameSession,
        expected_version: u64,
    ) -> Result<(), GameSessionRepositoryError> {
        let item = to_item(game_session)
            .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.sessions_table)
            .set_item(Some(item))
            .condition_expression(Self::version_condition(expected_version))
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => {
                    debug!(
                        "Version check failed for session {} (expected {})",
                        game_session.id, expected_version
                    );
                    Err(GameSessionRepositoryError::Conflict)
                }
                _ => Err(GameSessionRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }

    async fn commit_move(
        &self,
        game_session: &GameSession,
        expected_version: u64,
        game_move: &GameMove,
    ) -> Result<(), GameSessionRepositoryError> {
        let transact_items = vec![
            TransactWriteItem::builder().put(self.move_put(game_move)?).build(),
            TransactWriteItem::builder()
                .put(self.session_put(game_session, expected_version)?)
                .build(),
        ];

        match self
            .client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(TransactWriteItemsError::TransactionCanceledException(_)) =
                    e.as_service_error()
                {
                    warn!(
                        "Move {} on session {} cancelled by a concurrent write",
                        game_move.move_number, game_session.id
                    );
                    return Err(GameSessionRepositoryError::Conflict);
                }
                Err(GameSessionRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn list_moves(&self, session_id: &str) -> Result<Vec<GameMove>, GameSessionRepositoryError> {
        let mut moves = Vec::new();
        let mut start_key = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.moves_table)
                .key_condition_expression("game_id = :gid")
                .expression_attribute_values(":gid", AttributeValue::S(session_id.to_string()))
                .scan_index_forward(true)
                .consistent_read(true)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| GameSessionRepositoryError::DynamoDb(e.to_string()))?;

            for item in output.items.unwrap_or_default() {
                let game_move: GameMove = from_item(item)
                    .map_err(|e| GameSessionRepositoryError::Serialization(e.to_string()))?;
                moves.push(game_move);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(moves)
    }

    async fn mark_settled(&self, session_id: &str) -> Result<bool, GameSessionRepositoryError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.sessions_table)
            .key("id", AttributeValue::S(session_id.to_string()))
            .update_expression(
                "SET settled = :true, updated_at = :now ADD #version :one",
            )
            .condition_expression(
                "attribute_exists(id) AND (attribute_not_exists(settled) OR settled = :false)",
            )
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":true", AttributeValue::Bool(true))
            .expression_attribute_values(":false", AttributeValue::Bool(false))
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => match e.as_service_error() {
                Some(UpdateItemError::ConditionalCheckFailedException(_)) => Ok(false),
                _ => Err(GameSessionRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }
}
