use async_trait::async_trait;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_dynamo::{from_item, to_item};

use crate::config::TableNames;
use crate::models::room::Room;
use crate::repositories::errors::room_repository_errors::RoomRepositoryError;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn create_room(&self, room: &Room) -> Result<(), RoomRepositoryError>;
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RoomRepositoryError>;
    /// Conditional on the stored version, like session updates.
    async fn update_room(&self, room: &Room, expected_version: u64) -> Result<(), RoomRepositoryError>;
}

pub struct DynamoDbRoomRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbRoomRepository {
    pub fn new(client: Client, tables: &TableNames) -> Self {
        Self {
            client,
            table_name: tables.rooms.clone(),
        }
    }
}

#[async_trait]
impl RoomRepository for DynamoDbRoomRepository {
    async fn create_room(&self, room: &Room) -> Result<(), RoomRepositoryError> {
        let item = to_item(room).map_err(|e| RoomRepositoryError::Serialization(e.to_string()))?;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => {
                    Err(RoomRepositoryError::AlreadyExists)
                }
                _ => Err(RoomRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RoomRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(room_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| RoomRepositoryError::DynamoDb(e.to_string()))?;
        match output.item {
            Some(item) => {
                let room: Room =
                    from_item(item).map_err(|e| RoomRepositoryError::Serialization(e.to_string()))?;
                Ok(Some(room))
            }
            None => Ok(None),
        }
    }

    async fn update_room(&self, room: &Room, expected_version: u64) -> Result<(), RoomRepositoryError> {
        let item = to_item(room).map_err(|e| RoomRepositoryError::Serialization(e.to_string()))?;
        let condition = if expected_version == 0 {
            "attribute_not_exists(#version) OR #version = :expected"
        } else {
            "#version = :expected"
        };
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression(condition)
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => {
                    Err(RoomRepositoryError::Conflict)
                }
                _ => Err(RoomRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }
}
