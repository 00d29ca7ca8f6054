use async_trait::async_trait;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client;
use chrono::Utc;
use serde_dynamo::{from_item, to_item};
use tracing::{debug, warn};

use crate::config::TableNames;
use crate::models::account::PlayerAccount;
use crate::models::settlement::{LedgerEntry, PlatformFee, SettlementReceipt};
use crate::repositories::errors::ledger_repository_errors::LedgerRepositoryError;

#[cfg(test)]
use mockall::automock;

const MAX_ACCOUNT_WRITE_ATTEMPTS: u32 = 5;

/// Balances, ratings and platform fees. Every write is keyed by session id
/// so that replaying a settlement never applies an effect twice.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn create_account(&self, account: &PlayerAccount) -> Result<(), LedgerRepositoryError>;

    async fn get_account(&self, player_id: &str) -> Result<Option<PlayerAccount>, LedgerRepositoryError>;

    /// Applies the entry unless a receipt for this player and session
    /// exists. Returns whether anything was written.
    async fn apply_entry(
        &self,
        session_id: &str,
        entry: &LedgerEntry,
    ) -> Result<bool, LedgerRepositoryError>;

    /// Records the fee once per session. Returns whether anything was written.
    async fn record_platform_fee(&self, fee: &PlatformFee) -> Result<bool, LedgerRepositoryError>;

    async fn get_platform_fee(&self, session_id: &str) -> Result<Option<PlatformFee>, LedgerRepositoryError>;
}

pub struct DynamoDbLedgerRepository {
    pub client: Client,
    pub accounts_table: String,
    pub settlements_table: String,
    pub fees_table: String,
}

impl DynamoDbLedgerRepository {
    pub fn new(client: Client, tables: &TableNames) -> Self {
        Self {
            client,
            accounts_table: tables.accounts.clone(),
            settlements_table: tables.settlements.clone(),
            fees_table: tables.fees.clone(),
        }
    }

    fn account_put(&self, account: &PlayerAccount, expected_version: u64) -> Result<Put, LedgerRepositoryError> {
        let item = to_item(account).map_err(|e| LedgerRepositoryError::Serialization(e.to_string()))?;
        let condition = if expected_version == 0 {
            "attribute_exists(id) AND (attribute_not_exists(#version) OR #version = :expected)"
        } else {
            "#version = :expected"
        };

        Put::builder()
            .table_name(&self.accounts_table)
            .set_item(Some(item))
            .condition_expression(condition)
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .build()
            .map_err(|e| LedgerRepositoryError::DynamoDb(format!("Failed to build put: {:?}", e)))
    }

    fn receipt_put(&self, receipt: &SettlementReceipt) -> Result<Put, LedgerRepositoryError> {
        let item = to_item(receipt).map_err(|e| LedgerRepositoryError::Serialization(e.to_string()))?;

        Put::builder()
            .table_name(&self.settlements_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(session_id)")
            .build()
            .map_err(|e| LedgerRepositoryError::DynamoDb(format!("Failed to build put: {:?}", e)))
    }

    async fn has_receipt(&self, player_id: &str, session_id: &str) -> Result<bool, LedgerRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.settlements_table)
            .key("player_id", AttributeValue::S(player_id.to_string()))
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| LedgerRepositoryError::DynamoDb(e.to_string()))?;
        Ok(output.item.is_some())
    }
}

#[async_trait]
impl LedgerRepository for DynamoDbLedgerRepository {
    async fn create_account(&self, account: &PlayerAccount) -> Result<(), LedgerRepositoryError> {
        let item = to_item(account).map_err(|e| LedgerRepositoryError::Serialization(e.to_string()))?;
        let result = self
            .client
            .put_item()
            .table_name(&self.accounts_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => {
                    Err(LedgerRepositoryError::AlreadyExists)
                }
                _ => Err(LedgerRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }

    async fn get_account(&self, player_id: &str) -> Result<Option<PlayerAccount>, LedgerRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.accounts_table)
            .key("id", AttributeValue::S(player_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| LedgerRepositoryError::DynamoDb(e.to_string()))?;
        match output.item {
            Some(item) => {
                let account: PlayerAccount = from_item(item)
                    .map_err(|e| LedgerRepositoryError::Serialization(e.to_string()))?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    async fn apply_entry(
        &self,
        session_id: &str,
        entry: &LedgerEntry,
    ) -> Result<bool, LedgerRepositoryError> {
        for attempt in 1..=MAX_ACCOUNT_WRITE_ATTEMPTS {
            if self.has_receipt(&entry.player_id, session_id).await? {
                debug!(
                    "Session {} already applied to account {}",
                    session_id, entry.player_id
                );
                return Ok(false);
            }

            let mut account = self
                .get_account(&entry.player_id)
                .await?
                .ok_or(LedgerRepositoryError::NotFound)?;
            let expected_version = account.version;
            let now = Utc::now();
            account.apply_entry(entry, now);
            account.version = expected_version + 1;

            let receipt = SettlementReceipt {
                player_id: entry.player_id.clone(),
                session_id: session_id.to_string(),
                applied_at: now,
            };
            let transact_items = vec![
                TransactWriteItem::builder().put(self.receipt_put(&receipt)?).build(),
                TransactWriteItem::builder()
                    .put(self.account_put(&account, expected_version)?)
                    .build(),
            ];

            match self
                .client
                .transact_write_items()
                .set_transact_items(Some(transact_items))
                .send()
                .await
            {
                Ok(_) => return Ok(true),
                Err(e) => match e.as_service_error() {
                    // Either a concurrent run wrote the receipt or the account
                    // moved on; the next attempt tells them apart.
                    Some(TransactWriteItemsError::TransactionCanceledException(_)) => {
                        warn!(
                            "Account {} changed during settlement of {} (attempt {})",
                            entry.player_id, session_id, attempt
                        );
                    }
                    _ => return Err(LedgerRepositoryError::DynamoDb(e.to_string())),
                },
            }
        }
        Err(LedgerRepositoryError::Conflict)
    }

    async fn record_platform_fee(&self, fee: &PlatformFee) -> Result<bool, LedgerRepositoryError> {
        let item = to_item(fee).map_err(|e| LedgerRepositoryError::Serialization(e.to_string()))?;
        let result = self
            .client
            .put_item()
            .table_name(&self.fees_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(session_id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) => match e.as_service_error() {
                Some(PutItemError::ConditionalCheckFailedException(_)) => Ok(false),
                _ => Err(LedgerRepositoryError::DynamoDb(e.to_string())),
            },
        }
    }

    async fn get_platform_fee(&self, session_id: &str) -> Result<Option<PlatformFee>, LedgerRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.fees_table)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .send()
            .await
            .map_err(|e| LedgerRepositoryError::DynamoDb(e.to_string()))?;
        match output.item {
            Some(item) => {
                let fee: PlatformFee = from_item(item)
                    .map_err(|e| LedgerRepositoryError::Serialization(e.to_string()))?;
                Ok(Some(fee))
            }
            None => Ok(None),
        }
    }
}
