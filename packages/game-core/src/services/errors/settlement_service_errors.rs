use crate::repositories::errors::game_repository_errors::GameSessionRepositoryError;
use crate::repositories::errors::ledger_repository_errors::LedgerRepositoryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementServiceError {
    SessionNotFound(String),
    NotTerminal(String),
    InvalidBoard(String),
    Ledger(LedgerRepositoryError),
    Repository(GameSessionRepositoryError),
}

impl SettlementServiceError {
    /// Transient storage failures leave the marker unset, so the whole
    /// settlement can be run again. A missing account or an unreadable
    /// record fails the same way on every run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementServiceError::Ledger(
                LedgerRepositoryError::DynamoDb(_) | LedgerRepositoryError::Conflict
            ) | SettlementServiceError::Repository(
                GameSessionRepositoryError::DynamoDb(_) | GameSessionRepositoryError::Conflict
            )
        )
    }
}

impl std::fmt::Display for SettlementServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementServiceError::SessionNotFound(id) => write!(f, "Game session {} not found", id),
            SettlementServiceError::NotTerminal(id) => {
                write!(f, "Game session {} has not finished", id)
            }
            SettlementServiceError::InvalidBoard(msg) => write!(f, "Invalid final board: {}", msg),
            SettlementServiceError::Ledger(err) => write!(f, "Ledger error: {}", err),
            SettlementServiceError::Repository(err) => write!(f, "Repository error: {}", err),
        }
    }
}

impl std::error::Error for SettlementServiceError {}

impl From<LedgerRepositoryError> for SettlementServiceError {
    fn from(err: LedgerRepositoryError) -> Self {
        SettlementServiceError::Ledger(err)
    }
}

impl From<GameSessionRepositoryError> for SettlementServiceError {
    fn from(err: GameSessionRepositoryError) -> Self {
        SettlementServiceError::Repository(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_storage_errors_are_retryable() {
        let retryable = [
            SettlementServiceError::Ledger(LedgerRepositoryError::DynamoDb("throttled".to_string())),
            SettlementServiceError::Ledger(LedgerRepositoryError::Conflict),
            SettlementServiceError::Repository(GameSessionRepositoryError::DynamoDb("timeout".to_string())),
            SettlementServiceError::Repository(GameSessionRepositoryError::Conflict),
        ];
        for err in retryable {
            assert!(err.is_retryable(), "{} should be retryable", err);
        }

        let permanent = [
            SettlementServiceError::Ledger(LedgerRepositoryError::NotFound),
            SettlementServiceError::Ledger(LedgerRepositoryError::Serialization("bad item".to_string())),
            SettlementServiceError::Repository(GameSessionRepositoryError::Serialization("bad item".to_string())),
            SettlementServiceError::Repository(GameSessionRepositoryError::NotFound),
            SettlementServiceError::SessionNotFound("s1".to_string()),
            SettlementServiceError::NotTerminal("s1".to_string()),
            SettlementServiceError::InvalidBoard("garbage".to_string()),
        ];
        for err in permanent {
            assert!(!err.is_retryable(), "{} should not be retryable", err);
        }
    }
}
