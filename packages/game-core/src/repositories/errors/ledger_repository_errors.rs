#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerRepositoryError {
    NotFound,
    AlreadyExists,
    /// A conditional write lost against a concurrent writer.
    Conflict,
    Serialization(String),
    DynamoDb(String),
}

impl std::fmt::Display for LedgerRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerRepositoryError::NotFound => write!(f, "Account not found"),
            LedgerRepositoryError::AlreadyExists => write!(f, "Account already exists"),
            LedgerRepositoryError::Conflict => write!(f, "Account was modified concurrently"),
            LedgerRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            LedgerRepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerRepositoryError {}
