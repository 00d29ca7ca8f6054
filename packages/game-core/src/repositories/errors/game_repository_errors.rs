#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameSessionRepositoryError {
    NotFound,
    AlreadyExists,
    /// A conditional write lost against a concurrent writer.
    Conflict,
    Serialization(String),
    DynamoDb(String),
}

impl std::fmt::Display for GameSessionRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameSessionRepositoryError::NotFound => write!(f, "Game session not found"),
            GameSessionRepositoryError::AlreadyExists => write!(f, "Game session already exists"),
            GameSessionRepositoryError::Conflict => write!(f, "Game session was modified concurrently"),
            GameSessionRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            GameSessionRepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for GameSessionRepositoryError {}
