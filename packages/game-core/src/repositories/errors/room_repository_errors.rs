#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRepositoryError {
    NotFound,
    AlreadyExists,
    /// A conditional write lost against a concurrent writer.
    Conflict,
    Serialization(String),
    DynamoDb(String),
}

impl std::fmt::Display for RoomRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomRepositoryError::NotFound => write!(f, "Room not found"),
            RoomRepositoryError::AlreadyExists => write!(f, "Room already exists"),
            RoomRepositoryError::Conflict => write!(f, "Room was modified concurrently"),
            RoomRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            RoomRepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for RoomRepositoryError {}
