//! Bridge between committed records and the code that reacts to them.
//!
//! Two observers deliver the same thing: a sequence of snapshots of one
//! record, each strictly newer than the last. [`PushObserver`] is fed by the
//! table's change stream, [`PollingObserver`] reloads on a fixed interval.
//! Duplicate and out-of-order deliveries are dropped by version, so callers
//! cannot tell which one is in use.

mod polling;
mod push;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::game_session::GameSession;
use crate::models::room::Room;
use crate::repositories::game_repository::GameSessionRepository;
use crate::repositories::room_repository::RoomRepository;

pub use polling::PollingObserver;
pub use push::PushObserver;

pub type SnapshotError = Box<dyn std::error::Error + Send + Sync>;

/// A record whose every committed write carries a larger version.
pub trait Versioned: Clone + Send + Sync + 'static {
    fn record_id(&self) -> &str;
    fn version(&self) -> u64;
}

impl Versioned for GameSession {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Versioned for Room {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[async_trait]
pub trait ChangeObserver<T: Versioned>: Send {
    /// Waits for the next snapshot newer than any returned so far. `None`
    /// once the underlying feed has closed.
    async fn next_change(&mut self) -> Option<T>;
}

/// Latest committed snapshot of a record, for reloads.
#[async_trait]
pub trait SnapshotSource<T>: Send + Sync {
    async fn latest(&self, record_id: &str) -> Result<Option<T>, SnapshotError>;
}

#[async_trait]
impl SnapshotSource<GameSession> for Arc<dyn GameSessionRepository + Send + Sync> {
    async fn latest(&self, record_id: &str) -> Result<Option<GameSession>, SnapshotError> {
        Ok(self.get_game_session(record_id).await?)
    }
}

#[async_trait]
impl SnapshotSource<Room> for Arc<dyn RoomRepository + Send + Sync> {
    async fn latest(&self, record_id: &str) -> Result<Option<Room>, SnapshotError> {
        Ok(self.get_room(record_id).await?)
    }
}

/// Admits snapshots of one record in strictly increasing version order.
#[derive(Debug, Clone)]
struct VersionGate {
    record_id: String,
    last_seen: Option<u64>,
}

impl VersionGate {
    fn new(record_id: &str) -> Self {
        VersionGate {
            record_id: record_id.to_string(),
            last_seen: None,
        }
    }

    fn admit<T: Versioned>(&mut self, snapshot: &T) -> bool {
        if snapshot.record_id() != self.record_id {
            return false;
        }
        match self.last_seen {
            Some(last) if snapshot.version() <= last => false,
            _ => {
                self.last_seen = Some(snapshot.version());
                true
            }
        }
    }
}
