use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{ChangeObserver, SnapshotSource, VersionGate, Versioned};

/// Observer over a broadcast of committed snapshots for many records.
pub struct PushObserver<T: Versioned> {
    receiver: broadcast::Receiver<T>,
    gate: VersionGate,
    resync: Option<Arc<dyn SnapshotSource<T>>>,
}

impl<T: Versioned> PushObserver<T> {
    pub fn new(receiver: broadcast::Receiver<T>, record_id: &str) -> Self {
        PushObserver {
            receiver,
            gate: VersionGate::new(record_id),
            resync: None,
        }
    }

    /// Reload from `source` when the receiver falls behind and drops
    /// deliveries, instead of waiting for the next write.
    pub fn with_resync(mut self, source: Arc<dyn SnapshotSource<T>>) -> Self {
        self.resync = Some(source);
        self
    }

    async fn reload(&mut self) -> Option<T> {
        let source = self.resync.as_ref()?;
        match source.latest(&self.gate.record_id).await {
            Ok(Some(snapshot)) if self.gate.admit(&snapshot) => Some(snapshot),
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to reload {} after lag: {}", self.gate.record_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl<T: Versioned> ChangeObserver<T> for PushObserver<T> {
    async fn next_change(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => {
                    if self.gate.admit(&snapshot) {
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        "Observer for {} skipped {} deliveries",
                        self.gate.record_id, skipped
                    );
                    if let Some(snapshot) = self.reload().await {
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game_session::GameSession;
    use crate::repositories::game_repository::GameSessionRepository;
    use crate::repositories::memory::MemoryGameSessionRepository;
    use chrono::Utc;

    fn session(room_id: &str, version: u64) -> GameSession {
        let mut session = GameSession::new(room_id, "w", "b", 10, 600, Utc::now());
        session.version = version;
        session
    }

    #[tokio::test]
    async fn test_duplicates_and_stale_versions_are_dropped() {
        let (sender, receiver) = broadcast::channel::<GameSession>(16);
        let mut observer = PushObserver::new(receiver, &session("room-1", 0).id);

        for snapshot in [
            session("room-1", 1),
            session("room-1", 1),
            session("room-2", 2),
            session("room-1", 0),
            session("room-1", 2),
        ] {
            sender.send(snapshot).unwrap();
        }
        drop(sender);

        assert_eq!(observer.next_change().await.unwrap().version, 1);
        assert_eq!(observer.next_change().await.unwrap().version, 2);
        assert!(observer.next_change().await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_receiver_reloads_latest() {
        let (sender, receiver) = broadcast::channel::<GameSession>(2);
        let repo: Arc<dyn GameSessionRepository + Send + Sync> =
            Arc::new(MemoryGameSessionRepository::new());
        let latest = session("room-1", 0);
        repo.create_game_session(&latest).await.unwrap();
        let mut written = latest.clone();
        written.version = 7;
        repo.update_game_session(&written, 0).await.unwrap();

        let source: Arc<dyn SnapshotSource<GameSession>> = Arc::new(repo.clone());
        let mut observer = PushObserver::new(receiver, &latest.id).with_resync(source);
        for version in 1..=5 {
            sender.send(session("room-1", version)).unwrap();
        }

        assert_eq!(observer.next_change().await.unwrap().version, 7);
    }
}
