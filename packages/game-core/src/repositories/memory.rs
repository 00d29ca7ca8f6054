//! In-memory repositories with the same conditional-write semantics as the
//! DynamoDB ones. Used by tests and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::models::account::PlayerAccount;
use crate::models::game_move::GameMove;
use crate::models::game_session::GameSession;
use crate::models::room::Room;
use crate::models::settlement::{LedgerEntry, PlatformFee};
use crate::repositories::errors::game_repository_errors::GameSessionRepositoryError;
use crate::repositories::errors::ledger_repository_errors::LedgerRepositoryError;
use crate::repositories::errors::room_repository_errors::RoomRepositoryError;
use crate::repositories::game_repository::GameSessionRepository;
use crate::repositories::ledger_repository::LedgerRepository;
use crate::repositories::room_repository::RoomRepository;

const CHANGE_BUFFER: usize = 256;

/// Session store that also plays the role of the table's change stream:
/// every committed write is broadcast to subscribers in commit order. The
/// broadcast happens under the same lock as the write.
pub struct MemoryGameSessionRepository {
    inner: Mutex<SessionTables>,
    changes: broadcast::Sender<GameSession>,
}

#[derive(Default)]
struct SessionTables {
    sessions: HashMap<String, GameSession>,
    moves: HashMap<String, Vec<GameMove>>,
}

impl MemoryGameSessionRepository {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Mutex::new(SessionTables::default()),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameSession> {
        self.changes.subscribe()
    }

    /// Must be called while holding `inner`. Sending never blocks.
    fn publish(&self, session: &GameSession) {
        // No subscribers is fine.
        let _ = self.changes.send(session.clone());
    }

    fn check_version(
        stored: Option<&GameSession>,
        expected_version: u64,
    ) -> Result<(), GameSessionRepositoryError> {
        match stored {
            None => Err(GameSessionRepositoryError::NotFound),
            Some(s) if s.version != expected_version => Err(GameSessionRepositoryError::Conflict),
            Some(_) => Ok(()),
        }
    }
}

impl Default for MemoryGameSessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameSessionRepository for MemoryGameSessionRepository {
    async fn create_game_session(
        &self,
        game_session: &GameSession,
    ) -> Result<(), GameSessionRepositoryError> {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(&game_session.id) {
            return Err(GameSessionRepositoryError::AlreadyExists);
        }
        inner
            .sessions
            .insert(game_session.id.clone(), game_session.clone());
        self.publish(game_session);
        Ok(())
    }

    async fn get_game_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, GameSessionRepositoryError> {
        Ok(self.inner.lock().sessions.get(session_id).cloned())
    }

    async fn update_game_session(
        &self,
        game_session: &GameSession,
        expected_version: u64,
    ) -> Result<(), GameSessionRepositoryError> {
        let mut inner = self.inner.lock();
        Self::check_version(inner.sessions.get(&game_session.id), expected_version)?;
        inner
            .sessions
            .insert(game_session.id.clone(), game_session.clone());
        self.publish(game_session);
        Ok(())
    }

    async fn commit_move(
        &self,
        game_session: &GameSession,
        expected_version: u64,
        game_move: &GameMove,
    ) -> Result<(), GameSessionRepositoryError> {
        let mut inner = self.inner.lock();
        Self::check_version(inner.sessions.get(&game_session.id), expected_version)?;
        let log = inner.moves.entry(game_session.id.clone()).or_default();
        if log.iter().any(|m| m.move_number == game_move.move_number) {
            return Err(GameSessionRepositoryError::Conflict);
        }
        log.push(game_move.clone());
        inner
            .sessions
            .insert(game_session.id.clone(), game_session.clone());
        self.publish(game_session);
        Ok(())
    }

    async fn list_moves(&self, session_id: &str) -> Result<Vec<GameMove>, GameSessionRepositoryError> {
        let mut moves = self
            .inner
            .lock()
            .moves
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        moves.sort_by_key(|m| m.move_number);
        Ok(moves)
    }

    async fn mark_settled(&self, session_id: &str) -> Result<bool, GameSessionRepositoryError> {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(session_id) {
            Some(session) if !session.settled => {
                session.settled = true;
                session.version += 1;
                session.updated_at = Utc::now();
                self.publish(session);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryRoomRepository {
    rooms: Mutex<HashMap<String, Room>>,
}

impl MemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for MemoryRoomRepository {
    async fn create_room(&self, room: &Room) -> Result<(), RoomRepositoryError> {
        let mut rooms = self.rooms.lock();
        if rooms.contains_key(&room.id) {
            return Err(RoomRepositoryError::AlreadyExists);
        }
        rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RoomRepositoryError> {
        Ok(self.rooms.lock().get(room_id).cloned())
    }

    async fn update_room(&self, room: &Room, expected_version: u64) -> Result<(), RoomRepositoryError> {
        let mut rooms = self.rooms.lock();
        match rooms.get(&room.id) {
            None => Err(RoomRepositoryError::NotFound),
            Some(stored) if stored.version != expected_version => Err(RoomRepositoryError::Conflict),
            Some(_) => {
                rooms.insert(room.id.clone(), room.clone());
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryLedgerRepository {
    inner: Mutex<LedgerTables>,
}

#[derive(Default)]
struct LedgerTables {
    accounts: HashMap<String, PlayerAccount>,
    /// (player id, session id) of every applied entry.
    receipts: HashSet<(String, String)>,
    fees: HashMap<String, PlatformFee>,
    unavailable_account: Option<String>,
}

impl MemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every entry write for `player_id` fail until cleared. Lets
    /// tests exercise settlement retries.
    pub fn set_unavailable(&self, player_id: Option<&str>) {
        self.inner.lock().unavailable_account = player_id.map(str::to_string);
    }

    pub fn total_fees(&self) -> i64 {
        self.inner.lock().fees.values().map(|f| f.amount).sum()
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedgerRepository {
    async fn create_account(&self, account: &PlayerAccount) -> Result<(), LedgerRepositoryError> {
        let mut inner = self.inner.lock();
        if inner.accounts.contains_key(&account.id) {
            return Err(LedgerRepositoryError::AlreadyExists);
        }
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, player_id: &str) -> Result<Option<PlayerAccount>, LedgerRepositoryError> {
        Ok(self.inner.lock().accounts.get(player_id).cloned())
    }

    async fn apply_entry(
        &self,
        session_id: &str,
        entry: &LedgerEntry,
    ) -> Result<bool, LedgerRepositoryError> {
        let mut inner = self.inner.lock();
        if inner.unavailable_account.as_deref() == Some(entry.player_id.as_str()) {
            return Err(LedgerRepositoryError::DynamoDb(format!(
                "account {} unavailable",
                entry.player_id
            )));
        }
        let key = (entry.player_id.clone(), session_id.to_string());
        if inner.receipts.contains(&key) {
            return Ok(false);
        }
        let account = inner
            .accounts
            .get_mut(&entry.player_id)
            .ok_or(LedgerRepositoryError::NotFound)?;
        account.apply_entry(entry, Utc::now());
        account.version += 1;
        inner.receipts.insert(key);
        Ok(true)
    }

    async fn record_platform_fee(&self, fee: &PlatformFee) -> Result<bool, LedgerRepositoryError> {
        let mut inner = self.inner.lock();
        if inner.fees.contains_key(&fee.session_id) {
            return Ok(false);
        }
        inner.fees.insert(fee.session_id.clone(), fee.clone());
        Ok(true)
    }

    async fn get_platform_fee(&self, session_id: &str) -> Result<Option<PlatformFee>, LedgerRepositoryError> {
        Ok(self.inner.lock().fees.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settlement::GameResult;

    #[tokio::test]
    async fn test_update_requires_matching_version() {
        let repo = MemoryGameSessionRepository::new();
        let mut session = GameSession::new("room", "w", "b", 10, 600, Utc::now());
        repo.create_game_session(&session).await.unwrap();

        session.version = 1;
        repo.update_game_session(&session, 0).await.unwrap();

        let stale = repo.update_game_session(&session, 0).await;
        assert_eq!(stale, Err(GameSessionRepositoryError::Conflict));
        assert_eq!(
            repo.create_game_session(&session).await,
            Err(GameSessionRepositoryError::AlreadyExists)
        );
    }

    #[tokio::test]
    async fn test_commit_move_is_all_or_nothing() {
        let repo = MemoryGameSessionRepository::new();
        let mut session = GameSession::new("room", "w", "b", 10, 600, Utc::now());
        repo.create_game_session(&session).await.unwrap();

        session.version = 1;
        session.move_count = 1;
        let game_move = GameMove::new(&session.id, "w", 1, Utc::now());
        // Wrong expected version: neither the move nor the session lands.
        let result = repo.commit_move(&session, 5, &game_move).await;
        assert_eq!(result, Err(GameSessionRepositoryError::Conflict));
        assert!(repo.list_moves(&session.id).await.unwrap().is_empty());
        assert_eq!(repo.get_game_session(&session.id).await.unwrap().unwrap().version, 0);

        repo.commit_move(&session, 0, &game_move).await.unwrap();
        assert_eq!(repo.list_moves(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_broadcast_in_commit_order() {
        let repo = MemoryGameSessionRepository::new();
        let mut changes = repo.subscribe();
        let mut session = GameSession::new("room", "w", "b", 10, 600, Utc::now());
        repo.create_game_session(&session).await.unwrap();
        session.version = 1;
        repo.update_game_session(&session, 0).await.unwrap();
        assert!(repo.mark_settled(&session.id).await.unwrap());
        assert!(!repo.mark_settled(&session.id).await.unwrap());

        assert_eq!(changes.recv().await.unwrap().version, 0);
        assert_eq!(changes.recv().await.unwrap().version, 1);
        let settled = changes.recv().await.unwrap();
        assert_eq!(settled.version, 2);
        assert!(settled.settled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_are_broadcast_in_version_order() {
        let repo = std::sync::Arc::new(MemoryGameSessionRepository::new());
        let mut changes = repo.subscribe();
        let session = GameSession::new("room", "w", "b", 10, 600, Utc::now());
        repo.create_game_session(&session).await.unwrap();

        let mut writers = vec![];
        for _ in 0..4 {
            let repo = repo.clone();
            let id = session.id.clone();
            writers.push(tokio::spawn(async move {
                let mut written = 0;
                while written < 25 {
                    let mut current = repo.get_game_session(&id).await.unwrap().unwrap();
                    let expected = current.version;
                    current.version += 1;
                    match repo.update_game_session(&current, expected).await {
                        Ok(()) => written += 1,
                        Err(GameSessionRepositoryError::Conflict) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        for expected in 0..=100u64 {
            assert_eq!(changes.recv().await.unwrap().version, expected);
        }
    }

    #[tokio::test]
    async fn test_platform_fee_recorded_once() {
        let repo = MemoryLedgerRepository::new();
        let fee = PlatformFee {
            session_id: "s1".to_string(),
            amount: 2,
            recorded_at: Utc::now(),
        };

        assert!(repo.record_platform_fee(&fee).await.unwrap());
        assert!(!repo.record_platform_fee(&fee).await.unwrap());
        assert_eq!(repo.total_fees(), 2);
        assert_eq!(repo.get_platform_fee("s1").await.unwrap(), Some(fee));
    }

    #[tokio::test]
    async fn test_entry_applied_once_per_player_and_session() {
        let repo = MemoryLedgerRepository::new();
        repo.create_account(&PlayerAccount::new("p1", 100)).await.unwrap();
        let entry = LedgerEntry {
            player_id: "p1".to_string(),
            result: GameResult::Win,
            balance_delta: 8,
            rating_delta: 38,
        };

        assert!(repo.apply_entry("s1", &entry).await.unwrap());
        assert!(!repo.apply_entry("s1", &entry).await.unwrap());
        assert!(repo.apply_entry("s2", &entry).await.unwrap());

        let account = repo.get_account("p1").await.unwrap().unwrap();
        assert_eq!(account.balance, 116);
        assert_eq!(account.games_played, 2);
        assert_eq!(account.version, 2);

        let missing = LedgerEntry {
            player_id: "nobody".to_string(),
            ..entry
        };
        assert_eq!(
            repo.apply_entry("s1", &missing).await,
            Err(LedgerRepositoryError::NotFound)
        );
    }
}
