use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use game_core::clock::ManualTimeSource;
use game_core::config::EngineConfig;
use game_core::models::account::PlayerAccount;
use game_core::models::game_session::GameSession;
use game_core::models::move_request::MoveRequest;
use game_core::models::room::{Room, RoomState, TimeControl};
use game_core::repositories::ledger_repository::LedgerRepository;
use game_core::repositories::memory::{
    MemoryGameSessionRepository, MemoryLedgerRepository, MemoryRoomRepository,
};
use game_core::repositories::room_repository::RoomRepository;
use game_core::services::errors::game_session_service_errors::GameSessionServiceError;
use game_core::services::game_session_service::GameSessionService;
use game_core::services::settlement_service::SettlementService;
use game_core::services::settlement_trigger::SettlementTrigger;

pub const CREATOR: &str = "creator";
pub const OPPONENT: &str = "opponent";
pub const STARTING_BALANCE: i64 = 100;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub sessions: Arc<MemoryGameSessionRepository>,
    pub rooms: Arc<MemoryRoomRepository>,
    pub ledger: Arc<MemoryLedgerRepository>,
    pub time: Arc<ManualTimeSource>,
    pub games: GameSessionService,
    pub settlement: SettlementService,
    pub trigger: SettlementTrigger,
}

impl Harness {
    pub async fn new() -> Self {
        let sessions = Arc::new(MemoryGameSessionRepository::new());
        let rooms = Arc::new(MemoryRoomRepository::new());
        let ledger = Arc::new(MemoryLedgerRepository::new());
        let time = Arc::new(ManualTimeSource::new(t0()));
        let config = EngineConfig::default();

        for player in [CREATOR, OPPONENT] {
            ledger
                .create_account(&PlayerAccount::new(player, STARTING_BALANCE))
                .await
                .unwrap();
        }

        let games = GameSessionService::new(sessions.clone(), rooms.clone(), time.clone(), config.clone());
        let settlement = SettlementService::new(sessions.clone(), ledger.clone(), config.platform_fee_bps);
        let trigger = SettlementTrigger::new(settlement.clone());

        Harness {
            sessions,
            rooms,
            ledger,
            time,
            games,
            settlement,
            trigger,
        }
    }

    /// Creates a ready room with the given stake and starts its session.
    pub async fn start_game(&self, stake: i64) -> GameSession {
        let mut room = Room::new("test room", CREATOR, stake, TimeControl::default());
        room.opponent_id = Some(OPPONENT.to_string());
        room.state = RoomState::Full;
        room.creator_ready = true;
        room.opponent_ready = true;
        self.rooms.create_room(&room).await.unwrap();

        self.games.start_session(&room.id, CREATOR).await.unwrap()
    }

    pub async fn play(
        &self,
        session: &GameSession,
        player_id: &str,
        from: &str,
        to: &str,
    ) -> Result<GameSession, GameSessionServiceError> {
        self.time.advance_ms(2_000);
        self.games
            .make_move(player_id, &MoveRequest::new(&session.id, from, to))
            .await
    }

    pub async fn balance(&self, player_id: &str) -> i64 {
        self.account(player_id).await.balance
    }

    pub async fn account(&self, player_id: &str) -> PlayerAccount {
        self.ledger.get_account(player_id).await.unwrap().unwrap()
    }
}
