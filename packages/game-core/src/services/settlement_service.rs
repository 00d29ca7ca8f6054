use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    config::BPS_DENOMINATOR,
    models::{
        game_session::{GameOutcome, GameSession},
        settlement::{GameResult, LedgerEntry, PlatformFee, SettlementOutcome, SettlementPlan},
    },
    repositories::{game_repository::GameSessionRepository, ledger_repository::LedgerRepository},
    services::{chess_service::ChessService, errors::settlement_service_errors::SettlementServiceError},
};

pub const DRAW_RATING_DELTA: i32 = 5;
pub const LOSS_RATING_DELTA: i32 = -15;
pub const WIN_BASE_RATING_DELTA: i32 = 20;
const MAX_MATERIAL_BONUS_UNITS: i32 = 10;

pub fn efficiency_bonus(total_moves: u32) -> i32 {
    if total_moves < 30 {
        10
    } else if total_moves < 50 {
        5
    } else {
        0
    }
}

pub fn win_rating_delta(material_advantage: i32, total_moves: u32) -> i32 {
    WIN_BASE_RATING_DELTA
        + 2 * material_advantage.abs().min(MAX_MATERIAL_BONUS_UNITS)
        + efficiency_bonus(total_moves)
}

/// Fee kept from the pot of a decisive game.
pub fn platform_fee(stake: i64, fee_bps: i64) -> i64 {
    stake * 2 * fee_bps / BPS_DENOMINATOR
}

/// Applies the money and rating effects of finished sessions exactly once
/// per session id.
#[derive(Clone)]
pub struct SettlementService {
    sessions: Arc<dyn GameSessionRepository + Send + Sync>,
    ledger: Arc<dyn LedgerRepository + Send + Sync>,
    chess: ChessService,
    platform_fee_bps: i64,
}

impl SettlementService {
    pub fn new(
        sessions: Arc<dyn GameSessionRepository + Send + Sync>,
        ledger: Arc<dyn LedgerRepository + Send + Sync>,
        platform_fee_bps: i64,
    ) -> Self {
        SettlementService {
            sessions,
            ledger,
            chess: ChessService::new(),
            platform_fee_bps,
        }
    }

    /// The effects settling `session` would have, or `None` for a session
    /// that ended without a result.
    pub fn plan(&self, session: &GameSession) -> Result<Option<SettlementPlan>, SettlementServiceError> {
        let Some(outcome) = session.winner else {
            return Ok(None);
        };

        let plan = match outcome.winning_color() {
            None => SettlementPlan {
                session_id: session.id.clone(),
                entries: vec![
                    draw_entry(&session.white_player_id),
                    draw_entry(&session.black_player_id),
                ],
                platform_fee: 0,
            },
            Some(winner) => {
                let state = self
                    .chess
                    .load(&session.board_state)
                    .map_err(|e| SettlementServiceError::InvalidBoard(e.to_string()))?;
                let advantage =
                    self.chess.material(&state, winner) - self.chess.material(&state, winner.opponent());
                let fee = platform_fee(session.bet_amount, self.platform_fee_bps);
                let pot = session.bet_amount * 2;

                SettlementPlan {
                    session_id: session.id.clone(),
                    entries: vec![
                        LedgerEntry {
                            player_id: session.player_id(winner).to_string(),
                            result: GameResult::Win,
                            balance_delta: pot - fee - session.bet_amount,
                            rating_delta: win_rating_delta(advantage, session.move_count),
                        },
                        LedgerEntry {
                            player_id: session.player_id(winner.opponent()).to_string(),
                            result: GameResult::Loss,
                            balance_delta: -session.bet_amount,
                            rating_delta: LOSS_RATING_DELTA,
                        },
                    ],
                    platform_fee: fee,
                }
            }
        };
        Ok(Some(plan))
    }

    /// Settles a finished session. Safe to call any number of times: the
    /// marker is only set once every effect is durable, and each effect is
    /// itself keyed by the session id, so a retry after a partial failure
    /// completes the remaining writes without repeating the others.
    pub async fn settle(&self, session_id: &str) -> Result<SettlementOutcome, SettlementServiceError> {
        let session = self
            .sessions
            .get_game_session(session_id)
            .await?
            .ok_or_else(|| SettlementServiceError::SessionNotFound(session_id.to_string()))?;

        if !session.state.is_terminal() {
            return Err(SettlementServiceError::NotTerminal(session_id.to_string()));
        }
        if session.settled {
            debug!("Session {} already settled", session_id);
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let Some(plan) = self.plan(&session)? else {
            info!("Session {} ended without a result; nothing to settle", session_id);
            self.sessions.mark_settled(session_id).await?;
            return Ok(SettlementOutcome::Voided);
        };

        for entry in &plan.entries {
            let applied = self.ledger.apply_entry(session_id, entry).await?;
            if applied {
                info!(
                    "Settled {} for player {}: balance {:+}, rating {:+}",
                    session_id, entry.player_id, entry.balance_delta, entry.rating_delta
                );
            } else {
                debug!(
                    "Entry for player {} on session {} was already applied",
                    entry.player_id, session_id
                );
            }
        }

        if plan.platform_fee > 0 {
            let fee = PlatformFee {
                session_id: session_id.to_string(),
                amount: plan.platform_fee,
                recorded_at: Utc::now(),
            };
            if !self.ledger.record_platform_fee(&fee).await? {
                debug!("Platform fee for session {} was already recorded", session_id);
            }
        }

        if !self.sessions.mark_settled(session_id).await? {
            warn!("Session {} was marked settled by a concurrent run", session_id);
        }

        if session.winner == Some(GameOutcome::Draw) {
            info!("Session {} settled as a draw", session_id);
        }
        Ok(SettlementOutcome::Applied(plan))
    }
}

fn draw_entry(player_id: &str) -> LedgerEntry {
    LedgerEntry {
        player_id: player_id.to_string(),
        result: GameResult::Draw,
        balance_delta: 0,
        rating_delta: DRAW_RATING_DELTA,
    }
}
