use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    change_feed::PollingObserver,
    clock::{self, ClockView, TimeSource},
    config::EngineConfig,
    models::{
        game_move::{GameMove, PieceKind},
        game_session::{
            session_id_for_room, EndReason, GameOutcome, GameSession, GameStatus, PlayerColor,
        },
        move_request::MoveRequest,
        room::{Room, RoomState},
    },
    repositories::{
        errors::{
            game_repository_errors::GameSessionRepositoryError,
            room_repository_errors::RoomRepositoryError,
        },
        game_repository::GameSessionRepository,
        room_repository::RoomRepository,
    },
    services::{
        chess_service::{ChessService, DrawKind, MoveDescriptor, TerminalState},
        errors::game_session_service_errors::GameSessionServiceError,
    },
};

/// What a transition decided after looking at the latest record.
enum Step {
    /// Nothing to write; answer with the record as loaded.
    Unchanged,
    Reject(GameSessionServiceError),
    Write {
        next: GameSession,
        game_move: Option<GameMove>,
        /// Set when the write is a side effect of rejecting the request.
        rejection: Option<GameSessionServiceError>,
    },
}

impl Step {
    fn write(next: GameSession) -> Self {
        Step::Write {
            next,
            game_move: None,
            rejection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardSummary {
    pub captured_white: Vec<PieceKind>,
    pub captured_black: Vec<PieceKind>,
    /// White material minus black material.
    pub material_advantage: i32,
}

/// The session state machine. Every transition reloads the canonical
/// record, decides against it and writes conditionally on the version it
/// read; a lost race reloads and decides again.
#[derive(Clone)]
pub struct GameSessionService {
    sessions: Arc<dyn GameSessionRepository + Send + Sync>,
    rooms: Arc<dyn RoomRepository + Send + Sync>,
    time: Arc<dyn TimeSource>,
    chess: ChessService,
    config: EngineConfig,
}

impl GameSessionService {
    pub fn new(
        sessions: Arc<dyn GameSessionRepository + Send + Sync>,
        rooms: Arc<dyn RoomRepository + Send + Sync>,
        time: Arc<dyn TimeSource>,
        config: EngineConfig,
    ) -> Self {
        GameSessionService {
            sessions,
            rooms,
            time,
            chess: ChessService::new(),
            config,
        }
    }

    /// Creates the session for a room whose players are both ready.
    /// Calling it again for the same room returns the existing session.
    pub async fn start_session(
        &self,
        room_id: &str,
        requester_id: &str,
    ) -> Result<GameSession, GameSessionServiceError> {
        let room = self
            .rooms
            .get_room(room_id)
            .await?
            .ok_or_else(|| GameSessionServiceError::RoomNotFound(room_id.to_string()))?;

        if !room.is_member(requester_id) {
            return Err(GameSessionServiceError::NotAPlayer);
        }

        let session_id = session_id_for_room(room_id);
        if let Some(existing) = self.sessions.get_game_session(&session_id).await? {
            debug!("Session {} already started for room {}", session_id, room_id);
            return Ok(existing);
        }

        if !room.can_start() {
            return Err(GameSessionServiceError::RoomNotReady(
                "both players must be present and ready".to_string(),
            ));
        }
        let opponent_id = room.opponent_id.clone().ok_or_else(|| {
            GameSessionServiceError::RoomNotReady("room has no opponent".to_string())
        })?;

        let (white_player_id, black_player_id) = if rand::random::<bool>() {
            (room.creator_id.clone(), opponent_id)
        } else {
            (opponent_id, room.creator_id.clone())
        };

        let session = GameSession::new(
            room_id,
            &white_player_id,
            &black_player_id,
            room.bet_amount,
            room.time_control.base_seconds(),
            self.time.now(),
        );

        let session = match self.sessions.create_game_session(&session).await {
            Ok(()) => {
                info!(
                    "Started session {} for room {}: white {} black {}",
                    session.id, room_id, white_player_id, black_player_id
                );
                session
            }
            Err(GameSessionRepositoryError::AlreadyExists) => {
                debug!("Lost session creation race for room {}", room_id);
                self.get_session(&session_id).await?
            }
            Err(e) => return Err(e.into()),
        };

        self.mark_room_in_game(room_id).await?;
        Ok(session)
    }

    async fn mark_room_in_game(&self, room_id: &str) -> Result<(), GameSessionServiceError> {
        for attempt in 0..=self.config.max_conflict_retries {
            let mut room = self
                .rooms
                .get_room(room_id)
                .await?
                .ok_or_else(|| GameSessionServiceError::RoomNotFound(room_id.to_string()))?;
            if room.state == RoomState::InGame {
                return Ok(());
            }

            let expected_version = room.version;
            room.state = RoomState::InGame;
            room.version = expected_version + 1;
            match self.rooms.update_room(&room, expected_version).await {
                Ok(()) => return Ok(()),
                Err(RoomRepositoryError::Conflict) => {
                    warn!("Room {} changed while starting (attempt {})", room_id, attempt + 1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(GameSessionServiceError::ConflictRetriesExhausted)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<GameSession, GameSessionServiceError> {
        self.sessions
            .get_game_session(session_id)
            .await?
            .ok_or_else(|| GameSessionServiceError::NotFound(session_id.to_string()))
    }

    pub async fn list_moves(&self, session_id: &str) -> Result<Vec<GameMove>, GameSessionServiceError> {
        Ok(self.sessions.list_moves(session_id).await?)
    }

    pub async fn make_move(
        &self,
        mover_id: &str,
        request: &MoveRequest,
    ) -> Result<GameSession, GameSessionServiceError> {
        let chess = &self.chess;
        self.transition(&request.session_id, |session, now| {
            if !session.is_active() {
                return Step::Reject(GameSessionServiceError::NotActive);
            }
            let Some(color) = session.player_color(mover_id) else {
                return Step::Reject(GameSessionServiceError::NotAPlayer);
            };
            if clock::has_expired(session, color, now) {
                info!(
                    "Player {} moved on session {} after their clock ran out",
                    mover_id, session.id
                );
                let next = timed_out(session, color, now);
                let outcome = GameOutcome::win_for(color.opponent());
                return Step::Write {
                    next,
                    game_move: None,
                    rejection: Some(GameSessionServiceError::TimeExpired { outcome }),
                };
            }
            if color != session.current_player {
                return Step::Reject(GameSessionServiceError::WrongTurn);
            }

            let state = match chess.load(&session.board_state) {
                Ok(state) => state,
                Err(e) => return Step::Reject(e.into()),
            };
            let (next_state, descriptor) = match chess.apply_move(
                &state,
                &request.from_square,
                &request.to_square,
                request.promotion_piece.as_deref(),
            ) {
                Ok(applied) => applied,
                Err(e) => {
                    debug!("Rejected move on session {}: {}", session.id, e);
                    return Step::Reject(e.into());
                }
            };

            let mut next = session.clone();
            let mover_remaining = clock::effective_remaining(session, color, now);
            next.set_time_left_ms(color, mover_remaining);
            clock::on_turn_start(&mut next, now);
            next.board_state = descriptor.fen_after.clone();
            next.current_player = color.opponent();
            next.move_count += 1;
            next.draw_offered_by = None;

            match chess.terminal_state(&next_state) {
                TerminalState::Checkmate => next.finish(
                    GameStatus::Completed,
                    Some(GameOutcome::win_for(color)),
                    EndReason::Checkmate,
                    now,
                ),
                TerminalState::Draw(kind) => next.finish(
                    GameStatus::Completed,
                    Some(GameOutcome::Draw),
                    match kind {
                        DrawKind::Stalemate => EndReason::Stalemate,
                        DrawKind::InsufficientMaterial => EndReason::InsufficientMaterial,
                    },
                    now,
                ),
                TerminalState::None => {}
            }

            let game_move = move_record(&next, mover_id, &descriptor, now);
            Step::Write {
                next,
                game_move: Some(game_move),
                rejection: None,
            }
        })
        .await
    }

    /// Resigning an already finished game returns it unchanged.
    pub async fn resign(
        &self,
        session_id: &str,
        resigner_id: &str,
    ) -> Result<GameSession, GameSessionServiceError> {
        self.transition(session_id, |session, now| {
            let Some(color) = session.player_color(resigner_id) else {
                return Step::Reject(GameSessionServiceError::NotAPlayer);
            };
            if !session.is_active() {
                return Step::Unchanged;
            }
            let mut next = session.clone();
            freeze_clock(&mut next, now);
            next.finish(
                GameStatus::Completed,
                Some(GameOutcome::win_for(color.opponent())),
                EndReason::Resignation,
                now,
            );
            Step::write(next)
        })
        .await
    }

    /// Ends the game on time for `expired_color`. Does nothing unless that
    /// clock has run out at the moment of the write, so stale or duplicate
    /// signals are harmless.
    pub async fn expire_clock(
        &self,
        session_id: &str,
        expired_color: PlayerColor,
    ) -> Result<GameSession, GameSessionServiceError> {
        self.transition(session_id, |session, now| {
            if !session.is_active() {
                return Step::Unchanged;
            }
            if !clock::has_expired(session, expired_color, now) {
                debug!(
                    "Ignoring timeout claim for {} on session {}: clock still running",
                    expired_color, session.id
                );
                return Step::Unchanged;
            }
            Step::write(timed_out(session, expired_color, now))
        })
        .await
    }

    /// Writes the running side's remaining time. Completes the game on time
    /// instead if that clock has run out. Ticks arriving sooner than the
    /// persist interval after the last write are answered without writing.
    pub async fn persist_clock_tick(&self, session_id: &str) -> Result<GameSession, GameSessionServiceError> {
        let interval_ms = self.config.clock_persist_interval.as_millis() as i64;
        self.transition(session_id, |session, now| {
            if !session.is_active() {
                return Step::Unchanged;
            }
            let running = session.current_player;
            if clock::has_expired(session, running, now) {
                return Step::write(timed_out(session, running, now));
            }
            if !clock::persist_due(session, now, interval_ms) {
                return Step::Unchanged;
            }
            let mut next = session.clone();
            let remaining = clock::on_persist_tick(&mut next, running, now);
            debug!("Clock tick on session {}: {} has {}ms", session.id, running, remaining);
            Step::write(next)
        })
        .await
    }

    /// Offering while the opponent's offer is pending accepts it.
    pub async fn offer_draw(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> Result<GameSession, GameSessionServiceError> {
        self.transition(session_id, |session, now| {
            let color = match active_player(session, player_id) {
                Ok(color) => color,
                Err(e) => return Step::Reject(e),
            };
            match session.draw_offered_by {
                Some(offered_by) if offered_by == color => Step::Unchanged,
                Some(_) => Step::write(agreed_draw(session, now)),
                None => {
                    let mut next = session.clone();
                    next.draw_offered_by = Some(color);
                    Step::write(next)
                }
            }
        })
        .await
    }

    pub async fn accept_draw(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> Result<GameSession, GameSessionServiceError> {
        self.transition(session_id, |session, now| {
            let color = match active_player(session, player_id) {
                Ok(color) => color,
                Err(e) => return Step::Reject(e),
            };
            match session.draw_offered_by {
                None => Step::Reject(GameSessionServiceError::NoDrawOffer),
                Some(offered_by) if offered_by == color => {
                    Step::Reject(GameSessionServiceError::CannotAcceptOwnDrawOffer)
                }
                Some(_) => Step::write(agreed_draw(session, now)),
            }
        })
        .await
    }

    /// Declines the opponent's offer, or withdraws one's own.
    pub async fn decline_draw(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> Result<GameSession, GameSessionServiceError> {
        self.transition(session_id, |session, _now| {
            if let Err(e) = active_player(session, player_id) {
                return Step::Reject(e);
            }
            if session.draw_offered_by.is_none() {
                return Step::Reject(GameSessionServiceError::NoDrawOffer);
            }
            let mut next = session.clone();
            next.draw_offered_by = None;
            Step::write(next)
        })
        .await
    }

    /// External signal that the game is dead (room closed, players gone).
    /// The session ends without a result.
    pub async fn abandon(&self, session_id: &str, reason: &str) -> Result<GameSession, GameSessionServiceError> {
        self.transition(session_id, |session, now| {
            if !session.is_active() {
                return Step::Unchanged;
            }
            info!("Abandoning session {}: {}", session.id, reason);
            let mut next = session.clone();
            freeze_clock(&mut next, now);
            next.finish(GameStatus::Abandoned, None, EndReason::Abandoned, now);
            Step::write(next)
        })
        .await
    }

    /// UCI moves for the side to move. Empty once the game is over.
    pub async fn legal_moves(&self, session_id: &str) -> Result<Vec<String>, GameSessionServiceError> {
        let session = self.get_session(session_id).await?;
        if !session.is_active() {
            return Ok(vec![]);
        }
        let state = self.chess.load(&session.board_state)?;
        Ok(self.chess.legal_moves(&state))
    }

    pub async fn legal_destinations(
        &self,
        session_id: &str,
        from_square: &str,
    ) -> Result<Vec<String>, GameSessionServiceError> {
        let session = self.get_session(session_id).await?;
        if !session.is_active() {
            return Ok(vec![]);
        }
        let state = self.chess.load(&session.board_state)?;
        Ok(self.chess.legal_destinations(&state, from_square)?)
    }

    pub fn clock_view(&self, session: &GameSession) -> ClockView {
        let threshold_ms = self.config.low_time_threshold.as_millis() as i64;
        clock::clock_view(session, self.time.now(), threshold_ms)
    }

    /// Polling fallback for clients without a push subscription.
    pub fn poll_session(&self, session_id: &str) -> PollingObserver<GameSession> {
        PollingObserver::new(
            Arc::new(self.sessions.clone()),
            session_id,
            self.config.session_poll_interval,
        )
    }

    /// Polls a room while it waits for an opponent and ready flags.
    pub fn poll_room(&self, room_id: &str) -> PollingObserver<Room> {
        PollingObserver::new(Arc::new(self.rooms.clone()), room_id, self.config.room_poll_interval)
    }

    pub fn board_summary(&self, session: &GameSession) -> Result<BoardSummary, GameSessionServiceError> {
        let state = self.chess.load(&session.board_state)?;
        Ok(BoardSummary {
            captured_white: self.chess.captured_pieces(&state, PlayerColor::White),
            captured_black: self.chess.captured_pieces(&state, PlayerColor::Black),
            material_advantage: self.chess.material_advantage(&state),
        })
    }

    async fn transition<F>(&self, session_id: &str, decide: F) -> Result<GameSession, GameSessionServiceError>
    where
        F: Fn(&GameSession, DateTime<Utc>) -> Step,
    {
        for attempt in 0..=self.config.max_conflict_retries {
            let current = self.get_session(session_id).await?;
            let now = self.time.now();

            let (mut next, game_move, rejection) = match decide(&current, now) {
                Step::Unchanged => return Ok(current),
                Step::Reject(err) => return Err(err),
                Step::Write {
                    next,
                    game_move,
                    rejection,
                } => (next, game_move, rejection),
            };

            let expected_version = current.version;
            next.version = expected_version + 1;
            next.updated_at = now;

            let written = match &game_move {
                Some(game_move) => {
                    self.sessions
                        .commit_move(&next, expected_version, game_move)
                        .await
                }
                None => self.sessions.update_game_session(&next, expected_version).await,
            };

            match written {
                Ok(()) => {
                    if next.state.is_terminal() && current.is_active() {
                        info!(
                            "Session {} finished: {:?} ({:?})",
                            next.id, next.winner, next.end_reason
                        );
                    }
                    return match rejection {
                        Some(err) => Err(err),
                        None => Ok(next),
                    };
                }
                Err(GameSessionRepositoryError::Conflict) => {
                    warn!(
                        "Session {} changed concurrently at version {} (attempt {})",
                        session_id,
                        expected_version,
                        attempt + 1
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(GameSessionServiceError::ConflictRetriesExhausted)
    }
}

fn active_player(session: &GameSession, player_id: &str) -> Result<PlayerColor, GameSessionServiceError> {
    let color = session
        .player_color(player_id)
        .ok_or(GameSessionServiceError::NotAPlayer)?;
    if !session.is_active() {
        return Err(GameSessionServiceError::NotActive);
    }
    Ok(color)
}

/// Charges the running side up to `now` so the stored clocks are final.
fn freeze_clock(session: &mut GameSession, now: DateTime<Utc>) {
    let running = session.current_player;
    clock::on_persist_tick(session, running, now);
}

fn timed_out(session: &GameSession, color: PlayerColor, now: DateTime<Utc>) -> GameSession {
    let mut next = session.clone();
    next.set_time_left_ms(color, 0);
    next.clock_synced_at = Some(now);
    next.finish(
        GameStatus::Completed,
        Some(GameOutcome::win_for(color.opponent())),
        EndReason::Timeout,
        now,
    );
    next
}

fn agreed_draw(session: &GameSession, now: DateTime<Utc>) -> GameSession {
    let mut next = session.clone();
    freeze_clock(&mut next, now);
    next.finish(
        GameStatus::Completed,
        Some(GameOutcome::Draw),
        EndReason::Agreement,
        now,
    );
    next
}

fn move_record(
    session: &GameSession,
    mover_id: &str,
    descriptor: &MoveDescriptor,
    now: DateTime<Utc>,
) -> GameMove {
    let mut game_move = GameMove::new(&session.id, mover_id, session.move_count, now);
    game_move.from_square = descriptor.from_square.clone();
    game_move.to_square = descriptor.to_square.clone();
    game_move.piece = descriptor.piece;
    game_move.promotion = descriptor.promotion;
    game_move.capture = descriptor.captured.is_some();
    game_move.check = descriptor.is_check;
    game_move.checkmate = descriptor.is_checkmate;
    game_move.fen_after = descriptor.fen_after.clone();
    game_move
}
