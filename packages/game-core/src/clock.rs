//! Per-colour countdown clocks reconciled against the durable record.
//!
//! Elapsed time is always derived from wall-clock time since the session's
//! clock anchor (the later of `last_move_time` and `clock_synced_at`), never
//! from a client-side interval. Any observer holding the same snapshot and
//! the same `now` computes the same remaining time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::models::game_session::{GameSession, PlayerColor};

pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time source that only moves when told to. Used by tests and replays.
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualTimeSource {
            now: Mutex::new(start),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock();
        *now += chrono::Duration::milliseconds(ms);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Whether `color`'s clock is the one currently running.
pub fn is_running(session: &GameSession, color: PlayerColor) -> bool {
    session.is_active() && session.current_player == color
}

fn anchor(session: &GameSession) -> Option<DateTime<Utc>> {
    match (session.last_move_time, session.clock_synced_at) {
        (Some(turn), Some(synced)) => Some(turn.max(synced)),
        (turn, synced) => turn.or(synced),
    }
}

/// Remaining milliseconds for `color` at `now`. Saturates at zero. The
/// side not to move is frozen at its persisted value.
pub fn effective_remaining(session: &GameSession, color: PlayerColor, now: DateTime<Utc>) -> i64 {
    let persisted = session.time_left_ms(color);
    if !is_running(session, color) {
        return persisted;
    }
    let elapsed = match anchor(session) {
        Some(anchor) => (now - anchor).num_milliseconds().max(0),
        None => 0,
    };
    (persisted - elapsed).max(0)
}

pub fn has_expired(session: &GameSession, color: PlayerColor, now: DateTime<Utc>) -> bool {
    is_running(session, color) && effective_remaining(session, color, now) <= 0
}

/// Starts the new side's turn. Leaves both remaining values alone.
pub fn on_turn_start(session: &mut GameSession, now: DateTime<Utc>) {
    session.last_move_time = Some(now);
    session.clock_synced_at = None;
}

/// Folds the running side's elapsed time into its persisted value and
/// moves the anchor to `now`, so the same interval is never charged twice.
/// Returns the value written. Does nothing for a frozen clock.
pub fn on_persist_tick(session: &mut GameSession, color: PlayerColor, now: DateTime<Utc>) -> i64 {
    if !is_running(session, color) {
        return session.time_left_ms(color);
    }
    let remaining = effective_remaining(session, color, now);
    session.set_time_left_ms(color, remaining);
    session.clock_synced_at = Some(now);
    remaining
}

/// Whether the running clock has gone at least `interval_ms` without a
/// durable write.
pub fn persist_due(session: &GameSession, now: DateTime<Utc>, interval_ms: i64) -> bool {
    if !session.is_active() {
        return false;
    }
    match anchor(session) {
        Some(anchor) => (now - anchor).num_milliseconds() >= interval_ms,
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockView {
    pub white_ms: i64,
    pub black_ms: i64,
    pub running: Option<PlayerColor>,
    pub white_display: String,
    pub black_display: String,
    pub low_time: bool,
}

pub fn clock_view(session: &GameSession, now: DateTime<Utc>, low_time_threshold_ms: i64) -> ClockView {
    let white_ms = effective_remaining(session, PlayerColor::White, now);
    let black_ms = effective_remaining(session, PlayerColor::Black, now);
    let running = session.is_active().then_some(session.current_player);
    let low_time = match running {
        Some(PlayerColor::White) => white_ms < low_time_threshold_ms,
        Some(PlayerColor::Black) => black_ms < low_time_threshold_ms,
        None => false,
    };

    ClockView {
        white_ms,
        black_ms,
        running,
        white_display: format_clock(white_ms),
        black_display: format_clock(black_ms),
        low_time,
    }
}

/// `mm:ss`, rounding partial seconds up.
pub fn format_clock(ms: i64) -> String {
    let total_seconds = (ms.max(0) + 999) / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}
