use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::settlement::{GameResult, LedgerEntry};

pub const DEFAULT_RATING: i32 = 1200;
pub const MIN_RATING: i32 = 100;

/// Wallet balance, rating and lifetime stats for one player. Amounts are in
/// the ledger's smallest unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAccount {
    pub id: String,
    pub balance: i64,
    pub rating: i32,
    #[serde(default)]
    pub total_winnings: i64,
    #[serde(default)]
    pub total_losses: i64,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl PlayerAccount {
    pub fn new(id: &str, balance: i64) -> Self {
        PlayerAccount {
            id: id.to_string(),
            balance,
            rating: DEFAULT_RATING,
            total_winnings: 0,
            total_losses: 0,
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Folds one settlement entry into the account. Whether the session was
    /// already applied is tracked by a `SettlementReceipt`, not here.
    pub fn apply_entry(&mut self, entry: &LedgerEntry, now: DateTime<Utc>) {
        self.balance += entry.balance_delta;
        self.rating = (self.rating + entry.rating_delta).max(MIN_RATING);
        self.games_played += 1;
        match entry.result {
            GameResult::Win => {
                self.wins += 1;
                self.total_winnings += entry.balance_delta;
            }
            GameResult::Loss => {
                self.losses += 1;
                self.total_losses += -entry.balance_delta;
            }
            GameResult::Draw => self.draws += 1,
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(result: GameResult, balance_delta: i64, rating_delta: i32) -> LedgerEntry {
        LedgerEntry {
            player_id: "p1".to_string(),
            result,
            balance_delta,
            rating_delta,
        }
    }

    #[test]
    fn test_new_account_defaults() {
        let account = PlayerAccount::new("p1", 100);

        assert_eq!(account.rating, 1200);
        assert_eq!(account.balance, 100);
        assert_eq!(account.games_played, 0);
    }

    #[test]
    fn test_apply_win_updates_stats() {
        let mut account = PlayerAccount::new("p1", 100);

        account.apply_entry(&entry(GameResult::Win, 8, 38), Utc::now());

        assert_eq!(account.balance, 108);
        assert_eq!(account.rating, 1238);
        assert_eq!(account.total_winnings, 8);
        assert_eq!(account.wins, 1);
        assert_eq!(account.games_played, 1);
    }

    #[test]
    fn test_rating_never_drops_below_floor() {
        let mut account = PlayerAccount::new("p1", 100);
        account.rating = 105;

        account.apply_entry(&entry(GameResult::Loss, -10, -15), Utc::now());

        assert_eq!(account.rating, MIN_RATING);
        assert_eq!(account.balance, 90);
        assert_eq!(account.total_losses, 10);
        assert_eq!(account.losses, 1);
    }

    #[test]
    fn test_account_record_does_not_grow_with_games_played() {
        let mut account = PlayerAccount::new("p1", 100);
        account.apply_entry(&entry(GameResult::Draw, 0, 5), Utc::now());
        let after_one = serde_json::to_string(&account).unwrap().len();

        for _ in 0..20_000 {
            account.apply_entry(&entry(GameResult::Draw, 0, 5), Utc::now());
        }
        let after_many = serde_json::to_string(&account).unwrap().len();

        assert_eq!(account.draws, 20_001);
        // Only counters widen; no per-session data is kept on the account.
        assert!(after_many - after_one < 32, "{} -> {}", after_one, after_many);
    }
}
