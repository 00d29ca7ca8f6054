use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::warn;

use super::{ChangeObserver, SnapshotSource, VersionGate, Versioned};

/// Fallback observer that reloads the record on a fixed interval. A poll
/// that finds the same version yields nothing.
pub struct PollingObserver<T: Versioned> {
    source: Arc<dyn SnapshotSource<T>>,
    gate: VersionGate,
    ticker: Interval,
}

impl<T: Versioned> PollingObserver<T> {
    pub fn new(source: Arc<dyn SnapshotSource<T>>, record_id: &str, period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        PollingObserver {
            source,
            gate: VersionGate::new(record_id),
            ticker,
        }
    }
}

#[async_trait]
impl<T: Versioned> ChangeObserver<T> for PollingObserver<T> {
    async fn next_change(&mut self) -> Option<T> {
        loop {
            self.ticker.tick().await;
            match self.source.latest(&self.gate.record_id).await {
                Ok(Some(snapshot)) if self.gate.admit(&snapshot) => return Some(snapshot),
                Ok(_) => {}
                Err(e) => warn!("Polling {} failed: {}", self.gate.record_id, e),
            }
        }
    }
}
