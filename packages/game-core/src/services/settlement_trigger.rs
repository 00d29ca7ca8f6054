use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::{
    change_feed::ChangeObserver,
    models::{game_session::GameSession, settlement::SettlementOutcome},
    services::{
        errors::settlement_service_errors::SettlementServiceError,
        settlement_service::SettlementService,
    },
};

/// Runs settlement for session snapshots that are finished but not yet
/// settled. Fed by either change observer or the stream consumer.
const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SettlementTrigger {
    settlement: SettlementService,
}

impl SettlementTrigger {
    pub fn new(settlement: SettlementService) -> Self {
        SettlementTrigger { settlement }
    }

    /// Returns `None` when the snapshot needs nothing.
    pub async fn on_session_change(
        &self,
        snapshot: &GameSession,
    ) -> Result<Option<SettlementOutcome>, SettlementServiceError> {
        if !snapshot.state.is_terminal() || snapshot.settled {
            return Ok(None);
        }
        debug!("Session {} is finished, settling", snapshot.id);
        // The snapshot may be stale; settle reloads the canonical record.
        self.settlement.settle(&snapshot.id).await.map(Some)
    }

    /// Follows one session until it has been settled or the feed closes.
    /// A terminal snapshot gets no further writes until it is settled, so
    /// transient failures are retried here with backoff. Returns the last
    /// snapshot seen, unsettled if settlement failed permanently.
    pub async fn follow<O>(&self, observer: &mut O) -> Option<GameSession>
    where
        O: ChangeObserver<GameSession> + ?Sized,
    {
        let mut last = None;
        while let Some(snapshot) = observer.next_change().await {
            if snapshot.settled {
                info!("Session {} settled at version {}", snapshot.id, snapshot.version);
                return Some(snapshot);
            }
            if !self.settle_with_retry(&snapshot).await {
                return Some(snapshot);
            }
            last = Some(snapshot);
        }
        last
    }

    /// False once settlement has failed with an error a retry cannot fix.
    async fn settle_with_retry(&self, snapshot: &GameSession) -> bool {
        let mut backoff = RETRY_INITIAL_BACKOFF;
        loop {
            match self.on_session_change(snapshot).await {
                Ok(_) => return true,
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Settlement of session {} failed, retrying in {:?}: {}",
                        snapshot.id, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RETRY_MAX_BACKOFF);
                }
                Err(e) => {
                    error!("Settlement of session {} failed: {}", snapshot.id, e);
                    return false;
                }
            }
        }
    }
}
