use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use shared_config::BookingConfig;
use verification_cell::services::OtpChallengeService;

use crate::services::reservation::SlotReservationStore;
use crate::services::sessions::SessionRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub holds_released: usize,
    pub codes_purged: usize,
    pub sessions_pruned: usize,
    pub channels_closed: usize,
}

/// Periodic cleanup of lapsed holds, expired codes, idle sessions and
/// abandoned slot event channels.
pub struct HoldSweeper {
    store: Arc<dyn SlotReservationStore>,
    otp: Arc<OtpChallengeService>,
    sessions: Arc<SessionRegistry>,
    interval: Duration,
}

impl HoldSweeper {
    pub fn new(
        store: Arc<dyn SlotReservationStore>,
        otp: Arc<OtpChallengeService>,
        sessions: Arc<SessionRegistry>,
        config: &BookingConfig,
    ) -> Self {
        Self {
            store,
            otp,
            sessions,
            interval: Duration::from_secs(config.hold_sweep_interval_seconds.max(1)),
        }
    }

    pub async fn run_once(&self) -> SweepReport {
        let holds_released = match self.store.release_expired_holds().await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to release expired holds: {}", e);
                0
            }
        };

        let report = SweepReport {
            holds_released,
            codes_purged: self.otp.purge_expired().await,
            sessions_pruned: self.sessions.prune_idle().await,
            channels_closed: self.store.prune_idle_channels().await,
        };

        if report != SweepReport::default() {
            info!(
                "Sweep released {} holds, purged {} codes, pruned {} sessions, closed {} channels",
                report.holds_released, report.codes_purged, report.sessions_pruned, report.channels_closed
            );
        }
        report
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Hold sweeper running every {:?}", self.interval);
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                debug!("Running hold sweep");
                self.run_once().await;
            }
        })
    }
}
