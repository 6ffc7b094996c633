//! Periodic refresh of the leaderboards.
//!
//! The score ranking and the current day's check-in ranking are reloaded on a
//! fixed interval so readers rarely hit a cold or stale ranking.

use std::time::Duration;

use bbscache_core::day_bucket;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::entities::ForumCaches;

/// Configuration for the refresh scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the rankings are reloaded.
    /// Default: 600 seconds (10 minutes)
    pub refresh_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(600),
        }
    }
}

/// Outcome of one refresh round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub day: i64,
    pub score_rank_loaded: bool,
    pub check_in_rank_loaded: bool,
}

/// Background task reloading the rankings.
pub struct RefreshScheduler {
    caches: ForumCaches,
    config: SchedulerConfig,
}

impl RefreshScheduler {
    pub fn new(caches: ForumCaches, config: SchedulerConfig) -> Self {
        Self { caches, config }
    }

    /// Start the scheduler in a background task.
    ///
    /// The first round runs immediately. The task stops once `shutdown`
    /// turns `true` or its sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                refresh_interval_secs = self.config.refresh_interval.as_secs(),
                "Refresh scheduler started"
            );

            let mut ticker = interval(self.config.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Refresh scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Refresh both rankings once, for the current UTC day.
    pub async fn run_once(&self) -> RefreshReport {
        self.run_for(OffsetDateTime::now_utc()).await
    }

    /// Refresh both rankings as if the current time were `now`.
    pub async fn run_for(&self, now: OffsetDateTime) -> RefreshReport {
        let day = day_bucket(now);
        let score = self.caches.score_rank.refresh().await;
        let check_in = self.caches.check_in_rank.refresh(day).await;

        let report = RefreshReport {
            day,
            score_rank_loaded: score.is_some(),
            check_in_rank_loaded: check_in.is_some(),
        };
        debug!(?report, "Rankings refreshed");
        report
    }
}
