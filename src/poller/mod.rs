//! Convergence polling for the crawl/index pipeline
//!
//! An always-on crawler has no terminal "done" state, so the harness has to
//! judge settlement from periodic queue snapshots. Per shard, with a fresh
//! timer each time, the poller samples the spider queue and decides between
//! settled, still working, timed out, and unreachable. Shards are polled
//! strictly sequentially; fixture-server observation ordering depends on it.
//!
//! Settlement branches, in order of evaluation per sample:
//!
//! - sampling failure: the shard is unreachable, give up immediately
//! - quiet (in progress, nothing doled, nothing spidering) with queued future
//!   work: settled once no queued task is due within the pending horizon
//! - quiet with no queued work: settled after a full quiet period of
//!   consecutive quiet samples (a single quiet read right after a task
//!   finishes is not trusted)
//! - initializing: settled-by-grace once the grace budget is spent, so a
//!   permanently broken instance cannot hang the run
//! - anything else: keep sampling until the per-shard cap expires

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::api::models::{ShardStatus, SP_INITIALIZING};
use crate::api::EngineApi;
use crate::error::Result;

/// Source of spider-queue snapshots for one shard
///
/// The seam exists so tests can script status sequences.
#[async_trait]
pub trait QueueStatusSource: Send + Sync {
    /// Sample the shard's current queue status
    async fn sample(&self) -> Result<ShardStatus>;
}

#[async_trait]
impl QueueStatusSource for EngineApi {
    async fn sample(&self) -> Result<ShardStatus> {
        Ok(self.spider_queue().await?)
    }
}

/// Timing knobs for the convergence poller
///
/// Defaults match the production budgets; tests shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between queue samples
    pub poll_interval: Duration,

    /// Consecutive quiet time required before trusting an empty queue
    pub quiet_period: Duration,

    /// How long an initializing shard is waited on before settling by grace
    pub init_grace: Duration,

    /// Hard per-shard cap on total polling time
    pub shard_cap: Duration,

    /// Queued work scheduled beyond this horizon is not due soon enough to
    /// matter
    pub pending_horizon: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            quiet_period: Duration::from_secs(5),
            init_grace: Duration::from_secs(5),
            shard_cap: Duration::from_secs(180),
            pending_horizon: Duration::from_secs(3600),
        }
    }
}

/// Why a shard was judged settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    /// Quiet with an empty queue for the full quiet period
    Quiet,
    /// Queued work exists but none of it is due within the horizon
    NoneDueSoon,
    /// Still initializing when the grace budget ran out
    InitGrace,
}

/// Outcome of polling one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardVerdict {
    /// Background work judged complete enough for verification
    Settled(SettleReason),
    /// Per-shard cap expired without settlement
    TimedOut,
    /// A queue sample failed; the shard cannot be judged at all
    Unreachable,
}

impl ShardVerdict {
    /// Whether verification may proceed for this shard
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

/// Poll one shard until it settles, times out, or becomes unreachable
pub async fn poll_shard(source: &dyn QueueStatusSource, config: &PollerConfig) -> ShardVerdict {
    let started = Instant::now();
    let mut quiet_since: Option<Instant> = None;

    loop {
        let status = match source.sample().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Spider queue sample failed, shard unreachable");
                return ShardVerdict::Unreachable;
            }
        };

        debug!(
            status_code = status.status_code,
            dole_ip_count = status.dole_ip_count,
            spider_count = status.spider_count,
            waiting_tree_count = status.waiting_tree_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Spider queue sample"
        );

        if status.is_quiet() {
            if status.waiting_tree_count > 0 {
                // Queued future work: due-soon tasks keep the shard pending,
                // far-future tasks do not block settlement.
                let horizon_ms =
                    Utc::now().timestamp_millis() + config.pending_horizon.as_millis() as i64;
                let due_soon = status
                    .waiting_trees
                    .iter()
                    .any(|tree| tree.spider_time < horizon_ms);

                if !due_soon {
                    debug!("All queued work beyond pending horizon, shard settled");
                    return ShardVerdict::Settled(SettleReason::NoneDueSoon);
                }
                quiet_since = None;
            } else {
                let since = *quiet_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= config.quiet_period {
                    debug!("Quiet period satisfied, shard settled");
                    return ShardVerdict::Settled(SettleReason::Quiet);
                }
            }
        } else {
            quiet_since = None;

            if status.status_code == SP_INITIALIZING && started.elapsed() >= config.init_grace {
                warn!("Shard still initializing after grace period, settling anyway");
                return ShardVerdict::Settled(SettleReason::InitGrace);
            }
        }

        if started.elapsed() >= config.shard_cap {
            warn!(
                status_code = status.status_code,
                dole_ip_count = status.dole_ip_count,
                spider_count = status.spider_count,
                "Shard polling cap exceeded"
            );
            return ShardVerdict::TimedOut;
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}
