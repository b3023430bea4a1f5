//! Convergence poller behavior against scripted queue sources

mod common;

use std::time::Duration;

use chrono::Utc;

use common::{
    busy_status, initializing_status, pending_status, quiet_status, ScriptedQueueSource,
};
use crawlcheck::api::ApiError;
use crawlcheck::error::Error;
use crawlcheck::poller::{poll_shard, PollerConfig, SettleReason, ShardVerdict};

/// Millisecond-scale budgets so tests finish quickly
fn fast_config() -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_millis(5),
        quiet_period: Duration::from_millis(30),
        init_grace: Duration::from_millis(40),
        shard_cap: Duration::from_millis(500),
        pending_horizon: Duration::from_secs(3600),
    }
}

#[tokio::test]
async fn test_settles_after_sustained_quiet() {
    let source = ScriptedQueueSource::new(vec![Ok(quiet_status())]);
    let verdict = poll_shard(&source, &fast_config()).await;
    assert_eq!(verdict, ShardVerdict::Settled(SettleReason::Quiet));
}

#[tokio::test]
async fn test_single_quiet_sample_is_not_trusted() {
    // Quiet once, then busy again: the streak must restart and only the
    // later sustained quiet stretch settles the shard.
    let source = ScriptedQueueSource::new(vec![
        Ok(quiet_status()),
        Ok(busy_status()),
        Ok(quiet_status()),
    ]);

    let config = fast_config();
    let started = std::time::Instant::now();
    let verdict = poll_shard(&source, &config).await;

    assert_eq!(verdict, ShardVerdict::Settled(SettleReason::Quiet));
    // At least two poll intervals plus a full quiet period elapsed.
    assert!(started.elapsed() >= config.poll_interval * 2 + config.quiet_period);
}

#[tokio::test]
async fn test_busy_shard_times_out() {
    let source = ScriptedQueueSource::new(vec![Ok(busy_status())]);
    let config = PollerConfig {
        shard_cap: Duration::from_millis(50),
        ..fast_config()
    };

    let verdict = poll_shard(&source, &config).await;
    assert_eq!(verdict, ShardVerdict::TimedOut);
}

#[tokio::test]
async fn test_sample_error_means_unreachable() {
    let source = ScriptedQueueSource::new(vec![
        Ok(busy_status()),
        Err(Error::Api(ApiError::Status(502))),
    ]);

    let verdict = poll_shard(&source, &fast_config()).await;
    assert_eq!(verdict, ShardVerdict::Unreachable);
}

#[tokio::test]
async fn test_initializing_settles_by_grace() {
    let source = ScriptedQueueSource::new(vec![Ok(initializing_status())]);
    let config = fast_config();

    let started = std::time::Instant::now();
    let verdict = poll_shard(&source, &config).await;

    assert_eq!(verdict, ShardVerdict::Settled(SettleReason::InitGrace));
    assert!(started.elapsed() >= config.init_grace);
}

#[tokio::test]
async fn test_far_future_work_settles_immediately() {
    // Queued task two hours out, beyond the one-hour horizon.
    let far = Utc::now().timestamp_millis() + 2 * 3600 * 1000;
    let source = ScriptedQueueSource::new(vec![Ok(pending_status(far))]);

    let verdict = poll_shard(&source, &fast_config()).await;
    assert_eq!(verdict, ShardVerdict::Settled(SettleReason::NoneDueSoon));
}

#[tokio::test]
async fn test_due_soon_work_keeps_polling() {
    // Queued task one minute out: within the horizon, so the shard never
    // settles and the cap expires.
    let soon = Utc::now().timestamp_millis() + 60 * 1000;
    let source = ScriptedQueueSource::new(vec![Ok(pending_status(soon))]);
    let config = PollerConfig {
        shard_cap: Duration::from_millis(50),
        ..fast_config()
    };

    let verdict = poll_shard(&source, &config).await;
    assert_eq!(verdict, ShardVerdict::TimedOut);
}

#[tokio::test]
async fn test_due_soon_work_resets_quiet_streak() {
    // Empty-queue quiet, then due-soon work, then empty-queue quiet again.
    // The pending sample must reset the streak.
    let soon = Utc::now().timestamp_millis() + 60 * 1000;
    let source = ScriptedQueueSource::new(vec![
        Ok(quiet_status()),
        Ok(quiet_status()),
        Ok(pending_status(soon)),
        Ok(quiet_status()),
    ]);

    let config = fast_config();
    let started = std::time::Instant::now();
    let verdict = poll_shard(&source, &config).await;

    assert_eq!(verdict, ShardVerdict::Settled(SettleReason::Quiet));
    assert!(started.elapsed() >= config.poll_interval * 3 + config.quiet_period);
}
