//! crawlcheck - Integration test harness for a distributed crawl/search engine
//!
//! Drives a running engine cluster through complete crawl scenarios: start the
//! engine against a fixture web server, seed a crawl, wait for background
//! spidering to converge, verify index and crawl state through the engine's
//! HTTP API, and emit a JUnit-style report for CI.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and fixture placeholder expansion
//! - [`cluster`] - Engine control binary wrapper and instance addressing
//! - [`api`] - HTTP client for the engine admin/search API
//! - [`fixture`] - Fixture web server observation
//! - [`script`] - Test-script parsing and verb registry
//! - [`poller`] - Crawl convergence polling
//! - [`verify`] - Verification check catalog
//! - [`scenario`] - Scenario sequencing and teardown
//! - [`report`] - Run recording and JUnit XML rendering
//!
//! # Example
//!
//! ```no_run
//! use crawlcheck::config::Config;
//! use crawlcheck::fixture::HttpFixtureObserver;
//! use crawlcheck::scenario::ScenarioRunner;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let observer = HttpFixtureObserver::new(&config.observer_url(), config.request_timeout())?;
//!     let runner = ScenarioRunner::new(config, "basic", Box::new(observer))?;
//!     let recorder = runner.run().await;
//!     println!("{}", recorder.to_junit_xml());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fixture;
pub mod poller;
pub mod report;
pub mod scenario;
pub mod script;
pub mod verify;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::EngineApi;
    pub use crate::cluster::EngineCluster;
    pub use crate::config::{Config, TargetEnv};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::fixture::{FixtureObserver, HttpFixtureObserver};
    pub use crate::poller::{poll_shard, PollerConfig, ShardVerdict};
    pub use crate::report::{RunRecord, RunRecorder};
    pub use crate::scenario::ScenarioRunner;
    pub use crate::script::{Action, VerifyKind};
    pub use crate::verify::{CheckOutcome, Verifier};
}
