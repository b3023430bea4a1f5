//! Scenario sequencing
//!
//! One scenario run: clean and start the engine cluster, apply baseline
//! configuration, run the test case's instruction files (or the full fixed
//! verification sequence when there are none), then tear down. Teardown
//! (force-deleting tracked URLs and stopping the engine) runs on every exit
//! path; the only fatal condition is startup-budget exhaustion, which skips
//! verification but still reaches teardown and the report.
//!
//! All engine calls are awaited sequentially. The tracked-URL set and the
//! process-epoch baseline are the only mutable run-scoped state, both owned
//! here.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::api::models::{SP_INITIALIZING, SP_IN_PROGRESS};
use crate::api::EngineApi;
use crate::cluster::EngineCluster;
use crate::config::{Config, TargetEnv};
use crate::error::{Error, Result};
use crate::fixture::FixtureObserver;
use crate::poller::{poll_shard, PollerConfig};
use crate::report::{RunRecord, RunRecorder};
use crate::script::{self, Action, ConfigVerb, VerifyKind};
use crate::verify::{CheckOutcome, Verifier};

/// URLs seeded or injected during this run, retained for forced teardown
///
/// Grows on every add/inject, shrinks on explicit delete, and is drained
/// unconditionally (failures ignored) when the run finalizes.
#[derive(Debug, Default)]
pub struct TrackedUrls(HashSet<String>);

impl TrackedUrls {
    /// Track a seeded or injected URL
    pub fn insert(&mut self, url: impl Into<String>) {
        self.0.insert(url.into());
    }

    /// Stop tracking an explicitly deleted URL
    pub fn remove(&mut self, url: &str) {
        self.0.remove(url);
    }

    /// Take every tracked URL, leaving the set empty
    pub fn drain(&mut self) -> Vec<String> {
        self.0.drain().collect()
    }

    /// Number of currently tracked URLs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of the per-check process-epoch liveness comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Baseline matches; in-flight state can be trusted
    Fresh,
    /// Process-start timestamp changed: the engine restarted unplanned
    Restarted,
    /// The timestamp could not be fetched; nothing can be concluded
    Unknown,
}

/// Detects unplanned engine restarts from the process-start timestamp
///
/// A mismatch invalidates trust in in-flight state observed before it, so
/// the current check is marked failed and the baseline refreshed, letting
/// the next check be evaluated cleanly.
#[derive(Debug, Default)]
pub struct EpochGuard {
    baseline: Option<i64>,
}

impl EpochGuard {
    /// Set the baseline after a successful startup
    pub fn capture(&mut self, epoch: i64) {
        self.baseline = Some(epoch);
    }

    /// Compare a freshly fetched timestamp against the baseline
    pub fn assess(&mut self, current: Option<i64>) -> GuardVerdict {
        match (self.baseline, current) {
            (_, None) => GuardVerdict::Unknown,
            (None, Some(now)) => {
                self.baseline = Some(now);
                GuardVerdict::Fresh
            }
            (Some(baseline), Some(now)) if baseline == now => GuardVerdict::Fresh,
            (Some(_), Some(now)) => {
                self.baseline = Some(now);
                GuardVerdict::Restarted
            }
        }
    }
}

/// Drives one test-case scenario end to end
pub struct ScenarioRunner {
    config: Config,
    cluster: EngineCluster,
    /// One client per shard; index 0 is the primary instance
    apis: Vec<EngineApi>,
    fixture: Box<dyn FixtureObserver>,
    env: TargetEnv,
    poller_config: PollerConfig,
    recorder: RunRecorder,
    guard: EpochGuard,
    tracked: TrackedUrls,
    testcase: String,
    testcase_dir: PathBuf,
    config_dir: PathBuf,
}

impl ScenarioRunner {
    /// Build a runner for the named test case
    pub fn new(config: Config, testcase: &str, fixture: Box<dyn FixtureObserver>) -> Result<Self> {
        config.validate().map_err(|e| Error::config(e.to_string()))?;

        let cluster = EngineCluster::new(
            config.engine.offset,
            &config.engine.path,
            &config.engine.control_bin,
            config.engine.num_instances,
            config.engine.num_shards,
            config.engine.port,
        )?;

        let timeout = config.request_timeout();
        let host_offset = cluster.spider_host_offset();
        let mut apis = Vec::with_capacity(cluster.num_shards() as usize);
        for shard in 0..cluster.num_shards() {
            apis.push(EngineApi::new(
                &config.engine.host,
                cluster.instance_port(host_offset + shard),
                timeout,
            )?);
        }

        Self::with_parts(config, testcase, cluster, apis, fixture, PollerConfig::default())
    }

    /// Build a runner from explicit parts (bespoke wiring and tests)
    pub fn with_parts(
        config: Config,
        testcase: &str,
        cluster: EngineCluster,
        apis: Vec<EngineApi>,
        fixture: Box<dyn FixtureObserver>,
        poller_config: PollerConfig,
    ) -> Result<Self> {
        if apis.is_empty() {
            return Err(Error::config("at least one shard API client is required"));
        }

        let testcase_dir = config.tests.testdir.join(testcase);
        let config_dir = testcase_dir.join("testcase");
        let description = read_description(&testcase_dir).unwrap_or_else(|| testcase.to_string());
        let recorder = RunRecorder::new(testcase, cluster.offset(), &description);
        let env = config.target_env();

        Ok(Self {
            config,
            cluster,
            apis,
            fixture,
            env,
            poller_config,
            recorder,
            guard: EpochGuard::default(),
            tracked: TrackedUrls::default(),
            testcase: testcase.to_string(),
            testcase_dir,
            config_dir,
        })
    }

    /// Run the scenario to completion and hand back the accumulated records
    pub async fn run(mut self) -> RunRecorder {
        if !self.config_dir.is_dir() {
            warn!(
                testcase = %self.testcase,
                dir = %self.config_dir.display(),
                "Test case has no config directory, nothing to run"
            );
            return self.recorder;
        }

        if self.start_engine().await {
            let instruction_files = self.run_instruction_files().await;
            if instruction_files == 0 {
                self.run_full_sequence().await;
            }
        }

        self.finalize().await;
        self.recorder
    }

    fn primary(&self) -> EngineApi {
        self.apis[0].clone()
    }

    /// Append a record, annotating it with the process-epoch liveness check
    async fn push_with_guard(&mut self, mut record: RunRecord) {
        let current = self.primary().process_start_time().await.ok();
        if self.guard.assess(current) == GuardVerdict::Restarted {
            warn!(record = %record.name, "Engine restarted unexpectedly");
            record = record.with_failure_note("engine restarted");
        }
        self.recorder.push(record);
    }

    async fn record(&mut self, kind: &str, item: &str, started: Instant, outcome: &CheckOutcome) {
        if let Some(reason) = outcome.reason() {
            warn!(kind = kind, item = item, reason = reason, "Check failed");
        }
        let record = RunRecord::new(kind, item, started).with_outcome(outcome);
        self.push_with_guard(record).await;
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    async fn start_engine(&mut self) -> bool {
        info!("Cleaning old engine data");
        if let Err(e) = self.cluster.clean().await {
            warn!(error = %e, "Cleanup failed, continuing");
        }

        info!("Staging test case config files");
        if let Err(e) = self.stage_config_files().await {
            warn!(error = %e, "Config file staging failed, continuing");
        }

        info!("Starting engine");
        let started = Instant::now();
        if let Err(e) = self.cluster.start().await {
            warn!(error = %e, "Engine start command failed");
        }

        let budget = self.config.startup_budget();
        let mut up = false;
        loop {
            match self.try_bring_up().await {
                Ok(()) => {
                    up = true;
                    break;
                }
                Err(e) if e.is_connectivity() => {
                    debug!(error = %e, "Engine not answering yet");
                }
                Err(e) => {
                    warn!(error = %e, "Startup attempt failed");
                }
            }

            if started.elapsed() > budget {
                warn!(budget_secs = budget.as_secs(), "Engine did not start within budget");
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let mut record = RunRecord::new("pre", "start", started);
        if !up {
            record = record.with_failure("pre - start - failed");
        }
        self.recorder.push(record);
        up
    }

    /// One bring-up attempt: wait for all instances to answer, baseline the
    /// process epoch, apply configuration
    async fn try_bring_up(&mut self) -> Result<()> {
        self.wait_process_up().await?;

        let epoch = self.primary().process_start_time().await?;
        self.guard.capture(epoch);

        self.apply_baseline_config().await?;

        // Give the engine a moment after configuration before first use.
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    /// Wait until each instance reports initializing or in-progress
    ///
    /// Transport errors propagate so the startup loop retries the whole
    /// bring-up; a stubborn status code merely logs after the cap.
    async fn wait_process_up(&self) -> Result<()> {
        for api in &self.apis {
            let started = Instant::now();
            loop {
                let status = api.status().await?;
                if status.status_code == SP_INITIALIZING || status.status_code == SP_IN_PROGRESS {
                    break;
                }

                if started.elapsed() >= Duration::from_secs(60) {
                    warn!(
                        base_url = api.base_url(),
                        status_code = status.status_code,
                        "Instance not up after process-up cap"
                    );
                    break;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        Ok(())
    }

    async fn stage_config_files(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.config_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                let name = self.cluster.stage_config_file(&path, &self.env).await?;
                self.cluster.install_file(&name).await?;
            }
        }
        Ok(())
    }

    async fn apply_baseline_config(&mut self) -> Result<()> {
        let api = self.primary();

        api.config_crawldelay("0", "0").await?;
        api.config_dns("127.0.0.1", "").await?;

        // Debug/trace logs the test runs depend on for diagnosis.
        for flag in ["ldq", "ldspid", "ltrc_sp", "ltrc_msgfour", "ltrc_xmldoc"] {
            api.config_log(&[(flag.to_string(), "1".to_string())]).await?;
        }

        self.custom_config(&[]).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Instruction dispatch
    // ------------------------------------------------------------------

    /// Run every `instructions*` file in order; returns how many were found
    async fn run_instruction_files(&mut self) -> usize {
        let mut filenames: Vec<PathBuf> = match std::fs::read_dir(&self.config_dir) {
            Ok(entries) => entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("instructions"))
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        filenames.sort();

        for filename in &filenames {
            info!(file = %filename.display(), "Processing instruction file");
            let lines = script::read_lines(filename);
            for instruction in script::parse_script(&lines) {
                self.dispatch(&instruction.verb, &instruction.args).await;
            }
        }

        filenames.len()
    }

    async fn dispatch(&mut self, verb: &str, args: &[String]) {
        match script::resolve(verb) {
            Some(Action::Verify(kind)) => self.run_verify(kind, args).await,
            Some(Action::Seed) => self.seed(args).await,
            Some(Action::Dump) => self.dump().await,
            Some(Action::WaitSpiderDone) => {
                self.wait_spider_done().await;
            }
            Some(Action::CustomConfig) => self.custom_config(args).await,
            Some(Action::Config(config_verb)) => {
                if let Err(e) = self.apply_config_action(config_verb, args).await {
                    warn!(verb = verb, error = %e, "Configuration instruction failed");
                }
            }
            None => {
                warn!(verb = verb, "Unknown instruction");
                let record = RunRecord::new(verb, &args.join(" "), Instant::now())
                    .with_failure(format!("unknown instruction {verb:?}"));
                self.recorder.push(record);
            }
        }
    }

    /// Apply the `custom_config` file (or an inline configuration line)
    ///
    /// Fail-soft per line: a broken line is reported and the rest applied.
    async fn custom_config(&mut self, args: &[String]) {
        let items = self.items_for("custom_config", args, false);

        for item in items {
            let tokens: Vec<String> = item.split_whitespace().map(str::to_string).collect();
            let Some((verb, rest)) = tokens.split_first() else {
                continue;
            };

            match script::resolve(verb) {
                Some(Action::Config(config_verb)) => {
                    if let Err(e) = self.apply_config_action(config_verb, rest).await {
                        warn!(verb = %verb, error = %e, "Custom config line failed");
                    }
                }
                _ => warn!(verb = %verb, "Unknown custom config instruction"),
            }
        }
    }

    async fn apply_config_action(&mut self, verb: ConfigVerb, tokens: &[String]) -> Result<()> {
        let api = self.primary();

        match verb {
            ConfigVerb::Sitelist => {
                let sitelist = self.env.expand(&tokens.join(" "));
                api.config_sitelist(&sitelist).await?;
            }
            ConfigVerb::CrawlDelay => {
                script::require_args("config_crawldelay", tokens, 2)?;
                api.config_crawldelay(&tokens[0], &tokens[1]).await?;
            }
            ConfigVerb::Dns => {
                script::require_args("config_dns", tokens, 1)?;
                let secondary = tokens.get(1).map(String::as_str).unwrap_or("");
                api.config_dns(&tokens[0], secondary).await?;
            }
            ConfigVerb::Log => {
                let pairs = script::pair_key_values("config_log", tokens)?;
                api.config_log(&pairs).await?;
            }
            ConfigVerb::AddUrl => {
                script::require_args("add_url", tokens, 1)?;
                let url = self.env.expand(&tokens[0]);
                self.tracked.insert(url.clone());
                let accepted = api.add_url(&url).await?;
                if !accepted {
                    warn!(url = %url, "Engine rejected add_url");
                }
            }
            ConfigVerb::InjectUrl => {
                script::require_args("inject_url", tokens, 1)?;
                let url = self.env.expand(&tokens[0]);
                self.tracked.insert(url.clone());
                let accepted = api.inject_url(&url).await?;
                if !accepted {
                    warn!(url = %url, "Engine rejected inject_url");
                }
            }
            ConfigVerb::DeleteUrl => {
                script::require_args("delete_url", tokens, 1)?;
                let url = self.env.expand(&tokens[0]);
                self.tracked.remove(&url);
                if !api.delete_url(&url).await {
                    warn!(url = %url, "Engine did not acknowledge delete_url");
                }
            }
            ConfigVerb::Save => {
                api.save().await?;
            }
        }

        Ok(())
    }

    /// Resolve a verb's items: inline argument or fixture file fallback
    fn items_for(&self, verb: &str, args: &[String], single_url: bool) -> Vec<String> {
        if !args.is_empty() {
            if single_url {
                vec![args[0].clone()]
            } else {
                vec![args.join(" ")]
            }
        } else {
            script::read_lines(&self.config_dir.join(verb))
        }
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    async fn run_verify(&mut self, kind: VerifyKind, args: &[String]) {
        let verb = kind.verb();
        let items = self.items_for(verb, args, kind.takes_single_url());
        if items.is_empty() {
            return;
        }
        info!(check = verb, items = items.len(), "Running test");

        if kind == VerifyKind::OnlySpidered {
            let started = Instant::now();
            let api = self.primary();
            let outcomes = Verifier::new(&api, self.fixture.as_ref(), &self.env)
                .only_spidered(&items)
                .await;
            for (name, outcome) in outcomes {
                self.record(verb, &name, started, &outcome).await;
            }
            return;
        }

        for item in items {
            let started = Instant::now();
            let api = self.primary();
            let outcome = Verifier::new(&api, self.fixture.as_ref(), &self.env)
                .check(kind, &item)
                .await;
            self.record(verb, &item, started, &outcome).await;
        }
    }

    /// Seed the crawl: inline URL, seeds file, or one site per fixture dir
    async fn seed(&mut self, args: &[String]) {
        info!("Seeding crawl");

        let mut seeds: Vec<String> = Vec::new();
        if let Some(first) = args.first() {
            if !first.is_empty() {
                seeds.push(self.env.expand(first));
            }
        } else {
            for line in script::read_lines(&self.config_dir.join("seeds")) {
                seeds.push(self.env.expand(&line));
            }
        }

        if seeds.is_empty() {
            // Default: every sibling directory of the config dir is a
            // fixture site named <dir>.<testcase>.<domain>.
            if let Ok(entries) = std::fs::read_dir(&self.testcase_dir) {
                for entry in entries.flatten() {
                    if entry.path().is_dir() && entry.file_name() != "testcase" {
                        let site = entry.file_name().to_string_lossy().to_string();
                        seeds.push(format!(
                            "{}://{}.{}.{}:{}/",
                            self.env.scheme, site, self.testcase, self.env.domain, self.env.port
                        ));
                    }
                }
                seeds.sort();
            }
        }

        let sitelist = seeds.join("\n");
        debug!(sitelist = %sitelist, "Applying site list");
        if let Err(e) = self.primary().config_sitelist(&sitelist).await {
            warn!(error = %e, "Seeding failed");
        }
    }

    async fn dump(&mut self) {
        let started = Instant::now();
        let outcome = match self.primary().dump().await {
            Ok(()) => CheckOutcome::Pass,
            Err(e) => CheckOutcome::fail(format!("dump failed: {e}")),
        };
        self.record("dump", "", started, &outcome).await;
    }

    /// Run the convergence poller across all shards, sequentially
    ///
    /// Returns whether every shard settled. Each settled shard triggers a
    /// best-effort cluster save; a failed save is surfaced as a soft warning
    /// on the shard's record without retracting the verdict.
    async fn wait_spider_done(&mut self) -> bool {
        info!("Waiting for crawl to converge");

        let mut all_settled = true;
        for shard in 0..self.apis.len() {
            let api = self.apis[shard].clone();
            let started = Instant::now();

            let verdict = poll_shard(&api, &self.poller_config).await;
            info!(shard = shard, verdict = ?verdict, "Shard polling finished");

            let mut record = RunRecord::new("pre", "spider", started);
            if verdict.is_settled() {
                if let Err(e) = self.primary().save().await {
                    warn!(error = %e, "Cluster save after settlement failed");
                    record = record.with_warning(format!("cluster save failed: {e}"));
                } else {
                    // Let the engine's mode change take effect.
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            } else {
                all_settled = false;
                record = record.with_failure(format!("pre - spider - failed ({verdict:?})"));
            }

            self.push_with_guard(record).await;
        }

        match self.fixture.served_urls().await {
            Ok(urls) => {
                for url in &urls {
                    info!(url = %url, "Spidered");
                }
            }
            Err(e) => debug!(error = %e, "Could not list served URLs"),
        }

        all_settled
    }

    /// The full fixed verification sequence for test cases without
    /// instruction files
    async fn run_full_sequence(&mut self) {
        self.seed(&[]).await;

        // Only verify once spidering converged on every shard.
        if !self.wait_spider_done().await {
            return;
        }

        self.run_verify(VerifyKind::QueryLanguage, &[]).await;
        self.run_verify(VerifyKind::QueryTerms, &[]).await;
        self.run_verify(VerifyKind::JustSearch, &[]).await;
        self.run_verify(VerifyKind::Indexed, &[]).await;
        self.run_verify(VerifyKind::NotIndexed, &[]).await;
        self.run_verify(VerifyKind::SearchResultUrl, &[]).await;
        self.run_verify(VerifyKind::SearchResultTitleSummary, &[]).await;
        self.run_verify(VerifyKind::Spidered, &[]).await;
        self.run_verify(VerifyKind::OnlySpidered, &[]).await;
        self.run_verify(VerifyKind::NotSpidered, &[]).await;
        self.run_verify(VerifyKind::SpiderResponse, &[]).await;
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Unconditional teardown: drain tracked URLs, then stop the engine
    async fn finalize(&mut self) {
        let api = self.primary();
        for url in self.tracked.drain() {
            if !api.delete_url(&url).await {
                debug!(url = %url, "Force delete unacknowledged");
            }
        }

        info!("Stopping engine");
        if let Err(e) = self.cluster.stop().await {
            warn!(error = %e, "Engine stop failed");
        }
    }
}

/// First line of the test case's README, with periods stripped
fn read_description(testcase_dir: &std::path::Path) -> Option<String> {
    let content = std::fs::read_to_string(testcase_dir.join("README")).ok()?;
    let first = content.lines().next()?.replace('.', "");
    if first.is_empty() {
        None
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_urls_lifecycle() {
        let mut tracked = TrackedUrls::default();
        assert!(tracked.is_empty());

        tracked.insert("http://a.fixture.test/");
        tracked.insert("http://b.fixture.test/");
        tracked.insert("http://a.fixture.test/");
        assert_eq!(tracked.len(), 2);

        tracked.remove("http://b.fixture.test/");
        assert_eq!(tracked.len(), 1);

        let drained = tracked.drain();
        assert_eq!(drained, vec!["http://a.fixture.test/".to_string()]);
        assert!(tracked.is_empty());
    }

    #[test]
    fn test_epoch_guard_fresh_and_restart() {
        let mut guard = EpochGuard::default();
        guard.capture(1000);

        assert_eq!(guard.assess(Some(1000)), GuardVerdict::Fresh);
        // Restart detected once, then the refreshed baseline is clean
        assert_eq!(guard.assess(Some(2000)), GuardVerdict::Restarted);
        assert_eq!(guard.assess(Some(2000)), GuardVerdict::Fresh);
    }

    #[test]
    fn test_epoch_guard_unknown_and_adoption() {
        let mut guard = EpochGuard::default();
        assert_eq!(guard.assess(None), GuardVerdict::Unknown);
        // First observed epoch is adopted, not flagged
        assert_eq!(guard.assess(Some(500)), GuardVerdict::Fresh);
        assert_eq!(guard.assess(None), GuardVerdict::Unknown);
        assert_eq!(guard.assess(Some(500)), GuardVerdict::Fresh);
    }
}
