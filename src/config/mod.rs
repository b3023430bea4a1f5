//! Configuration management for the crawlcheck harness
//!
//! This module handles loading and validating configuration from environment
//! variables, TOML files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target engine configuration
    pub engine: EngineConfig,

    /// Fixture web server configuration
    pub fixture: FixtureConfig,

    /// Test case configuration
    pub tests: TestConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Configuration for the engine cluster under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory containing the engine control binary and instance tree
    pub path: PathBuf,

    /// Control binary invoked for start/stop/install actions
    pub control_bin: String,

    /// Engine host
    pub host: String,

    /// Base HTTP port of the first instance
    pub port: u16,

    /// Number of engine instances
    pub num_instances: u32,

    /// Number of shards (instances may mirror shards)
    pub num_shards: u32,

    /// Offset for running multiple clusters side by side
    pub offset: u32,

    /// Startup budget in seconds before the run is abandoned
    pub startup_budget_secs: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Configuration for the fixture web server serving test content
///
/// Scheme, domain and port are also the values substituted for the
/// `{SCHEME}`, `{DOMAIN}` and `{PORT}` placeholders in test fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// URL scheme served by the fixture server
    pub scheme: String,

    /// Domain under which fixture sites are served
    pub domain: String,

    /// Fixture server port
    pub port: u16,

    /// Bookkeeping endpoint returning the set of served URLs.
    /// Defaults to `http://127.0.0.1:{port}/served_urls` when unset.
    pub observer_url: Option<String>,
}

/// Test case configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Directory containing test cases
    pub testdir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                path: PathBuf::from("../engine"),
                control_bin: String::from("./gb"),
                host: String::from("127.0.0.1"),
                port: 28000,
                num_instances: 1,
                num_shards: 1,
                offset: 0,
                startup_budget_secs: 300,
                request_timeout_secs: 30,
            },
            fixture: FixtureConfig {
                scheme: String::from("http"),
                domain: String::from("fixture.test"),
                port: 28080,
                observer_url: None,
            },
            tests: TestConfig {
                testdir: PathBuf::from("tests"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every field has a default so a bare environment still yields a
    /// runnable configuration.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CRAWLCHECK_ENGINE_PATH") {
            config.engine.path = path.into();
        }
        if let Ok(bin) = std::env::var("CRAWLCHECK_CONTROL_BIN") {
            config.engine.control_bin = bin;
        }
        if let Ok(host) = std::env::var("CRAWLCHECK_ENGINE_HOST") {
            config.engine.host = host;
        }
        if let Some(port) = env_parse("CRAWLCHECK_ENGINE_PORT") {
            config.engine.port = port;
        }
        if let Some(n) = env_parse("CRAWLCHECK_NUM_INSTANCES") {
            config.engine.num_instances = n;
        }
        if let Some(n) = env_parse("CRAWLCHECK_NUM_SHARDS") {
            config.engine.num_shards = n;
        }
        if let Some(n) = env_parse("CRAWLCHECK_OFFSET") {
            config.engine.offset = n;
        }
        if let Some(n) = env_parse("CRAWLCHECK_STARTUP_BUDGET") {
            config.engine.startup_budget_secs = n;
        }
        if let Some(n) = env_parse("CRAWLCHECK_REQUEST_TIMEOUT") {
            config.engine.request_timeout_secs = n;
        }
        if let Ok(scheme) = std::env::var("CRAWLCHECK_FIXTURE_SCHEME") {
            config.fixture.scheme = scheme;
        }
        if let Ok(domain) = std::env::var("CRAWLCHECK_FIXTURE_DOMAIN") {
            config.fixture.domain = domain;
        }
        if let Some(port) = env_parse("CRAWLCHECK_FIXTURE_PORT") {
            config.fixture.port = port;
        }
        if let Ok(url) = std::env::var("CRAWLCHECK_OBSERVER_URL") {
            config.fixture.observer_url = Some(url);
        }
        if let Ok(dir) = std::env::var("CRAWLCHECK_TESTDIR") {
            config.tests.testdir = dir.into();
        }
        if let Ok(level) = std::env::var("CRAWLCHECK_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("CRAWLCHECK_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&content).context("Invalid config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.engine.num_shards == 0 {
            anyhow::bail!("num_shards must be at least 1");
        }
        if self.engine.num_instances < self.engine.num_shards {
            anyhow::bail!(
                "num_instances ({}) must not be less than num_shards ({})",
                self.engine.num_instances,
                self.engine.num_shards
            );
        }
        if self.engine.num_instances % self.engine.num_shards != 0 {
            anyhow::bail!("num_instances must be a multiple of num_shards");
        }
        if self.fixture.scheme != "http" && self.fixture.scheme != "https" {
            anyhow::bail!("unsupported fixture scheme: {}", self.fixture.scheme);
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.request_timeout_secs)
    }

    /// Get startup budget as Duration
    pub fn startup_budget(&self) -> Duration {
        Duration::from_secs(self.engine.startup_budget_secs)
    }

    /// Build the placeholder-substitution environment for fixture URLs
    pub fn target_env(&self) -> TargetEnv {
        TargetEnv {
            scheme: self.fixture.scheme.clone(),
            domain: self.fixture.domain.clone(),
            port: self.fixture.port,
        }
    }

    /// Resolve the fixture observer endpoint
    pub fn observer_url(&self) -> String {
        self.fixture
            .observer_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}/served_urls", self.fixture.port))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Substitution environment for `{SCHEME}`, `{DOMAIN}` and `{PORT}`
/// placeholders in seeds, instruction items and engine config files
///
/// Fixture content is addressed by placeholder so the same test case runs
/// against whatever scheme/domain/port the fixture server was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    /// Scheme substituted for `{SCHEME}`
    pub scheme: String,

    /// Domain substituted for `{DOMAIN}`
    pub domain: String,

    /// Port substituted for `{PORT}`
    pub port: u16,
}

impl TargetEnv {
    /// Expand all placeholders in a fixture string
    pub fn expand(&self, raw: &str) -> String {
        raw.replace("{SCHEME}", &self.scheme)
            .replace("{DOMAIN}", &self.domain)
            .replace("{PORT}", &self.port.to_string())
    }

    /// Whether result URLs need an explicit `http://` prefix restored
    ///
    /// The engine omits the scheme from result URLs when it is plain http.
    pub fn is_plain_http(&self) -> bool {
        self.scheme == "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_shard_counts() {
        let mut config = Config::default();
        config.engine.num_shards = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.num_instances = 2;
        config.engine.num_shards = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.num_instances = 3;
        config.engine.num_shards = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_target_env_expand() {
        let env = TargetEnv {
            scheme: "http".to_string(),
            domain: "fixture.test".to_string(),
            port: 28080,
        };

        assert_eq!(
            env.expand("{SCHEME}://site.{DOMAIN}:{PORT}/index.html"),
            "http://site.fixture.test:28080/index.html"
        );
        assert_eq!(env.expand("no placeholders"), "no placeholders");
    }

    #[test]
    fn test_observer_url_default() {
        let config = Config::default();
        assert_eq!(
            config.observer_url(),
            "http://127.0.0.1:28080/served_urls"
        );

        let mut config = Config::default();
        config.fixture.observer_url = Some("http://10.0.0.1:9999/urls".to_string());
        assert_eq!(config.observer_url(), "http://10.0.0.1:9999/urls");
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [engine]
            path = "/opt/engine"
            control_bin = "./gb"
            host = "127.0.0.1"
            port = 28000
            num_instances = 2
            num_shards = 2
            offset = 1
            startup_budget_secs = 300
            request_timeout_secs = 30

            [fixture]
            scheme = "http"
            domain = "fixture.test"
            port = 28080

            [tests]
            testdir = "tests"

            [logging]
            level = "debug"
            format = "text"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.offset, 1);
        assert_eq!(config.engine.num_shards, 2);
        assert!(config.validate().is_ok());
    }
}
