use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlcheck::config::Config;
use crawlcheck::fixture::HttpFixtureObserver;
use crawlcheck::scenario::ScenarioRunner;

#[derive(Parser)]
#[command(
    name = "crawlcheck",
    version,
    about = "Integration test harness for a distributed crawl/search engine",
    long_about = None
)]
struct Cli {
    /// Name of the test case to run
    testcase: String,

    /// Directory containing test cases
    #[arg(long)]
    testdir: Option<String>,

    /// Cluster offset for running several harness instances side by side
    #[arg(short, long)]
    offset: Option<u32>,

    /// Directory containing the engine control binary and instance tree
    #[arg(short, long)]
    path: Option<String>,

    /// Number of engine instances
    #[arg(long)]
    num_instances: Option<u32>,

    /// Number of shards
    #[arg(long)]
    num_shards: Option<u32>,

    /// Engine host
    #[arg(long)]
    host: Option<String>,

    /// Base HTTP port of the first engine instance
    #[arg(long)]
    port: Option<u16>,

    /// Scheme the fixture server serves under
    #[arg(long)]
    dest_scheme: Option<String>,

    /// Domain the fixture server serves under
    #[arg(long)]
    dest_domain: Option<String>,

    /// Port the fixture server serves under
    #[arg(long)]
    dest_port: Option<u16>,

    /// Fixture server bookkeeping endpoint
    #[arg(long)]
    observer_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Cli {
    /// Environment-derived configuration with command-line overrides applied
    fn into_config(self) -> Result<(Config, String)> {
        let mut config = Config::from_env()?;

        if let Some(testdir) = self.testdir {
            config.tests.testdir = testdir.into();
        }
        if let Some(offset) = self.offset {
            config.engine.offset = offset;
        }
        if let Some(path) = self.path {
            config.engine.path = path.into();
        }
        if let Some(n) = self.num_instances {
            config.engine.num_instances = n;
        }
        if let Some(n) = self.num_shards {
            config.engine.num_shards = n;
        }
        if let Some(host) = self.host {
            config.engine.host = host;
        }
        if let Some(port) = self.port {
            config.engine.port = port;
        }
        if let Some(scheme) = self.dest_scheme {
            config.fixture.scheme = scheme;
        }
        if let Some(domain) = self.dest_domain {
            config.fixture.domain = domain;
        }
        if let Some(port) = self.dest_port {
            config.fixture.port = port;
        }
        if let Some(url) = self.observer_url {
            config.fixture.observer_url = Some(url);
        }

        config.validate()?;
        Ok((config, self.testcase))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let (config, testcase) = cli.into_config()?;
    tracing::info!(testcase = %testcase, "crawlcheck starting");

    let observer =
        HttpFixtureObserver::new(config.observer_url(), config.request_timeout())?;
    let runner = ScenarioRunner::new(config, &testcase, Box::new(observer))?;
    let recorder = runner.run().await;

    println!("{}", recorder.to_junit_xml());

    let failures = recorder.failure_count();
    if failures > 0 {
        tracing::warn!(failures = failures, "Run finished with failures");
        std::process::exit(1);
    }

    tracing::info!("Run finished, all checks passed");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("crawlcheck=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("crawlcheck=info,warn")
    };

    // The JUnit report goes to stdout; logs stay on stderr.
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
