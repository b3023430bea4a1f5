//! Fixture web server observation
//!
//! The fixture server serves static test content and records every URL it
//! was asked for. The harness only ever reads that record; serving is the
//! fixture server's own business. The trait seam lets tests substitute a
//! canned set of observations.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

/// Read access to the fixture server's request bookkeeping
#[async_trait]
pub trait FixtureObserver: Send + Sync {
    /// The set of absolute URLs the fixture server has served so far
    async fn served_urls(&self) -> Result<HashSet<String>>;
}

/// Observer backed by the fixture server's HTTP bookkeeping endpoint
///
/// The endpoint returns a JSON array of absolute URL strings.
#[derive(Debug, Clone)]
pub struct HttpFixtureObserver {
    client: Client,
    endpoint: String,
}

impl HttpFixtureObserver {
    /// Create an observer for the given bookkeeping endpoint
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("fixture observer client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl FixtureObserver for HttpFixtureObserver {
    async fn served_urls(&self) -> Result<HashSet<String>> {
        debug!(endpoint = %self.endpoint, "Fetching served URLs from fixture server");

        let urls: Vec<String> = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(urls.into_iter().collect())
    }
}
