//! HTTP client for the engine admin/search/query API
//!
//! Thin reqwest wrapper around the endpoints the harness drives: status,
//! spider queue, search, spiderdb lookup, configuration setters and the URL
//! seed/inject/delete primitives. Every request carries the engine's default
//! payload (`c=main`, `format=json`, `showinput=0`).

pub mod models;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use models::{Envelope, SearchResponse, ShardStatus, SpiderdbLookup, StatusResponse};

/// Errors from engine API calls
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport or decode error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Engine replied with a non-success HTTP status
    #[error("Engine returned HTTP {0}")]
    Status(u16),

    /// HTTP client could not be constructed
    #[error("Client build failed: {0}")]
    Build(String),
}

impl ApiError {
    /// Classify for the unified error taxonomy
    pub fn category(&self) -> crate::error::ErrorCategory {
        match self {
            Self::Http(e) if e.is_decode() => crate::error::ErrorCategory::Format,
            Self::Http(_) | Self::Status(_) => crate::error::ErrorCategory::Connectivity,
            Self::Build(_) => crate::error::ErrorCategory::Other,
        }
    }
}

/// Result alias for API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Default payload applied to every engine request
const DEFAULT_PARAMS: &[(&str, &str)] = &[("c", "main"), ("format", "json"), ("showinput", "0")];

/// Merge the default payload with caller parameters
///
/// A default key is dropped when the caller already supplies it, so an item's
/// own query parameters win.
fn merged_params(params: &[(String, String)]) -> Vec<(&str, &str)> {
    let mut merged: Vec<(&str, &str)> = DEFAULT_PARAMS
        .iter()
        .copied()
        .filter(|&(key, _)| !params.iter().any(|(k, _)| k.as_str() == key))
        .collect();
    merged.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    merged
}

/// Client for one engine instance's HTTP API
#[derive(Debug, Clone)]
pub struct EngineApi {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Base URL of the instance, e.g. `http://127.0.0.1:28000`
    base_url: String,
}

impl EngineApi {
    /// Create a client for the instance at `host:port`
    pub fn new(host: &str, port: u16, timeout: Duration) -> ApiResult<Self> {
        Self::with_base_url(&format!("http://{host}:{port}"), timeout)
    }

    /// Create a client with an explicit base URL (used by tests with mock servers)
    pub fn with_base_url(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| ApiError::Build(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> ApiResult<T> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url = %url, params = ?params, "Engine API request");

        let response = self
            .client
            .get(&url)
            .query(&merged_params(params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        Ok(response.json::<T>().await?)
    }

    /// Fire a configuration request, ignoring the response body
    async fn get_ignore_body(&self, path: &str, params: &[(String, String)]) -> ApiResult<()> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url = %url, params = ?params, "Engine API config request");

        let response = self
            .client
            .get(&url)
            .query(&merged_params(params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        Ok(())
    }

    /// Fetch the engine status snapshot
    pub async fn status(&self) -> ApiResult<StatusResponse> {
        let envelope: Envelope<StatusResponse> = self.get_json("admin/status", &[]).await?;
        Ok(envelope.response)
    }

    /// Fetch the engine's own process-start timestamp (epoch milliseconds)
    pub async fn process_start_time(&self) -> ApiResult<i64> {
        Ok(self.status().await?.process_start_time)
    }

    /// Fetch this instance's spider queue snapshot
    pub async fn spider_queue(&self) -> ApiResult<ShardStatus> {
        let envelope: Envelope<ShardStatus> = self.get_json("admin/spiderdb", &[]).await?;
        Ok(envelope.response)
    }

    /// Run a search query with extra query parameters
    pub async fn search(&self, query: &str, params: &[(String, String)]) -> ApiResult<SearchResponse> {
        let mut all = params.to_vec();
        all.push(("q".to_string(), query.to_string()));
        self.get_json("search", &all).await
    }

    /// Look up the crawl record for a URL in spiderdb
    pub async fn lookup_spiderdb(&self, url: &str) -> ApiResult<SpiderdbLookup> {
        self.get_json("admin/spiderdblookup", &[("url".to_string(), url.to_string())])
            .await
    }

    /// Register a URL for crawling; returns whether the engine accepted it
    pub async fn add_url(&self, url: &str) -> ApiResult<bool> {
        let envelope: Envelope<StatusResponse> = self
            .get_json("admin/addurl", &[("urls".to_string(), url.to_string())])
            .await?;
        Ok(envelope.response.status_code == 0)
    }

    /// Inject a document directly into the index
    ///
    /// The engine acknowledges the inject before the document is fully
    /// indexed, hence the short settle delay.
    pub async fn inject_url(&self, url: &str) -> ApiResult<bool> {
        let envelope: Envelope<StatusResponse> = self
            .get_json("admin/inject", &[("url".to_string(), url.to_string())])
            .await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(envelope.response.status_code == 0)
    }

    /// Force-delete a URL from the index; returns whether the delete took
    ///
    /// The engine answers a force delete with a nonstandard status line, which
    /// the HTTP client surfaces as a transport error. That path is reported
    /// as an unsuccessful delete rather than an error so teardown can drain
    /// tracked URLs best-effort.
    pub async fn delete_url(&self, url: &str) -> bool {
        let params = [
            ("url".to_string(), url.to_string()),
            ("deleteurl".to_string(), "1".to_string()),
        ];

        match self
            .get_json::<Envelope<StatusResponse>>("admin/inject", &params)
            .await
        {
            Ok(envelope) => envelope.response.status_code == 0,
            Err(e) => {
                debug!(url = %url, error = %e, "Force delete returned no parsable response");
                false
            }
        }
    }

    /// Set the site list used to seed crawling
    pub async fn config_sitelist(&self, sitelist: &str) -> ApiResult<()> {
        self.get_ignore_body(
            "admin/settings",
            &[("sitelist".to_string(), sitelist.to_string())],
        )
        .await
    }

    /// Set crawl delays for hosts with and without robots.txt
    pub async fn config_crawldelay(&self, norobots: &str, robots_nodelay: &str) -> ApiResult<()> {
        self.get_ignore_body(
            "admin/spider",
            &[
                ("crwldlnorobot".to_string(), norobots.to_string()),
                ("crwldlrobotnodelay".to_string(), robots_nodelay.to_string()),
            ],
        )
        .await
    }

    /// Point the engine at primary/secondary DNS servers
    pub async fn config_dns(&self, primary: &str, secondary: &str) -> ApiResult<()> {
        self.get_ignore_body(
            "admin/master",
            &[
                ("pdns".to_string(), primary.to_string()),
                ("sdns".to_string(), secondary.to_string()),
            ],
        )
        .await
    }

    /// Set log flags from key/value pairs
    pub async fn config_log(&self, flags: &[(String, String)]) -> ApiResult<()> {
        self.get_ignore_body("admin/log", flags).await
    }

    /// Trigger an on-disk dump of in-memory data
    pub async fn dump(&self) -> ApiResult<()> {
        self.get_ignore_body("admin/master", &[("dump".to_string(), "1".to_string())])
            .await
    }

    /// Trigger a best-effort cluster save
    pub async fn save(&self) -> ApiResult<()> {
        self.get_ignore_body("admin/master", &[("js".to_string(), "1".to_string())])
            .await
    }
}
