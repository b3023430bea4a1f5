//! Wire types for the engine admin/search/query API
//!
//! All responses are JSON with camelCase field names. Only the fields the
//! harness actually inspects are modelled; everything else is ignored on
//! decode.

use serde::Deserialize;

/// Spider status code: engine still initializing
pub const SP_INITIALIZING: i64 = 0;

/// Spider status code: crawl in progress
pub const SP_IN_PROGRESS: i64 = 7;

/// Generic `{"response": {...}}` envelope wrapping admin responses
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Inner response payload
    pub response: T,
}

/// Response payload of `admin/status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Spider status code (see [`SP_INITIALIZING`], [`SP_IN_PROGRESS`])
    pub status_code: i64,

    /// Process start timestamp in epoch milliseconds
    #[serde(default)]
    pub process_start_time: i64,
}

/// Per-shard spider queue snapshot from `admin/spiderdb`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardStatus {
    /// Spider status code
    pub status_code: i64,

    /// Number of IPs with crawl work currently doled out to workers
    #[serde(default)]
    pub dole_ip_count: i64,

    /// Number of URLs currently being spidered
    #[serde(default)]
    pub spider_count: i64,

    /// Number of queued future crawl tasks
    #[serde(default)]
    pub waiting_tree_count: i64,

    /// Queued future crawl tasks
    #[serde(default)]
    pub waiting_trees: Vec<WaitingTree>,
}

impl ShardStatus {
    /// Whether the shard currently has no dispatched or executing work
    pub fn is_quiet(&self) -> bool {
        self.status_code == SP_IN_PROGRESS && self.dole_ip_count == 0 && self.spider_count == 0
    }
}

/// One queued crawl task scheduled for future execution
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingTree {
    /// Scheduled execution time in epoch milliseconds
    pub spider_time: i64,
}

/// Response of the `search` endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Ranked result list
    #[serde(default)]
    pub results: Vec<SearchResult>,

    /// Parsed-query metadata
    #[serde(default)]
    pub query_info: Option<QueryInfo>,
}

/// One search result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    /// Result URL. The engine omits the scheme when it is plain http.
    #[serde(default)]
    pub url: String,

    /// Result title
    #[serde(default)]
    pub title: String,

    /// Result summary
    #[serde(rename = "sum", default)]
    pub summary: String,
}

/// Query decomposition metadata attached to a search response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    /// Detected query language code (e.g. "en")
    #[serde(default)]
    pub query_language_abbr: Option<String>,

    /// Total number of parsed query terms
    #[serde(default)]
    pub query_num_terms_total: Option<i64>,

    /// Parsed query terms, in order
    #[serde(default)]
    pub terms: Vec<QueryTerm>,
}

/// One parsed query term
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTerm {
    /// Term string as parsed by the engine
    pub term_str: String,
}

/// Response of `admin/spiderdblookup`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiderdbLookup {
    /// Crawl record for the looked-up URL, absent when never spidered
    #[serde(default)]
    pub spider_reply: Option<serde_json::Map<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_shard_status() {
        let json = r#"{
            "response": {
                "statusCode": 7,
                "doleIPCount": 0,
                "spiderCount": 0,
                "waitingTreeCount": 2,
                "waitingTrees": [
                    {"spiderTime": 1700000000000},
                    {"spiderTime": 1700000500000}
                ]
            }
        }"#;

        let envelope: Envelope<ShardStatus> = serde_json::from_str(json).unwrap();
        let status = envelope.response;
        assert_eq!(status.status_code, SP_IN_PROGRESS);
        assert_eq!(status.waiting_tree_count, 2);
        assert_eq!(status.waiting_trees[1].spider_time, 1_700_000_500_000);
        assert!(status.is_quiet());
    }

    #[test]
    fn test_decode_shard_status_missing_trees() {
        let json = r#"{"statusCode": 0}"#;
        let status: ShardStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status_code, SP_INITIALIZING);
        assert!(status.waiting_trees.is_empty());
        assert!(!status.is_quiet());
    }

    #[test]
    fn test_decode_search_response() {
        let json = r#"{
            "results": [
                {"url": "site.fixture.test:28080/", "title": "Home", "sum": "Welcome"}
            ],
            "queryInfo": {
                "queryLanguageAbbr": "en",
                "queryNumTermsTotal": 2,
                "terms": [{"termStr": "hello"}, {"termStr": "world"}]
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].summary, "Welcome");

        let info = response.query_info.unwrap();
        assert_eq!(info.query_language_abbr.as_deref(), Some("en"));
        assert_eq!(info.query_num_terms_total, Some(2));
        assert_eq!(info.terms[0].term_str, "hello");
    }

    #[test]
    fn test_decode_spiderdb_lookup() {
        let json = r#"{"spiderReply": {"errCode": 0, "httpStatus": 200}}"#;
        let lookup: SpiderdbLookup = serde_json::from_str(json).unwrap();
        let reply = lookup.spider_reply.unwrap();
        assert_eq!(reply.get("httpStatus").unwrap(), &serde_json::json!(200));

        let json = r#"{}"#;
        let lookup: SpiderdbLookup = serde_json::from_str(json).unwrap();
        assert!(lookup.spider_reply.is_none());
    }
}
