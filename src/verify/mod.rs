//! Verification engine
//!
//! A fixed catalog of assertion kinds, each comparing a live query/lookup
//! response against expected literal values. Every check returns a typed
//! [`CheckOutcome`] instead of raising: transport failures and malformed
//! items degrade to a failed outcome for that one item, and the batch keeps
//! going. Nothing here is fatal to a run.

pub mod item;

use std::collections::HashSet;

use tracing::debug;

use crate::api::EngineApi;
use crate::config::TargetEnv;
use crate::error::Error;
use crate::fixture::FixtureObserver;
use crate::script::VerifyKind;

/// Typed result of one verification check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Expectation held
    Pass,
    /// Expectation failed, with the reason
    Fail(String),
}

impl CheckOutcome {
    /// Build a failed outcome
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    /// Build an outcome from a condition and a lazy failure reason
    pub fn expect(ok: bool, reason: impl FnOnce() -> String) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail(reason())
        }
    }

    /// Whether the check passed
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// The failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Fail(reason) => Some(reason),
        }
    }
}

impl From<Error> for CheckOutcome {
    fn from(e: Error) -> Self {
        Self::Fail(format!("check aborted: {e}"))
    }
}

/// Runs the assertion catalog against a live engine and fixture server
pub struct Verifier<'a> {
    api: &'a EngineApi,
    fixture: &'a dyn FixtureObserver,
    env: &'a TargetEnv,
}

impl<'a> Verifier<'a> {
    /// Create a verifier over an open engine connection
    pub fn new(api: &'a EngineApi, fixture: &'a dyn FixtureObserver, env: &'a TargetEnv) -> Self {
        Self { api, fixture, env }
    }

    /// Run one item through the named check
    ///
    /// [`VerifyKind::OnlySpidered`] is batch-shaped and handled by
    /// [`Verifier::only_spidered`] instead.
    pub async fn check(&self, kind: VerifyKind, item: &str) -> CheckOutcome {
        debug!(kind = kind.verb(), item = %item, "Running check");

        match kind {
            VerifyKind::Indexed => self.indexed(item, true).await,
            VerifyKind::NotIndexed => self.indexed(item, false).await,
            VerifyKind::Spidered => self.spidered(item, true).await,
            VerifyKind::NotSpidered => self.spidered(item, false).await,
            VerifyKind::OnlySpidered => {
                CheckOutcome::fail("verify_only_spidered is a batch check")
            }
            VerifyKind::QueryLanguage => self.query_language(item).await,
            VerifyKind::QueryTerms => self.query_terms(item).await,
            VerifyKind::SearchResultUrl => self.search_result_url(item).await,
            VerifyKind::SearchResultTitleSummary => self.search_result_title_summary(item).await,
            VerifyKind::SpiderResponse => self.spider_response(item).await,
            VerifyKind::JustSearch => self.just_search(item).await,
        }
    }

    async fn just_search(&self, query: &str) -> CheckOutcome {
        match self.api.search(query, &[]).await {
            Ok(_) => CheckOutcome::Pass,
            Err(e) => CheckOutcome::fail(format!("search failed: {e}")),
        }
    }

    async fn indexed(&self, query: &str, expect_results: bool) -> CheckOutcome {
        let response = match self.api.search(query, &[]).await {
            Ok(response) => response,
            Err(e) => return CheckOutcome::fail(format!("search failed: {e}")),
        };

        let count = response.results.len();
        if expect_results {
            CheckOutcome::expect(count > 0, || format!("no results for query {query:?}"))
        } else {
            CheckOutcome::expect(count == 0, || {
                format!("{count} unexpected result(s) for query {query:?}")
            })
        }
    }

    async fn spidered(&self, raw_url: &str, expect_served: bool) -> CheckOutcome {
        let url = self.env.expand(raw_url);
        let served = match self.fixture.served_urls().await {
            Ok(served) => served,
            Err(e) => return CheckOutcome::fail(format!("fixture server unreachable: {e}")),
        };

        let seen = served.contains(&url);
        if expect_served {
            CheckOutcome::expect(seen, || format!("URL {url:?} was never spidered"))
        } else {
            CheckOutcome::expect(!seen, || format!("URL {url:?} was spidered"))
        }
    }

    /// Batch set-equality check between expected URLs and the served set
    ///
    /// Produces one outcome per expected URL, plus one failed outcome per
    /// served URL that was not expected.
    pub async fn only_spidered(&self, raw_urls: &[String]) -> Vec<(String, CheckOutcome)> {
        let expected: Vec<String> = raw_urls.iter().map(|u| self.env.expand(u)).collect();

        let served = match self.fixture.served_urls().await {
            Ok(served) => served,
            Err(e) => {
                let reason = format!("fixture server unreachable: {e}");
                return expected
                    .into_iter()
                    .map(|url| (url, CheckOutcome::fail(reason.clone())))
                    .collect();
            }
        };

        let expected_set: HashSet<&String> = expected.iter().collect();
        let mut outcomes = Vec::with_capacity(expected.len());

        for url in &expected {
            let outcome = CheckOutcome::expect(served.contains(url), || {
                format!("URL {url:?} was never spidered")
            });
            outcomes.push((url.clone(), outcome));
        }

        let mut unexpected: Vec<&String> = served
            .iter()
            .filter(|url| !expected_set.contains(url))
            .collect();
        unexpected.sort();

        for url in unexpected {
            outcomes.push((
                url.clone(),
                CheckOutcome::fail(format!("unexpected URL {url:?} was spidered")),
            ));
        }

        outcomes
    }

    async fn query_language(&self, raw_item: &str) -> CheckOutcome {
        let parsed = match item::parse_lang(raw_item) {
            Ok(parsed) => parsed,
            Err(e) => return CheckOutcome::fail(format!("invalid item: {e}")),
        };

        let params = item::parse_query_params(&parsed.params);
        let response = match self.api.search(&parsed.query, &params).await {
            Ok(response) => response,
            Err(e) => return CheckOutcome::fail(format!("search failed: {e}")),
        };

        let detected = response
            .query_info
            .and_then(|info| info.query_language_abbr);
        CheckOutcome::expect(detected.as_deref() == Some(&parsed.language), || {
            format!(
                "expected language {:?}, engine detected {:?}",
                parsed.language, detected
            )
        })
    }

    async fn query_terms(&self, raw_item: &str) -> CheckOutcome {
        let parsed = match item::parse_terms(raw_item) {
            Ok(parsed) => parsed,
            Err(e) => return CheckOutcome::fail(format!("invalid item: {e}")),
        };

        let params = item::parse_query_params(&parsed.params);
        let response = match self.api.search(&parsed.query, &params).await {
            Ok(response) => response,
            Err(e) => return CheckOutcome::fail(format!("search failed: {e}")),
        };

        let info = match response.query_info {
            Some(info) => info,
            None => return CheckOutcome::fail("response carried no query info"),
        };

        let expected_total = parsed.terms.len() as i64;
        if info.query_num_terms_total != Some(expected_total) {
            return CheckOutcome::fail(format!(
                "expected {expected_total} total terms, engine reported {:?}",
                info.query_num_terms_total
            ));
        }

        for (index, expected) in parsed.terms.iter().enumerate() {
            let actual = info.terms.get(index).map(|t| t.term_str.as_str());
            if actual != Some(expected) {
                return CheckOutcome::fail(format!(
                    "term {index}: expected {expected:?}, got {actual:?}"
                ));
            }
        }

        CheckOutcome::Pass
    }

    async fn search_result_url(&self, raw_item: &str) -> CheckOutcome {
        let parsed = match item::parse_counted(raw_item) {
            Ok(parsed) => parsed,
            Err(e) => return CheckOutcome::fail(format!("invalid item: {e}")),
        };

        let query = self.env.expand(&parsed.query);
        let expected: Vec<String> = parsed.values.iter().map(|u| self.env.expand(u)).collect();

        let params = item::parse_query_params(&parsed.params);
        let response = match self.api.search(&query, &params).await {
            Ok(response) => response,
            Err(e) => return CheckOutcome::fail(format!("search failed: {e}")),
        };

        if response.results.len() != expected.len() {
            return CheckOutcome::fail(format!(
                "expected {} result(s), got {}",
                expected.len(),
                response.results.len()
            ));
        }

        for (index, expected_url) in expected.iter().enumerate() {
            let actual = self.normalize_result_url(&response.results[index].url);
            if &actual != expected_url {
                return CheckOutcome::fail(format!(
                    "result {index}: expected URL {expected_url:?}, got {actual:?}"
                ));
            }
        }

        CheckOutcome::Pass
    }

    /// Restore the scheme the engine omits from plain-http result URLs
    fn normalize_result_url(&self, url: &str) -> String {
        if self.env.is_plain_http() && !url.starts_with("http://") {
            format!("http://{url}")
        } else {
            url.to_string()
        }
    }

    async fn search_result_title_summary(&self, raw_item: &str) -> CheckOutcome {
        let parsed = match item::parse_paired(raw_item) {
            Ok(parsed) => parsed,
            Err(e) => return CheckOutcome::fail(format!("invalid item: {e}")),
        };

        let query = self.env.expand(&parsed.query);
        let params = item::parse_query_params(&parsed.params);
        let response = match self.api.search(&query, &params).await {
            Ok(response) => response,
            Err(e) => return CheckOutcome::fail(format!("search failed: {e}")),
        };

        if response.results.len() != parsed.pairs.len() {
            return CheckOutcome::fail(format!(
                "expected {} result(s), got {}",
                parsed.pairs.len(),
                response.results.len()
            ));
        }

        for (index, (title, summary)) in parsed.pairs.iter().enumerate() {
            let result = &response.results[index];
            if &result.title != title {
                return CheckOutcome::fail(format!(
                    "result {index}: expected title {title:?}, got {:?}",
                    result.title
                ));
            }
            if &result.summary != summary {
                return CheckOutcome::fail(format!(
                    "result {index}: expected summary {summary:?}, got {:?}",
                    result.summary
                ));
            }
        }

        CheckOutcome::Pass
    }

    async fn spider_response(&self, raw_item: &str) -> CheckOutcome {
        let parsed = match item::parse_spider_response(raw_item) {
            Ok(parsed) => parsed,
            Err(e) => return CheckOutcome::fail(format!("invalid item: {e}")),
        };

        let url = self.env.expand(&parsed.url);
        let lookup = match self.api.lookup_spiderdb(&url).await {
            Ok(lookup) => lookup,
            Err(e) => return CheckOutcome::fail(format!("spiderdb lookup failed: {e}")),
        };

        let reply = match lookup.spider_reply {
            Some(reply) => reply,
            None => return CheckOutcome::fail(format!("no spider reply for URL {url:?}")),
        };

        // Subset match: only fields named in the mapping are checked.
        for (field, expected) in &parsed.expected {
            match reply.get(field) {
                Some(actual) if values_match(expected, actual) => {}
                Some(actual) => {
                    return CheckOutcome::fail(format!(
                        "field {field:?}: expected {expected}, got {actual}"
                    ));
                }
                None => {
                    return CheckOutcome::fail(format!("field {field:?} missing from spider reply"));
                }
            }
        }

        CheckOutcome::Pass
    }
}

/// Compare a literal mapping value against a crawl-record value
///
/// Exact JSON equality, with a fallback on rendered forms so a literal `200`
/// still matches an engine that reports `"200"`.
fn values_match(expected: &serde_json::Value, actual: &serde_json::Value) -> bool {
    if expected == actual {
        return true;
    }
    render(expected) == render(actual)
}

fn render(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_expect() {
        assert!(CheckOutcome::expect(true, || "unused".to_string()).passed());

        let outcome = CheckOutcome::expect(false, || "reason".to_string());
        assert!(!outcome.passed());
        assert_eq!(outcome.reason(), Some("reason"));
    }

    #[test]
    fn test_values_match_exact_and_rendered() {
        use serde_json::json;

        assert!(values_match(&json!(0), &json!(0)));
        assert!(values_match(&json!("ok"), &json!("ok")));
        assert!(values_match(&json!(200), &json!("200")));
        assert!(values_match(&json!("200"), &json!(200)));
        assert!(!values_match(&json!(200), &json!(404)));
        assert!(!values_match(&json!("a"), &json!("b")));
    }
}
