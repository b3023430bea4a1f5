//! Test-script parsing and verb dispatch
//!
//! Test scripts are plain text: one instruction per line, `#` comments and
//! blank lines skipped, fields split on whitespace. The leading token is a
//! verb resolved against an explicit registry of typed actions; unknown verbs
//! are a lookup miss the caller reports and skips, never an abort.

use std::path::Path;

use thiserror::Error;

/// Errors from instruction parsing and dispatch
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Verb not present in the registry
    #[error("Unknown instruction: {0}")]
    UnknownVerb(String),

    /// A verb expecting trailing key/value pairs got an odd token count
    #[error("{verb} expects key/value pairs, got {count} tokens")]
    OddKeyValueCount {
        /// Offending verb
        verb: String,
        /// Number of trailing tokens
        count: usize,
    },

    /// A verb was given fewer arguments than its fixed arity requires
    #[error("{verb} expects at least {expected} argument(s), got {got}")]
    MissingArguments {
        /// Offending verb
        verb: String,
        /// Minimum arity
        expected: usize,
        /// Tokens actually present
        got: usize,
    },
}

/// One tokenized instruction line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Leading verb token
    pub verb: String,

    /// Remaining whitespace-separated tokens
    pub args: Vec<String>,
}

/// The verification checks the harness knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyKind {
    /// Query must return at least one result
    Indexed,
    /// Query must return no results
    NotIndexed,
    /// URL must appear in the fixture server's served set
    Spidered,
    /// URL must not appear in the served set
    NotSpidered,
    /// Served set must equal the expected list exactly
    OnlySpidered,
    /// Detected query language must match
    QueryLanguage,
    /// Parsed term count and term strings must match
    QueryTerms,
    /// Result count and positional result URLs must match
    SearchResultUrl,
    /// Result count and positional (title, summary) pairs must match
    SearchResultTitleSummary,
    /// Spiderdb record fields must match a literal mapping
    SpiderResponse,
    /// Query must merely complete without a transport error
    JustSearch,
}

impl VerifyKind {
    /// The verb (and fixture file name) for this check
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Indexed => "verify_indexed",
            Self::NotIndexed => "verify_not_indexed",
            Self::Spidered => "verify_spidered",
            Self::NotSpidered => "verify_not_spidered",
            Self::OnlySpidered => "verify_only_spidered",
            Self::QueryLanguage => "verify_query_language",
            Self::QueryTerms => "verify_query_terms",
            Self::SearchResultUrl => "verify_search_result_url",
            Self::SearchResultTitleSummary => "verify_search_result_titlesummary",
            Self::SpiderResponse => "verify_spider_response",
            Self::JustSearch => "just_search",
        }
    }

    /// Whether inline arguments form a single URL token rather than a
    /// space-joined item
    pub fn takes_single_url(&self) -> bool {
        matches!(self, Self::Spidered | Self::NotSpidered | Self::OnlySpidered)
    }
}

/// Engine configuration calls reachable from a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigVerb {
    /// `config_sitelist <rest of line>`
    Sitelist,
    /// `config_crawldelay <norobots> <robots-nodelay>`
    CrawlDelay,
    /// `config_dns <primary> [secondary]`
    Dns,
    /// `config_log <key> <value> [<key> <value> ...]`
    Log,
    /// `add_url <url>`
    AddUrl,
    /// `inject_url <url>`
    InjectUrl,
    /// `delete_url <url>`
    DeleteUrl,
    /// `save`
    Save,
}

/// A verb resolved to its typed action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run a verification check (inline item or fixture file)
    Verify(VerifyKind),
    /// Seed the crawl from inline arg, seeds file, or site directories
    Seed,
    /// Trigger an engine data dump, recorded in the report
    Dump,
    /// Run the convergence poller across all shards
    WaitSpiderDone,
    /// Apply the custom_config file or inline configuration line
    CustomConfig,
    /// Call an engine configuration setter
    Config(ConfigVerb),
}

/// Resolve a verb token against the registry
pub fn resolve(verb: &str) -> Option<Action> {
    let action = match verb {
        "verify_indexed" => Action::Verify(VerifyKind::Indexed),
        "verify_not_indexed" => Action::Verify(VerifyKind::NotIndexed),
        "verify_spidered" => Action::Verify(VerifyKind::Spidered),
        "verify_not_spidered" => Action::Verify(VerifyKind::NotSpidered),
        "verify_only_spidered" => Action::Verify(VerifyKind::OnlySpidered),
        "verify_query_language" => Action::Verify(VerifyKind::QueryLanguage),
        "verify_query_terms" => Action::Verify(VerifyKind::QueryTerms),
        "verify_search_result_url" => Action::Verify(VerifyKind::SearchResultUrl),
        "verify_search_result_titlesummary" => {
            Action::Verify(VerifyKind::SearchResultTitleSummary)
        }
        "verify_spider_response" => Action::Verify(VerifyKind::SpiderResponse),
        "just_search" => Action::Verify(VerifyKind::JustSearch),
        "seed" => Action::Seed,
        "dump" => Action::Dump,
        "wait_spider_done" => Action::WaitSpiderDone,
        "custom_config" => Action::CustomConfig,
        "config_sitelist" => Action::Config(ConfigVerb::Sitelist),
        "config_crawldelay" => Action::Config(ConfigVerb::CrawlDelay),
        "config_dns" => Action::Config(ConfigVerb::Dns),
        "config_log" => Action::Config(ConfigVerb::Log),
        "add_url" => Action::Config(ConfigVerb::AddUrl),
        "inject_url" => Action::Config(ConfigVerb::InjectUrl),
        "delete_url" => Action::Config(ConfigVerb::DeleteUrl),
        "save" => Action::Config(ConfigVerb::Save),
        _ => return None,
    };
    Some(action)
}

/// Read a fixture file into lines; a missing file reads as empty
///
/// Item files are optional by design: a test case only provides the files
/// for the checks it exercises.
pub fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

/// Tokenize script lines into instructions, skipping comments and blanks
pub fn parse_script(lines: &[String]) -> Vec<Instruction> {
    lines
        .iter()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace().map(str::to_string);
            let verb = tokens.next()?;
            Some(Instruction {
                verb,
                args: tokens.collect(),
            })
        })
        .collect()
}

/// Collapse trailing tokens into `(key, value)` pairs
///
/// An odd token count means the instruction is malformed and must be
/// reported and skipped, not silently truncated.
pub fn pair_key_values(verb: &str, tokens: &[String]) -> Result<Vec<(String, String)>, ScriptError> {
    if tokens.len() % 2 != 0 {
        return Err(ScriptError::OddKeyValueCount {
            verb: verb.to_string(),
            count: tokens.len(),
        });
    }

    Ok(tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// Require a minimum argument count for a fixed-arity verb
pub fn require_args(verb: &str, tokens: &[String], expected: usize) -> Result<(), ScriptError> {
    if tokens.len() < expected {
        return Err(ScriptError::MissingArguments {
            verb: verb.to_string(),
            expected,
            got: tokens.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_skips_comments_and_blanks() {
        let lines = vec![
            "# this is a comment".to_string(),
            String::new(),
            "seed http://{DOMAIN}/".to_string(),
            "wait_spider_done".to_string(),
            "verify_indexed hello world".to_string(),
        ];

        let instructions = parse_script(&lines);
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].verb, "seed");
        assert_eq!(instructions[0].args, vec!["http://{DOMAIN}/"]);
        assert_eq!(instructions[1].verb, "wait_spider_done");
        assert!(instructions[1].args.is_empty());
        assert_eq!(instructions[2].args, vec!["hello", "world"]);
    }

    #[test]
    fn test_resolve_known_verbs() {
        assert_eq!(
            resolve("verify_indexed"),
            Some(Action::Verify(VerifyKind::Indexed))
        );
        assert_eq!(
            resolve("verify_search_result_titlesummary"),
            Some(Action::Verify(VerifyKind::SearchResultTitleSummary))
        );
        assert_eq!(resolve("config_log"), Some(Action::Config(ConfigVerb::Log)));
        assert_eq!(resolve("seed"), Some(Action::Seed));
        assert_eq!(resolve("wait_spider_done"), Some(Action::WaitSpiderDone));
    }

    #[test]
    fn test_resolve_unknown_verb() {
        assert_eq!(resolve("verify_everything"), None);
        assert_eq!(resolve(""), None);
    }

    #[test]
    fn test_pair_key_values() {
        let tokens: Vec<String> = ["ldq", "1", "ldspid", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pairs = pair_key_values("config_log", &tokens).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("ldq".to_string(), "1".to_string()),
                ("ldspid".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn test_pair_key_values_odd_count() {
        let tokens: Vec<String> = ["ldq", "1", "ldspid"].iter().map(|s| s.to_string()).collect();
        let err = pair_key_values("config_log", &tokens).unwrap_err();
        assert!(matches!(err, ScriptError::OddKeyValueCount { count: 3, .. }));
    }

    #[test]
    fn test_require_args() {
        let tokens = vec!["0".to_string()];
        assert!(require_args("config_crawldelay", &tokens, 2).is_err());
        assert!(require_args("config_dns", &tokens, 1).is_ok());
    }

    #[test]
    fn test_read_lines_missing_file_is_empty() {
        let lines = read_lines(Path::new("/nonexistent/fixture/file"));
        assert!(lines.is_empty());
    }

    #[test]
    fn test_verify_kind_verb_roundtrip() {
        for kind in [
            VerifyKind::Indexed,
            VerifyKind::NotIndexed,
            VerifyKind::Spidered,
            VerifyKind::NotSpidered,
            VerifyKind::OnlySpidered,
            VerifyKind::QueryLanguage,
            VerifyKind::QueryTerms,
            VerifyKind::SearchResultUrl,
            VerifyKind::SearchResultTitleSummary,
            VerifyKind::SpiderResponse,
            VerifyKind::JustSearch,
        ] {
            assert_eq!(resolve(kind.verb()), Some(Action::Verify(kind)));
        }
    }
}
