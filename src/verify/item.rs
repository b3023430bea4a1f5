//! Verification item micro-format parsing
//!
//! Multi-field items are `|`-delimited: a query, a URL-encoded parameter
//! string, and kind-specific trailing fields. Counted kinds declare how many
//! trailing values follow; a mismatch is a hard format error for that item.

use thiserror::Error;

/// Errors from malformed verification items
#[derive(Error, Debug)]
pub enum ItemError {
    /// Wrong number of `|`-separated fields
    #[error("expected {expected} |-separated fields, got {got}")]
    FieldCount {
        /// Fields the kind requires
        expected: usize,
        /// Fields actually present
        got: usize,
    },

    /// Count field did not parse as an unsigned integer
    #[error("invalid count field: {0:?}")]
    BadCount(String),

    /// Declared count does not match the trailing value fields
    #[error("declared {declared} entries but {got} trailing field(s) present")]
    CountMismatch {
        /// Count the item declared
        declared: usize,
        /// Trailing fields actually present
        got: usize,
    },

    /// `spider-response` literal mapping was not a JSON object
    #[error("literal mapping is not a JSON object")]
    NotAMapping,
}

/// `query|params|lang-code`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangItem {
    /// Search query
    pub query: String,
    /// URL-encoded extra query parameters
    pub params: String,
    /// Expected detected language code
    pub language: String,
}

/// `query|params|count|term1|term2|...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsItem {
    /// Search query
    pub query: String,
    /// URL-encoded extra query parameters
    pub params: String,
    /// Expected parsed terms, in order
    pub terms: Vec<String>,
}

/// `query|params|count|value1|value2|...` (one trailing value per entry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedItem {
    /// Search query
    pub query: String,
    /// URL-encoded extra query parameters
    pub params: String,
    /// Expected positional values
    pub values: Vec<String>,
}

/// `query|params|count|title1|summary1|...` (two trailing values per entry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedItem {
    /// Search query
    pub query: String,
    /// URL-encoded extra query parameters
    pub params: String,
    /// Expected positional (title, summary) pairs
    pub pairs: Vec<(String, String)>,
}

/// `relative-url|{"field": value, ...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiderResponseItem {
    /// URL to look up in spiderdb
    pub url: String,
    /// Fields the crawl record must contain with these exact values
    pub expected: serde_json::Map<String, serde_json::Value>,
}

fn split_fields(item: &str) -> Vec<&str> {
    item.split('|').collect()
}

fn parse_count(field: &str) -> Result<usize, ItemError> {
    field
        .parse::<usize>()
        .map_err(|_| ItemError::BadCount(field.to_string()))
}

/// Parse a `query|params|lang-code` item
pub fn parse_lang(item: &str) -> Result<LangItem, ItemError> {
    let fields = split_fields(item);
    if fields.len() != 3 {
        return Err(ItemError::FieldCount {
            expected: 3,
            got: fields.len(),
        });
    }

    Ok(LangItem {
        query: fields[0].to_string(),
        params: fields[1].to_string(),
        language: fields[2].to_string(),
    })
}

/// Parse a `query|params|count|term...` item
pub fn parse_terms(item: &str) -> Result<TermsItem, ItemError> {
    let (query, params, values) = parse_counted_fields(item, 1)?;
    Ok(TermsItem {
        query,
        params,
        terms: values,
    })
}

/// Parse a `query|params|count|value...` item with one field per entry
pub fn parse_counted(item: &str) -> Result<CountedItem, ItemError> {
    let (query, params, values) = parse_counted_fields(item, 1)?;
    Ok(CountedItem {
        query,
        params,
        values,
    })
}

/// Parse a `query|params|count|title|summary...` item with two fields per entry
pub fn parse_paired(item: &str) -> Result<PairedItem, ItemError> {
    let (query, params, values) = parse_counted_fields(item, 2)?;
    let pairs = values
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok(PairedItem {
        query,
        params,
        pairs,
    })
}

fn parse_counted_fields(
    item: &str,
    fields_per_entry: usize,
) -> Result<(String, String, Vec<String>), ItemError> {
    let fields = split_fields(item);
    if fields.len() < 3 {
        return Err(ItemError::FieldCount {
            expected: 3,
            got: fields.len(),
        });
    }

    let declared = parse_count(fields[2])?;
    let trailing = &fields[3..];
    if trailing.len() != declared * fields_per_entry {
        return Err(ItemError::CountMismatch {
            declared,
            got: trailing.len() / fields_per_entry,
        });
    }

    Ok((
        fields[0].to_string(),
        fields[1].to_string(),
        trailing.iter().map(|s| s.to_string()).collect(),
    ))
}

/// Parse a `relative-url|literal-mapping` item
///
/// The literal mapping is a JSON object; anything else (array, scalar,
/// unparsable text) is a format error.
pub fn parse_spider_response(item: &str) -> Result<SpiderResponseItem, ItemError> {
    let fields = split_fields(item);
    if fields.len() != 2 {
        return Err(ItemError::FieldCount {
            expected: 2,
            got: fields.len(),
        });
    }

    let value: serde_json::Value =
        serde_json::from_str(fields[1]).map_err(|_| ItemError::NotAMapping)?;
    let expected = match value {
        serde_json::Value::Object(map) => map,
        _ => return Err(ItemError::NotAMapping),
    };

    Ok(SpiderResponseItem {
        url: fields[0].to_string(),
        expected,
    })
}

/// Decode a URL-encoded parameter string into query pairs
pub fn parse_query_params(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}
