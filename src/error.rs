//! Unified error handling for the crawlcheck crate
//!
//! This module provides a unified error type that consolidates all
//! domain-specific errors into a single `Error` enum, while maintaining the
//! ability to use domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Nothing in the verification phase is fatal to a scenario run: the run
//! loop converts errors into failed records and keeps going. The category
//! tells it how (connectivity failures mark a shard unreachable, format
//! errors skip an item, and so on).

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::api::ApiError;
pub use crate::script::ScriptError;
pub use crate::verify::item::ItemError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Target engine unreachable (connection refused, timeout, decode)
    Connectivity,
    /// Malformed instruction or verification item
    Format,
    /// Engine process lifecycle failures (start/stop/install)
    Lifecycle,
    /// Storage and I/O errors
    Io,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the crawlcheck crate
///
/// This enum wraps all domain-specific errors, providing a single error type
/// that can be used across module boundaries while preserving the detailed
/// error information.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine API errors (transport, HTTP status, response shape)
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Instruction parsing and dispatch errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Verification item format errors
    #[error("Item format error: {0}")]
    Item(#[from] ItemError),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Engine process lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lifecycle error
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api(e) => e.category(),
            Self::Http(e) => {
                if e.is_decode() {
                    ErrorCategory::Format
                } else {
                    ErrorCategory::Connectivity
                }
            }
            Self::Script(_) | Self::Item(_) | Self::Json(_) => ErrorCategory::Format,
            Self::Io(_) => ErrorCategory::Io,
            Self::Config(_) => ErrorCategory::Other,
            Self::Lifecycle(_) => ErrorCategory::Lifecycle,
        }
    }

    /// Check whether this error means the target engine could not be reached
    ///
    /// The startup wait loop keeps retrying on connectivity failures until
    /// its budget runs out; everything else is surfaced immediately.
    pub fn is_connectivity(&self) -> bool {
        self.category() == ErrorCategory::Connectivity
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
