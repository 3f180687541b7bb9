//! Unified error handling for the ontograph crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while keeping the domain errors usable on
//! their own.
//!
//! # Architecture
//!
//! - [`OntographErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use ontograph::error::{Error, ErrorCategory, OntographErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {}", err.user_message());
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use serde::Serialize;
use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::corpus::CorpusError;
pub use crate::graph::{FatalEmissionError, StoreError};
pub use crate::llm::LlmError;
pub use crate::ontology::error::OntologyError;

/// Common trait for all ontograph error types
pub trait OntographErrorTrait: std::error::Error {
    /// Check if this error is recoverable (retry or skip the item)
    fn is_recoverable(&self) -> bool;

    /// Short user-facing description
    fn user_message(&self) -> String;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// LLM transport and status errors
    Llm,
    /// Model output that could not be decoded
    Parsing,
    /// Records rejected by schema or referential checks
    Validation,
    /// Graph store errors
    Store,
    /// Corpus and file I/O errors
    Io,
    /// Configuration and validation errors
    Config,
    /// Errors outside the crate's own types
    Other,
}

impl ErrorCategory {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Llm => "LLM service error",
            Self::Parsing => "Decode error",
            Self::Validation => "Validation error",
            Self::Store => "Graph store error",
            Self::Io => "I/O error",
            Self::Config => "Configuration error",
            Self::Other => "Other error",
        }
    }
}

impl OntographErrorTrait for OntologyError {
    fn is_recoverable(&self) -> bool {
        OntologyError::is_recoverable(self)
    }

    fn user_message(&self) -> String {
        format!("{}: {self}", self.summary())
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaParse { .. } | Self::ExtractionParse { .. } => ErrorCategory::Parsing,
            Self::SchemaViolation { .. } | Self::DanglingReference { .. } => {
                ErrorCategory::Validation
            }
            Self::Llm { .. } => ErrorCategory::Llm,
            Self::InvalidConfig { .. } => ErrorCategory::Config,
            Self::Io { .. } => ErrorCategory::Io,
        }
    }
}

impl OntographErrorTrait for LlmError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn user_message(&self) -> String {
        format!("{}: {self}", ErrorCategory::Llm.description())
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedResponse(_) | Self::EmptyResponse => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            _ => ErrorCategory::Llm,
        }
    }
}

impl OntographErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    fn user_message(&self) -> String {
        format!("{}: {self}", ErrorCategory::Store.description())
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            _ => ErrorCategory::Store,
        }
    }
}

impl OntographErrorTrait for CorpusError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn user_message(&self) -> String {
        format!("{}: {self}", self.category().description())
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownEncoding(_) => ErrorCategory::Config,
            Self::NotADirectory(_) | Self::Io { .. } => ErrorCategory::Io,
        }
    }
}

/// Unified error type for the ontograph crate
#[derive(Error, Debug)]
pub enum Error {
    /// Schema discovery and extraction errors
    #[error("Ontology error: {0}")]
    Ontology(#[from] OntologyError),

    /// LLM service errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Graph store errors
    #[error("Graph store error: {0}")]
    Store(#[from] StoreError),

    /// Emission aborted mid-run
    #[error("{0}")]
    Emission(#[from] FatalEmissionError),

    /// Corpus loading errors
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl OntographErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Ontology(e) => OntographErrorTrait::is_recoverable(e),
            Self::Llm(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Emission(_) => false,
            Self::Corpus(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Ontology(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Store(e) => e.user_message(),
            Self::Emission(e) => format!("{}: {e}", ErrorCategory::Store.description()),
            Self::Corpus(e) => e.user_message(),
            Self::Io(e) => format!("{}: {e}", ErrorCategory::Io.description()),
            Self::Json(e) => format!("{}: {e}", ErrorCategory::Parsing.description()),
            Self::Config(msg) => format!("{}: {msg}", ErrorCategory::Config.description()),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Ontology(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Emission(_) => ErrorCategory::Store,
            Self::Corpus(e) => e.category(),
            Self::Io(_) => ErrorCategory::Io,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Category of the first crate error found in an `anyhow` chain
pub fn categorize(err: &anyhow::Error) -> ErrorCategory {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return e.category();
        }
        if let Some(e) = cause.downcast_ref::<OntologyError>() {
            return e.category();
        }
        if let Some(e) = cause.downcast_ref::<LlmError>() {
            return e.category();
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return e.category();
        }
        if cause.is::<FatalEmissionError>() {
            return ErrorCategory::Store;
        }
        if let Some(e) = cause.downcast_ref::<CorpusError>() {
            return e.category();
        }
        if cause.is::<io::Error>() {
            return ErrorCategory::Io;
        }
    }
    ErrorCategory::Other
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
