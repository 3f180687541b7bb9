//! Error types for schema discovery and instance extraction
//!
//! Per-document failures (`SchemaParse`, `ExtractionParse`) never abort a
//! corpus run: the pipeline records the document as failed and moves on.
//! `SchemaViolation` and `DanglingReference` describe individual records that
//! were dropped during validation; they are logged and counted rather than
//! propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ontology operations
pub type OntologyResult<T> = Result<T, OntologyError>;

/// Errors raised by the ontology agents and validators
#[derive(Error, Debug)]
pub enum OntologyError {
    /// Ontology agent output could not be decoded into a schema
    #[error("Schema proposal for '{document}' could not be decoded: {reason}")]
    SchemaParse { document: String, reason: String },

    /// Extraction agent output could not be decoded into instances
    #[error("Extraction for '{document}' could not be decoded: {reason}")]
    ExtractionParse { document: String, reason: String },

    /// A label or relationship type outside the master schema
    #[error("{kind} '{value}' is not part of the master schema")]
    SchemaViolation { kind: ViolationKind, value: String },

    /// A relationship endpoint with no matching accepted node
    #[error("Relationship {relationship_type} references unknown node ({label}:{id})")]
    DanglingReference {
        relationship_type: String,
        label: String,
        id: String,
    },

    /// The LLM call behind an agent failed
    #[error("LLM request failed for '{document}': {source}")]
    Llm {
        document: String,
        #[source]
        source: crate::llm::LlmError,
    },

    /// Invalid configuration value
    #[error("Invalid config '{field}' = '{value}': {reason}")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    /// Failed to read a control file (goal, seed labels)
    #[error("I/O error during {operation} on {path:?}: {source}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which part of a record violated the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    NodeLabel,
    RelationshipType,
    EndpointLabel,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeLabel => write!(f, "Node label"),
            Self::RelationshipType => write!(f, "Relationship type"),
            Self::EndpointLabel => write!(f, "Endpoint label"),
        }
    }
}

impl OntologyError {
    /// Create a schema decode error
    pub fn schema_parse(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaParse {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Create an extraction decode error
    pub fn extraction_parse(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtractionParse {
            document: document.into(),
            reason: reason.into(),
        }
    }

    pub fn schema_violation(kind: ViolationKind, value: impl Into<String>) -> Self {
        Self::SchemaViolation {
            kind,
            value: value.into(),
        }
    }

    pub fn dangling_reference(
        relationship_type: impl Into<String>,
        label: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::DanglingReference {
            relationship_type: relationship_type.into(),
            label: label.into(),
            id: id.into(),
        }
    }

    /// Create a config validation error
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Whether the corpus run can continue past this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SchemaParse { .. }
            | Self::ExtractionParse { .. }
            | Self::SchemaViolation { .. }
            | Self::DanglingReference { .. } => true,
            Self::Llm { source, .. } => source.is_transient(),
            Self::InvalidConfig { .. } | Self::Io { .. } => false,
        }
    }

    /// Short description used in run reports
    pub fn summary(&self) -> &'static str {
        match self {
            Self::SchemaParse { .. } => "schema proposal undecodable",
            Self::ExtractionParse { .. } => "extraction undecodable",
            Self::SchemaViolation { .. } => "schema violation",
            Self::DanglingReference { .. } => "dangling reference",
            Self::Llm { .. } => "llm request failed",
            Self::InvalidConfig { .. } => "invalid config",
            Self::Io { .. } => "i/o error",
        }
    }
}
