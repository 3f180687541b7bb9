//! Schema discovery and instance extraction
//!
//! The two agents behind the graph pipeline live here:
//!
//! - **Ontology agent** ([`OntologyAgent`]): reads one document and proposes
//!   the categories it contains as a [`SchemaDefinition`].
//! - **Extraction agent** ([`ExtractionAgent`]): reads one document against the
//!   master schema and returns concrete nodes and relationships.
//!
//! Both have an LLM-backed implementation and a pattern-based one that parses
//! explicit `(Label:Name)-[TYPE]->(Label:Name)` triple lines without any model.
//!
//! # Submodules
//!
//! - [`normalize`] - Canonical casing and diacritic folding for labels, types and ids
//! - [`schema`] - Schema definitions, unification and conceptual triplets
//! - [`ontologist`] - Ontology agents
//! - [`extractor`] - Extraction agents and batch validation
//! - [`error`] - Error types for ontology operations
//!
//! # Example
//!
//! ```ignore
//! use ontograph::ontology::{unify, validate_extraction, ExtractionAgent, OntologyAgent};
//!
//! let proposal = ontologist.propose_schema(&doc, &known, goal).await?;
//! let master = unify([&proposal.value]);
//! let raw = extractor.extract(&doc, &master).await?;
//! let batch = validate_extraction(raw.value, &master, &doc.filename);
//! ```

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::corpus::Document;

pub mod error;
pub mod extractor;
pub mod normalize;
pub mod ontologist;
pub mod schema;

pub use error::{OntologyError, OntologyResult, ViolationKind};
pub use extractor::{
    validate_extraction, ExtractionResult, ExtractionStats, ExtractorConfig,
    ExtractorConfigBuilder, GraphNode, GraphRelationship, LlmExtractor, PatternExtractor,
    ValidatedExtraction,
};
pub use normalize::{
    is_valid_identifier, normalize, normalize_id, normalize_label, normalize_relationship_type,
    Convention,
};
pub use ontologist::{LlmOntologist, OntologistConfig, OntologistConfigBuilder, PatternOntologist};
pub use schema::{render_concept_file, unify, SchemaDefinition, SchemaTriplet};

/// Agent result plus the tokens spent producing it
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput<T> {
    pub value: T,
    pub tokens: u64,
}

impl<T> AgentOutput<T> {
    pub fn new(value: T, tokens: u64) -> Self {
        Self { value, tokens }
    }

    /// Output produced without any LLM call
    pub fn free(value: T) -> Self {
        Self { value, tokens: 0 }
    }
}

/// Proposes a schema for one document
#[async_trait]
pub trait OntologyAgent: Send + Sync {
    /// Propose node labels and relationship types present in `document`.
    ///
    /// `known_labels` are offered for reuse; `goal` steers which categories
    /// matter. The returned schema is already normalized.
    async fn propose_schema(
        &self,
        document: &Document,
        known_labels: &BTreeSet<String>,
        goal: Option<&str>,
    ) -> OntologyResult<AgentOutput<SchemaDefinition>>;
}

/// Extracts instances for one document under a fixed master schema
#[async_trait]
pub trait ExtractionAgent: Send + Sync {
    /// Raw, unvalidated extraction. Callers run [`validate_extraction`].
    async fn extract(
        &self,
        document: &Document,
        schema: &SchemaDefinition,
    ) -> OntologyResult<AgentOutput<ExtractionResult>>;
}
