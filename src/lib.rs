//! ontograph - LLM-driven schema discovery and property-graph construction
//!
//! Turns a directory of plain-text documents into a property graph in two
//! phases: an ontology agent proposes the node labels and relationship types
//! each document contains, the proposals are unified into one master schema,
//! and an extraction agent pulls schema-conformant instances out of every
//! document. Instances are normalized, validated and written with idempotent
//! `MERGE` statements, so re-running a corpus never duplicates anything.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`corpus`] - Corpus directory loading and decoding
//! - [`llm`] - Structured-output LLM client with rate limiting and retries
//! - [`ontology`] - Normalizer, schema unifier, ontology and extraction agents
//! - [`graph`] - Graph statements, stores and the emitter
//! - [`pipeline`] - Orchestration of the stages with bounded fan-out
//! - [`error`] - Unified error type
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ontograph::corpus::CorpusLoader;
//! use ontograph::graph::MemoryGraph;
//! use ontograph::ontology::{PatternExtractor, PatternOntologist};
//! use ontograph::pipeline::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let corpus = CorpusLoader::new().load(std::path::Path::new("corpus"))?;
//!     let pipeline = Pipeline::new(
//!         Arc::new(PatternOntologist::default()),
//!         Arc::new(PatternExtractor::default()),
//!         PipelineConfig::default(),
//!     )?;
//!     let report = pipeline.run(&corpus, Arc::new(MemoryGraph::new())).await;
//!     println!("{}", report.schema.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod graph;
pub mod llm;
pub mod ontology;
pub mod pipeline;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::corpus::{Corpus, CorpusLoader, Document};
    pub use crate::error::{Error, ErrorCategory, OntographErrorTrait, Result};
    pub use crate::graph::{EmitOptions, GraphStore, MemoryGraph, Neo4jStore, ScriptStore};
    pub use crate::llm::{LlmClient, LlmConfig, LlmService};
    pub use crate::ontology::{
        ExtractionAgent, LlmExtractor, LlmOntologist, OntologyAgent, PatternExtractor,
        PatternOntologist, SchemaDefinition,
    };
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport};
}

// Direct re-exports for convenience
pub use ontology::{normalize, Convention, SchemaDefinition};
