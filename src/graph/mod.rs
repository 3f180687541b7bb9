//! Graph store abstraction and emission
//!
//! The pipeline never talks Bolt directly: it hands [`GraphStatement`]s to a
//! [`GraphStore`]. Three stores are provided:
//!
//! - [`Neo4jStore`] - live Neo4j database over Bolt
//! - [`MemoryGraph`] - in-process interpreter of the statements, used by tests and dry runs
//! - [`ScriptStore`] - writes a replayable `.cypher` script and mirrors the
//!   graph in memory to answer lookups
//!
//! The [`emitter`] turns validated batches into ordered statements.

use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod cypher;
pub mod emitter;
pub mod error;
pub mod memory;
pub mod neo4j;
pub mod script;

pub use cypher::{quote_identifier, quote_literal, ColumnKind, CypherQuery, GraphStatement};
pub use emitter::{
    DocumentBatch, EmissionReport, EmitOptions, Emitter, FailedStatement, FatalEmissionError,
    Phase,
};
pub use error::StoreError;
pub use memory::MemoryGraph;
pub use neo4j::{Neo4jConfig, Neo4jStore};
pub use script::ScriptStore;

/// One result row, keyed by column name
pub type Record = BTreeMap<String, serde_json::Value>;

/// Destination for graph statements
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute one statement and return its rows
    async fn execute(&self, statement: &GraphStatement) -> Result<Vec<Record>, StoreError>;

    /// Persist buffered output, if any
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Short store name for logs
    fn name(&self) -> &'static str;
}

/// Read the `count` column of the first row, 0 when absent
pub fn first_count(records: &[Record]) -> i64 {
    records
        .first()
        .and_then(|r| r.get("count"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

/// `(key, count)` pairs from a grouped count query
pub fn grouped_counts(records: &[Record], key: &str) -> Vec<(String, i64)> {
    records
        .iter()
        .filter_map(|r| {
            let name = r.get(key)?.as_str()?.to_string();
            let count = r.get("count")?.as_i64()?;
            Some((name, count))
        })
        .collect()
}
