//! Graph emission
//!
//! Turns validated per-document batches into an ordered statement stream:
//!
//! 1. uniqueness constraints (optional)
//! 2. one upsert per distinct `(label, id)` across the whole run
//! 3. provenance documents and their `MENTIONS` edges (optional)
//! 4. semantic relationships, each after its endpoints are resolved
//!
//! Statements are executed one at a time. A rejected statement is recorded
//! and the run continues; a connectivity failure stops it with enough context
//! to resume.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use super::{first_count, GraphStatement, GraphStore, Record, StoreError};
use crate::corpus::Document;
use crate::ontology::error::{OntologyError, OntologyResult};
use crate::ontology::extractor::{GraphNode, GraphRelationship, ValidatedExtraction};
use crate::ontology::normalize::is_valid_identifier;
use crate::ontology::schema::SchemaDefinition;

/// Emission options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Create a uniqueness constraint on `id` for every label first
    pub create_constraints: bool,

    /// Overwrite descriptions of nodes that already exist
    pub refresh_descriptions: bool,

    /// Emit one node per source file linked to the entities it yielded
    pub provenance: bool,

    pub provenance_label: String,
    pub mentions_type: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            create_constraints: true,
            refresh_descriptions: false,
            provenance: false,
            provenance_label: "Document".to_string(),
            mentions_type: "MENTIONS".to_string(),
        }
    }
}

impl EmitOptions {
    pub fn validate(&self) -> OntologyResult<()> {
        if !is_valid_identifier(&self.provenance_label) {
            return Err(OntologyError::invalid_config(
                "provenance_label",
                &self.provenance_label,
                "Must be a valid identifier",
            ));
        }
        if !is_valid_identifier(&self.mentions_type) {
            return Err(OntologyError::invalid_config(
                "mentions_type",
                &self.mentions_type,
                "Must be a valid identifier",
            ));
        }
        Ok(())
    }
}

/// Accepted output of one document
#[derive(Debug, Clone)]
pub struct DocumentBatch {
    pub filename: String,
    pub document_id: String,
    pub content_hash: String,
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

impl DocumentBatch {
    pub fn new(document: &Document, extraction: ValidatedExtraction) -> Self {
        Self {
            filename: document.filename.clone(),
            document_id: document.node_id(),
            content_hash: document.content_hash(),
            nodes: extraction.nodes,
            relationships: extraction.relationships,
        }
    }
}

/// Emission phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Constraints,
    Nodes,
    Provenance,
    Relationships,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Constraints => "constraints",
            Self::Nodes => "nodes",
            Self::Provenance => "provenance",
            Self::Relationships => "relationships",
        };
        f.write_str(name)
    }
}

/// A statement the store rejected
#[derive(Debug, Clone, Serialize)]
pub struct FailedStatement {
    pub phase: Phase,
    pub statement: String,
    pub entity_ids: Vec<String>,
    pub message: String,
}

/// Outcome of an emission run
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmissionReport {
    pub constraints_ensured: usize,
    pub nodes_upserted: usize,
    pub documents_upserted: usize,
    pub mentions_upserted: usize,
    pub relationships_upserted: usize,
    /// Edges skipped because an endpoint could not be found
    pub unresolved_relationships: Vec<String>,
    pub failed_statements: Vec<FailedStatement>,
    /// Statements the store accepted
    pub statements_completed: usize,
    pub cancelled: bool,
}

/// Emission stopped by a connectivity-class failure
#[derive(Error, Debug)]
#[error("Emission aborted in {phase} phase after {statements_completed} statements: {source}")]
pub struct FatalEmissionError {
    pub phase: Phase,
    pub statements_completed: usize,
    /// What was written before the failure
    pub report: Box<EmissionReport>,
    #[source]
    pub source: StoreError,
}

enum Halt {
    Cancelled,
    Fatal(Phase, StoreError),
}

type NodeKey = (String, String);

fn describe_edge(rel: &GraphRelationship) -> String {
    format!(
        "({}:{})-[{}]->({}:{})",
        rel.source_label, rel.source_id, rel.relationship_type, rel.target_label, rel.target_id
    )
}

/// Distinct nodes across batches, first non-empty description wins
fn distinct_nodes(batches: &[DocumentBatch]) -> BTreeMap<NodeKey, String> {
    let mut nodes: BTreeMap<NodeKey, String> = BTreeMap::new();
    for node in batches.iter().flat_map(|b| &b.nodes) {
        let description = nodes.entry(node.key()).or_default();
        if description.is_empty() {
            description.clone_from(&node.description);
        }
    }
    nodes
}

/// Serial statement emitter
pub struct Emitter {
    store: Arc<dyn GraphStore>,
    options: EmitOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Emitter {
    pub fn new(store: Arc<dyn GraphStore>, options: EmitOptions) -> Self {
        Self {
            store,
            options,
            shutdown: None,
        }
    }

    /// Stop between statements once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Emit every batch against the master schema
    pub async fn emit(
        &self,
        schema: &SchemaDefinition,
        batches: &[DocumentBatch],
    ) -> Result<EmissionReport, FatalEmissionError> {
        let mut report = EmissionReport::default();

        tracing::info!(
            store = self.store.name(),
            documents = batches.len(),
            provenance = self.options.provenance,
            "Starting graph emission"
        );

        match self.emit_phases(schema, batches, &mut report).await {
            Ok(()) => {}
            Err(Halt::Cancelled) => {
                tracing::warn!(
                    statements_completed = report.statements_completed,
                    "Emission cancelled"
                );
                report.cancelled = true;
            }
            Err(Halt::Fatal(phase, source)) => {
                tracing::error!(
                    phase = %phase,
                    statements_completed = report.statements_completed,
                    error = %source,
                    "Emission aborted"
                );
                return Err(FatalEmissionError {
                    phase,
                    statements_completed: report.statements_completed,
                    report: Box::new(report),
                    source,
                });
            }
        }

        tracing::info!(
            nodes = report.nodes_upserted,
            relationships = report.relationships_upserted,
            unresolved = report.unresolved_relationships.len(),
            failed = report.failed_statements.len(),
            "Graph emission finished"
        );

        Ok(report)
    }

    async fn emit_phases(
        &self,
        schema: &SchemaDefinition,
        batches: &[DocumentBatch],
        report: &mut EmissionReport,
    ) -> Result<(), Halt> {
        if self.options.create_constraints {
            self.emit_constraints(schema, batches, report).await?;
        }

        let upserted = self.emit_nodes(batches, report).await?;

        if self.options.provenance {
            self.emit_provenance(batches, &upserted, report).await?;
        }

        self.emit_relationships(batches, &upserted, report).await
    }

    async fn emit_constraints(
        &self,
        schema: &SchemaDefinition,
        batches: &[DocumentBatch],
        report: &mut EmissionReport,
    ) -> Result<(), Halt> {
        let mut labels: BTreeSet<&str> = schema.node_labels.iter().map(String::as_str).collect();
        labels.extend(batches.iter().flat_map(|b| &b.nodes).map(|n| n.label.as_str()));
        if self.options.provenance {
            labels.insert(self.options.provenance_label.as_str());
        }

        for label in labels {
            let statement = GraphStatement::EnsureUniqueId {
                label: label.to_string(),
            };
            if self.run(Phase::Constraints, &statement, report).await?.is_some() {
                report.constraints_ensured += 1;
            }
        }
        Ok(())
    }

    async fn emit_nodes(
        &self,
        batches: &[DocumentBatch],
        report: &mut EmissionReport,
    ) -> Result<HashSet<NodeKey>, Halt> {
        let nodes = distinct_nodes(batches);
        let mut upserted = HashSet::with_capacity(nodes.len());

        for ((label, id), description) in nodes {
            let statement = GraphStatement::UpsertNode {
                label: label.clone(),
                id: id.clone(),
                description,
                refresh: self.options.refresh_descriptions,
            };
            if self.run(Phase::Nodes, &statement, report).await?.is_some() {
                report.nodes_upserted += 1;
                upserted.insert((label, id));
            }
        }

        tracing::debug!(nodes = report.nodes_upserted, "Node phase done");
        Ok(upserted)
    }

    async fn emit_provenance(
        &self,
        batches: &[DocumentBatch],
        upserted: &HashSet<NodeKey>,
        report: &mut EmissionReport,
    ) -> Result<(), Halt> {
        for batch in batches {
            let document = GraphStatement::UpsertDocument {
                label: self.options.provenance_label.clone(),
                id: batch.document_id.clone(),
                name: batch.filename.clone(),
                content_hash: batch.content_hash.clone(),
            };
            if self.run(Phase::Provenance, &document, report).await?.is_none() {
                continue;
            }
            report.documents_upserted += 1;

            let mentioned: BTreeSet<NodeKey> = batch
                .nodes
                .iter()
                .map(GraphNode::key)
                .filter(|key| upserted.contains(key))
                .collect();

            for (label, id) in mentioned {
                let statement = GraphStatement::UpsertRelationship {
                    source_label: self.options.provenance_label.clone(),
                    source_id: batch.document_id.clone(),
                    relationship_type: self.options.mentions_type.clone(),
                    target_label: label,
                    target_id: id,
                };
                if let Some(rows) = self.run(Phase::Provenance, &statement, report).await? {
                    if first_count(&rows) > 0 {
                        report.mentions_upserted += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn emit_relationships(
        &self,
        batches: &[DocumentBatch],
        upserted: &HashSet<NodeKey>,
        report: &mut EmissionReport,
    ) -> Result<(), Halt> {
        let relationships: BTreeSet<&GraphRelationship> =
            batches.iter().flat_map(|b| &b.relationships).collect();
        let mut lookups: HashMap<NodeKey, bool> = HashMap::new();

        for rel in relationships {
            let source = (rel.source_label.clone(), rel.source_id.clone());
            let target = (rel.target_label.clone(), rel.target_id.clone());

            let resolved = self.resolve(source, upserted, &mut lookups, report).await?
                && self.resolve(target, upserted, &mut lookups, report).await?;
            if !resolved {
                tracing::warn!(edge = %describe_edge(rel), "Skipping edge with unresolved endpoint");
                report.unresolved_relationships.push(describe_edge(rel));
                continue;
            }

            let statement = GraphStatement::UpsertRelationship {
                source_label: rel.source_label.clone(),
                source_id: rel.source_id.clone(),
                relationship_type: rel.relationship_type.clone(),
                target_label: rel.target_label.clone(),
                target_id: rel.target_id.clone(),
            };
            match self.run(Phase::Relationships, &statement, report).await? {
                Some(rows) if first_count(&rows) > 0 => report.relationships_upserted += 1,
                Some(_) => {
                    tracing::warn!(edge = %describe_edge(rel), "Edge matched no endpoints");
                    report.unresolved_relationships.push(describe_edge(rel));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Whether a node is known to exist, querying the store at most once per key
    async fn resolve(
        &self,
        key: NodeKey,
        upserted: &HashSet<NodeKey>,
        lookups: &mut HashMap<NodeKey, bool>,
        report: &mut EmissionReport,
    ) -> Result<bool, Halt> {
        if upserted.contains(&key) {
            return Ok(true);
        }
        if let Some(found) = lookups.get(&key) {
            return Ok(*found);
        }

        let statement = GraphStatement::NodeExists {
            label: key.0.clone(),
            id: key.1.clone(),
        };
        let found = self
            .run(Phase::Relationships, &statement, report)
            .await?
            .is_some_and(|rows| first_count(&rows) > 0);
        lookups.insert(key, found);
        Ok(found)
    }

    /// Execute one statement; `None` when the store rejected it
    async fn run(
        &self,
        phase: Phase,
        statement: &GraphStatement,
        report: &mut EmissionReport,
    ) -> Result<Option<Vec<Record>>, Halt> {
        if self.cancelled() {
            return Err(Halt::Cancelled);
        }

        match self.store.execute(statement).await {
            Ok(rows) => {
                report.statements_completed += 1;
                Ok(Some(rows))
            }
            Err(err) if err.is_fatal() => Err(Halt::Fatal(phase, err)),
            Err(err) => {
                let text = statement.to_cypher().text;
                let entity_ids = statement.entity_ids();
                tracing::warn!(
                    phase = %phase,
                    statement = %text,
                    entity_ids = ?entity_ids,
                    error = %err,
                    "Statement rejected"
                );
                report.failed_statements.push(FailedStatement {
                    phase,
                    statement: text,
                    entity_ids,
                    message: err.to_string(),
                });
                Ok(None)
            }
        }
    }
}
