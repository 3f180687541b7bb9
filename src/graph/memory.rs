//! In-process graph store
//!
//! Interprets [`GraphStatement`]s with the same merge semantics a Cypher
//! database gives them: nodes are unique per `(label, id)`, edges are unique
//! per `(source, type, target)` and an edge whose endpoint is missing is not
//! created.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use super::{GraphStatement, GraphStore, Record, StoreError};

/// Stored edge identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StoredEdge {
    pub source_label: String,
    pub source_id: String,
    pub relationship_type: String,
    pub target_label: String,
    pub target_id: String,
}

/// Full graph state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    /// `(label, id)` -> properties
    pub nodes: BTreeMap<(String, String), BTreeMap<String, String>>,
    pub relationships: BTreeSet<StoredEdge>,
    /// Labels with a uniqueness constraint on `id`
    pub constraints: BTreeSet<String>,
}

fn count_record(count: i64) -> Vec<Record> {
    let mut record = Record::new();
    record.insert("count".to_string(), serde_json::Value::from(count));
    vec![record]
}

fn grouped_records<'a, I>(key: &str, names: I) -> Vec<Record>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(name, count)| {
            let mut record = Record::new();
            record.insert(key.to_string(), serde_json::Value::from(name));
            record.insert("count".to_string(), serde_json::Value::from(count));
            record
        })
        .collect()
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn contains_node(&self, label: &str, id: &str) -> bool {
        self.nodes.contains_key(&(label.to_string(), id.to_string()))
    }

    /// Property of a node, if both exist
    pub fn node_property(&self, label: &str, id: &str, key: &str) -> Option<&str> {
        self.nodes
            .get(&(label.to_string(), id.to_string()))
            .and_then(|props| props.get(key))
            .map(String::as_str)
    }

    pub fn contains_relationship(
        &self,
        source: (&str, &str),
        relationship_type: &str,
        target: (&str, &str),
    ) -> bool {
        self.relationships.contains(&StoredEdge {
            source_label: source.0.to_string(),
            source_id: source.1.to_string(),
            relationship_type: relationship_type.to_string(),
            target_label: target.0.to_string(),
            target_id: target.1.to_string(),
        })
    }

    /// Edges with an endpoint missing from the node set
    pub fn dangling_relationships(&self) -> Vec<&StoredEdge> {
        self.relationships
            .iter()
            .filter(|e| {
                !self.contains_node(&e.source_label, &e.source_id)
                    || !self.contains_node(&e.target_label, &e.target_id)
            })
            .collect()
    }

    /// Apply one statement
    pub fn apply(&mut self, statement: &GraphStatement) -> Vec<Record> {
        match statement {
            GraphStatement::EnsureUniqueId { label } => {
                self.constraints.insert(label.clone());
                Vec::new()
            }
            GraphStatement::UpsertNode {
                label,
                id,
                description,
                refresh,
            } => {
                let props = self
                    .nodes
                    .entry((label.clone(), id.clone()))
                    .or_insert_with(|| {
                        BTreeMap::from([
                            ("id".to_string(), id.clone()),
                            ("description".to_string(), description.clone()),
                        ])
                    });
                if *refresh {
                    props.insert("description".to_string(), description.clone());
                }
                Vec::new()
            }
            GraphStatement::UpsertDocument {
                label,
                id,
                name,
                content_hash,
            } => {
                let props = self.nodes.entry((label.clone(), id.clone())).or_default();
                props.insert("id".to_string(), id.clone());
                props.insert("name".to_string(), name.clone());
                props.insert("content_hash".to_string(), content_hash.clone());
                Vec::new()
            }
            GraphStatement::NodeExists { label, id } => {
                count_record(i64::from(self.contains_node(label, id)))
            }
            GraphStatement::UpsertRelationship {
                source_label,
                source_id,
                relationship_type,
                target_label,
                target_id,
            } => {
                if !self.contains_node(source_label, source_id)
                    || !self.contains_node(target_label, target_id)
                {
                    return count_record(0);
                }
                self.relationships.insert(StoredEdge {
                    source_label: source_label.clone(),
                    source_id: source_id.clone(),
                    relationship_type: relationship_type.clone(),
                    target_label: target_label.clone(),
                    target_id: target_id.clone(),
                });
                count_record(1)
            }
            GraphStatement::CountNodesByLabel => {
                grouped_records("label", self.nodes.keys().map(|(label, _)| label.as_str()))
            }
            GraphStatement::CountRelationshipsByType => grouped_records(
                "type",
                self.relationships
                    .iter()
                    .map(|e| e.relationship_type.as_str()),
            ),
        }
    }
}

/// In-memory [`GraphStore`]
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphSnapshot>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> GraphSnapshot {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn execute(&self, statement: &GraphStatement) -> Result<Vec<Record>, StoreError> {
        Ok(self.state.lock().await.apply(statement))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
