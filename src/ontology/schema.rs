//! Schema definitions and cross-document unification
//!
//! A [`SchemaDefinition`] is the abstract vocabulary of the graph: the set of
//! node labels and relationship types instances may use. Each document yields
//! one proposal; [`unify`] folds the proposals into the master schema that is
//! handed, read-only, to the extraction phase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::normalize::{is_valid_identifier, normalize_label, normalize_relationship_type};

/// Abstract vocabulary of node labels and relationship types
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Node labels (`CapitalizedCamel`)
    #[serde(default)]
    pub node_labels: BTreeSet<String>,

    /// Relationship types (`UPPER_SNAKE`)
    #[serde(default)]
    pub relationship_types: BTreeSet<String>,
}

/// Entries dropped while normalizing a proposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DroppedEntries {
    pub node_labels: Vec<String>,
    pub relationship_types: Vec<String>,
}

impl DroppedEntries {
    pub fn is_empty(&self) -> bool {
        self.node_labels.is_empty() && self.relationship_types.is_empty()
    }
}

impl SchemaDefinition {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from raw agent output, normalizing every entry.
    ///
    /// Entries that do not normalize to a valid identifier are returned in
    /// [`DroppedEntries`] instead of being kept.
    pub fn from_raw<L, T>(labels: L, types: T) -> (Self, DroppedEntries)
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let mut schema = Self::new();
        let mut dropped = DroppedEntries::default();

        for raw in labels {
            let raw = raw.as_ref();
            let label = normalize_label(raw);
            if is_valid_identifier(&label) {
                schema.node_labels.insert(label);
            } else {
                dropped.node_labels.push(raw.to_string());
            }
        }

        for raw in types {
            let raw = raw.as_ref();
            let rel_type = normalize_relationship_type(raw);
            if is_valid_identifier(&rel_type) {
                schema.relationship_types.insert(rel_type);
            } else {
                dropped.relationship_types.push(raw.to_string());
            }
        }

        (schema, dropped)
    }

    /// Schema holding only node labels
    pub fn from_labels<I>(labels: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self::from_raw(labels, std::iter::empty::<&str>()).0
    }

    /// Re-normalize every entry; invalid ones are discarded.
    pub fn normalized(&self) -> Self {
        Self::from_raw(&self.node_labels, &self.relationship_types).0
    }

    /// Union `other` into `self`
    pub fn merge(&mut self, other: &SchemaDefinition) {
        self.node_labels.extend(other.node_labels.iter().cloned());
        self.relationship_types
            .extend(other.relationship_types.iter().cloned());
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.node_labels.contains(label)
    }

    pub fn contains_relationship_type(&self, rel_type: &str) -> bool {
        self.relationship_types.contains(rel_type)
    }

    /// Remove a label, returning whether it was present
    pub fn remove_label(&mut self, label: &str) -> bool {
        self.node_labels.remove(label)
    }

    pub fn is_empty(&self) -> bool {
        self.node_labels.is_empty() && self.relationship_types.is_empty()
    }

    /// One-line summary for logs and reports
    pub fn summary(&self) -> String {
        format!(
            "{} labels, {} relationship types",
            self.node_labels.len(),
            self.relationship_types.len()
        )
    }
}

/// Unify per-document proposals into one master schema.
///
/// Set union after normalization. Associative and commutative; an empty
/// input yields an empty schema.
pub fn unify<'a, I>(proposals: I) -> SchemaDefinition
where
    I: IntoIterator<Item = &'a SchemaDefinition>,
{
    proposals
        .into_iter()
        .fold(SchemaDefinition::new(), |mut master, proposal| {
            master.merge(&proposal.normalized());
            master
        })
}

/// `(SourceLabel)-[TYPE]->(TargetLabel)` pattern observed in accepted data
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaTriplet {
    pub source_label: String,
    pub relationship_type: String,
    pub target_label: String,
}

impl std::fmt::Display for SchemaTriplet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}) --[{}]--> ({})",
            self.source_label, self.relationship_type, self.target_label
        )
    }
}

/// Render the conceptual schema file: one commented triplet per line.
pub fn render_concept_file(triplets: &BTreeSet<SchemaTriplet>) -> String {
    let mut lines = vec![
        "// ========================================".to_string(),
        "// Conceptual graph schema".to_string(),
        "// ========================================".to_string(),
        "// Relationship patterns observed:".to_string(),
        "//".to_string(),
    ];

    if triplets.is_empty() {
        lines.push("// (no relationships detected)".to_string());
    } else {
        lines.extend(triplets.iter().map(|t| format!("// {t}")));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
