//! Instance extraction and batch validation
//!
//! Extraction agents turn one document into raw nodes and relationships.
//! Nothing an agent returns is trusted: [`validate_extraction`] normalizes
//! every label, type and id, then enforces the master schema and referential
//! integrity inside the batch.
//!
//! ## Validation rules
//! - Nodes with an empty id or a label outside the schema are dropped
//! - Nodes are deduplicated by `(label, id)`; the first non-empty description wins
//! - Relationships with a type or endpoint label outside the schema are dropped
//! - Relationship endpoints must resolve to an accepted node of the same batch.
//!   An endpoint whose `(label, id)` is unknown but whose id names exactly one
//!   accepted node takes that node's label; otherwise the relationship is
//!   dangling and dropped
//! - Identical relationship triples collapse into one

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use super::error::{OntologyError, OntologyResult, ViolationKind};
use super::normalize::{
    is_valid_identifier, normalize_id, normalize_label, normalize_relationship_type,
};
use super::schema::{SchemaDefinition, SchemaTriplet};
use super::{AgentOutput, ExtractionAgent};
use crate::corpus::Document;
use crate::llm::{extract_json, LlmService, StructuredRequest};
use crate::utils::truncate_text;

/// Extraction configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Leading characters of each document sent to the model
    pub max_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { max_chars: 30_000 }
    }
}

impl ExtractorConfig {
    /// Create a new builder for ExtractorConfig
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> OntologyResult<()> {
        if self.max_chars == 0 {
            return Err(OntologyError::invalid_config(
                "max_chars",
                "0",
                "Must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Builder for ExtractorConfig
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfigBuilder {
    max_chars: Option<usize>,
}

impl ExtractorConfigBuilder {
    /// Set the document prefix length
    pub fn max_chars(mut self, max: usize) -> Self {
        self.max_chars = Some(max);
        self
    }

    /// Build the config with validation
    pub fn build(self) -> OntologyResult<ExtractorConfig> {
        let config = ExtractorConfig {
            max_chars: self.max_chars.unwrap_or(30_000),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Concrete node returned by an extraction agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Canonical id (`UPPER_SNAKE`)
    pub id: String,

    /// Node label from the master schema
    pub label: String,

    /// Human readable name, accents preserved
    #[serde(default, alias = "properties", alias = "name")]
    pub description: String,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: description.into(),
        }
    }

    /// `(label, id)` identity
    pub fn key(&self) -> (String, String) {
        (self.label.clone(), self.id.clone())
    }
}

/// Concrete relationship returned by an extraction agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub source_id: String,
    pub source_label: String,
    #[serde(alias = "relationship", alias = "type")]
    pub relationship_type: String,
    pub target_id: String,
    pub target_label: String,
}

impl GraphRelationship {
    pub fn new(
        source: (&str, &str),
        relationship_type: impl Into<String>,
        target: (&str, &str),
    ) -> Self {
        Self {
            source_label: source.0.to_string(),
            source_id: source.1.to_string(),
            relationship_type: relationship_type.into(),
            target_label: target.0.to_string(),
            target_id: target.1.to_string(),
        }
    }

    /// Abstract pattern of this relationship
    pub fn triplet(&self) -> SchemaTriplet {
        SchemaTriplet {
            source_label: self.source_label.clone(),
            relationship_type: self.relationship_type.clone(),
            target_label: self.target_label.clone(),
        }
    }
}

/// Raw extraction output for one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
}

/// Per-document validation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub accepted_nodes: usize,
    pub rejected_nodes: usize,
    pub duplicate_nodes: usize,
    pub accepted_relationships: usize,
    pub rejected_relationships: usize,
    pub dangling_relationships: usize,
    pub duplicate_relationships: usize,
    pub relabeled_endpoints: usize,
}

impl ExtractionStats {
    /// Add another document's counters
    pub fn absorb(&mut self, other: &ExtractionStats) {
        self.accepted_nodes += other.accepted_nodes;
        self.rejected_nodes += other.rejected_nodes;
        self.duplicate_nodes += other.duplicate_nodes;
        self.accepted_relationships += other.accepted_relationships;
        self.rejected_relationships += other.rejected_relationships;
        self.dangling_relationships += other.dangling_relationships;
        self.duplicate_relationships += other.duplicate_relationships;
        self.relabeled_endpoints += other.relabeled_endpoints;
    }
}

/// Schema-conformant, self-consistent batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedExtraction {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub stats: ExtractionStats,
}

impl ValidatedExtraction {
    /// Distinct abstract patterns used by the accepted relationships
    pub fn triplets(&self) -> BTreeSet<SchemaTriplet> {
        self.relationships.iter().map(GraphRelationship::triplet).collect()
    }
}

/// Normalize and validate a raw batch against the master schema
pub fn validate_extraction(
    raw: ExtractionResult,
    schema: &SchemaDefinition,
    document: &str,
) -> ValidatedExtraction {
    let mut stats = ExtractionStats::default();
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut node_index: HashMap<(String, String), usize> = HashMap::new();

    for node in raw.nodes {
        let label = normalize_label(&node.label);
        let id = normalize_id(&node.id);

        if id.is_empty() {
            stats.rejected_nodes += 1;
            tracing::warn!(document, label = %label, raw_id = %node.id, "Dropping node with empty id");
            continue;
        }

        if !schema.contains_label(&label) {
            stats.rejected_nodes += 1;
            let err = OntologyError::schema_violation(ViolationKind::NodeLabel, &label);
            tracing::warn!(document, id = %id, error = %err, "Dropping node");
            continue;
        }

        let description = node.description.trim().to_string();
        match node_index.get(&(label.clone(), id.clone())) {
            Some(&idx) => {
                stats.duplicate_nodes += 1;
                if nodes[idx].description.is_empty() && !description.is_empty() {
                    nodes[idx].description = description;
                }
            }
            None => {
                node_index.insert((label.clone(), id.clone()), nodes.len());
                nodes.push(GraphNode {
                    id,
                    label,
                    description,
                });
            }
        }
    }

    // id -> labels of accepted nodes carrying that id
    let mut labels_by_id: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &nodes {
        labels_by_id
            .entry(node.id.as_str())
            .or_default()
            .push(node.label.as_str());
    }

    let mut relationships = Vec::new();
    let mut seen: HashSet<GraphRelationship> = HashSet::new();

    for rel in raw.relationships {
        let rel_type = normalize_relationship_type(&rel.relationship_type);
        if !is_valid_identifier(&rel_type) || !schema.contains_relationship_type(&rel_type) {
            stats.rejected_relationships += 1;
            let err = OntologyError::schema_violation(ViolationKind::RelationshipType, &rel_type);
            tracing::warn!(document, error = %err, "Dropping relationship");
            continue;
        }

        let source_label = normalize_label(&rel.source_label);
        let target_label = normalize_label(&rel.target_label);
        if let Some(bad) = [&source_label, &target_label]
            .into_iter()
            .find(|l| !schema.contains_label(l))
        {
            stats.rejected_relationships += 1;
            let err = OntologyError::schema_violation(ViolationKind::EndpointLabel, bad.as_str());
            tracing::warn!(document, relationship_type = %rel_type, error = %err, "Dropping relationship");
            continue;
        }

        let source_id = normalize_id(&rel.source_id);
        let target_id = normalize_id(&rel.target_id);

        let source = resolve_endpoint(&node_index, &labels_by_id, source_label, source_id);
        let target = resolve_endpoint(&node_index, &labels_by_id, target_label, target_id);

        let (source, target) = match (source, target) {
            (Resolution::Found(s), Resolution::Found(t)) => (s, t),
            (s, t) => {
                stats.dangling_relationships += 1;
                for missing in [s, t].into_iter().filter_map(Resolution::missing) {
                    let err = OntologyError::dangling_reference(&rel_type, &missing.0, &missing.1);
                    tracing::warn!(document, error = %err, "Dropping relationship");
                }
                continue;
            }
        };

        stats.relabeled_endpoints += usize::from(source.relabeled) + usize::from(target.relabeled);

        let rel = GraphRelationship {
            source_id: source.id,
            source_label: source.label,
            relationship_type: rel_type,
            target_id: target.id,
            target_label: target.label,
        };

        if seen.insert(rel.clone()) {
            relationships.push(rel);
        } else {
            stats.duplicate_relationships += 1;
        }
    }

    stats.accepted_nodes = nodes.len();
    stats.accepted_relationships = relationships.len();

    ValidatedExtraction {
        nodes,
        relationships,
        stats,
    }
}

struct Endpoint {
    label: String,
    id: String,
    relabeled: bool,
}

enum Resolution {
    Found(Endpoint),
    Missing(String, String),
}

impl Resolution {
    fn missing(self) -> Option<(String, String)> {
        match self {
            Resolution::Found(_) => None,
            Resolution::Missing(label, id) => Some((label, id)),
        }
    }
}

fn resolve_endpoint(
    node_index: &HashMap<(String, String), usize>,
    labels_by_id: &HashMap<&str, Vec<&str>>,
    label: String,
    id: String,
) -> Resolution {
    if id.is_empty() {
        return Resolution::Missing(label, id);
    }

    if node_index.contains_key(&(label.clone(), id.clone())) {
        return Resolution::Found(Endpoint {
            label,
            id,
            relabeled: false,
        });
    }

    match labels_by_id.get(id.as_str()).map(Vec::as_slice) {
        Some([only]) => Resolution::Found(Endpoint {
            label: (*only).to_string(),
            id,
            relabeled: true,
        }),
        _ => Resolution::Missing(label, id),
    }
}

/// Extraction agent backed by an LLM
pub struct LlmExtractor {
    llm: Arc<dyn LlmService>,
    config: ExtractorConfig,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self::with_config(llm, ExtractorConfig::default())
    }

    pub fn with_config(llm: Arc<dyn LlmService>, config: ExtractorConfig) -> Self {
        Self { llm, config }
    }

    fn build_request(&self, document: &Document, schema: &SchemaDefinition) -> StructuredRequest {
        let labels = schema.node_labels.iter().cloned().collect::<Vec<_>>();
        let types = schema.relationship_types.iter().cloned().collect::<Vec<_>>();

        let system = format!(
            "You are a knowledge graph extraction engine.\n\
             Extract concrete instances from the document using ONLY this schema.\n\n\
             Node labels: {labels}\n\
             Relationship types: {types}\n\n\
             Rules:\n\
             1. Every node has an `id` in UPPER_SNAKE_CASE without accents \
             (\"Ley 27.275\" -> LEY_27_275), a `label` from the list above and a short \
             human readable `description` (accents allowed).\n\
             2. Use the same id every time the same real-world entity appears.\n\
             3. Every relationship must connect two nodes that appear in `nodes`, \
             referenced by their exact id and label.\n\
             4. Do not invent labels or relationship types. Skip anything that does not fit.",
            labels = labels.join(", "),
            types = types.join(", "),
        );

        let user = format!(
            "Document: {}\n\n{}",
            document.filename,
            document.prefix(self.config.max_chars)
        );

        StructuredRequest {
            system,
            user,
            schema_name: "extraction_result".to_string(),
            json_schema: extraction_json_schema(&labels, &types),
        }
    }
}

fn string_field(allowed: &[String]) -> serde_json::Value {
    if allowed.is_empty() {
        serde_json::json!({ "type": "string" })
    } else {
        serde_json::json!({ "type": "string", "enum": allowed })
    }
}

fn extraction_json_schema(labels: &[String], types: &[String]) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "label": string_field(labels),
                        "description": { "type": "string" }
                    },
                    "required": ["id", "label", "description"],
                    "additionalProperties": false
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source_id": { "type": "string" },
                        "source_label": string_field(labels),
                        "relationship_type": string_field(types),
                        "target_id": { "type": "string" },
                        "target_label": string_field(labels)
                    },
                    "required": ["source_id", "source_label", "relationship_type", "target_id", "target_label"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["nodes", "relationships"],
        "additionalProperties": false
    })
}

#[async_trait]
impl ExtractionAgent for LlmExtractor {
    async fn extract(
        &self,
        document: &Document,
        schema: &SchemaDefinition,
    ) -> OntologyResult<AgentOutput<ExtractionResult>> {
        let request = self.build_request(document, schema);

        let response = self
            .llm
            .complete_structured(&request)
            .await
            .map_err(|source| OntologyError::Llm {
                document: document.filename.clone(),
                source,
            })?;

        let result: ExtractionResult = serde_json::from_str(extract_json(&response.content))
            .map_err(|e| {
                tracing::debug!(
                    document = %document.filename,
                    content = %truncate_text(&response.content, 200),
                    "Undecodable extraction"
                );
                OntologyError::extraction_parse(&document.filename, e.to_string())
            })?;

        tracing::info!(
            document = %document.filename,
            tokens = response.total_tokens,
            nodes = result.nodes.len(),
            relationships = result.relationships.len(),
            "Extraction completed"
        );

        Ok(AgentOutput::new(result, response.total_tokens))
    }
}

/// One side of a triple line: optional label and the entity name
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TripleEndpoint {
    pub label: Option<String>,
    pub name: String,
}

/// Parsed `(A)-[REL]->(B)` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TripleLine {
    pub source: TripleEndpoint,
    pub relationship: String,
    pub target: TripleEndpoint,
}

fn triple_regex() -> &'static Regex {
    static TRIPLE_RE: OnceLock<Regex> = OnceLock::new();
    TRIPLE_RE.get_or_init(|| {
        Regex::new(r"\(([^)]+)\)\s*-\[(\w+)\]->\s*\(([^)]+)\)").expect("Invalid regex pattern")
    })
}

fn parse_endpoint(raw: &str) -> TripleEndpoint {
    match raw.split_once(':') {
        Some((label, name)) if !label.trim().is_empty() && !name.trim().is_empty() => {
            TripleEndpoint {
                label: Some(label.trim().to_string()),
                name: name.trim().to_string(),
            }
        }
        _ => TripleEndpoint {
            label: None,
            name: raw.trim().to_string(),
        },
    }
}

/// Every triple found in `text`, one per match
pub(crate) fn parse_triples(text: &str) -> Vec<TripleLine> {
    triple_regex()
        .captures_iter(text)
        .map(|caps| TripleLine {
            source: parse_endpoint(&caps[1]),
            relationship: caps[2].to_string(),
            target: parse_endpoint(&caps[3]),
        })
        .collect()
}

/// Extraction agent for explicit triple lines, no LLM involved.
///
/// `(Norma:Ley 27.275)-[DEROGA]->(Norma:Ley 25.326)` yields two `Norma` nodes
/// and a `DEROGA` edge. Endpoints without a `Label:` prefix use the default
/// label.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    default_label: String,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new("Entity")
    }
}

impl PatternExtractor {
    pub fn new(default_label: impl Into<String>) -> Self {
        Self {
            default_label: default_label.into(),
        }
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Parse `text` into a raw batch
    pub fn extract_text(&self, text: &str) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for triple in parse_triples(text) {
            let source = self.node_for(&triple.source);
            let target = self.node_for(&triple.target);

            result.relationships.push(GraphRelationship {
                source_id: source.id.clone(),
                source_label: source.label.clone(),
                relationship_type: triple.relationship,
                target_id: target.id.clone(),
                target_label: target.label.clone(),
            });
            result.nodes.push(source);
            result.nodes.push(target);
        }

        result
    }

    fn node_for(&self, endpoint: &TripleEndpoint) -> GraphNode {
        let label = endpoint.label.as_deref().unwrap_or(&self.default_label);
        GraphNode::new(normalize_id(&endpoint.name), label, endpoint.name.clone())
    }
}

#[async_trait]
impl ExtractionAgent for PatternExtractor {
    async fn extract(
        &self,
        document: &Document,
        _schema: &SchemaDefinition,
    ) -> OntologyResult<AgentOutput<ExtractionResult>> {
        Ok(AgentOutput::free(self.extract_text(&document.text)))
    }
}
