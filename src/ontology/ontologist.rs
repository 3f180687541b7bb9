//! Ontology agents: per-document schema proposals
//!
//! The LLM ontologist reads a bounded prefix of the document and returns the
//! categories it contains, never instance values. The pattern ontologist
//! derives the same shape from explicit triple lines.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::{OntologyError, OntologyResult};
use super::extractor::parse_triples;
use super::schema::SchemaDefinition;
use super::{AgentOutput, OntologyAgent};
use crate::corpus::Document;
use crate::llm::{extract_json, LlmService, StructuredRequest};
use crate::utils::truncate_text;

/// Ontology agent configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologistConfig {
    /// Leading characters of each document sent to the model
    pub max_chars: usize,
}

impl Default for OntologistConfig {
    fn default() -> Self {
        Self { max_chars: 15_000 }
    }
}

impl OntologistConfig {
    /// Create a new builder for OntologistConfig
    pub fn builder() -> OntologistConfigBuilder {
        OntologistConfigBuilder::default()
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

/// Builder for OntologistConfig
#[derive(Debug, Clone, Default)]
pub struct OntologistConfigBuilder {
    max_chars: Option<usize>,
}

impl OntologistConfigBuilder {
    pub fn max_chars(mut self, max: usize) -> Self {
        self.max_chars = Some(max);
        self
    }

    /// Build the config with validation
    pub fn build(self) -> OntologyResult<OntologistConfig> {
        let config = OntologistConfig {
            max_chars: self.max_chars.unwrap_or(15_000),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Shape the model is asked to return
#[derive(Debug, Deserialize)]
struct SchemaProposal {
    #[serde(default, alias = "labels")]
    node_labels: Vec<String>,
    #[serde(default, alias = "relationships")]
    relationship_types: Vec<String>,
}

fn proposal_json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "node_labels": { "type": "array", "items": { "type": "string" } },
            "relationship_types": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["node_labels", "relationship_types"],
        "additionalProperties": false
    })
}

/// Ontology agent backed by an LLM
pub struct LlmOntologist {
    llm: Arc<dyn LlmService>,
    config: OntologistConfig,
}

impl LlmOntologist {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self::with_config(llm, OntologistConfig::default())
    }

    pub fn with_config(llm: Arc<dyn LlmService>, config: OntologistConfig) -> Self {
        Self { llm, config }
    }

    fn build_request(
        &self,
        document: &Document,
        known_labels: &BTreeSet<String>,
        goal: Option<&str>,
    ) -> StructuredRequest {
        let mut system = String::from(
            "You are an expert ontologist. Identify the abstract categories present in the \
             document: node labels for the kinds of entities and relationship types for the \
             kinds of links between them.\n\n\
             Rules:\n\
             1. Categories only. Never return instance values (names, numbers, dates).\n\
             2. Node labels use CamelCase (FactorRiesgo), relationship types use UPPER_SNAKE_CASE \
             (PROVOCA_EFECTO). No accents or special characters.\n\
             3. Prefer the known labels whenever they fit.\n",
        );

        if let Some(goal) = goal.map(str::trim).filter(|g| !g.is_empty()) {
            system.push_str(&format!("\nGoal of the graph: {goal}\n"));
        }

        if !known_labels.is_empty() {
            let known = known_labels.iter().cloned().collect::<Vec<_>>().join(", ");
            system.push_str(&format!("\nKnown labels: {known}\n"));
        }

        let user = format!(
            "Document: {}\n\n{}",
            document.filename,
            document.prefix(self.config.max_chars)
        );

        StructuredRequest {
            system,
            user,
            schema_name: "schema_definition".to_string(),
            json_schema: proposal_json_schema(),
        }
    }
}

#[async_trait]
impl OntologyAgent for LlmOntologist {
    async fn propose_schema(
        &self,
        document: &Document,
        known_labels: &BTreeSet<String>,
        goal: Option<&str>,
    ) -> OntologyResult<AgentOutput<SchemaDefinition>> {
        let request = self.build_request(document, known_labels, goal);

        let response = self
            .llm
            .complete_structured(&request)
            .await
            .map_err(|source| OntologyError::Llm {
                document: document.filename.clone(),
                source,
            })?;

        let proposal: SchemaProposal = serde_json::from_str(extract_json(&response.content))
            .map_err(|e| {
                tracing::debug!(
                    document = %document.filename,
                    content = %truncate_text(&response.content, 200),
                    "Undecodable schema proposal"
                );
                OntologyError::schema_parse(&document.filename, e.to_string())
            })?;

        let (schema, dropped) =
            SchemaDefinition::from_raw(&proposal.node_labels, &proposal.relationship_types);

        if !dropped.is_empty() {
            tracing::warn!(
                document = %document.filename,
                labels = ?dropped.node_labels,
                relationship_types = ?dropped.relationship_types,
                "Dropped entries that are not valid identifiers"
            );
        }

        tracing::info!(
            document = %document.filename,
            tokens = response.total_tokens,
            schema = %schema.summary(),
            "Schema proposal received"
        );

        Ok(AgentOutput::new(schema, response.total_tokens))
    }
}

/// Ontology agent reading explicit `(Label:Name)-[TYPE]->(Label:Name)` lines.
///
/// Endpoints without a label prefix contribute the default label.
#[derive(Debug, Clone)]
pub struct PatternOntologist {
    default_label: String,
}

impl Default for PatternOntologist {
    fn default() -> Self {
        Self::new("Entity")
    }
}

impl PatternOntologist {
    pub fn new(default_label: impl Into<String>) -> Self {
        Self {
            default_label: default_label.into(),
        }
    }

    pub fn propose_text(&self, text: &str) -> SchemaDefinition {
        let triples = parse_triples(text);

        let labels = triples.iter().flat_map(|t| {
            [&t.source, &t.target].map(|e| e.label.as_deref().unwrap_or(&self.default_label))
        });
        let types = triples.iter().map(|t| t.relationship.as_str());

        SchemaDefinition::from_raw(labels, types).0
    }
}

#[async_trait]
impl OntologyAgent for PatternOntologist {
    async fn propose_schema(
        &self,
        document: &Document,
        _known_labels: &BTreeSet<String>,
        _goal: Option<&str>,
    ) -> OntologyResult<AgentOutput<SchemaDefinition>> {
        Ok(AgentOutput::free(self.propose_text(&document.text)))
    }
}
