//! Configuration management for ontograph
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags are applied on top by the
//! commands themselves.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::graph::Neo4jConfig;
use crate::llm::LlmConfig;
use crate::ontology::{ExtractorConfig, OntologistConfig};
use crate::pipeline::PipelineConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM service configuration
    pub llm: LlmConfig,

    /// Agent configuration
    pub agents: AgentsConfig,

    /// Corpus loading configuration
    pub corpus: CorpusConfig,

    /// Pipeline configuration
    pub pipeline: PipelineConfig,

    /// Graph store and output files
    pub graph: GraphConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Leading characters sent to the ontology agent
    pub ontology_max_chars: usize,

    /// Leading characters sent to the extraction agent
    pub extraction_max_chars: usize,

    /// Label for unlabeled endpoints in pattern mode
    pub pattern_default_label: String,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            ontology_max_chars: OntologistConfig::default().max_chars,
            extraction_max_chars: ExtractorConfig::default().max_chars,
            pattern_default_label: String::from("Entity"),
        }
    }
}

/// Corpus loading configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// WHATWG label of the encoding tried when UTF-8 fails
    pub fallback_encoding: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            fallback_encoding: String::from("windows-1252"),
        }
    }
}

/// Graph store and output file configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neo4j connection
    pub neo4j: Neo4jConfig,

    /// Statement script path for the script target
    pub script_path: PathBuf,

    /// Conceptual schema file path
    pub concept_path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            neo4j: Neo4jConfig::default(),
            script_path: PathBuf::from("graph.cypher"),
            concept_path: PathBuf::from("concept.cypher"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    /// Apply `ONTOGRAPH_*`, `OPENAI_API_KEY` and `NEO4J_*` overrides
    pub fn with_env_overrides(mut self) -> Self {
        self.llm = self.llm.with_env_overrides();
        self.graph.neo4j = self.graph.neo4j.with_env_overrides();

        self.pipeline.concurrency =
            env_parse("ONTOGRAPH_CONCURRENCY").unwrap_or(self.pipeline.concurrency);
        if let Ok(goal) = std::env::var("ONTOGRAPH_GOAL") {
            self.pipeline.goal = Some(goal);
        }
        if let Ok(labels) = std::env::var("ONTOGRAPH_SEED_LABELS") {
            self.pipeline.seed_labels = crate::corpus::parse_label_list(&labels);
        }
        self.pipeline.emit.provenance =
            env_parse("ONTOGRAPH_PROVENANCE").unwrap_or(self.pipeline.emit.provenance);

        self.agents.ontology_max_chars =
            env_parse("ONTOGRAPH_ONTOLOGY_MAX_CHARS").unwrap_or(self.agents.ontology_max_chars);
        self.agents.extraction_max_chars = env_parse("ONTOGRAPH_EXTRACTION_MAX_CHARS")
            .unwrap_or(self.agents.extraction_max_chars);

        if let Ok(encoding) = std::env::var("ONTOGRAPH_FALLBACK_ENCODING") {
            self.corpus.fallback_encoding = encoding;
        }

        if let Ok(level) = std::env::var("ONTOGRAPH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ONTOGRAPH_LOG_FORMAT") {
            self.logging.format = format;
        }

        self
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File when given, environment otherwise; secrets always come from the
    /// environment when the file leaves them unset
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::from_env();
        };

        let mut config = Self::from_file(path)?;
        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("ONTOGRAPH_LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if config.graph.neo4j.password.is_empty() {
            config.graph.neo4j.password = std::env::var("NEO4J_PASSWORD").unwrap_or_default();
        }
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.llm.endpoint.trim().is_empty() {
            anyhow::bail!("llm.endpoint must not be empty");
        }

        if self.llm.requests_per_minute == 0 {
            anyhow::bail!("llm.requests_per_minute must be greater than 0");
        }

        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be between 0.0 and 2.0");
        }

        if self.agents.ontology_max_chars == 0 || self.agents.extraction_max_chars == 0 {
            anyhow::bail!("agent max_chars must be greater than 0");
        }

        if crate::utils::encoding_for_label(&self.corpus.fallback_encoding).is_none() {
            anyhow::bail!(
                "corpus.fallback_encoding '{}' is not a known encoding",
                self.corpus.fallback_encoding
            );
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        self.pipeline
            .validate()
            .context("Invalid pipeline configuration")?;

        Ok(())
    }

    pub fn ontologist_config(&self) -> OntologistConfig {
        OntologistConfig {
            max_chars: self.agents.ontology_max_chars,
        }
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            max_chars: self.agents.extraction_max_chars,
        }
    }
}
