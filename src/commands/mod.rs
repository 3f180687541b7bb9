use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::Path;
use std::sync::Arc;

use ontograph::config::Config;
use ontograph::corpus::{Corpus, CorpusLoader};
use ontograph::llm::{LlmClient, LlmService};
use ontograph::ontology::{
    ExtractionAgent, LlmExtractor, LlmOntologist, OntologyAgent, PatternExtractor,
    PatternOntologist,
};

pub mod build;
pub mod schema;
pub mod stats;

// Re-export command functions for convenience
pub use build::{build, BuildParams, Target};
pub use schema::{schema, SchemaParams};
pub use stats::stats;

/// Agent implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    /// Structured-output LLM calls
    Llm,
    /// Explicit `(Label:Name)-[TYPE]->(Label:Name)` lines, no model
    Pattern,
}

/// Load the corpus with the configured fallback encoding
pub fn load_corpus(dir: &Path, config: &Config) -> Result<Corpus> {
    let corpus = CorpusLoader::new()
        .with_fallback_encoding(&config.corpus.fallback_encoding)?
        .load(dir)
        .with_context(|| format!("Failed to load corpus from {}", dir.display()))?;

    println!(
        "Loaded {} documents from {} ({} skipped)",
        corpus.len(),
        dir.display(),
        corpus.skipped.len()
    );
    Ok(corpus)
}

/// One shared client for every LLM-backed agent
pub fn llm_client(config: &Config) -> Result<Arc<dyn LlmService>> {
    let client = LlmClient::with_config(config.llm.clone()).context("Failed to create LLM client")?;
    tracing::info!(
        backend = ?client.backend(),
        model = %client.config().model,
        "LLM client ready"
    );
    Ok(Arc::new(client))
}

pub fn ontology_agent(
    kind: AgentKind,
    config: &Config,
    llm: Option<&Arc<dyn LlmService>>,
) -> Result<Arc<dyn OntologyAgent>> {
    match (kind, llm) {
        (AgentKind::Llm, Some(llm)) => Ok(Arc::new(LlmOntologist::with_config(
            llm.clone(),
            config.ontologist_config(),
        ))),
        (AgentKind::Llm, None) => anyhow::bail!("LLM ontology agent requires an LLM client"),
        (AgentKind::Pattern, _) => Ok(Arc::new(PatternOntologist::new(
            config.agents.pattern_default_label.clone(),
        ))),
    }
}

pub fn extraction_agent(
    kind: AgentKind,
    config: &Config,
    llm: Option<&Arc<dyn LlmService>>,
) -> Result<Arc<dyn ExtractionAgent>> {
    match (kind, llm) {
        (AgentKind::Llm, Some(llm)) => Ok(Arc::new(LlmExtractor::with_config(
            llm.clone(),
            config.extractor_config(),
        ))),
        (AgentKind::Llm, None) => anyhow::bail!("LLM extraction agent requires an LLM client"),
        (AgentKind::Pattern, _) => Ok(Arc::new(PatternExtractor::new(
            config.agents.pattern_default_label.clone(),
        ))),
    }
}
