use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use ontograph::config::Config;
use ontograph::graph::{GraphStore, MemoryGraph, Neo4jStore, ScriptStore};
use ontograph::ontology::render_concept_file;
use ontograph::pipeline::{Pipeline, PipelineReport};

use super::{extraction_agent, llm_client, load_corpus, ontology_agent, AgentKind};

/// Graph destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Live Neo4j database
    Neo4j,
    /// Replayable statement script
    Script,
    /// In-process graph, discarded at exit
    Memory,
}

/// Parameters for the build command
pub struct BuildParams {
    pub dir: PathBuf,
    pub target: Target,
    pub script: Option<PathBuf>,
    pub concept: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub provenance: bool,
    pub refresh: bool,
    pub no_constraints: bool,
    pub extractor: AgentKind,
    pub ontologist: AgentKind,
    pub concurrency: Option<usize>,
}

pub async fn build(
    mut config: Config,
    params: BuildParams,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Some(concurrency) = params.concurrency {
        config.pipeline.concurrency = concurrency;
    }
    config.pipeline.emit.provenance |= params.provenance;
    config.pipeline.emit.refresh_descriptions |= params.refresh;
    if params.no_constraints {
        config.pipeline.emit.create_constraints = false;
    }

    let corpus = load_corpus(&params.dir, &config)?;
    if corpus.is_empty() {
        println!("No documents to process.");
        return Ok(());
    }

    let needs_llm = params.extractor == AgentKind::Llm || params.ontologist == AgentKind::Llm;
    let llm = if needs_llm {
        Some(llm_client(&config)?)
    } else {
        None
    };

    let ontologist = ontology_agent(params.ontologist, &config, llm.as_ref())?;
    let extractor = extraction_agent(params.extractor, &config, llm.as_ref())?;

    let script_path = params
        .script
        .clone()
        .unwrap_or_else(|| config.graph.script_path.clone());
    let store: Arc<dyn GraphStore> = match params.target {
        Target::Neo4j => Arc::new(
            Neo4jStore::connect(&config.graph.neo4j)
                .await
                .with_context(|| format!("Failed to connect to {}", config.graph.neo4j.uri))?,
        ),
        Target::Script => Arc::new(ScriptStore::new(&script_path)),
        Target::Memory => Arc::new(MemoryGraph::new()),
    };

    let pipeline = Pipeline::new(ontologist, extractor, config.pipeline.clone())?
        .with_shutdown(shutdown);

    println!(
        "Building graph from {} documents (target: {:?}, concurrency: {})...",
        corpus.len(),
        params.target,
        config.pipeline.concurrency
    );

    let report = pipeline.run(&corpus, store).await;

    let concept_path = params
        .concept
        .clone()
        .unwrap_or_else(|| config.graph.concept_path.clone());
    write_file(&concept_path, &render_concept_file(&report.triplets))?;

    if let Some(report_path) = &params.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        write_file(report_path, &json)?;
    }

    print_summary(&report);
    println!("  Concept file: {}", concept_path.display());
    if params.target == Target::Script {
        println!("  Statement script: {}", script_path.display());
    }

    if report.is_complete() {
        tracing::info!(run_id = %report.run_id, "Build finished");
    } else if let Some(fatal) = &report.fatal {
        anyhow::bail!(
            "Emission aborted in {} phase after {} statements: {}",
            fatal.phase,
            fatal.statements_completed,
            fatal.error
        );
    }

    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

fn print_summary(report: &PipelineReport) {
    println!();
    println!("=== Run {} ===", report.run_id);
    println!("Schema: {}", report.schema.summary());
    println!(
        "Documents: {} extracted, {} failed, {} not started",
        report.documents.len(),
        report.failures.len(),
        report.not_started.len()
    );

    let totals = &report.totals;
    println!(
        "Nodes: {} accepted, {} rejected, {} duplicates",
        totals.accepted_nodes, totals.rejected_nodes, totals.duplicate_nodes
    );
    println!(
        "Relationships: {} accepted, {} rejected, {} dangling, {} relabeled",
        totals.accepted_relationships,
        totals.rejected_relationships,
        totals.dangling_relationships,
        totals.relabeled_endpoints
    );

    if let Some(emission) = &report.emission {
        println!(
            "Emitted: {} nodes, {} relationships, {} documents, {} mentions",
            emission.nodes_upserted,
            emission.relationships_upserted,
            emission.documents_upserted,
            emission.mentions_upserted
        );
        if !emission.unresolved_relationships.is_empty() || !emission.failed_statements.is_empty() {
            println!(
                "  {} unresolved relationships, {} rejected statements",
                emission.unresolved_relationships.len(),
                emission.failed_statements.len()
            );
        }
    }

    for failure in &report.failures {
        println!(
            "  FAILED {} ({:?}, {}): {}",
            failure.filename,
            failure.stage,
            failure.category.description(),
            failure.error
        );
    }

    println!("Tokens used: {}", report.tokens);
    if report.cancelled {
        println!("Run was cancelled; the graph holds a valid partial result.");
    }
}
