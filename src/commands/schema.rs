use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::watch;

use ontograph::config::Config;
use ontograph::ontology::PatternExtractor;
use ontograph::pipeline::Pipeline;

use super::{llm_client, load_corpus, ontology_agent, AgentKind};

/// Parameters for the schema command
pub struct SchemaParams {
    pub dir: PathBuf,
    pub output: Option<PathBuf>,
    pub ontologist: AgentKind,
    pub concurrency: Option<usize>,
}

pub async fn schema(
    mut config: Config,
    params: SchemaParams,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Some(concurrency) = params.concurrency {
        config.pipeline.concurrency = concurrency;
    }

    let corpus = load_corpus(&params.dir, &config)?;

    let llm = match params.ontologist {
        AgentKind::Llm => Some(llm_client(&config)?),
        AgentKind::Pattern => None,
    };
    let ontologist = ontology_agent(params.ontologist, &config, llm.as_ref())?;

    // discovery never reaches the extraction agent
    let extractor = std::sync::Arc::new(PatternExtractor::default());
    let pipeline =
        Pipeline::new(ontologist, extractor, config.pipeline.clone())?.with_shutdown(shutdown);

    let discovery = pipeline.discover_schema(&corpus).await;

    let json =
        serde_json::to_string_pretty(&discovery.schema).context("Failed to serialize schema")?;
    println!("{json}");

    if let Some(output) = &params.output {
        std::fs::write(output, &json)
            .with_context(|| format!("Failed to write schema: {}", output.display()))?;
        eprintln!("Schema written to {}", output.display());
    }

    for failure in &discovery.failures {
        eprintln!("FAILED {}: {}", failure.filename, failure.error);
    }
    eprintln!(
        "{} ({} failed, {} tokens)",
        discovery.schema.summary(),
        discovery.failures.len(),
        discovery.tokens
    );

    Ok(())
}
