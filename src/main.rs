use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ontograph::config::Config;
use ontograph::error::categorize;

mod commands;

use commands::{AgentKind, BuildParams, SchemaParams, Target};

#[derive(Parser)]
#[command(
    name = "ontograph",
    version,
    about = "LLM-driven schema discovery and idempotent graph construction from text corpora",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file (environment variables otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the schema, extract instances and write the graph
    Build {
        /// Corpus directory of .txt files
        dir: PathBuf,

        /// Graph destination
        #[arg(short, long, value_enum, default_value = "script")]
        target: Target,

        /// Statement script path (script target)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Conceptual schema output path
        #[arg(long)]
        concept: Option<PathBuf>,

        /// JSON run report path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Add Document nodes linked to the entities they mention
        #[arg(long)]
        provenance: bool,

        /// Overwrite descriptions of existing nodes
        #[arg(long)]
        refresh: bool,

        /// Skip uniqueness constraint creation
        #[arg(long)]
        no_constraints: bool,

        /// Extraction agent
        #[arg(long, value_enum, default_value = "llm")]
        extractor: AgentKind,

        /// Ontology agent (defaults to the extraction agent kind)
        #[arg(long, value_enum)]
        ontologist: Option<AgentKind>,

        /// Documents processed concurrently per phase
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run schema discovery only and print the master schema
    Schema {
        /// Corpus directory of .txt files
        dir: PathBuf,

        /// Write the schema JSON here as well
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ontology agent
        #[arg(long, value_enum, default_value = "llm")]
        ontologist: AgentKind,

        /// Documents processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show node and relationship counts from Neo4j
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    config.validate()?;

    tracing::info!("ontograph starting");

    let result = run(cli.command, config).await;
    if let Err(err) = &result {
        tracing::error!(
            category = categorize(err).description(),
            error = %format!("{err:#}"),
            "Command failed"
        );
    } else {
        tracing::info!("ontograph completed successfully");
    }
    result
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            let _ = shutdown_tx.send(true);
        }
    });

    match command {
        Commands::Build {
            dir,
            target,
            script,
            concept,
            report,
            provenance,
            refresh,
            no_constraints,
            extractor,
            ontologist,
            concurrency,
        } => {
            tracing::info!(
                dir = %dir.display(),
                target = ?target,
                extractor = ?extractor,
                provenance = %provenance,
                "Starting build command"
            );
            let params = BuildParams {
                dir,
                target,
                script,
                concept,
                report,
                provenance,
                refresh,
                no_constraints,
                extractor,
                ontologist: ontologist.unwrap_or(extractor),
                concurrency,
            };
            commands::build(config, params, shutdown_rx).await?;
        }

        Commands::Schema {
            dir,
            output,
            ontologist,
            concurrency,
        } => {
            tracing::info!(
                dir = %dir.display(),
                ontologist = ?ontologist,
                "Starting schema command"
            );
            let params = SchemaParams {
                dir,
                output,
                ontologist,
                concurrency,
            };
            commands::schema(config, params, shutdown_rx).await?;
        }

        Commands::Stats => {
            tracing::info!("Starting stats command");
            commands::stats(config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("ontograph=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("ontograph={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ontograph=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
