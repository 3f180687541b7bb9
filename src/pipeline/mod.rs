//! Corpus-to-graph pipeline
//!
//! Runs the stages in order, with a barrier between each:
//!
//! ```text
//! corpus ──▶ ontology agent (per doc) ──▶ unify ──▶ extraction agent (per doc) ──▶ emitter
//!             bounded fan-out                        bounded fan-out               serial
//! ```
//!
//! Every stage receives what it needs as arguments; the only state carried
//! between them is the [`PipelineReport`] being filled in.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::corpus::{Corpus, Document, SkippedFile};
use crate::error::{ErrorCategory, OntographErrorTrait};
use crate::graph::{DocumentBatch, EmissionReport, EmitOptions, Emitter, GraphStore};
use crate::ontology::{
    unify, validate_extraction, ExtractionAgent, ExtractionStats, OntologyAgent, OntologyError,
    OntologyResult, SchemaDefinition, SchemaTriplet,
};

// ============================================================================
// Configuration
// ============================================================================

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Documents processed at once within a phase
    pub concurrency: usize,

    /// Goal used when the corpus has no `goal.txt`
    pub goal: Option<String>,

    /// Labels unified into the master schema and offered to the ontology agent
    pub seed_labels: Vec<String>,

    /// Graph emission options
    pub emit: EmitOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            goal: None,
            seed_labels: Vec::new(),
            emit: EmitOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> OntologyResult<()> {
        if self.concurrency == 0 {
            return Err(OntologyError::invalid_config(
                "concurrency",
                "0",
                "Must be at least 1",
            ));
        }
        self.emit.validate()
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Pipeline stage a document failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ontology,
    Extraction,
}

/// A document the pipeline could not process in one stage
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub filename: String,
    pub stage: Stage,
    pub error: String,
    pub category: ErrorCategory,
    pub recoverable: bool,
}

/// Per-document outcome of the extraction stage
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub filename: String,
    pub stats: ExtractionStats,
    pub tokens: u64,
}

/// Where emission stopped after a fatal store error
#[derive(Debug, Clone, Serialize)]
pub struct FatalContext {
    pub phase: String,
    pub statements_completed: usize,
    pub error: String,
}

/// Result of the discovery stage
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiscovery {
    pub schema: SchemaDefinition,
    pub failures: Vec<DocumentFailure>,
    pub tokens: u64,
    /// Documents not started because the run was cancelled
    pub not_started: Vec<String>,
}

/// Everything a run did, serialized as the JSON run report
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub schema: SchemaDefinition,
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
    pub skipped_files: Vec<SkippedFile>,
    pub not_started: Vec<String>,
    pub totals: ExtractionStats,
    pub triplets: BTreeSet<SchemaTriplet>,
    pub emission: Option<EmissionReport>,
    pub fatal: Option<FatalContext>,
    pub tokens: u64,
    pub cancelled: bool,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            schema: SchemaDefinition::default(),
            documents: Vec::new(),
            failures: Vec::new(),
            skipped_files: Vec::new(),
            not_started: Vec::new(),
            totals: ExtractionStats::default(),
            triplets: BTreeSet::new(),
            emission: None,
            fatal: None,
            tokens: 0,
            cancelled: false,
        }
    }

    /// Whether the run finished without fatal error or cancellation
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none() && !self.cancelled
    }
}

// ============================================================================
// Pipeline
// ============================================================================

enum Outcome<T> {
    Done(T),
    Failed(DocumentFailure),
    NotStarted(String),
}

fn failure(document: &Document, stage: Stage, err: &OntologyError) -> DocumentFailure {
    DocumentFailure {
        filename: document.filename.clone(),
        stage,
        error: err.to_string(),
        category: err.category(),
        recoverable: OntologyError::is_recoverable(err),
    }
}

/// Schema discovery, extraction and emission over one corpus
pub struct Pipeline {
    ontologist: Arc<dyn OntologyAgent>,
    extractor: Arc<dyn ExtractionAgent>,
    config: PipelineConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(
        ontologist: Arc<dyn OntologyAgent>,
        extractor: Arc<dyn ExtractionAgent>,
        config: PipelineConfig,
    ) -> OntologyResult<Self> {
        config.validate()?;
        Ok(Self {
            ontologist,
            extractor,
            config,
            shutdown: None,
        })
    }

    /// Stop starting documents and statements once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Seed labels from the corpus and the configuration, normalized
    fn seed_schema(&self, corpus: &Corpus) -> SchemaDefinition {
        let labels = corpus.seed_labels.iter().chain(&self.config.seed_labels);
        SchemaDefinition::from_labels(labels)
    }

    /// Run the ontology agent over every document and unify the proposals
    pub async fn discover_schema(&self, corpus: &Corpus) -> SchemaDiscovery {
        let seed = self.seed_schema(corpus);
        let goal = corpus.goal.as_deref().or(self.config.goal.as_deref());

        tracing::info!(
            documents = corpus.len(),
            seed_labels = seed.node_labels.len(),
            goal = goal.is_some(),
            "Starting schema discovery"
        );

        let known = &seed.node_labels;
        let mut outcomes: Vec<(usize, Outcome<_>)> = stream::iter(&corpus.documents)
            .map(|document| async move {
                if self.cancelled() {
                    return (document.index, Outcome::NotStarted(document.filename.clone()));
                }
                let outcome = match self.ontologist.propose_schema(document, known, goal).await {
                    Ok(output) => Outcome::Done(output),
                    Err(err) => {
                        tracing::warn!(
                            document = %document.filename,
                            error = %err,
                            "Schema proposal failed"
                        );
                        Outcome::Failed(failure(document, Stage::Ontology, &err))
                    }
                };
                (document.index, outcome)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut discovery = SchemaDiscovery::default();
        let mut proposals = vec![seed];
        for (_, outcome) in outcomes {
            match outcome {
                Outcome::Done(output) => {
                    discovery.tokens += output.tokens;
                    proposals.push(output.value);
                }
                Outcome::Failed(f) => discovery.failures.push(f),
                Outcome::NotStarted(name) => discovery.not_started.push(name),
            }
        }

        let mut schema = unify(&proposals);
        if self.config.emit.provenance && schema.remove_label(&self.config.emit.provenance_label) {
            tracing::debug!(
                label = %self.config.emit.provenance_label,
                "Provenance label removed from master schema"
            );
        }

        tracing::info!(
            schema = %schema.summary(),
            failed = discovery.failures.len(),
            tokens = discovery.tokens,
            "Master schema unified"
        );

        discovery.schema = schema;
        discovery
    }

    /// Run the extraction agent over every document and validate each batch
    async fn extract_all(
        &self,
        corpus: &Corpus,
        schema: &SchemaDefinition,
    ) -> Vec<(usize, Outcome<(DocumentReport, DocumentBatch)>)> {
        tracing::info!(documents = corpus.len(), "Starting extraction");

        let mut outcomes: Vec<_> = stream::iter(&corpus.documents)
            .map(|document| async move {
                if self.cancelled() {
                    return (document.index, Outcome::NotStarted(document.filename.clone()));
                }
                let outcome = match self.extractor.extract(document, schema).await {
                    Ok(output) => {
                        let validated =
                            validate_extraction(output.value, schema, &document.filename);
                        tracing::info!(
                            document = %document.filename,
                            nodes = validated.nodes.len(),
                            relationships = validated.relationships.len(),
                            rejected_nodes = validated.stats.rejected_nodes,
                            dangling = validated.stats.dangling_relationships,
                            "Extraction validated"
                        );
                        let report = DocumentReport {
                            filename: document.filename.clone(),
                            stats: validated.stats,
                            tokens: output.tokens,
                        };
                        Outcome::Done((report, DocumentBatch::new(document, validated)))
                    }
                    Err(err) => {
                        tracing::warn!(
                            document = %document.filename,
                            error = %err,
                            "Extraction failed"
                        );
                        Outcome::Failed(failure(document, Stage::Extraction, &err))
                    }
                };
                (document.index, outcome)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes
    }

    /// Full run against a graph store
    pub async fn run(&self, corpus: &Corpus, store: Arc<dyn GraphStore>) -> PipelineReport {
        let mut report = PipelineReport::new();
        report.skipped_files = corpus.skipped.clone();

        tracing::info!(
            run_id = %report.run_id,
            documents = corpus.len(),
            store = store.name(),
            "Pipeline run started"
        );

        let discovery = self.discover_schema(corpus).await;
        report.schema = discovery.schema;
        report.failures = discovery.failures;
        report.not_started = discovery.not_started;
        report.tokens = discovery.tokens;

        if self.cancelled() {
            report.cancelled = true;
            return self.finish(report, store.as_ref()).await;
        }

        let mut batches = Vec::new();
        for (_, outcome) in self.extract_all(corpus, &report.schema).await {
            match outcome {
                Outcome::Done((doc_report, batch)) => {
                    report.totals.absorb(&doc_report.stats);
                    report.tokens += doc_report.tokens;
                    report
                        .triplets
                        .extend(batch.relationships.iter().map(|r| r.triplet()));
                    report.documents.push(doc_report);
                    batches.push(batch);
                }
                Outcome::Failed(f) => report.failures.push(f),
                Outcome::NotStarted(name) => {
                    if !report.not_started.contains(&name) {
                        report.not_started.push(name);
                    }
                }
            }
        }

        if self.cancelled() {
            report.cancelled = true;
            return self.finish(report, store.as_ref()).await;
        }

        let mut emitter = Emitter::new(store.clone(), self.config.emit.clone());
        if let Some(rx) = &self.shutdown {
            emitter = emitter.with_shutdown(rx.clone());
        }

        match emitter.emit(&report.schema, &batches).await {
            Ok(emission) => {
                report.cancelled = emission.cancelled;
                report.emission = Some(emission);
            }
            Err(err) => {
                report.fatal = Some(FatalContext {
                    phase: err.phase.to_string(),
                    statements_completed: err.statements_completed,
                    error: err.source.to_string(),
                });
                report.emission = Some(*err.report);
            }
        }

        self.finish(report, store.as_ref()).await
    }

    async fn finish(&self, mut report: PipelineReport, store: &dyn GraphStore) -> PipelineReport {
        if let Err(err) = store.flush().await {
            tracing::error!(store = store.name(), error = %err, "Failed to flush graph store");
            if report.fatal.is_none() {
                report.fatal = Some(FatalContext {
                    phase: "flush".to_string(),
                    statements_completed: report
                        .emission
                        .as_ref()
                        .map_or(0, |e| e.statements_completed),
                    error: err.to_string(),
                });
            }
        }

        report.finished_at = Some(Utc::now());

        tracing::info!(
            run_id = %report.run_id,
            schema = %report.schema.summary(),
            documents = report.documents.len(),
            failed = report.failures.len(),
            tokens = report.tokens,
            cancelled = report.cancelled,
            "Pipeline run finished"
        );
        report
    }
}
