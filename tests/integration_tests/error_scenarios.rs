//! Error scenario tests
//!
//! Per-document failures must never stop the corpus run, statement-level
//! store rejections must never stop the emission, and a lost store must stop
//! it with enough context to resume.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ontograph::corpus::Corpus;
use ontograph::error::ErrorCategory;
use ontograph::graph::{GraphStatement, GraphStore, MemoryGraph, Record, StoreError};
use ontograph::llm::LlmService;
use ontograph::ontology::{LlmExtractor, LlmOntologist};
use ontograph::pipeline::{Pipeline, PipelineConfig, Stage};

use super::fixtures::{
    legal_corpus, ScriptedLlm, EXTRACTION, LEY_EXTRACTION_JSON, LEY_SCHEMA_JSON, ONTOLOGY,
    ORGANISMO_EXTRACTION_JSON, ORGANISMO_SCHEMA_JSON,
};

fn llm_pipeline(llm: Arc<dyn LlmService>) -> Pipeline {
    Pipeline::new(
        Arc::new(LlmOntologist::new(llm.clone())),
        Arc::new(LlmExtractor::new(llm)),
        PipelineConfig::default(),
    )
    .unwrap()
}

/// Graph store that fails according to a rule, delegating the rest
struct FailingStore {
    inner: MemoryGraph,
    executed: AtomicUsize,
    fail: Box<dyn Fn(usize, &GraphStatement) -> Option<StoreError> + Send + Sync>,
}

impl FailingStore {
    fn new(
        fail: impl Fn(usize, &GraphStatement) -> Option<StoreError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: MemoryGraph::new(),
            executed: AtomicUsize::new(0),
            fail: Box::new(fail),
        }
    }
}

#[async_trait]
impl GraphStore for FailingStore {
    async fn execute(&self, statement: &GraphStatement) -> Result<Vec<Record>, StoreError> {
        let n = self.executed.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = (self.fail)(n, statement) {
            return Err(err);
        }
        self.inner.execute(statement).await
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn test_undecodable_proposal_is_skipped() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(ONTOLOGY, "ley_27275.txt", LEY_SCHEMA_JSON)
            .respond(ONTOLOGY, "organismos.txt", "I could not find any categories.")
            .respond(EXTRACTION, "ley_27275.txt", LEY_EXTRACTION_JSON)
            .respond(EXTRACTION, "organismos.txt", ORGANISMO_EXTRACTION_JSON),
    );
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());

    let report = llm_pipeline(llm.clone()).run(&corpus, graph.clone()).await;

    assert!(report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "organismos.txt");
    assert_eq!(report.failures[0].stage, Stage::Ontology);
    assert_eq!(report.failures[0].category, ErrorCategory::Parsing);
    assert!(report.failures[0].recoverable);

    // the document still goes through extraction against the partial schema
    assert_eq!(llm.calls(), 4);
    assert_eq!(report.documents.len(), 2);
    assert!(!report.schema.contains_label("Organismo"));

    let snap = graph.snapshot().await;
    assert_eq!(snap.node_count(), 2);
    assert_eq!(report.totals.rejected_nodes, 1);
}

#[tokio::test]
async fn test_undecodable_extraction_is_skipped() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(ONTOLOGY, "ley_27275.txt", LEY_SCHEMA_JSON)
            .respond(ONTOLOGY, "organismos.txt", ORGANISMO_SCHEMA_JSON)
            .respond(EXTRACTION, "ley_27275.txt", LEY_EXTRACTION_JSON)
            .respond(EXTRACTION, "organismos.txt", r#"{"nodes": [{"id": 1}"#),
    );
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());

    let report = llm_pipeline(llm).run(&corpus, graph.clone()).await;

    assert!(report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Extraction);
    assert_eq!(report.documents.len(), 1);
    assert_eq!(graph.snapshot().await.node_count(), 2);
}

#[tokio::test]
async fn test_llm_status_failure_is_reported_per_document() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(ONTOLOGY, "ley_27275.txt", LEY_SCHEMA_JSON)
            .respond(ONTOLOGY, "organismos.txt", ORGANISMO_SCHEMA_JSON)
            .fail(EXTRACTION, "ley_27275.txt", 401)
            .respond(EXTRACTION, "organismos.txt", ORGANISMO_EXTRACTION_JSON),
    );
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());

    let report = llm_pipeline(llm).run(&corpus, graph.clone()).await;

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.filename, "ley_27275.txt");
    assert_eq!(failure.stage, Stage::Extraction);
    assert_eq!(failure.category, ErrorCategory::Llm);
    assert!(!failure.recoverable);
    assert!(failure.error.contains("401"));

    let snap = graph.snapshot().await;
    assert!(snap.contains_node("Organismo", "CONGRESO_DE_LA_NACION"));
    assert_eq!(snap.relationship_count(), 1);
}

#[tokio::test]
async fn test_rejected_statement_does_not_stop_emission() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let store = Arc::new(FailingStore::new(|_, statement| match statement {
        GraphStatement::UpsertNode { id, .. } if id == "LEY_25_326" => {
            Some(StoreError::constraint("MERGE", "property type mismatch"))
        }
        _ => None,
    }));

    let report = llm_pipeline(super::fixtures::legal_llm())
        .run(&corpus, store.clone())
        .await;

    assert!(report.is_complete());
    let emission = report.emission.unwrap();
    assert_eq!(emission.failed_statements.len(), 1);
    assert_eq!(emission.failed_statements[0].entity_ids, vec!["Norma:LEY_25_326"]);
    assert_eq!(emission.nodes_upserted, 2);

    // the edge to the missing node resolves to nothing, the other one lands
    assert_eq!(emission.relationships_upserted, 1);
    assert_eq!(emission.unresolved_relationships.len(), 1);
    assert_eq!(store.inner.snapshot().await.relationship_count(), 1);
}

#[tokio::test]
async fn test_lost_connection_stops_emission_with_context() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let store = Arc::new(FailingStore::new(|n, _| {
        (n >= 3).then(|| StoreError::Connectivity("connection reset by peer".to_string()))
    }));

    let report = llm_pipeline(super::fixtures::legal_llm())
        .run(&corpus, store.clone())
        .await;

    assert!(!report.is_complete());
    let fatal = report.fatal.as_ref().unwrap();
    assert_eq!(fatal.phase, "nodes");
    assert_eq!(fatal.statements_completed, 3);
    assert!(fatal.error.contains("connection reset by peer"));

    // extraction results are still in the report
    assert_eq!(report.documents.len(), 2);
    assert!(report.emission.is_some());

    let snap = store.inner.snapshot().await;
    assert_eq!(snap.constraints.len(), 2);
    assert_eq!(snap.node_count(), 1);
    assert_eq!(snap.relationship_count(), 0);
}

#[tokio::test]
async fn test_unreachable_store_fails_on_first_statement() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let store = Arc::new(FailingStore::new(|_, _| {
        Some(StoreError::Connectivity("connection refused".to_string()))
    }));

    let report = llm_pipeline(super::fixtures::legal_llm())
        .run(&corpus, store)
        .await;

    let fatal = report.fatal.unwrap();
    assert_eq!(fatal.phase, "constraints");
    assert_eq!(fatal.statements_completed, 0);
}
