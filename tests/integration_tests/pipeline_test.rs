//! Pipeline integration tests
//!
//! Runs the full discovery → extraction → emission flow with LLM-backed
//! agents over a scripted LLM service and checks the resulting graph.

use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

use ontograph::corpus::{Corpus, CorpusLoader};
use ontograph::graph::{EmitOptions, GraphStore, MemoryGraph, ScriptStore};
use ontograph::llm::{LlmError, LlmService, StructuredRequest, StructuredResponse};
use ontograph::ontology::{
    render_concept_file, LlmExtractor, LlmOntologist, PatternExtractor, PatternOntologist,
};
use ontograph::pipeline::{Pipeline, PipelineConfig};

use super::fixtures::{
    legal_corpus, legal_llm, ScriptedLlm, EXTRACTION, LEY_SCHEMA_JSON, ONTOLOGY,
};

fn llm_pipeline(llm: Arc<dyn LlmService>, config: PipelineConfig) -> Pipeline {
    Pipeline::new(
        Arc::new(LlmOntologist::new(llm.clone())),
        Arc::new(LlmExtractor::new(llm)),
        config,
    )
    .unwrap()
}

// ============================================================================
// Schema discovery
// ============================================================================

#[tokio::test]
async fn test_proposals_unify_into_master_schema() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let pipeline = llm_pipeline(legal_llm(), PipelineConfig::default());

    let discovery = pipeline.discover_schema(&corpus).await;

    assert!(discovery.failures.is_empty());
    assert_eq!(
        discovery.schema.node_labels.iter().collect::<Vec<_>>(),
        vec!["Norma", "Organismo"]
    );
    assert_eq!(
        discovery.schema.relationship_types.iter().collect::<Vec<_>>(),
        vec!["CITA", "EMITE"]
    );
    assert_eq!(discovery.tokens, 200);
}

#[tokio::test]
async fn test_accented_labels_converge() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(
                ONTOLOGY,
                "a.txt",
                r#"{"node_labels": ["Complicación"], "relationship_types": []}"#,
            )
            .respond(
                ONTOLOGY,
                "b.txt",
                r#"{"node_labels": ["Complicacion"], "relationship_types": []}"#,
            ),
    );
    let corpus = Corpus::from_pairs([("a.txt", "uno"), ("b.txt", "dos")]);

    let discovery = llm_pipeline(llm, PipelineConfig::default())
        .discover_schema(&corpus)
        .await;

    assert_eq!(
        discovery.schema.node_labels.iter().collect::<Vec<_>>(),
        vec!["Complicacion"]
    );
}

#[tokio::test]
async fn test_goal_and_seed_labels_reach_the_prompt() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("goal.txt"), "Map legal norms and issuers").unwrap();
    std::fs::write(dir.path().join("labels.txt"), "\"Norma\",\"Organismo\"").unwrap();
    std::fs::write(dir.path().join("ley_27275.txt"), "Ley 27.275").unwrap();

    let corpus = CorpusLoader::new().load(dir.path()).unwrap();
    let llm = Arc::new(ScriptedLlm::new().respond(ONTOLOGY, "ley_27275.txt", LEY_SCHEMA_JSON));

    let discovery = llm_pipeline(llm.clone(), PipelineConfig::default())
        .discover_schema(&corpus)
        .await;

    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].system.contains("Map legal norms and issuers"));
    assert!(requests[0].system.contains("Known labels: Norma, Organismo"));
    assert!(discovery.schema.contains_label("Organismo"));
}

// ============================================================================
// Full runs
// ============================================================================

#[tokio::test]
async fn test_full_run_builds_consistent_graph() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());

    let report = llm_pipeline(legal_llm(), PipelineConfig::default())
        .run(&corpus, graph.clone())
        .await;

    assert!(report.is_complete());
    assert!(report.failures.is_empty());
    assert_eq!(report.documents.len(), 2);

    let snap = graph.snapshot().await;
    assert_eq!(snap.node_count(), 3);
    assert_eq!(snap.relationship_count(), 2);
    assert!(snap.dangling_relationships().is_empty());
    assert!(snap.contains_relationship(
        ("Norma", "LEY_27_275"),
        "CITA",
        ("Norma", "LEY_25_326")
    ));
    assert!(snap.contains_relationship(
        ("Organismo", "CONGRESO_DE_LA_NACION"),
        "EMITE",
        ("Norma", "LEY_27_275")
    ));

    // the empty description from the second document does not win
    assert_eq!(
        snap.node_property("Norma", "LEY_27_275", "description"),
        Some("Ley 27.275 de Acceso a la Información Pública")
    );

    // every node and edge conforms to the master schema
    for (label, _) in snap.nodes.keys() {
        assert!(report.schema.contains_label(label));
    }
    for edge in &snap.relationships {
        assert!(report.schema.contains_relationship_type(&edge.relationship_type));
    }

    let concept = render_concept_file(&report.triplets);
    assert!(concept.contains("// (Norma) --[CITA]--> (Norma)"));
    assert!(concept.contains("// (Organismo) --[EMITE]--> (Norma)"));
}

#[tokio::test]
async fn test_dangling_relationship_is_dropped_and_counted() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond(ONTOLOGY, "a.txt", LEY_SCHEMA_JSON)
            .respond(
                EXTRACTION,
                "a.txt",
                r#"{
                  "nodes": [{"id": "LEY_1", "label": "Norma", "description": "Ley 1"}],
                  "relationships": [
                    {"source_id": "LEY_9", "source_label": "Norma", "relationship_type": "CITA",
                     "target_id": "LEY_1", "target_label": "Norma"}
                  ]
                }"#,
            ),
    );
    let corpus = Corpus::from_pairs([("a.txt", "Ley 1")]);
    let graph = Arc::new(MemoryGraph::new());

    let report = llm_pipeline(llm, PipelineConfig::default())
        .run(&corpus, graph.clone())
        .await;

    assert_eq!(report.totals.dangling_relationships, 1);
    assert_eq!(report.totals.accepted_relationships, 0);
    let snap = graph.snapshot().await;
    assert_eq!(snap.node_count(), 1);
    assert_eq!(snap.relationship_count(), 0);
}

#[tokio::test]
async fn test_rerun_changes_nothing() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());
    let config = PipelineConfig {
        emit: EmitOptions {
            provenance: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let first = llm_pipeline(legal_llm(), config.clone())
        .run(&corpus, graph.clone())
        .await;
    let after_first = graph.snapshot().await;

    let second = llm_pipeline(legal_llm(), config)
        .run(&corpus, graph.clone())
        .await;
    let after_second = graph.snapshot().await;

    assert!(first.is_complete() && second.is_complete());
    assert_eq!(after_first, after_second);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_provenance_overlay_links_documents() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());
    let config = PipelineConfig {
        emit: EmitOptions {
            provenance: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let report = llm_pipeline(legal_llm(), config)
        .run(&corpus, graph.clone())
        .await;

    let emission = report.emission.unwrap();
    assert_eq!(emission.documents_upserted, 2);
    assert_eq!(emission.mentions_upserted, 4);
    assert!(!report.schema.contains_label("Document"));

    let snap = graph.snapshot().await;
    assert!(snap.contains_relationship(
        ("Document", "organismos.txt"),
        "MENTIONS",
        ("Norma", "LEY_27_275")
    ));
    assert_eq!(
        snap.node_property("Document", "ley_27275.txt", "name"),
        Some("ley_27275.txt")
    );
}

#[tokio::test]
async fn test_script_target_writes_replayable_statements() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.cypher");
    let store = Arc::new(ScriptStore::new(&path));
    let corpus = Corpus::from_pairs(legal_corpus());

    let report = llm_pipeline(legal_llm(), PipelineConfig::default())
        .run(&corpus, store.clone())
        .await;
    assert!(report.is_complete());

    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains(
        "CREATE CONSTRAINT constraint_Norma_id IF NOT EXISTS FOR (n:`Norma`) REQUIRE n.id IS UNIQUE;"
    ));
    assert_eq!(script.matches(r#"MERGE (n:`Norma` {id: "LEY_27_275"})"#).count(), 1);
    assert!(script.contains("MERGE (a)-[r:`CITA`]->(b);"));
    assert!(!script.contains("RETURN"));

    // node statements precede relationship statements
    let last_node = script.rfind("MERGE (n:").unwrap();
    let first_edge = script.find("MERGE (a)-[").unwrap();
    assert!(last_node < first_edge);
}

#[tokio::test]
async fn test_pattern_agents_need_no_llm() {
    let corpus = Corpus::from_pairs([
        ("a.txt", "(Norma:Ley 27.275)-[CITA]->(Norma:Ley 25.326)"),
        ("b.txt", "(Organismo:Congreso)-[EMITE]->(Norma:Ley 27.275)\nno triples here"),
    ]);
    let graph = Arc::new(MemoryGraph::new());
    let pipeline = Pipeline::new(
        Arc::new(PatternOntologist::default()),
        Arc::new(PatternExtractor::default()),
        PipelineConfig::default(),
    )
    .unwrap();

    let report = pipeline.run(&corpus, graph.clone()).await;

    assert_eq!(report.tokens, 0);
    let snap = graph.snapshot().await;
    assert_eq!(snap.node_count(), 3);
    assert!(snap.contains_relationship(("Organismo", "CONGRESO"), "EMITE", ("Norma", "LEY_27_275")));
}

// ============================================================================
// Cancellation
// ============================================================================

/// Raises the shutdown flag during the first extraction call
struct InterruptingLlm {
    inner: Arc<ScriptedLlm>,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl LlmService for InterruptingLlm {
    async fn complete_structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, LlmError> {
        if request.schema_name == EXTRACTION {
            let _ = self.shutdown.send(true);
        }
        self.inner.complete_structured(request).await
    }
}

#[tokio::test]
async fn test_interrupt_during_extraction_stops_cleanly() {
    let (tx, rx) = watch::channel(false);
    let llm = Arc::new(InterruptingLlm {
        inner: legal_llm(),
        shutdown: tx,
    });
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());
    let config = PipelineConfig {
        concurrency: 1,
        ..Default::default()
    };

    let report = llm_pipeline(llm, config)
        .with_shutdown(rx)
        .run(&corpus, graph.clone())
        .await;

    assert!(report.cancelled);
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.not_started, vec!["organismos.txt"]);
    assert!(report.emission.is_none());
    assert_eq!(graph.snapshot().await.node_count(), 0);
}

#[tokio::test]
async fn test_memory_store_is_reusable_after_run() {
    let corpus = Corpus::from_pairs(legal_corpus());
    let graph = Arc::new(MemoryGraph::new());

    llm_pipeline(legal_llm(), PipelineConfig::default())
        .run(&corpus, graph.clone())
        .await;

    let counts = graph
        .execute(&ontograph::graph::GraphStatement::CountNodesByLabel)
        .await
        .unwrap();
    assert_eq!(
        ontograph::graph::grouped_counts(&counts, "label"),
        vec![("Norma".to_string(), 2), ("Organismo".to_string(), 1)]
    );
}
