//! Property-based tests for normalization, unification and emission
//!
//! Names are drawn from a small pool of accented, mixed-case and punctuated
//! words so collisions between proposals actually happen.

use proptest::prelude::*;
use std::sync::Arc;

use ontograph::corpus::Document;
use ontograph::graph::{DocumentBatch, EmitOptions, Emitter, MemoryGraph};
use ontograph::ontology::{
    is_valid_identifier, normalize, unify, validate_extraction, Convention, ExtractionResult,
    GraphNode, GraphRelationship, SchemaDefinition,
};

const WORDS: &[&str] = &[
    "Complicación",
    "complicacion",
    "COMPLICACION",
    "factor de riesgo",
    "FactorRiesgo",
    "Organismo Público",
    "norma",
    "Ley 27.275",
    "provoca efecto",
    "PROVOCA_EFECTO",
    "Año",
    "niño-adolescente",
    "!!!",
    "",
];

fn word() -> impl Strategy<Value = String> {
    prop::sample::select(WORDS).prop_map(str::to_string)
}

fn convention() -> impl Strategy<Value = Convention> {
    prop_oneof![
        Just(Convention::Label),
        Just(Convention::RelationshipType),
        Just(Convention::Id),
    ]
}

fn raw_schema() -> impl Strategy<Value = SchemaDefinition> {
    (
        prop::collection::vec(word(), 0..6),
        prop::collection::vec(word(), 0..6),
    )
        .prop_map(|(labels, types)| SchemaDefinition::from_raw(labels, types).0)
}

fn raw_extraction() -> impl Strategy<Value = ExtractionResult> {
    let node = (word(), word(), "[a-z ]{0,12}")
        .prop_map(|(id, label, description)| GraphNode::new(id, label, description));
    let rel = (word(), word(), word(), word(), word()).prop_map(|(sl, si, t, tl, ti)| {
        GraphRelationship::new((sl.as_str(), si.as_str()), t, (tl.as_str(), ti.as_str()))
    });
    (
        prop::collection::vec(node, 0..8),
        prop::collection::vec(rel, 0..8),
    )
        .prop_map(|(nodes, relationships)| ExtractionResult {
            nodes,
            relationships,
        })
}

proptest! {
    /// Property: normalizing twice equals normalizing once
    #[test]
    fn normalize_is_idempotent(input in "\\PC{0,24}", convention in convention()) {
        let once = normalize(&input, convention);
        prop_assert_eq!(normalize(&once, convention), once);
    }

    /// Property: output is always ASCII word characters
    #[test]
    fn normalize_output_is_ascii(input in "\\PC{0,24}", convention in convention()) {
        let out = normalize(&input, convention);
        prop_assert!(out.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    /// Property: every schema entry is a valid identifier
    #[test]
    fn schema_entries_are_identifiers(schema in raw_schema()) {
        for entry in schema.node_labels.iter().chain(&schema.relationship_types) {
            prop_assert!(is_valid_identifier(entry), "invalid entry {}", entry);
        }
    }

    /// Property: unify(a, b) == unify(b, a)
    #[test]
    fn unify_is_commutative(a in raw_schema(), b in raw_schema()) {
        prop_assert_eq!(unify([&a, &b]), unify([&b, &a]));
    }

    /// Property: unify(unify(a, b), c) == unify(a, unify(b, c))
    #[test]
    fn unify_is_associative(a in raw_schema(), b in raw_schema(), c in raw_schema()) {
        let left = unify([&unify([&a, &b]), &c]);
        let right = unify([&a, &unify([&b, &c])]);
        prop_assert_eq!(left, right);
    }

    /// Property: every proposal is contained in the master schema
    #[test]
    fn unify_contains_every_proposal(proposals in prop::collection::vec(raw_schema(), 0..5)) {
        let master = unify(&proposals);
        for proposal in &proposals {
            prop_assert!(proposal.node_labels.is_subset(&master.node_labels));
            prop_assert!(proposal.relationship_types.is_subset(&master.relationship_types));
        }
    }

    /// Property: a validated batch only uses schema entries and resolves every endpoint
    #[test]
    fn validated_batch_is_closed(schema in raw_schema(), raw in raw_extraction()) {
        let batch = validate_extraction(raw, &schema, "doc.txt");

        for node in &batch.nodes {
            prop_assert!(schema.contains_label(&node.label));
            prop_assert!(!node.id.is_empty());
        }
        for rel in &batch.relationships {
            prop_assert!(schema.contains_relationship_type(&rel.relationship_type));
            prop_assert!(batch.nodes.iter().any(|n| n.key() == (rel.source_label.clone(), rel.source_id.clone())));
            prop_assert!(batch.nodes.iter().any(|n| n.key() == (rel.target_label.clone(), rel.target_id.clone())));
        }
    }

    /// Property: emitted graphs never hold an edge with a missing endpoint
    #[test]
    fn emission_leaves_no_dangling_edges(
        schema in raw_schema(),
        docs in prop::collection::vec(raw_extraction(), 1..4),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let batches: Vec<DocumentBatch> = docs
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let document = Document::new(i, format!("doc{i}.txt"), "");
                DocumentBatch::new(&document, validate_extraction(raw, &schema, &document.filename))
            })
            .collect();

        let graph = Arc::new(MemoryGraph::new());
        let emitter = Emitter::new(graph.clone(), EmitOptions::default());
        let report = rt.block_on(emitter.emit(&schema, &batches)).unwrap();

        let snap = rt.block_on(graph.snapshot());
        prop_assert!(snap.dangling_relationships().is_empty());
        prop_assert!(report.unresolved_relationships.is_empty());
        prop_assert_eq!(snap.relationship_count(), report.relationships_upserted);
        for (label, _) in snap.nodes.keys() {
            prop_assert!(schema.contains_label(label));
        }
    }

    /// Property: emitting the same batches twice leaves the graph unchanged
    #[test]
    fn emission_is_idempotent(
        schema in raw_schema(),
        docs in prop::collection::vec(raw_extraction(), 1..4),
        provenance in any::<bool>(),
        refresh_descriptions in any::<bool>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let batches: Vec<DocumentBatch> = docs
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let document = Document::new(i, format!("doc{i}.txt"), format!("text {i}"));
                DocumentBatch::new(&document, validate_extraction(raw, &schema, &document.filename))
            })
            .collect();

        let graph = Arc::new(MemoryGraph::new());
        let options = EmitOptions {
            provenance,
            refresh_descriptions,
            ..EmitOptions::default()
        };
        let emitter = Emitter::new(graph.clone(), options);

        rt.block_on(emitter.emit(&schema, &batches)).unwrap();
        let first = rt.block_on(graph.snapshot());
        rt.block_on(emitter.emit(&schema, &batches)).unwrap();
        let second = rt.block_on(graph.snapshot());

        prop_assert_eq!(first, second);
    }
}
