use anyhow::{Context, Result};

use ontograph::config::Config;
use ontograph::graph::{grouped_counts, GraphStatement, GraphStore, Neo4jStore};

pub async fn stats(config: Config) -> Result<()> {
    let store = Neo4jStore::connect(&config.graph.neo4j)
        .await
        .with_context(|| format!("Failed to connect to {}", config.graph.neo4j.uri))?;

    let labels = store
        .execute(&GraphStatement::CountNodesByLabel)
        .await
        .context("Failed to count nodes")?;
    let types = store
        .execute(&GraphStatement::CountRelationshipsByType)
        .await
        .context("Failed to count relationships")?;

    println!("Graph Statistics");
    println!("================");

    let labels = grouped_counts(&labels, "label");
    let total_nodes: i64 = labels.iter().map(|(_, c)| c).sum();
    println!("\nNodes: {total_nodes}");
    for (label, count) in &labels {
        println!("  {label:<30} {count:>8}");
    }

    let types = grouped_counts(&types, "type");
    let total_edges: i64 = types.iter().map(|(_, c)| c).sum();
    println!("\nRelationships: {total_edges}");
    for (rel_type, count) in &types {
        println!("  {rel_type:<30} {count:>8}");
    }

    Ok(())
}
