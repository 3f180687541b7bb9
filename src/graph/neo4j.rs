//! Neo4j graph store over Bolt

use async_trait::async_trait;
use neo4rs::{query, Graph, Row};
use serde::{Deserialize, Serialize};

use super::{ColumnKind, GraphStatement, GraphStore, Record, StoreError};

/// Connection settings for Neo4j
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

impl Neo4jConfig {
    /// Read `NEO4J_URI`, `NEO4J_USER` and `NEO4J_PASSWORD`
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = std::env::var("NEO4J_URI") {
            self.uri = uri;
        }
        if let Ok(user) = std::env::var("NEO4J_USER") {
            self.user = user;
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            self.password = password;
        }
        self
    }
}

/// Live Neo4j store
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect and verify the session with a trivial query
    pub async fn connect(config: &Neo4jConfig) -> Result<Self, StoreError> {
        let graph = Graph::new(&config.uri, &config.user, &config.password).await?;
        graph.run(query("RETURN 1")).await?;

        tracing::info!(uri = %config.uri, user = %config.user, "Connected to Neo4j");
        Ok(Self { graph })
    }
}

fn row_to_record(row: &Row, columns: &[(&'static str, ColumnKind)]) -> Record {
    let mut record = Record::new();
    for (name, kind) in columns {
        let value = match kind {
            ColumnKind::Integer => row.get::<i64>(name).ok().map(serde_json::Value::from),
            ColumnKind::Text => row.get::<String>(name).ok().map(serde_json::Value::from),
        };
        if let Some(value) = value {
            record.insert((*name).to_string(), value);
        }
    }
    record
}

/// Tag a statement-level failure with the query text
fn with_statement(err: StoreError, text: &str) -> StoreError {
    match err {
        StoreError::Constraint { message, .. } => StoreError::constraint(text, message),
        other => other,
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn execute(&self, statement: &GraphStatement) -> Result<Vec<Record>, StoreError> {
        let cypher = statement.to_cypher();
        let mut q = query(&cypher.text);
        for (key, value) in &cypher.params {
            q = q.param(*key, value.as_str());
        }

        let columns = statement.result_columns();
        if columns.is_empty() {
            self.graph
                .run(q)
                .await
                .map_err(|e| with_statement(e.into(), &cypher.text))?;
            return Ok(Vec::new());
        }

        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| with_statement(e.into(), &cypher.text))?;

        let mut records = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| with_statement(e.into(), &cypher.text))?
        {
            records.push(row_to_record(&row, columns));
        }
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "neo4j"
    }
}
