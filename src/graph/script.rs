//! Statement script store
//!
//! Records every write as a standalone Cypher line with inlined literals. The
//! graph is mirrored in memory so endpoint lookups get the answers a live
//! database would give.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::memory::{GraphSnapshot, MemoryGraph};
use super::{GraphStatement, GraphStore, Record, StoreError};

pub struct ScriptStore {
    path: PathBuf,
    lines: Mutex<Vec<String>>,
    mirror: MemoryGraph,
}

impl ScriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Mutex::new(Vec::new()),
            mirror: MemoryGraph::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of recorded write statements
    pub async fn statement_count(&self) -> usize {
        self.lines.lock().await.len()
    }

    /// Script text as it would be written
    pub async fn render(&self) -> String {
        let lines = self.lines.lock().await;
        let mut out = format!(
            "// ontograph statement script\n// generated {}\n// {} statements\n\n",
            chrono::Utc::now().to_rfc3339(),
            lines.len()
        );
        for line in lines.iter() {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// State of the mirrored graph
    pub async fn snapshot(&self) -> GraphSnapshot {
        self.mirror.snapshot().await
    }
}

#[async_trait]
impl GraphStore for ScriptStore {
    async fn execute(&self, statement: &GraphStatement) -> Result<Vec<Record>, StoreError> {
        if let Some(line) = statement.to_script_line() {
            self.lines.lock().await.push(line);
        }
        self.mirror.execute(statement).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let script = self.render().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, script).await?;

        let statements = self.statement_count().await;
        tracing::info!(
            path = %self.path.display(),
            statements,
            "Statement script written"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "script"
    }
}
