//! Test fixtures for integration tests
//!
//! Provides a scripted LLM service that answers per document and per agent,
//! plus canned model outputs for a small legal corpus.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ontograph::llm::{LlmError, LlmService, StructuredRequest, StructuredResponse};

/// Schema name the ontology agent requests
pub const ONTOLOGY: &str = "schema_definition";

/// Schema name the extraction agent requests
pub const EXTRACTION: &str = "extraction_result";

/// Ontology output for the first legal document
pub const LEY_SCHEMA_JSON: &str = r#"{"node_labels": ["Norma"], "relationship_types": ["CITA"]}"#;

/// Ontology output for the second legal document
pub const ORGANISMO_SCHEMA_JSON: &str =
    r#"{"node_labels": ["Organismo"], "relationship_types": ["EMITE"]}"#;

/// Extraction output for the first legal document
pub const LEY_EXTRACTION_JSON: &str = r#"```json
{
  "nodes": [
    {"id": "Ley 27.275", "label": "Norma", "description": "Ley 27.275 de Acceso a la Información Pública"},
    {"id": "LEY_25_326", "label": "Norma", "description": "Ley 25.326 de Protección de Datos"}
  ],
  "relationships": [
    {"source_id": "LEY_27_275", "source_label": "Norma", "relationship_type": "cita",
     "target_id": "LEY_25_326", "target_label": "Norma"}
  ]
}
```"#;

/// Extraction output for the second legal document
pub const ORGANISMO_EXTRACTION_JSON: &str = r#"{
  "nodes": [
    {"id": "CONGRESO_DE_LA_NACION", "label": "Organismo", "description": "Congreso de la Nación"},
    {"id": "LEY_27_275", "label": "Norma", "description": ""}
  ],
  "relationships": [
    {"source_id": "CONGRESO_DE_LA_NACION", "source_label": "Organismo", "relationship_type": "EMITE",
     "target_id": "LEY_27_275", "target_label": "Norma"}
  ]
}"#;

/// Two-document legal corpus
pub fn legal_corpus() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "ley_27275.txt",
            "La Ley 27.275 de Acceso a la Información Pública cita la Ley 25.326.",
        ),
        (
            "organismos.txt",
            "El Congreso de la Nación sancionó la Ley 27.275.",
        ),
    ]
}

/// Scripted LLM wired for [`legal_corpus`]
pub fn legal_llm() -> Arc<ScriptedLlm> {
    Arc::new(
        ScriptedLlm::new()
            .respond(ONTOLOGY, "ley_27275.txt", LEY_SCHEMA_JSON)
            .respond(ONTOLOGY, "organismos.txt", ORGANISMO_SCHEMA_JSON)
            .respond(EXTRACTION, "ley_27275.txt", LEY_EXTRACTION_JSON)
            .respond(EXTRACTION, "organismos.txt", ORGANISMO_EXTRACTION_JSON),
    )
}

/// LLM service answering from a `(schema name, file name)` table
///
/// Unscripted calls get an empty JSON object.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: HashMap<(String, String), Result<String, u16>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, schema_name: &str, filename: &str, content: &str) -> Self {
        self.responses.insert(
            (schema_name.to_string(), filename.to_string()),
            Ok(content.to_string()),
        );
        self
    }

    /// Fail the call with an HTTP status
    #[allow(dead_code)]
    pub fn fail(mut self, schema_name: &str, filename: &str, status: u16) -> Self {
        self.responses
            .insert((schema_name.to_string(), filename.to_string()), Err(status));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn requested_file(request: &StructuredRequest) -> String {
    request
        .user
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Document: "))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete_structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let key = (request.schema_name.clone(), requested_file(request));
        match self.responses.get(&key) {
            Some(Ok(content)) => Ok(StructuredResponse {
                content: content.clone(),
                total_tokens: 100,
            }),
            Some(Err(status)) => Err(LlmError::Status {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            None => Ok(StructuredResponse {
                content: "{}".to_string(),
                total_tokens: 1,
            }),
        }
    }
}
