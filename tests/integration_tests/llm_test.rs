//! LLM client tests against a wiremock server

use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ontograph::corpus::Document;
use ontograph::llm::{LlmBackend, LlmClient, LlmConfig, LlmError, LlmService, StructuredRequest};
use ontograph::ontology::{LlmOntologist, OntologyAgent};
use ontograph::utils::retry::RetryConfig;

use super::fixtures::LEY_SCHEMA_JSON;

fn config_for(server: &MockServer, backend: LlmBackend) -> LlmConfig {
    LlmConfig {
        backend,
        endpoint: server.uri(),
        model: "test-model".to_string(),
        timeout_secs: 5,
        requests_per_minute: 6000,
        retry: RetryConfig::with_delays(2, 10, 50),
        ..Default::default()
    }
}

fn request() -> StructuredRequest {
    StructuredRequest {
        system: "system prompt".to_string(),
        user: "Document: a.txt\n\nLey 27.275".to_string(),
        schema_name: "schema_definition".to_string(),
        json_schema: json!({"type": "object"}),
    }
}

fn openai_body(content: &str, tokens: u64) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": tokens - 10, "completion_tokens": 10, "total_tokens": tokens}
    })
}

/// OpenAI-compatible request carries the schema as response_format
#[tokio::test]
async fn test_openai_structured_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "temperature": 0.0,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "schema_definition", "schema": {"type": "object"}}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(LEY_SCHEMA_JSON, 42)))
        .expect(1)
        .mount(&server)
        .await;

    let client = LlmClient::with_config(config_for(&server, LlmBackend::OpenAi)).unwrap();
    let response = client.complete_structured(&request()).await.unwrap();

    assert_eq!(response.content, LEY_SCHEMA_JSON);
    assert_eq!(response.total_tokens, 42);
}

/// Ollama token usage is prompt plus completion counts
#[tokio::test]
async fn test_ollama_token_counting() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "format": {"type": "object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": LEY_SCHEMA_JSON},
            "prompt_eval_count": 30,
            "eval_count": 12,
            "done": true
        })))
        .mount(&server)
        .await;

    let client = LlmClient::with_config(config_for(&server, LlmBackend::Ollama)).unwrap();
    let response = client.complete_structured(&request()).await.unwrap();

    assert_eq!(response.content, LEY_SCHEMA_JSON);
    assert_eq!(response.total_tokens, 42);
}

/// Server errors are retried until one succeeds
#[tokio::test]
async fn test_unavailable_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("{}", 11)))
        .mount(&server)
        .await;

    let client = LlmClient::with_config(config_for(&server, LlmBackend::OpenAi)).unwrap();
    let result = client.complete_structured(&request()).await;

    assert!(result.is_ok(), "Should succeed after retries: {:?}", result.err());
}

/// Authentication failures are returned after a single attempt
#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let client = LlmClient::with_config(config_for(&server, LlmBackend::OpenAi)).unwrap();
    let err = client.complete_structured(&request()).await.unwrap_err();

    match err {
        LlmError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Retries stop at the configured bound
#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = LlmClient::with_config(config_for(&server, LlmBackend::OpenAi)).unwrap();
    let err = client.complete_structured(&request()).await.unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_bearer_token_sent_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("{}", 11)))
        .expect(1)
        .mount(&server)
        .await;

    let config = LlmConfig {
        api_key: Some("sk-test".to_string()),
        ..config_for(&server, LlmBackend::OpenAi)
    };
    let client = LlmClient::with_config(config).unwrap();

    assert!(client.complete_structured(&request()).await.is_ok());
}

#[tokio::test]
async fn test_empty_content_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("   ", 11)))
        .mount(&server)
        .await;

    let client = LlmClient::with_config(config_for(&server, LlmBackend::OpenAi)).unwrap();
    let err = client.complete_structured(&request()).await.unwrap_err();

    assert!(matches!(err, LlmError::EmptyResponse));
}

/// Ontologist over HTTP: fenced JSON reply, normalized labels
#[tokio::test]
async fn test_ontologist_over_http() {
    let server = MockServer::start().await;
    let reply = "Here is the schema:\n```json\n\
                 {\"node_labels\": [\"norma\", \"Organismo Público\"], \
                 \"relationship_types\": [\"cita a\"]}\n```";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(reply, 77)))
        .mount(&server)
        .await;

    let client: Arc<dyn LlmService> =
        Arc::new(LlmClient::with_config(config_for(&server, LlmBackend::OpenAi)).unwrap());
    let ontologist = LlmOntologist::new(client);
    let document = Document::new(0, "ley.txt", "La Ley 27.275 cita la Ley 25.326.");

    let output = ontologist
        .propose_schema(&document, &BTreeSet::new(), None)
        .await
        .unwrap();

    assert_eq!(output.tokens, 77);
    assert_eq!(
        output.value.node_labels.iter().collect::<Vec<_>>(),
        vec!["Norma", "OrganismoPublico"]
    );
    assert!(output.value.contains_relationship_type("CITA_A"));
}
