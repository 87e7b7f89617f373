// tests/integration/model_router.rs
use super::{json, test_config, Arc};
use assistant_core::config::Config;
use assistant_core::models::internal::{ContextMessage, Role};
use assistant_core::services::model_router::{DispatchOutcome, ModelRouter};
use tokio::sync::RwLock;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn router(config: Config) -> ModelRouter {
    ModelRouter::new(Arc::new(RwLock::new(config)))
}

fn context() -> Vec<ContextMessage> {
    vec![
        ContextMessage::new(Role::System, "You are terse."),
        ContextMessage::new(Role::User, "first question"),
        ContextMessage::new(Role::Assistant, "first answer"),
        ContextMessage::new(Role::User, "second question"),
    ]
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

#[tokio::test]
async fn test_structured_client_sends_full_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 4096,
            "temperature": 0.7,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "first question"},
                {"role": "assistant", "content": "first answer"},
                {"role": "user", "content": "second question"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sure.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: "sk-test".to_string(),
        openai_base_url: server.uri(),
        ..test_config()
    };
    let outcome = router(config)
        .dispatch(&context(), Some("gpt-4o-mini"), None)
        .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Completed {
            model: "gpt-4o-mini".to_string(),
            text: "Sure.".to_string()
        }
    );
}

#[tokio::test]
async fn test_structured_client_attaches_image_to_last_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "first question"},
                {"role": "assistant", "content": "first answer"},
                {"role": "user", "content": [
                    {"type": "text", "text": "second question"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}}
                ]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("A cat.")))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: "sk-test".to_string(),
        openai_base_url: server.uri(),
        ..test_config()
    };
    let outcome = router(config)
        .dispatch(&context(), Some("gpt-4o"), Some("aGVsbG8="))
        .await;

    assert_eq!(outcome.text(), "A cat.");
}

#[tokio::test]
async fn test_missing_choice_content_yields_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let config = Config {
        deepseek_api_key: "ds-test".to_string(),
        deepseek_base_url: server.uri(),
        ..test_config()
    };
    let outcome = router(config)
        .dispatch(&context(), Some("deepseek-chat"), None)
        .await;

    assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
    assert_eq!(outcome.text(), "");
}

#[tokio::test]
async fn test_provider_error_status_becomes_reply_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: "sk-test".to_string(),
        openai_base_url: server.uri(),
        ..test_config()
    };
    let outcome = router(config).dispatch(&context(), Some("gpt-4o"), None).await;

    assert!(matches!(outcome, DispatchOutcome::ProviderFailed { .. }));
    assert!(outcome.text().contains("gpt-4o"));
    assert!(outcome.text().contains("500"));
    assert!(outcome.text().contains("upstream exploded"));
}

#[tokio::test]
async fn test_missing_key_echoes_without_calling_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("never")))
        .expect(0)
        .mount(&server)
        .await;

    let config = Config {
        openai_base_url: server.uri(),
        ..test_config()
    };
    let outcome = router(config).dispatch(&context(), Some("gpt-4o"), None).await;

    assert!(matches!(outcome, DispatchOutcome::Echo { .. }));
    assert!(outcome.text().contains("gpt-4o"));
    assert!(outcome.text().contains("second question"));
}

#[tokio::test]
async fn test_competition_chat_completions_without_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "llama-3"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from llama")))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        competition_base_url: format!("{}/v1/", server.uri()),
        competition_model_ids: "llama-3".to_string(),
        ..test_config()
    };
    let outcome = router(config).dispatch(&context(), Some("llama-3"), None).await;

    assert_eq!(outcome.text(), "from llama");
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_raw_http_sends_last_user_message_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(header("authorization", "Bearer comp-key"))
        .and(body_partial_json(json!({
            "model": "custom",
            "prompt": "second question",
            "system_prompt": "You are terse.",
            "temperature": 0.7
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "raw reply"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        competition_base_url: format!("{}/generate", server.uri()),
        competition_api_key: "comp-key".to_string(),
        competition_use_raw_http: true,
        default_model: "competition-model".to_string(),
        ..test_config()
    };
    let outcome = router(config).dispatch(&context(), None, None).await;
    assert_eq!(outcome.text(), "raw reply");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("messages").is_none());
    assert!(!body.to_string().contains("first question"));
}

#[tokio::test]
async fn test_raw_http_falls_back_to_pretty_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": {"tokens": 3}})))
        .mount(&server)
        .await;

    let config = Config {
        competition_base_url: server.uri(),
        competition_model_ids: "bespoke".to_string(),
        competition_use_raw_http: true,
        ..test_config()
    };
    let outcome = router(config).dispatch(&context(), Some("bespoke"), None).await;

    assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
    let parsed: serde_json::Value = serde_json::from_str(outcome.text()).unwrap();
    assert_eq!(parsed, json!({"output": {"tokens": 3}}));

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_raw_http_error_status_becomes_reply_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = Config {
        competition_base_url: server.uri(),
        competition_model_ids: "bespoke".to_string(),
        competition_use_raw_http: true,
        ..test_config()
    };
    let outcome = router(config).dispatch(&context(), Some("bespoke"), None).await;

    assert!(matches!(outcome, DispatchOutcome::ProviderFailed { .. }));
    assert!(outcome.text().starts_with("Error communicating with bespoke"));
}
