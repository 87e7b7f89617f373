// tests/integration/orchestrator.rs
use super::{create_test_repo, create_test_session, create_test_user, json, test_config, Arc, Uuid};
use assistant_core::config::Config;
use assistant_core::models::internal::Role;
use assistant_core::orchestrator::{ChatOrchestrator, OrchestratorError};
use assistant_core::storage::ChatRepository;
use tokio::sync::RwLock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn orchestrator(repo: &Arc<dyn ChatRepository>, config: Config) -> ChatOrchestrator {
    ChatOrchestrator::new(repo.clone(), Arc::new(RwLock::new(config)))
}

async fn openai_stub(reply: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })))
        .mount(&server)
        .await;
    server
}

async fn last_request_body(server: &MockServer) -> serde_json::Value {
    let requests = server.received_requests().await.unwrap();
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

#[tokio::test]
async fn test_turn_persists_both_messages_with_echo() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "turn@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let orchestrator = orchestrator(&repo, test_config());

    let turn = orchestrator
        .handle_turn(session.id, user.id, "Hello there", None, None)
        .await
        .unwrap();

    assert_eq!(turn.user_message.role, Role::User);
    assert_eq!(turn.user_message.content, "Hello there");
    assert_eq!(turn.assistant_message.role, Role::Assistant);
    assert!(turn.assistant_message.content.contains("Demo Mode: gpt-4o"));
    assert!(turn.assistant_message.content.contains("> Hello there"));

    let stored = repo.list_messages(session.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].id, turn.user_message.id);
    assert_eq!(stored[1].id, turn.assistant_message.id);
}

#[tokio::test]
async fn test_auto_title_short_content_verbatim() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "title@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let orchestrator = orchestrator(&repo, test_config());

    orchestrator
        .handle_turn(session.id, user.id, "Plan a weekend in Rome", None, None)
        .await
        .unwrap();
    orchestrator
        .handle_turn(session.id, user.id, "Something else entirely", None, None)
        .await
        .unwrap();

    let session = repo.find_session(session.id, user.id).await.unwrap().unwrap();
    assert_eq!(session.title, "Plan a weekend in Rome");
}

#[tokio::test]
async fn test_auto_title_truncates_long_content() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "long@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let orchestrator = orchestrator(&repo, test_config());
    let content = "Please summarize the main arguments of the attached essay about urban planning";

    orchestrator
        .handle_turn(session.id, user.id, content, None, None)
        .await
        .unwrap();

    let session = repo.find_session(session.id, user.id).await.unwrap().unwrap();
    assert_eq!(session.title, format!("{}...", &content[..60]));
}

#[tokio::test]
async fn test_explicit_title_is_kept() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "named@example.com").await;
    let session = repo
        .create_session(user.id, Some("Groceries".to_string()))
        .await
        .unwrap();
    let orchestrator = orchestrator(&repo, test_config());

    orchestrator
        .handle_turn(session.id, user.id, "Milk and eggs", None, None)
        .await
        .unwrap();

    let session = repo.find_session(session.id, user.id).await.unwrap().unwrap();
    assert_eq!(session.title, "Groceries");
}

#[tokio::test]
async fn test_foreign_session_is_not_found_and_untouched() {
    let repo = create_test_repo().await;
    let owner = create_test_user(&repo, "owner@example.com").await;
    let intruder = create_test_user(&repo, "intruder@example.com").await;
    let session = create_test_session(&repo, &owner).await;
    let orchestrator = orchestrator(&repo, test_config());

    let result = orchestrator
        .handle_turn(session.id, intruder.id, "my name is mallory", None, None)
        .await;
    assert!(matches!(result, Err(OrchestratorError::SessionNotFound(id)) if id == session.id));

    let missing = orchestrator
        .handle_turn(Uuid::new_v4(), owner.id, "hi", None, None)
        .await;
    assert!(matches!(missing, Err(OrchestratorError::SessionNotFound(_))));

    assert!(repo.list_messages(session.id).await.unwrap().is_empty());
    assert!(repo.list_memories(intruder.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_end_to_end_fact_extraction() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "sam@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let orchestrator = orchestrator(&repo, test_config());

    orchestrator
        .handle_turn(
            session.id,
            user.id,
            "My name is Sam, remember that I like jazz",
            None,
            None,
        )
        .await
        .unwrap();

    let name = repo.find_memory(user.id, "name").await.unwrap().unwrap();
    let remembered = repo.find_memory(user.id, "remembered_fact").await.unwrap().unwrap();
    assert_eq!(name.value, "sam");
    assert_eq!(remembered.value, "i like jazz");
    assert_eq!(name.category, "auto-extracted");
}

#[tokio::test]
async fn test_renaming_across_turns_keeps_one_fact() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "rename@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let orchestrator = orchestrator(&repo, test_config());

    orchestrator
        .handle_turn(session.id, user.id, "My name is Alice", None, None)
        .await
        .unwrap();
    orchestrator
        .handle_turn(session.id, user.id, "My name is Bob", None, None)
        .await
        .unwrap();

    let facts = repo.list_memories(user.id, None).await.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].key, "name");
    assert_eq!(facts[0].value, "bob");
}

#[tokio::test]
async fn test_background_extraction_completes_in_turn_order() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "bg@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let config = Config {
        background_extraction: true,
        ..test_config()
    };
    let orchestrator = orchestrator(&repo, config);

    for name in ["ann", "ben", "cid"] {
        orchestrator
            .handle_turn(session.id, user.id, &format!("my name is {}", name), None, None)
            .await
            .unwrap();
    }
    orchestrator.extraction_queue().flush(user.id).await;

    let name = repo.find_memory(user.id, "name").await.unwrap().unwrap();
    assert_eq!(name.value, "cid");
}

#[tokio::test]
async fn test_system_prompt_carries_long_term_memory() {
    let server = openai_stub("Noted.").await;
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "prompt@example.com").await;
    let session = create_test_session(&repo, &user).await;
    repo.save_memory(user.id, "city", "Lisbon", "manual").await.unwrap();

    let config = Config {
        openai_api_key: "sk-test".to_string(),
        openai_base_url: server.uri(),
        system_prompt: "Base prompt.".to_string(),
        ..test_config()
    };
    let orchestrator = orchestrator(&repo, config);

    let turn = orchestrator
        .handle_turn(session.id, user.id, "Where do I live?", None, None)
        .await
        .unwrap();
    assert_eq!(turn.assistant_message.content, "Noted.");

    let body = last_request_body(&server).await;
    let messages = body["messages"].as_array().unwrap();
    let system = messages[0]["content"].as_str().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert!(system.starts_with("Base prompt.\n\nHere are some things you know about this user:"));
    assert!(system.contains("- city: Lisbon"));
    assert_eq!(messages.last().unwrap()["content"], "Where do I live?");
}

#[tokio::test]
async fn test_system_prompt_without_memory_is_base_prompt() {
    let server = openai_stub("Hi.").await;
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "bare@example.com").await;
    let session = create_test_session(&repo, &user).await;

    let config = Config {
        openai_api_key: "sk-test".to_string(),
        openai_base_url: server.uri(),
        system_prompt: "Base prompt.".to_string(),
        ..test_config()
    };
    orchestrator(&repo, config)
        .handle_turn(session.id, user.id, "Hello", None, None)
        .await
        .unwrap();

    let body = last_request_body(&server).await;
    assert_eq!(body["messages"][0]["content"], "Base prompt.");
}

#[tokio::test]
async fn test_context_window_is_capped() {
    let server = openai_stub("ok").await;
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "window@example.com").await;
    let session = create_test_session(&repo, &user).await;

    let config = Config {
        openai_api_key: "sk-test".to_string(),
        openai_base_url: server.uri(),
        memory_window: 4,
        ..test_config()
    };
    let orchestrator = orchestrator(&repo, config);

    for i in 0..4 {
        orchestrator
            .handle_turn(session.id, user.id, &format!("question {}", i), None, None)
            .await
            .unwrap();
    }

    let body = last_request_body(&server).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[1]["content"], "ok");
    assert_eq!(messages[2]["content"], "question 2");
    assert_eq!(messages[4]["content"], "question 3");
}

#[tokio::test]
async fn test_provider_failure_still_persists_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "fail@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let config = Config {
        deepseek_api_key: "ds-test".to_string(),
        deepseek_base_url: server.uri(),
        ..test_config()
    };

    let turn = orchestrator(&repo, config)
        .handle_turn(session.id, user.id, "I live in Porto", Some("deepseek-chat"), None)
        .await
        .unwrap();

    assert!(turn
        .assistant_message
        .content
        .starts_with("Error communicating with deepseek-chat"));
    assert_eq!(repo.list_messages(session.id).await.unwrap().len(), 2);
    assert_eq!(
        repo.find_memory(user.id, "location").await.unwrap().unwrap().value,
        "porto"
    );
}

#[tokio::test]
async fn test_unknown_model_reply_is_persisted() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "unknown@example.com").await;
    let session = create_test_session(&repo, &user).await;

    let turn = orchestrator(&repo, test_config())
        .handle_turn(session.id, user.id, "hi", Some("gpt-17"), None)
        .await
        .unwrap();

    assert!(turn.assistant_message.content.contains("Unknown model 'gpt-17'"));
    assert!(turn.assistant_message.content.contains("gpt-4o-mini"));
}

#[tokio::test]
async fn test_image_turn_stores_marker() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "image@example.com").await;
    let session = create_test_session(&repo, &user).await;

    let turn = orchestrator(&repo, test_config())
        .handle_turn(session.id, user.id, "What is this?", None, Some("aGVsbG8="))
        .await
        .unwrap();

    assert_eq!(turn.user_message.image_url.as_deref(), Some("[image attached]"));
    assert!(turn.assistant_message.image_url.is_none());
}

#[tokio::test]
async fn test_user_delete_after_turns_leaves_nothing() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "cascade@example.com").await;
    let session = create_test_session(&repo, &user).await;

    orchestrator(&repo, test_config())
        .handle_turn(session.id, user.id, "I work at Acme", None, None)
        .await
        .unwrap();
    assert_eq!(repo.list_memories(user.id, None).await.unwrap().len(), 1);

    assert!(repo.delete_user(user.id).await.unwrap());
    assert!(repo.list_sessions(user.id).await.unwrap().is_empty());
    assert!(repo.list_messages(session.id).await.unwrap().is_empty());
    assert!(repo.list_memories(user.id, None).await.unwrap().is_empty());
}
