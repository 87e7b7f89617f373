// tests/integration/repository.rs
use super::{create_test_repo, create_test_session, create_test_user, Uuid};
use assistant_core::models::internal::{NewMessage, NewUser, Role, DEFAULT_SESSION_TITLE};
use assistant_core::storage::RepositoryError;

#[tokio::test]
async fn test_get_or_create_user_is_idempotent_by_email() {
    let repo = create_test_repo().await;
    let new_user = NewUser {
        email: "sam@example.com".to_string(),
        display_name: "Sam".to_string(),
        provider: "demo".to_string(),
    };

    let first = repo.get_or_create_user(new_user.clone()).await.unwrap();
    let second = repo.get_or_create_user(new_user).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        repo.find_user_by_email("sam@example.com").await.unwrap().unwrap().id,
        first.id
    );
}

#[tokio::test]
async fn test_create_session_requires_existing_user() {
    let repo = create_test_repo().await;
    let result = repo.create_session(Uuid::new_v4(), None).await;
    assert!(matches!(result, Err(RepositoryError::NotFound(_))));
}

#[tokio::test]
async fn test_create_session_defaults_title() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "a@example.com").await;

    let untitled = repo.create_session(user.id, None).await.unwrap();
    let blank = repo.create_session(user.id, Some("  ".to_string())).await.unwrap();
    let titled = repo
        .create_session(user.id, Some("Trip planning".to_string()))
        .await
        .unwrap();

    assert_eq!(untitled.title, DEFAULT_SESSION_TITLE);
    assert_eq!(blank.title, DEFAULT_SESSION_TITLE);
    assert_eq!(titled.title, "Trip planning");
}

#[tokio::test]
async fn test_session_lookup_is_scoped_by_owner() {
    let repo = create_test_repo().await;
    let owner = create_test_user(&repo, "owner@example.com").await;
    let other = create_test_user(&repo, "other@example.com").await;
    let session = create_test_session(&repo, &owner).await;

    assert!(repo.find_session(session.id, owner.id).await.unwrap().is_some());
    assert!(repo.find_session(session.id, other.id).await.unwrap().is_none());
    assert!(repo.list_sessions(other.id).await.unwrap().is_empty());
    assert!(!repo.delete_session(session.id, other.id).await.unwrap());
    assert!(repo.find_session(session.id, owner.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_sessions_listed_most_recently_updated_first() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "b@example.com").await;

    let older = create_test_session(&repo, &user).await;
    let newer = create_test_session(&repo, &user).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    repo.append_message(older.id, NewMessage::user("bump", false), None)
        .await
        .unwrap();

    let sessions = repo.list_sessions(user.id).await.unwrap();
    assert_eq!(sessions[0].id, older.id);
    assert_eq!(sessions[1].id, newer.id);
    assert!(sessions[0].updated_at > sessions[0].created_at);
}

#[tokio::test]
async fn test_messages_keep_insertion_order() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "c@example.com").await;
    let session = create_test_session(&repo, &user).await;

    for i in 0..5 {
        repo.append_message(session.id, NewMessage::user(format!("m{}", i), false), None)
            .await
            .unwrap();
    }

    let messages = repo.list_messages(session.id).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    assert!(messages.windows(2).all(|w| w[0].position < w[1].position));
    assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    let recent = repo.recent_messages(session.id, 2).await.unwrap();
    assert_eq!(recent[0].content, "m4");
    assert_eq!(recent[1].content, "m3");
}

#[tokio::test]
async fn test_append_message_stores_image_marker_only() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "d@example.com").await;
    let session = create_test_session(&repo, &user).await;

    let with_image = repo
        .append_message(session.id, NewMessage::user("look", true), None)
        .await
        .unwrap();
    let reply = repo
        .append_message(session.id, NewMessage::assistant("nice"), None)
        .await
        .unwrap();

    assert_eq!(with_image.role, Role::User);
    assert_eq!(with_image.image_url.as_deref(), Some("[image attached]"));
    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.image_url.is_none());
}

#[tokio::test]
async fn test_append_message_retitles_placeholder_only() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "e@example.com").await;
    let session = create_test_session(&repo, &user).await;

    repo.append_message(
        session.id,
        NewMessage::assistant("first"),
        Some("First title".to_string()),
    )
    .await
    .unwrap();
    repo.append_message(
        session.id,
        NewMessage::assistant("second"),
        Some("Second title".to_string()),
    )
    .await
    .unwrap();

    let session = repo.find_session(session.id, user.id).await.unwrap().unwrap();
    assert_eq!(session.title, "First title");
}

#[tokio::test]
async fn test_append_message_to_missing_session_fails() {
    let repo = create_test_repo().await;
    let result = repo
        .append_message(Uuid::new_v4(), NewMessage::user("hi", false), None)
        .await;
    assert!(matches!(result, Err(RepositoryError::NotFound(_))));
}

#[tokio::test]
async fn test_upsert_memories_overwrites_existing_key() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "f@example.com").await;

    repo.upsert_memories(user.id, vec![("name".to_string(), "alice".to_string())])
        .await
        .unwrap();
    repo.upsert_memories(
        user.id,
        vec![
            ("name".to_string(), "bob".to_string()),
            ("location".to_string(), "paris".to_string()),
        ],
    )
    .await
    .unwrap();

    let facts = repo.list_memories(user.id, None).await.unwrap();
    assert_eq!(facts.len(), 2);
    let name = repo.find_memory(user.id, "name").await.unwrap().unwrap();
    assert_eq!(name.value, "bob");
    assert_eq!(name.category, "auto-extracted");
}

#[tokio::test]
async fn test_save_memory_allows_duplicate_keys() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "g@example.com").await;

    repo.save_memory(user.id, "hobby", "chess", "manual").await.unwrap();
    repo.save_memory(user.id, "hobby", "go", "manual").await.unwrap();

    let facts = repo.list_memories(user.id, None).await.unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].value, "go");
    assert_eq!(facts[1].value, "chess");

    assert!(matches!(
        repo.save_memory(user.id, " ", "x", "manual").await,
        Err(RepositoryError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_memories_are_scoped_by_user() {
    let repo = create_test_repo().await;
    let alice = create_test_user(&repo, "alice@example.com").await;
    let bob = create_test_user(&repo, "bob@example.com").await;

    repo.save_memory(alice.id, "pet", "cat", "general").await.unwrap();

    assert!(repo.list_memories(bob.id, None).await.unwrap().is_empty());
    assert!(repo.find_memory(bob.id, "pet").await.unwrap().is_none());
    assert_eq!(repo.delete_memories(bob.id).await.unwrap(), 0);
    assert_eq!(repo.delete_memories(alice.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let repo = create_test_repo().await;
    let user = create_test_user(&repo, "gone@example.com").await;
    let keeper = create_test_user(&repo, "keeper@example.com").await;
    let session = create_test_session(&repo, &user).await;
    let kept_session = create_test_session(&repo, &keeper).await;

    repo.append_message(session.id, NewMessage::user("hello", false), None)
        .await
        .unwrap();
    repo.append_message(kept_session.id, NewMessage::user("stay", false), None)
        .await
        .unwrap();
    repo.save_memory(user.id, "k", "v", "manual").await.unwrap();

    assert!(repo.delete_user(user.id).await.unwrap());

    assert!(repo.find_user(user.id).await.unwrap().is_none());
    assert!(repo.list_sessions(user.id).await.unwrap().is_empty());
    assert!(repo.list_messages(session.id).await.unwrap().is_empty());
    assert!(repo.list_memories(user.id, None).await.unwrap().is_empty());
    assert_eq!(repo.list_messages(kept_session.id).await.unwrap().len(), 1);
    assert!(!repo.delete_user(user.id).await.unwrap());
}
