//! Tests for the client facade contract: precondition checks, message
//! pass-through, reply shaping, and fault propagation.

mod common;
use common::mock_support::{MockBehavior, MockChatProvider, client_with, mock_spec};
use serde_json::json;
use std::sync::atomic::Ordering;
use uni_parla::client::ModelClient;
use uni_parla::error::{ClientError, ErrorOrigin};
use uni_parla::message::{Message, Role};
use uni_parla::registry::ProviderRegistry;
use uni_parla::traits::TokenUsage;

#[tokio::test]
async fn unconfigured_client_fails_every_operation_without_provider_contact() {
    let provider = MockChatProvider::new();
    let connects = provider.connect_count.clone();
    let state = provider.state.clone();

    // A registry with a healthy provider, but no model spec at all.
    let client = ModelClient::builder()
        .registry(ProviderRegistry::empty().register(provider))
        .build();
    assert!(!client.is_configured());

    let messages = || vec![Message::user("hi")];
    let schema = json!({"type": "object"});

    let errors: Vec<ClientError> = vec![
        client.chat(messages()).await.unwrap_err(),
        client.stream_chat(messages()).await.unwrap_err(),
        client
            .create_object(messages(), schema.clone())
            .await
            .unwrap_err(),
        client
            .stream_object(messages(), schema.clone())
            .await
            .unwrap_err(),
        client.classify("text", ["a", "b"]).await.unwrap_err(),
        client
            .chat_with_image_file(messages(), "/tmp/x.png")
            .await
            .unwrap_err(),
        client
            .chat_with_image_url(messages(), "https://example.com/x.png")
            .await
            .unwrap_err(),
        client
            .chat_with_file(messages(), "/tmp/x.pdf")
            .await
            .unwrap_err(),
        client
            .extract_from_file(messages(), "/tmp/x.pdf", schema)
            .await
            .unwrap_err(),
    ];

    for err in errors {
        assert!(matches!(err, ClientError::Unconfigured));
        assert_eq!(err.to_string(), "ai model not set");
    }
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert_eq!(state.calls(), 0);
}

#[tokio::test]
async fn chat_passes_messages_through_untouched() {
    let provider = MockChatProvider::new();
    let state = provider.state.clone();
    let client = client_with(provider);

    let reply = client
        .chat(vec![
            Message::system("You are terse."),
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("echo me"),
        ])
        .await
        .unwrap();
    assert_eq!(reply.text, "echo me");
    assert!(reply.reasoning.is_none());

    let request = state.last_request().unwrap();
    let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(request.messages[1].content.text(), "first question");
}

#[tokio::test]
async fn usage_is_reported_verbatim() {
    let provider = MockChatProvider::new().with_usage(TokenUsage {
        prompt_tokens: 11,
        completion_tokens: 22,
        total_tokens: 33,
    });
    let client = client_with(provider);

    let reply = client.chat(vec![Message::user("hi")]).await.unwrap();
    let usage = reply.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 11);
    assert_eq!(usage.completion_tokens, 22);
    assert_eq!(usage.total_tokens, 33);
}

#[tokio::test]
async fn provider_fault_is_wrapped_never_panicked() {
    let provider =
        MockChatProvider::new().with_behavior(MockBehavior::Fail("upstream exploded".to_string()));
    let client = client_with(provider);

    let err = client.chat(vec![Message::user("hi")]).await.unwrap_err();
    assert_eq!(err.origin(), ErrorOrigin::Provider);
    assert!(!err.to_string().is_empty());
    assert!(err.to_string().contains("upstream exploded"));
}

#[tokio::test]
async fn connect_failure_surfaces_on_first_use() {
    let provider = MockChatProvider::new().failing_connect("key material missing");
    let client = client_with(provider);
    assert!(client.is_configured());

    let err = client.chat(vec![Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
    assert!(err.to_string().contains("key material missing"));
}

#[tokio::test]
async fn one_client_serves_concurrent_calls() {
    let provider = MockChatProvider::new();
    let connects = provider.connect_count.clone();
    let client = std::sync::Arc::new(client_with(provider));

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.chat(vec![Message::user(format!("call {}", i))]).await
        }));
    }
    for handle in handles {
        let reply = handle.await.unwrap().unwrap();
        assert!(reply.text.starts_with("call "));
    }
    // Concurrent first calls race, but each client binds only once.
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn model_spec_accessor_reflects_the_accepted_spec() {
    let client = ModelClient::builder()
        .registry(ProviderRegistry::empty().register(MockChatProvider::new()))
        .model(mock_spec())
        .build();
    let spec = client.model_spec().unwrap();
    assert_eq!(spec.provider_id, "mock/chat");
    assert_eq!(spec.model_id, "echo-1");
}
