//! Scenario 6 (spec §8): two endpoints, the primary returns 503. The client must fail over
//! to the secondary within its retry budget and complete successfully.

use std::time::Duration;

use agentic::llm::{ChatOptions, HttpLlmClient, LlmClient, LlmClientConfig, Message};

#[tokio::test]
async fn primary_503_fails_over_to_secondary() {
    let mut primary = mockito::Server::new_async().await;
    let mut secondary = mockito::Server::new_async().await;

    let primary_mock = primary
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("service unavailable")
        .create_async()
        .await;

    let secondary_mock = secondary
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"message": {"content": "hello from secondary"}}]}"#)
        .create_async()
        .await;

    let config = LlmClientConfig {
        endpoints: vec![primary.url(), secondary.url()],
        max_retries: 2,
        request_timeout: Duration::from_secs(5),
        ..LlmClientConfig::default()
    };
    let client = HttpLlmClient::new(config);

    let reply = client
        .chat(&[Message::user("ping")], &ChatOptions::default())
        .await
        .expect("secondary endpoint should have served the request");

    assert_eq!(reply.message.content.as_ref(), "hello from secondary");
    assert_eq!(reply.endpoint, secondary.url());

    primary_mock.assert_async().await;
    secondary_mock.assert_async().await;
}

/// Three consecutive 503s against a single endpoint degrade it to unhealthy (spec §4.1:
/// "degraded -> unhealthy after 3 consecutive failures").
#[tokio::test]
async fn three_consecutive_failures_mark_endpoint_unhealthy() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let config = LlmClientConfig {
        endpoints: vec![server.url()],
        max_retries: 3,
        request_timeout: Duration::from_secs(5),
        ..LlmClientConfig::default()
    };
    let client = HttpLlmClient::new(config);

    let err = client
        .chat(&[Message::user("ping")], &ChatOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, agentic::error::AgenticError::LLMUnavailable { .. }));
    let snapshot = client.endpoint_pool().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].status, agentic::llm::EndpointStatus::Unhealthy);
}
