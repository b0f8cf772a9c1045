//! HTTP model backends against mocked endpoints.

use finadvisor::providers::ollama::OllamaProvider;
use finadvisor::providers::openai::OpenAiProvider;
use finadvisor::providers::{Provider, ProviderError};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_ollama_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "mistral", "stream": false})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": "{\"ok\":true}"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(Client::new())
        .with_base_url(server.uri())
        .with_model("mistral");

    let text = provider.complete("hello", None).await.unwrap();
    assert_eq!(text, "{\"ok\":true}");
}

#[tokio::test]
async fn test_ollama_models_and_availability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"models": [{"name": "llama3.2"}, {"name": "mistral"}]})),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(Client::new()).with_base_url(server.uri());
    assert!(provider.is_available().await);
    assert_eq!(provider.list_models().await.unwrap(), vec!["llama3.2", "mistral"]);
}

#[tokio::test]
async fn test_ollama_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(Client::new()).with_base_url(server.uri());
    match provider.complete("hello", None).await {
        Err(ProviderError::ApiError(msg)) => assert!(msg.contains("model not loaded")),
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_chat_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "advice"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(Client::new(), Some("sk-test".to_string()))
        .with_base_url(format!("{}/", server.uri()));

    assert_eq!(provider.complete("hello", Some("gpt-test")).await.unwrap(), "advice");
}

#[tokio::test]
async fn test_openai_without_key_is_unavailable() {
    let provider = OpenAiProvider::new(Client::new(), None);

    assert!(!provider.is_available().await);
    assert!(matches!(
        provider.complete("hello", None).await,
        Err(ProviderError::NotAvailable(_))
    ));
}

#[tokio::test]
async fn test_openai_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(Client::new(), Some("sk-test".to_string()))
        .with_base_url(server.uri());

    assert!(matches!(
        provider.complete("hello", None).await,
        Err(ProviderError::ApiError(_))
    ));
}
