//! Unit tests for the text generation backends.

use super::*;
use intake_core::config::LlmConfig;

#[tokio::test]
async fn placeholder_echoes_latest_user_request() {
    let request = GenerationRequest::new(
        "system",
        vec![
            ChatMessage::user("Build a guitar marketplace"),
            ChatMessage::assistant("Which payment options?"),
            ChatMessage::user("Card only"),
        ],
    );

    let text = PlaceholderGenerator.generate(request).await.expect("generate");
    assert!(text.contains("3 message(s)"));
    assert!(text.contains("Card only"));
}

#[tokio::test]
async fn placeholder_small_model_returns_single_line() {
    let request =
        GenerationRequest::new("title", vec![ChatMessage::user("First line\nsecond line")]).small();

    let text = PlaceholderGenerator.generate(request).await.expect("generate");
    assert_eq!(text, "First line");
}

#[tokio::test]
async fn placeholder_handles_empty_transcript() {
    let text = PlaceholderGenerator
        .generate(GenerationRequest::new("system", Vec::new()))
        .await
        .expect("generate");
    assert!(text.contains("0 message(s)"));
}

#[test]
fn create_generator_defaults_to_placeholder() {
    let generator = create_generator(&LlmConfig::default()).expect("create");
    assert_eq!(generator.model_name(false), "placeholder");
}

#[test]
fn create_generator_rejects_unknown_provider() {
    let config = LlmConfig {
        provider: "carrier-pigeon".to_string(),
        ..LlmConfig::default()
    };
    let err = create_generator(&config).err().expect("unknown provider");
    assert!(matches!(err, GenerationError::Unavailable(_)));
}

#[test]
fn openai_requires_api_key() {
    let config = LlmConfig {
        provider: "openai".to_string(),
        api_key_env: "INTAKE_TEST_MISSING_API_KEY".to_string(),
        ..LlmConfig::default()
    };
    let err = OpenAiCompatible::from_config(&config).expect_err("missing key");
    assert!(err.to_string().contains("INTAKE_TEST_MISSING_API_KEY"));
}

#[test]
fn openai_request_body_prepends_system_prompt() {
    let client = OpenAiCompatible {
        client: reqwest::Client::new(),
        base_url: "http://localhost".to_string(),
        api_key: "test".to_string(),
        model: "big".to_string(),
        small_model: "small".to_string(),
        max_tokens: 256,
    };
    let request = GenerationRequest::new("be brief", vec![ChatMessage::user("hi")]).small();

    let body = client.build_request_body(&request);
    assert_eq!(body["model"], "small");
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "be brief");
    assert_eq!(body["messages"][1]["role"], "user");
}
