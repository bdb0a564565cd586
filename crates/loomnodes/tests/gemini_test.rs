use base64::{engine::general_purpose::STANDARD, Engine as _};
use loomcore::{GenerateRequest, ModelBackend, NodeError};
use loomnodes::{HttpModelBackend, NodesConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];

fn backend(server: &MockServer, media_root: &TempDir) -> HttpModelBackend {
    let mut config = NodesConfig::default()
        .with_media_root(media_root.path())
        .with_api_key("test-key");
    config.model_base_url = format!("{}/", server.uri());
    HttpModelBackend::new(&config)
}

fn request(model: &str, system_prompt: Option<&str>, images: Vec<String>) -> GenerateRequest {
    GenerateRequest {
        model: model.to_string(),
        system_prompt: system_prompt.map(str::to_string),
        user_message: "describe it".to_string(),
        images,
    }
}

fn reply(parts: &[&str]) -> Value {
    let parts: Vec<Value> = parts.iter().map(|p| json!({ "text": p })).collect();
    json!({ "candidates": [{ "content": { "role": "model", "parts": parts } }] })
}

/// Bodies of the generateContent calls the server received, in order.
async fn generate_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().ends_with(":generateContent"))
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_text_request_wire_format() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(&["Hello, ", "world"])))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server, &media)
        .generate(request("gemini-pro", Some("be brief"), vec![]))
        .await
        .unwrap();

    assert_eq!(response.text, "Hello, world");
    assert_eq!(
        generate_bodies(&server).await,
        vec![json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": "System Instruction: be brief\n\n" },
                    { "text": "describe it" }
                ]
            }]
        })]
    );
}

#[tokio::test]
async fn test_images_upgrade_model_and_sit_between_prompts() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();
    std::fs::create_dir_all(media.path().join("uploads")).unwrap();
    std::fs::write(media.path().join("uploads/a.png"), PNG_BYTES).unwrap();

    Mock::given(method("GET"))
        .and(path("/img/cat.webp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"webp-bytes".to_vec(), "image/webp; charset=binary"))
        .mount(&server)
        .await;
    // Not an image content type: the extension decides.
    Mock::given(method("GET"))
        .and(path("/img/dog.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"dog-bytes".to_vec(), "application/octet-stream"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(&["a cat and a dog"])))
        .expect(1)
        .mount(&server)
        .await;

    let images = vec![
        "/uploads/a.png".to_string(),
        format!("{}/img/cat.webp", server.uri()),
        format!("{}/img/dog.png", server.uri()),
    ];
    let response = backend(&server, &media)
        .generate(request("gemini-pro", Some("be brief"), images))
        .await
        .unwrap();
    assert_eq!(response.text, "a cat and a dog");

    let bodies = generate_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0]["contents"][0]["parts"],
        json!([
            { "text": "System Instruction: be brief\n\n" },
            { "inlineData": { "mimeType": "image/png", "data": STANDARD.encode(PNG_BYTES) } },
            { "inlineData": { "mimeType": "image/webp", "data": STANDARD.encode(b"webp-bytes") } },
            { "inlineData": { "mimeType": "image/png", "data": STANDARD.encode(b"dog-bytes") } },
            { "text": "describe it" }
        ])
    );
}

#[tokio::test]
async fn test_explicit_model_is_not_upgraded() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();
    std::fs::create_dir_all(media.path().join("uploads")).unwrap();
    std::fs::write(media.path().join("uploads/a.png"), PNG_BYTES).unwrap();

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(&["ok"])))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server, &media)
        .generate(request("gemini-1.5-pro", None, vec!["/uploads/a.png".to_string()]))
        .await
        .unwrap();
    assert_eq!(response.text, "ok");

    // No system prompt, no system part.
    let parts = &generate_bodies(&server).await[0]["contents"][0]["parts"];
    assert_eq!(parts.as_array().unwrap().len(), 2);
    assert!(parts[0].get("inlineData").is_some());
}

#[tokio::test]
async fn test_error_status_is_model_invocation_error() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let err = backend(&server, &media)
        .generate(request("gemini-pro", None, vec![]))
        .await
        .unwrap_err();

    match err {
        NodeError::ModelInvocation(message) => {
            assert!(message.contains("429"), "{}", message);
            assert!(message.contains("quota exceeded"), "{}", message);
        }
        other => panic!("expected a model invocation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_reply_is_model_invocation_error() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = backend(&server, &media)
        .generate(request("gemini-pro", None, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::ModelInvocation(ref m) if m.starts_with("Malformed response")));
}

#[tokio::test]
async fn test_reply_without_candidates_is_model_invocation_error() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = backend(&server, &media)
        .generate(request("gemini-pro", None, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::ModelInvocation(ref m) if m.contains("no candidates")));
}

#[tokio::test]
async fn test_unreachable_remote_image_stops_before_model_call() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/img/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(&["unused"])))
        .expect(0)
        .mount(&server)
        .await;

    let err = backend(&server, &media)
        .generate(request("gemini-pro", None, vec![format!("{}/img/gone.jpg", server.uri())]))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::MediaSourceNotFound(ref m) if m.contains("404")));
    assert!(generate_bodies(&server).await.is_empty());
}
