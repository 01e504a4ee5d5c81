use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_INPUT_TOKENS: i32 = 12;
pub const TEST_OUTPUT_TOKENS: i32 = 15;
pub const TEST_TOTAL_TOKENS: i32 = 27;

pub async fn setup_mock_server(path_url: &str, response_body: Value) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(path_url))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;
    mock_server
}

pub async fn setup_mock_server_with_response_code(
    path_url: &str,
    response_code: u16,
) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(path_url))
        .respond_with(ResponseTemplate::new(response_code))
        .mount(&mock_server)
        .await;
    mock_server
}

pub fn create_mock_open_ai_response(model_name: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": TEST_INPUT_TOKENS,
            "completion_tokens": TEST_OUTPUT_TOKENS,
            "total_tokens": TEST_TOTAL_TOKENS
        },
        "model": model_name
    })
}

pub fn create_mock_embedding_response(vectors: &[Vec<f32>]) -> Value {
    let data: Vec<Value> = vectors
        .iter()
        .enumerate()
        .map(|(index, v)| json!({"object": "embedding", "index": index, "embedding": v}))
        .collect();
    json!({"object": "list", "data": data, "model": "text-embedding-3-small"})
}
