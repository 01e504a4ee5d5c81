use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::errors::ProviderError;
use super::openai::OpenAiProviderConfig;
use super::utils::handle_response;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Turns text into dense vectors for similarity search
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_single(&self, text: String) -> Result<Vec<f32>, ProviderError> {
        self.embed(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseParseError("No embedding returned".to_string()))
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
/// `config.base_path` points at the embeddings route rather than chat.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiProviderConfig,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiProviderConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            config,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let token = self.config.api_key.as_deref().ok_or_else(|| {
            ProviderError::Authentication(
                "No API key found for embeddings. Please set OPENAI_API_KEY".to_string(),
            )
        })?;
        let expected = texts.len();
        let request = EmbeddingRequest {
            input: texts,
            model: self.model.clone(),
        };
        let payload = serde_json::to_value(&request)?;

        let url = url::Url::parse(&self.config.host)
            .and_then(|base| base.join(&self.config.base_path))
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid embeddings URL: {e}")))?;
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await?;
        let body = handle_response(&payload, response).await?;

        let mut parsed: EmbeddingResponse = serde_json::from_value(body)?;
        // Servers may return the batch out of order
        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        if parsed.data.len() != expected {
            return Err(ProviderError::ResponseParseError(format!(
                "Expected {} embeddings, got {}",
                expected,
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock_server::{create_mock_embedding_response, setup_mock_server};
    use serde_json::json;

    fn embedder_for(host: String) -> OpenAiEmbedder {
        let mut config = OpenAiProviderConfig::new(Some("test_key".to_string())).with_host(host);
        config.base_path = "v1/embeddings".to_string();
        OpenAiEmbedder::new(config, DEFAULT_EMBEDDING_MODEL).unwrap()
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let body = create_mock_embedding_response(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let server = setup_mock_server("/v1/embeddings", body).await;
        let embedder = embedder_for(server.uri());

        let vectors = embedder
            .embed(vec!["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["model"], DEFAULT_EMBEDDING_MODEL);
        assert_eq!(sent["input"], json!(["first", "second"]));
    }

    #[tokio::test]
    async fn test_embed_reorders_by_index() {
        let body = json!({"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]});
        let server = setup_mock_server("/v1/embeddings", body).await;
        let vectors = embedder_for(server.uri())
            .embed(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_single_and_count_mismatch() {
        let body = create_mock_embedding_response(&[vec![0.5, 0.5]]);
        let server = setup_mock_server("/v1/embeddings", body).await;
        let embedder = embedder_for(server.uri());

        assert_eq!(
            embedder.embed_single("x".to_string()).await.unwrap(),
            vec![0.5, 0.5]
        );
        let result = embedder
            .embed(vec!["x".to_string(), "y".to_string()])
            .await;
        assert!(matches!(result, Err(ProviderError::ResponseParseError(_))));
    }

    #[tokio::test]
    async fn test_empty_input_skips_request() {
        let embedder = embedder_for("http://127.0.0.1:9".to_string());
        assert!(embedder.embed(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let config = OpenAiProviderConfig::new(None);
        let embedder = OpenAiEmbedder::new(config, DEFAULT_EMBEDDING_MODEL).unwrap();
        let result = embedder.embed(vec!["x".to_string()]).await;
        assert!(matches!(result, Err(ProviderError::Authentication(_))));
    }
}
