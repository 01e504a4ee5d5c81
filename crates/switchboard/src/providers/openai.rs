use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::{Provider, ProviderCompleteResponse, ProviderExtractResponse, Usage};
use super::errors::ProviderError;
use super::utils::{
    emit_debug_trace, get_message_text, get_model, get_usage, handle_response, parse_json_text,
};
use crate::message::Message;
use crate::model::ModelConfig;

fn default_timeout() -> u64 {
    600
}
fn default_base_path() -> String {
    "v1/chat/completions".to_string()
}
fn default_host() -> String {
    "https://api.openai.com".to_string()
}

/// Connection settings for any OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl OpenAiProviderConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            host: default_host(),
            base_path: default_base_path(),
            api_key,
            timeout: default_timeout(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

#[derive(Debug, Serialize)]
pub struct OpenAiProvider {
    #[serde(skip)]
    client: Client,
    config: OpenAiProviderConfig,
    model: ModelConfig,
}

impl OpenAiProvider {
    pub fn from_config(
        config: OpenAiProviderConfig,
        model: ModelConfig,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            config,
            model,
        })
    }

    fn create_request(&self, system: &str, messages: &[Message]) -> Value {
        let mut chat = vec![json!({"role": "system", "content": system})];
        chat.extend(
            messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        );

        let mut payload = json!({
            "model": self.model.model_name,
            "messages": chat,
            "temperature": self.model.temperature(),
        });
        if let Some(max_tokens) = self.model.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }

    async fn post(&self, payload: &Value) -> Result<Value, ProviderError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            ProviderError::Authentication("No API key configured (set OPENAI_API_KEY)".to_string())
        })?;
        let base_url = url::Url::parse(&self.config.host)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid base URL: {e}")))?;
        let url = base_url.join(&self.config.base_path).map_err(|e| {
            ProviderError::RequestFailed(format!("Failed to construct endpoint URL: {e}"))
        })?;

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(payload)
            .send()
            .await?;

        let response = handle_response(payload, response).await?;
        if let Some(error) = response.get("error") {
            return Err(ProviderError::RequestFailed(format!(
                "Provider API error: {}",
                error
            )));
        }
        Ok(response)
    }

    fn usage_of(response: &Value) -> Result<Usage, ProviderError> {
        match get_usage(response) {
            Ok(usage) => Ok(usage),
            Err(ProviderError::UsageError(e)) => {
                tracing::debug!("Failed to get usage data: {}", e);
                Ok(Usage::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn get_model_config(&self) -> ModelConfig {
        self.model.clone()
    }

    #[tracing::instrument(
        skip(self, system, messages),
        fields(model = %self.model.model_name)
    )]
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<ProviderCompleteResponse, ProviderError> {
        let payload = self.create_request(system, messages);
        let response = self.post(&payload).await?;

        let text = get_message_text(&response)?;
        let usage = Self::usage_of(&response)?;
        let model = get_model(&response);
        emit_debug_trace(&self.model, &payload, &response, &usage);
        Ok(ProviderCompleteResponse::new(
            Message::assistant().with_text(text),
            model,
            usage,
        ))
    }

    #[tracing::instrument(
        skip(self, system, messages),
        fields(model = %self.model.model_name)
    )]
    async fn complete_json(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<ProviderExtractResponse, ProviderError> {
        let mut payload = self.create_request(system, messages);
        payload["response_format"] = json!({"type": "json_object"});
        let response = self.post(&payload).await?;

        let data = parse_json_text(&get_message_text(&response)?)?;
        let usage = Self::usage_of(&response)?;
        let model = get_model(&response);
        emit_debug_trace(&self.model, &payload, &response, &usage);
        Ok(ProviderExtractResponse::new(data, model, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock_server::{
        create_mock_open_ai_response, setup_mock_server, setup_mock_server_with_response_code,
        TEST_INPUT_TOKENS, TEST_OUTPUT_TOKENS, TEST_TOTAL_TOKENS,
    };
    use serde_json::json;

    fn provider_for(host: String) -> OpenAiProvider {
        let config = OpenAiProviderConfig::new(Some("test_api_key".to_string())).with_host(host);
        OpenAiProvider::from_config(config, ModelConfig::new("gpt-4o".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_complete_basic() -> anyhow::Result<()> {
        let body = create_mock_open_ai_response("gpt-4o", "Paris is the capital of France.");
        let server = setup_mock_server("/v1/chat/completions", body).await;
        let provider = provider_for(server.uri());

        let response = provider
            .complete(
                "You are a helpful assistant.",
                &[Message::user().with_text("Capital of France?")],
            )
            .await?;

        assert_eq!(response.message.as_text(), "Paris is the capital of France.");
        assert_eq!(response.model, "gpt-4o");
        assert_eq!(response.usage.input_tokens, Some(TEST_INPUT_TOKENS));
        assert_eq!(response.usage.output_tokens, Some(TEST_OUTPUT_TOKENS));
        assert_eq!(response.usage.total_tokens, Some(TEST_TOTAL_TOKENS));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][1]["content"], "Capital of France?");
        assert_eq!(sent["temperature"], json!(0.0));
        assert!(sent.get("response_format").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_json_requests_json_mode() -> anyhow::Result<()> {
        let body = create_mock_open_ai_response("gpt-4o", "```json\n{\"steps\": []}\n```");
        let server = setup_mock_server("/v1/chat/completions", body).await;
        let provider = provider_for(server.uri());

        let response = provider
            .complete_json("Only JSON.", &[Message::user().with_text("plan")])
            .await?;
        assert_eq!(response.data, json!({"steps": []}));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(sent["response_format"]["type"], "json_object");
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_json_rejects_prose() {
        let body = create_mock_open_ai_response("gpt-4o", "Sure! Here is a plan.");
        let server = setup_mock_server("/v1/chat/completions", body).await;
        let provider = provider_for(server.uri());

        let result = provider
            .complete_json("Only JSON.", &[Message::user().with_text("plan")])
            .await;
        assert!(matches!(result, Err(ProviderError::ResponseParseError(_))));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let server = setup_mock_server_with_response_code("/v1/chat/completions", 401).await;
        let result = provider_for(server.uri())
            .complete("system", &[Message::user().with_text("hi")])
            .await;
        assert!(matches!(result, Err(ProviderError::Authentication(_))));

        let server = setup_mock_server_with_response_code("/v1/chat/completions", 429).await;
        let result = provider_for(server.uri())
            .complete("system", &[Message::user().with_text("hi")])
            .await;
        assert!(matches!(result, Err(ProviderError::RateLimitExceeded(_))));

        let server = setup_mock_server_with_response_code("/v1/chat/completions", 503).await;
        let result = provider_for(server.uri())
            .complete("system", &[Message::user().with_text("hi")])
            .await;
        assert!(matches!(result, Err(ProviderError::ServerError(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let config = OpenAiProviderConfig::new(None).with_host("http://127.0.0.1:9");
        let provider =
            OpenAiProvider::from_config(config, ModelConfig::new("gpt-4o".to_string())).unwrap();
        let result = provider
            .complete("system", &[Message::user().with_text("hi")])
            .await;
        assert!(matches!(result, Err(ProviderError::Authentication(_))));
    }

    #[test]
    fn test_create_request_includes_max_tokens() {
        let model = ModelConfig::new("m".to_string()).with_max_tokens(Some(64));
        let provider =
            OpenAiProvider::from_config(OpenAiProviderConfig::new(None), model).unwrap();
        let payload = provider.create_request("sys", &[Message::user().with_text("q")]);
        assert_eq!(payload["max_tokens"], 64);
        assert_eq!(payload["model"], "m");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_config_does_not_serialize_api_key() {
        let config = OpenAiProviderConfig::new(Some("secret".to_string()));
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("api_key").is_none());
    }
}
