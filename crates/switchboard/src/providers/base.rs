use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::ProviderError;
use super::utils::parse_json_text;
use crate::message::Message;
use crate::model::ModelConfig;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderCompleteResponse {
    pub message: Message,
    pub model: String,
    pub usage: Usage,
}

impl ProviderCompleteResponse {
    pub fn new(message: Message, model: String, usage: Usage) -> Self {
        Self {
            message,
            model,
            usage,
        }
    }
}

/// Response from a JSON-mode completion
#[derive(Debug, Clone)]
pub struct ProviderExtractResponse {
    /// The parsed JSON value
    pub data: serde_json::Value,
    /// Which model produced it
    pub model: String,
    pub usage: Usage,
}

impl ProviderExtractResponse {
    pub fn new(data: serde_json::Value, model: String, usage: Usage) -> Self {
        Self { data, model, usage }
    }
}

/// Base trait for chat model providers
#[async_trait]
pub trait Provider: Send + Sync {
    fn get_model_config(&self) -> ModelConfig;

    /// Generate the next assistant message
    ///
    /// # Arguments
    /// * `system` - The system prompt that guides the model's behavior
    /// * `messages` - The conversation so far, oldest first
    ///
    /// # Errors
    /// Any [`ProviderError`]; callers decide whether a failure is fatal.
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<ProviderCompleteResponse, ProviderError>;

    /// Generate a reply that must be a single JSON value.
    ///
    /// The default implementation calls [`Provider::complete`] and parses the
    /// text, tolerating Markdown code fences around it. Providers with a
    /// native JSON mode override this.
    async fn complete_json(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<ProviderExtractResponse, ProviderError> {
        let ProviderCompleteResponse {
            message,
            model,
            usage,
        } = self.complete(system, messages).await?;
        let data = parse_json_text(message.as_text())?;
        Ok(ProviderExtractResponse::new(data, model, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_provider_complete_response_creation() {
        let message = Message::assistant().with_text("Hello, world!");
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let response =
            ProviderCompleteResponse::new(message.clone(), "test_model".to_string(), usage.clone());

        assert_eq!(response.message, message);
        assert_eq!(response.model, "test_model");
        assert_eq!(response.usage, usage);
    }
}
