use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::base::{Provider, ProviderCompleteResponse, Usage};
use super::errors::ProviderError;
use crate::message::Message;
use crate::model::ModelConfig;

/// A prompt as the mock provider received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPrompt {
    pub system: String,
    pub messages: Vec<Message>,
}

impl RecordedPrompt {
    /// Text of the last message, usually the user prompt
    pub fn last_text(&self) -> &str {
        self.messages.last().map(Message::as_text).unwrap_or_default()
    }
}

/// A provider that replays scripted responses in order, for tests and
/// offline runs. Once the script is exhausted it answers with empty text.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<String, ProviderError>>>>,
    prompts: Arc<Mutex<Vec<RecordedPrompt>>>,
    model_config: ModelConfig,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of text responses
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(|r| Ok(r.into())).collect(),
            )),
            prompts: Arc::new(Mutex::new(Vec::new())),
            model_config: ModelConfig::new("mock".to_string()),
        }
    }

    /// Queue a failure after the responses already scripted
    pub fn then_error(self, error: ProviderError) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(Err(error));
        }
        self
    }

    /// Everything this provider has been asked so far
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn get_model_config(&self) -> ModelConfig {
        self.model_config.clone()
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
    ) -> Result<ProviderCompleteResponse, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(RecordedPrompt {
                system: system.to_string(),
                messages: messages.to_vec(),
            });
        }

        let next = {
            let mut responses = self.responses.lock().map_err(|_| {
                ProviderError::RequestFailed("mock provider state poisoned".to_string())
            })?;
            if responses.is_empty() {
                Ok(String::new())
            } else {
                responses.remove(0)
            }
        };

        let usage = Usage::new(Some(1), Some(1), Some(2));
        next.map(|text| {
            ProviderCompleteResponse::new(
                Message::assistant().with_text(text),
                "mock".to_string(),
                usage,
            )
        })
    }
}
