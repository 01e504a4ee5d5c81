pub mod base;
pub mod embeddings;
pub mod errors;
pub mod mock;
pub mod openai;
pub mod utils;

#[cfg(test)]
pub(crate) mod mock_server;

pub use base::{Provider, ProviderCompleteResponse, ProviderExtractResponse, Usage};
pub use embeddings::{Embedder, OpenAiEmbedder};
pub use errors::ProviderError;
pub use mock::MockProvider;
pub use openai::{OpenAiProvider, OpenAiProviderConfig};
