pub mod ollama;
pub mod openai;

use std::sync::Arc;

use crate::core::config::LlmConfig;
use crate::error::PadResult;
use crate::llm::{CompletionBackend, ModelBackend};

/// Builds a completion backend for a selected model
pub trait BackendFactory: Send + Sync {
    fn connect(&self, backend: &ModelBackend) -> PadResult<Arc<dyn CompletionBackend>>;
}

/// Connects every backend through the OpenAI-compatible client
pub struct OpenAIBackendFactory {
    llm: LlmConfig,
}

impl OpenAIBackendFactory {
    pub fn new(llm: LlmConfig) -> Self {
        Self { llm }
    }
}

impl BackendFactory for OpenAIBackendFactory {
    fn connect(&self, backend: &ModelBackend) -> PadResult<Arc<dyn CompletionBackend>> {
        let config = openai::OpenAIConfig::for_backend(backend, &self.llm)?;
        Ok(Arc::new(openai::OpenAIClient::new(config)))
    }
}
