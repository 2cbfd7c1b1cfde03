use async_openai::{
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs, Stop},
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::LlmConfig;
use crate::error::{PadError, PadResult};
use crate::llm::{BackendKind, CompletionBackend, ModelBackend};

/// Key Ollama expects on its OpenAI-compatible endpoint (any value works)
const OLLAMA_API_KEY: &str = "ollama";

/// OpenAI client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// API Key (if not provided, will use OPENAI_API_KEY env var)
    pub api_key: Option<String>,
    /// Base URL override, used to reach Ollama
    pub api_base: Option<String>,
    /// Model to use
    pub model: String,
    /// Max tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature
    pub temperature: Option<f32>,
}

impl OpenAIConfig {
    /// Client configuration for a registry backend.
    ///
    /// Local backends point at `<ollama_url>/v1`. Remote backends need an API
    /// key from the config file or `OPENAI_API_KEY`.
    pub fn for_backend(backend: &ModelBackend, llm: &LlmConfig) -> PadResult<Self> {
        let (api_key, api_base) = match backend.kind {
            BackendKind::Local => (
                Some(OLLAMA_API_KEY.to_string()),
                Some(format!("{}/v1", llm.ollama_url.trim_end_matches('/'))),
            ),
            BackendKind::Remote => {
                let key = llm
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        PadError::config_error(format!(
                            "model '{}' needs OPENAI_API_KEY to be set",
                            backend.model
                        ))
                    })?;
                (Some(key), None)
            }
        };

        Ok(Self {
            api_key,
            api_base,
            model: backend.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: Some(backend.temperature),
        })
    }
}

/// OpenAI client wrapper
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client<async_openai::config::OpenAIConfig>,
    config: OpenAIConfig,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAIConfig) -> Self {
        let mut openai_config = async_openai::config::OpenAIConfig::new();

        if let Some(api_key) = &config.api_key {
            openai_config = openai_config.with_api_key(api_key);
        }

        if let Some(api_base) = &config.api_base {
            openai_config = openai_config.with_api_base(api_base);
        }

        let client = Client::with_config(openai_config);

        Self { client, config }
    }

    /// Execute a prompt against the chat completions API
    pub async fn execute_prompt(&self, prompt: &str, stop: &[&str]) -> PadResult<String> {
        debug!("Executing prompt against {}: {}", self.config.model, prompt);

        let message = ChatCompletionRequestMessage::User(
            async_openai::types::ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    prompt.to_string(),
                ),
                name: None,
            },
        );

        let mut request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(vec![message])
            .build()
            .map_err(|e| PadError::generation_error(e.to_string()))?;

        if let Some(max_tokens) = self.config.max_tokens {
            #[allow(deprecated)]
            {
                request.max_tokens = Some(max_tokens);
            }
        }

        if let Some(temp) = self.config.temperature {
            request.temperature = Some(temp);
        }

        if !stop.is_empty() {
            request.stop = Some(Stop::StringArray(
                stop.iter().map(|s| s.to_string()).collect(),
            ));
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PadError::generation_error(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PadError::generation_error("no response from model"))
    }
}

#[async_trait]
impl CompletionBackend for OpenAIClient {
    async fn complete(&self, prompt: &str, stop: &[&str]) -> PadResult<String> {
        self.execute_prompt(prompt, stop).await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_backend_uses_ollama() {
        let llm = LlmConfig {
            ollama_url: "http://gpu-box:11434/".to_string(),
            ..Default::default()
        };
        let config = OpenAIConfig::for_backend(&ModelBackend::local("sqlcoder"), &llm).unwrap();

        assert_eq!(config.api_base.as_deref(), Some("http://gpu-box:11434/v1"));
        assert_eq!(config.api_key.as_deref(), Some("ollama"));
        assert_eq!(config.model, "sqlcoder");
        assert_eq!(config.temperature, Some(0.0));
    }

    #[test]
    fn test_remote_backend_prefers_configured_key() {
        let llm = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let config = OpenAIConfig::for_backend(&ModelBackend::remote("gpt-4"), &llm).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.api_base, None);

        let client = OpenAIClient::new(config);
        assert_eq!(client.model_name(), "gpt-4");
    }

    #[tokio::test]
    async fn test_openai_client() {
        // Skip if no API key is set
        if std::env::var("OPENAI_API_KEY").is_err() {
            println!("Skipping OpenAI test: No API key");
            return;
        }

        let config =
            OpenAIConfig::for_backend(&ModelBackend::remote("gpt-3.5-turbo"), &LlmConfig::default())
                .unwrap();
        let client = OpenAIClient::new(config);
        let response = client.execute_prompt("Say hello", &[]).await.unwrap();

        assert!(!response.is_empty());
    }
}
