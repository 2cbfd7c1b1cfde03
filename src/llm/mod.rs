pub mod agent;
pub mod chain;
pub mod models;

use async_trait::async_trait;

use crate::error::PadResult;

pub use agent::{AgentAnswer, AgentStep, ChatMessage, Role, SqlAgent, DEFAULT_AGENT_STEPS};
pub use chain::TextToSqlChain;
pub use models::{BackendKind, ModelBackend, ModelEntry, ModelRegistry};

/// A text-generation service that turns a prompt into a completion
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate a completion for `prompt`, stopping at any of `stop`
    async fn complete(&self, prompt: &str, stop: &[&str]) -> PadResult<String>;

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays canned replies and records the prompts it saw
    pub struct ScriptedBackend {
        name: String,
        replies: Mutex<VecDeque<String>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub fn new(name: &str, replies: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, prompt: &str, _stop: &[&str]) -> PadResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| crate::error::PadError::generation_error("script exhausted"))
        }

        fn model_name(&self) -> &str {
            &self.name
        }
    }
}
