use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PadError, PadResult};

/// Where a model runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Served by the local Ollama endpoint
    Local,
    /// OpenAI API, needs an API key
    Remote,
}

/// A configured generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBackend {
    pub kind: BackendKind,
    /// Model name as the service knows it
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
}

impl ModelBackend {
    pub fn local(model: &str) -> Self {
        Self {
            kind: BackendKind::Local,
            model: model.to_string(),
            temperature: 0.0,
        }
    }

    pub fn remote(model: &str) -> Self {
        Self {
            kind: BackendKind::Remote,
            model: model.to_string(),
            temperature: 0.0,
        }
    }
}

/// A labelled backend as it appears in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub label: String,
    #[serde(flatten)]
    pub backend: ModelBackend,
}

/// Ordered mapping from user-facing label to backend
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let local = [
            "duckdb-nsql",
            "sqlcoder",
            "zephyr",
            "gemma:7b",
            "codegemma",
            "llama2",
        ];
        let mut entries: Vec<ModelEntry> = local
            .iter()
            .map(|name| ModelEntry {
                label: name.to_string(),
                backend: ModelBackend::local(name),
            })
            .collect();
        entries.push(ModelEntry {
            label: "chatgpt3.5".to_string(),
            backend: ModelBackend::remote("gpt-3.5-turbo"),
        });
        entries.push(ModelEntry {
            label: "chatgpt4".to_string(),
            backend: ModelBackend::remote("gpt-4"),
        });
        Self { entries }
    }
}

impl ModelRegistry {
    /// Built-in models, with `overrides` replacing same-label entries or appended
    pub fn with_overrides(overrides: &[ModelEntry]) -> Self {
        let mut registry = Self::default();
        for entry in overrides {
            registry.upsert(entry.clone());
        }
        registry
    }

    pub fn upsert(&mut self, entry: ModelEntry) {
        match self.entries.iter_mut().find(|e| e.label == entry.label) {
            Some(existing) => {
                debug!("Overriding model '{}'", entry.label);
                *existing = entry;
            }
            None => self.entries.push(entry),
        }
    }

    /// Look up the backend behind `label`
    pub fn select(&self, label: &str) -> PadResult<&ModelBackend> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| &e.backend)
            .ok_or_else(|| PadError::unknown_model(label, self.labels()))
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}
