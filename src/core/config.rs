use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PadError, PadResult};
use crate::llm::agent::DEFAULT_AGENT_STEPS;
use crate::llm::models::ModelEntry;

/// Rows fetched per query unless configured otherwise
pub const DEFAULT_ROW_LIMIT: usize = 25;

/// Global configuration for padchat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Query pipeline configuration
    pub query: QueryConfig,
    /// Language model configuration
    pub llm: LlmConfig,
    /// Map rendering configuration
    pub map: MapConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB file to query
    pub path: PathBuf,
    /// Open the file read-only
    pub read_only: bool,
    /// Load the spatial extension after connecting
    pub load_spatial: bool,
    /// Run `INSTALL spatial` before loading it (needs network on first use)
    pub install_spatial: bool,
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum rows fetched and rendered per query
    pub row_limit: usize,
    /// Number of cached results (0 disables caching)
    pub cache_capacity: usize,
    /// Example rows per table shown to the language model
    pub sample_rows: usize,
    /// Row limit the language model is asked to apply
    pub top_k: usize,
    /// Most queries the agent may run for one question
    pub agent_max_steps: usize,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Label selected at startup
    pub default_model: String,
    /// Base URL of the local Ollama server
    pub ollama_url: String,
    /// API key for remote models (falls back to OPENAI_API_KEY)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Max tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra or overriding model entries
    pub models: Vec<ModelEntry>,
}

/// Map rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    /// Where the HTML map is written
    pub output: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pad.duckdb"),
            read_only: true,
            load_spatial: true,
            install_spatial: false,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            cache_capacity: 64,
            sample_rows: 3,
            top_k: 5,
            agent_max_steps: DEFAULT_AGENT_STEPS,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: "duckdb-nsql".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            api_key: None,
            max_tokens: Some(512),
            models: Vec::new(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 35.0,
            center_lon: -100.0,
            zoom: 4,
            output: PathBuf::from("map.html"),
        }
    }
}

impl PadConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> PadResult<Self> {
        let config: PadConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as pretty TOML
    pub fn to_toml(&self) -> PadResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> PadResult<()> {
        if self.query.row_limit == 0 {
            return Err(PadError::config_error("query.row_limit must be at least 1"));
        }
        if self.query.agent_max_steps == 0 {
            return Err(PadError::config_error("query.agent_max_steps must be at least 1"));
        }
        if self.llm.default_model.trim().is_empty() {
            return Err(PadError::config_error("llm.default_model must not be empty"));
        }
        if self.map.zoom > 20 {
            return Err(PadError::config_error(format!(
                "map.zoom must be between 0 and 20, got {}",
                self.map.zoom
            )));
        }
        Ok(())
    }

    /// Load configuration from an explicit path, the user config directory, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                let config = Self::from_toml(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))?;
                Ok(config)
            }
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the configuration to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        info!("Saving configuration to {}", path.display());
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}

/// `<config dir>/padchat/config.toml`, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("padchat").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::BackendKind;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PadConfig::default();
        assert_eq!(config.query.row_limit, 25);
        assert_eq!(config.database.path, PathBuf::from("pad.duckdb"));
        assert!(config.database.read_only);
        assert_eq!(config.llm.default_model, "duckdb-nsql");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PadConfig::from_toml(
            r#"
            [query]
            row_limit = 10

            [[llm.models]]
            label = "mistral"
            kind = "local"
            model = "mistral:7b"
            "#,
        )
        .unwrap();

        assert_eq!(config.query.row_limit, 10);
        assert_eq!(config.query.cache_capacity, 64);
        assert_eq!(config.map.zoom, 4);
        assert_eq!(config.llm.models.len(), 1);
        assert_eq!(config.llm.models[0].backend.kind, BackendKind::Local);
        assert_eq!(config.llm.models[0].backend.model, "mistral:7b");
    }

    #[test]
    fn test_zero_row_limit_rejected() {
        let err = PadConfig::from_toml("[query]\nrow_limit = 0\n").unwrap_err();
        assert!(matches!(err, PadError::Config { .. }));
    }

    #[test]
    fn test_agent_steps() {
        assert_eq!(PadConfig::default().query.agent_max_steps, 5);
        let config = PadConfig::from_toml("[query]\nagent_max_steps = 8\n").unwrap();
        assert_eq!(config.query.agent_max_steps, 8);
        assert!(PadConfig::from_toml("[query]\nagent_max_steps = 0\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PadConfig::default();
        config.database.path = PathBuf::from("/data/pad.duckdb");
        config.map.zoom = 6;
        config.save(&path).unwrap();

        let loaded = PadConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.database.path, PathBuf::from("/data/pad.duckdb"));
        assert_eq!(loaded.map.zoom, 6);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(PadConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
