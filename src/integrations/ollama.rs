use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{PadError, PadResult};

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Names of the models pulled into the Ollama server at `base_url`
pub async fn list_local_models(base_url: &str) -> PadResult<Vec<String>> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    debug!("Listing Ollama models at {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| PadError::config_error(e.to_string()))?;

    let tags: TagsResponse = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| PadError::config_error(format!("Ollama is not reachable at {}: {}", base_url, e)))?
        .json()
        .await
        .map_err(|e| PadError::parse_error(e.to_string()))?;

    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

/// Whether `model` is among `available`, accepting Ollama's implicit `:latest` tag
pub fn is_pulled(model: &str, available: &[String]) -> bool {
    available.iter().any(|name| {
        name == model || (!model.contains(':') && name.strip_suffix(":latest") == Some(model))
    })
}
