use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Where the pipeline's HTTP collaborators live.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// OpenAI-compatible chat completions base URL (Ollama's `/v1`).
    pub model_url: String,
    /// OpenAI-compatible embeddings base URL.
    pub embed_url: String,
    pub embed_model: String,
    /// Bearer token for the model endpoint, if it needs one.
    pub api_key: Option<String>,
    /// Brave Search key; without it evidence grounding degrades to empty.
    pub brave_api_key: Option<String>,
    /// Per-request HTTP timeout for search and embedding calls.
    pub http_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        let model_url = std::env::var("DIALECTIC_MODEL_URL")
            .unwrap_or_else(|_| "http://localhost:11434/v1".into());
        Self {
            embed_url: std::env::var("DIALECTIC_EMBED_URL").unwrap_or_else(|_| model_url.clone()),
            embed_model: std::env::var("DIALECTIC_EMBED_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".into()),
            api_key: non_empty_env("DIALECTIC_API_KEY"),
            brave_api_key: non_empty_env("BRAVE_SEARCH_API_KEY"),
            http_timeout: Duration::from_secs(10),
            model_url,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{url}/models");
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelListEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelListEntry {
    id: String,
}

/// Names of the models an OpenAI-compatible endpoint currently serves.
pub async fn list_models(url: &str) -> Result<Vec<String>> {
    let models_url = format!("{url}/models");
    let list: ModelList = reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("Failed to reach {models_url}"))?
        .error_for_status()
        .with_context(|| format!("{models_url} returned an error status"))?
        .json()
        .await
        .context("Failed to decode model list")?;
    Ok(list.data.into_iter().map(|m| m.id).collect())
}
