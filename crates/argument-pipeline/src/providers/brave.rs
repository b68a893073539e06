//! Brave Search web client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{SearchResult, WebSearch, MAX_SEARCH_RESULTS};
use crate::config::EndpointConfig;
use crate::errors::SearchError;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
}

impl BraveResponse {
    /// Results missing a title or URL are dropped.
    fn into_results(self) -> Vec<SearchResult> {
        self.web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| match (r.title, r.url) {
                (Some(title), Some(url)) if !title.is_empty() && !url.is_empty() => {
                    Some(SearchResult {
                        title,
                        url,
                        snippet: r.description.unwrap_or_default(),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct BraveSearch {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl BraveSearch {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: BRAVE_SEARCH_URL.to_string(),
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, SearchError> {
        Self::new(config.brave_api_key.clone(), config.http_timeout)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        let key = self.api_key.as_deref().ok_or(SearchError::NotConfigured)?;
        let count = count.clamp(1, MAX_SEARCH_RESULTS);

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query.to_string()), ("count", count.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Http(format!("HTTP {}", response.status())));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        let mut results = body.into_results();
        results.truncate(count);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_without_title_or_url_dropped() {
        let body: BraveResponse = serde_json::from_str(
            r#"{"web":{"results":[
                {"title":"Study","url":"https://example.org/a","description":"finding"},
                {"title":"","url":"https://example.org/b"},
                {"url":"https://example.org/c"},
                {"title":"No snippet","url":"https://example.org/d"}
            ]}}"#,
        )
        .unwrap();
        let results = body.into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "finding");
        assert_eq!(results[1].url, "https://example.org/d");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_missing_web_section_is_empty() {
        let body: BraveResponse = serde_json::from_str(r#"{"type":"search"}"#).unwrap();
        assert!(body.into_results().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let search = BraveSearch::new(Some("  ".into()), Duration::from_secs(1)).unwrap();
        assert!(!search.is_configured());
        assert_eq!(
            search.search("carbon tax", 3).await.unwrap_err(),
            SearchError::NotConfigured
        );
    }
}
