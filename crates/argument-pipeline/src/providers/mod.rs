//! Collaborator contracts: model calls, embeddings and web search.
//!
//! The pipeline only talks to the outside world through these traits.
//! `openai` and `brave` hold the HTTP implementations; tests script their
//! own.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{EmbedError, ModelCallError, SearchError};

pub mod brave;
pub mod openai;

pub use brave::BraveSearch;
pub use openai::{OpenAiCompatClient, OpenAiCompatEmbedder};

/// Upper bound on results per search request.
pub const MAX_SEARCH_RESULTS: usize = 20;

/// Per-call budget taken from the model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub timeout: Duration,
    pub max_tokens: u32,
}

/// Text generation against a named model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<String, ModelCallError>;
}

/// Text embedding for semantic dedup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    /// `[title](url): snippet`, the form replayed to the evidence model.
    pub fn to_markdown(&self) -> String {
        format!("[{}]({}): {}", self.title, self.url, self.snippet)
    }
}

/// Web search. Implementations clamp `count` to [`MAX_SEARCH_RESULTS`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// A search backend that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSearch;

#[async_trait]
impl WebSearch for NoSearch {
    async fn search(&self, _query: &str, _count: usize) -> Result<Vec<SearchResult>, SearchError> {
        Err(SearchError::NotConfigured)
    }
}
