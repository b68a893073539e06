//! OpenAI-compatible chat completion and embedding clients.
//!
//! Works against Ollama's `/v1` surface, llama.cpp server and vLLM alike.
//! Timeouts are enforced per request from the model table, not on the
//! shared `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, GenerateOptions, ModelClient};
use crate::config::EndpointConfig;
use crate::errors::{EmbedError, ModelCallError};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Reasoning models put their chain of thought here and sometimes leave
    /// `content` empty.
    reasoning_content: Option<String>,
}

/// Chat completions client (`POST {model_url}/chat/completions`).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ModelCallError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelCallError::Transport {
                model: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, ModelCallError> {
        Self::new(config.model_url.clone(), config.api_key.clone())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<String, ModelCallError> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_tokens,
            stream: false,
        };

        let mut builder = self
            .http
            .post(self.completions_url())
            .timeout(options.timeout)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(model, options.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelCallError::Transport {
                model: model.to_string(),
                message: format!("HTTP {}: {}", status, truncate(&body, 200)),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| transport_error(model, options.timeout, e))?;

        let message = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ModelCallError::InvalidResponse {
                model: model.to_string(),
                message: "no choices in response".into(),
            })?;

        let content = message
            .content
            .filter(|c| !c.trim().is_empty())
            .or(message.reasoning_content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelCallError::InvalidResponse {
                model: model.to_string(),
                message: "empty completion".into(),
            });
        }

        debug!(model, chars = content.len(), "completion received");
        Ok(content)
    }
}

fn transport_error(model: &str, timeout: Duration, err: reqwest::Error) -> ModelCallError {
    if err.is_timeout() {
        ModelCallError::Timeout {
            model: model.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_decode() {
        ModelCallError::InvalidResponse {
            model: model.to_string(),
            message: err.to_string(),
        }
    } else {
        ModelCallError::Transport {
            model: model.to_string(),
            message: err.to_string(),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

/// Embeddings client (`POST {embed_url}/embeddings`).
#[derive(Debug, Clone)]
pub struct OpenAiCompatEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, EmbedError> {
        Self::new(
            config.embed_url.clone(),
            config.embed_model.clone(),
            config.api_key.clone(),
            config.http_timeout,
        )
    }
}

#[async_trait]
impl Embedder for OpenAiCompatEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let mut builder = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EmbedError::Transport(format!("HTTP {}", response.status())));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::InvalidResponse("no embedding in response".into()))?;
        if vector.is_empty() {
            return Err(EmbedError::InvalidResponse("empty embedding".into()));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "qwen2.5:latest",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            max_tokens: 1000,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen2.5:latest");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_chat_response_decodes_reasoning_field() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null,"reasoning_content":"thinking"}}]}"#,
        )
        .unwrap();
        let message = &chat.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.reasoning_content.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_embedding_response_decodes() {
        let body: EmbeddingResponse =
            serde_json::from_str(r#"{"object":"list","data":[{"index":0,"embedding":[0.1,0.2]}]}"#)
                .unwrap();
        assert_eq!(body.data[0].embedding, vec![0.1, 0.2]);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAiCompatClient::new("http://localhost:11434/v1/", None).unwrap();
        assert_eq!(
            client.completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = OpenAiCompatClient::new("http://127.0.0.1:1", None).unwrap();
        let err = client
            .generate(
                "qwen2.5:latest",
                "hi",
                GenerateOptions {
                    timeout: Duration::from_secs(2),
                    max_tokens: 10,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModelCallError::Transport { .. } | ModelCallError::Timeout { .. }
        ));
        assert_eq!(err.model(), "qwen2.5:latest");
    }
}
