//! Ollama provider implementation.
//!
//! Talks to a locally running Ollama server:
//! - `GET /api/tags`: health probe and installed-model listing
//! - `POST /api/chat`: chat completions, blocking or NDJSON streaming
//!
//! Each call carries its own timeout so that a short health probe and a
//! long generation can share one connection pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use zema_config::LlmConfig;
use zema_core::error::ProviderError;
use zema_core::message::{Message, Role};
use zema_core::provider::*;

use crate::ndjson;

/// Upper bound on establishing a connection, whatever the per-call timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A provider backed by a local Ollama server.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    health_timeout: Duration,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl OllamaProvider {
    /// Create a provider for the server at `base_url` with default timeouts
    /// (2s health probe, 60s blocking request, 120s stream).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            health_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
        }
    }

    /// Create a provider from the `[llm]` config section.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.base_url).with_timeouts(
            config.health_timeout(),
            config.request_timeout(),
            config.stream_timeout(),
        )
    }

    /// Override the per-call timeouts.
    pub fn with_timeouts(mut self, health: Duration, request: Duration, stream: Duration) -> Self {
        self.health_timeout = health;
        self.request_timeout = request;
        self.stream_timeout = stream;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the `/api/chat` request body.
    fn chat_body(request: &ProviderRequest, stream: bool) -> ApiChatRequest<'_> {
        ApiChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
            options: ApiOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    /// Send a chat request and check the status line.
    async fn post_chat(
        &self,
        request: &ProviderRequest,
        stream: bool,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let timeout = if stream { self.stream_timeout } else { self.request_timeout };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream,
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&Self::chat_body(request, stream))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model.clone()));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: api_error_message(&error_body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let response = self.post_chat(&request, false).await?;

        let body = response.text().await.map_err(transport_error)?;
        parse_chat_response(&body, &request.model)
    }

    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkStream, ProviderError> {
        let response = self.post_chat(&request, true).await?;
        Ok(ndjson::decode_chunks(Box::pin(response.bytes_stream())))
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: "failed to list models".into(),
            });
        }

        let tags: ApiTagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse model list: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }
}

/// Map a reqwest failure onto the provider taxonomy.
fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else if e.is_decode() {
        ProviderError::MalformedResponse(e.to_string())
    } else {
        ProviderError::ServiceUnavailable(e.to_string())
    }
}

/// Pull the `error` field out of an Ollama error body, if there is one.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string())
}

/// Parse a non-streaming `/api/chat` body.
fn parse_chat_response(
    body: &str,
    requested_model: &str,
) -> std::result::Result<ProviderResponse, ProviderError> {
    let api_response: ApiChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

    if let Some(error) = api_response.error {
        return Err(ProviderError::ApiError {
            status_code: 200,
            message: error,
        });
    }

    let message = api_response
        .message
        .ok_or_else(|| ProviderError::MalformedResponse("No message in response".into()))?;

    let usage = match (api_response.prompt_eval_count, api_response.eval_count) {
        (Some(prompt), Some(completion)) => Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt.saturating_add(completion),
        }),
        _ => None,
    };

    let model = api_response
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| requested_model.to_string());

    Ok(ProviderResponse {
        message: Message {
            role: Role::Assistant,
            content: message.content,
        },
        usage,
        model,
    })
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiTagsResponse {
    #[serde(default)]
    models: Vec<ApiModelTag>,
}

#[derive(Debug, Deserialize)]
struct ApiModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}
