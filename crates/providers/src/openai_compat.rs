//! OpenAI-compatible provider implementation.
//!
//! Speaks both shapes the OpenAI API family exposes:
//! - `/chat/completions` — messages in, first choice's message content out
//! - `/completions` — the messages flattened into one prompt, first choice's
//!   text out (legacy `text-davinci-003`)

use async_trait::async_trait;
use gridparley_core::error::ProviderError;
use gridparley_core::message::{Message, Role};
use gridparley_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::transport_error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Which OpenAI endpoint this provider targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Completions,
}

/// An OpenAI-compatible completion provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: Endpoint,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            endpoint,
            client,
        }
    }

    /// OpenAI chat completions (convenience constructor).
    pub fn openai_chat(api_key: impl Into<String>) -> Self {
        Self::new("openai-chat", DEFAULT_BASE_URL, api_key, Endpoint::Chat)
    }

    /// OpenAI legacy text completions (convenience constructor).
    pub fn openai_completions(api_key: impl Into<String>) -> Self {
        Self::new(
            "openai-completions",
            DEFAULT_BASE_URL,
            api_key,
            Endpoint::Completions,
        )
    }

    /// Convert our Message types to chat API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    /// Flatten messages into a single prompt for the completions endpoint.
    fn to_prompt(messages: &[Message]) -> String {
        messages.iter().fold(String::new(), |mut prompt, m| {
            prompt.push_str(&m.content);
            prompt.push('\n');
            prompt
        })
    }

    fn request_body(&self, request: &ProviderRequest) -> (String, serde_json::Value) {
        let (path, mut body) = match self.endpoint {
            Endpoint::Chat => (
                "chat/completions",
                serde_json::json!({
                    "model": request.model,
                    "messages": Self::to_api_messages(&request.messages),
                    "temperature": request.temperature,
                }),
            ),
            Endpoint::Completions => (
                "completions",
                serde_json::json!({
                    "model": request.model,
                    "prompt": Self::to_prompt(&request.messages),
                    "temperature": request.temperature,
                }),
            ),
        };

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        (format!("{}/{}", self.base_url, path), body)
    }

    /// Extract the text payload from a decoded response body.
    fn parse_response(
        endpoint: Endpoint,
        body: serde_json::Value,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let (model, content, usage) = match endpoint {
            Endpoint::Chat => {
                let resp: ChatResponse = serde_json::from_value(body).map_err(|e| {
                    ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
                })?;
                let choice = resp.choices.into_iter().next().ok_or_else(|| {
                    ProviderError::MalformedResponse("No choices in response".into())
                })?;
                (resp.model, choice.message.content.unwrap_or_default(), resp.usage)
            }
            Endpoint::Completions => {
                let resp: CompletionResponse = serde_json::from_value(body).map_err(|e| {
                    ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
                })?;
                let choice = resp.choices.into_iter().next().ok_or_else(|| {
                    ProviderError::MalformedResponse("No choices in response".into())
                })?;
                (resp.model, choice.text, resp.usage)
            }
        };

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content,
            timestamp: chrono::Utc::now(),
        };

        let usage = usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model,
        })
    }
}

#[async_trait]
impl gridparley_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let (url, body) = self.request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to read body: {e}")))?;

        Self::parse_response(self.endpoint, body)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<CompletionChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
