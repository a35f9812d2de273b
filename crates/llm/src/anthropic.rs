//! Anthropic Claude provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, LlmResult};
use crate::provider::{AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, TokenUsage};

/// Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Environment variable holding the API key
const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Default model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Output budget when the caller does not set one; the messages API requires it.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Known Anthropic models
const SUPPORTED_MODELS: &[&str] = &[
    "claude-opus-4-1-20250805",
    "claude-sonnet-4-5-20250929",
    "claude-sonnet-4-20250514",
    "claude-3-5-haiku-20241022",
    "sonnet",
    "haiku",
];

/// Map short names to API model identifiers.
fn normalize_model(model: &str) -> &str {
    match model {
        "sonnet" => "claude-sonnet-4-5-20250929",
        "haiku" => "claude-3-5-haiku-20241022",
        _ => model,
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()).filter(|k| !k.is_empty()),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Convert messages to Anthropic format, extracting the system message.
    fn convert_messages(messages: &[AIMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                // Anthropic uses a separate system field
                AIRole::System => system = Some(msg.content.clone()),
                AIRole::User | AIRole::Assistant => converted.push(AnthropicMessage {
                    role: msg.role.as_str(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system, converted)
    }
}

#[async_trait]
impl AIProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn api_key_env_var(&self) -> &'static str {
        ENV_ANTHROPIC_API_KEY
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn supported_models(&self) -> Vec<&str> {
        SUPPORTED_MODELS.to_vec()
    }

    async fn generate_text(
        &self,
        model: &str,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> LlmResult<AIResponse> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured {
            provider: "anthropic",
            env_var: ENV_ANTHROPIC_API_KEY,
        })?;

        let (system, converted_messages) = Self::convert_messages(messages);

        let request = AnthropicRequest {
            model: normalize_model(model).to_string(),
            messages: converted_messages,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: options.temperature,
        };

        tracing::debug!(model = %request.model, "Calling Anthropic messages API");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|source| LlmError::Request {
                provider: "anthropic",
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| LlmError::Request {
            provider: "anthropic",
            source,
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<AnthropicErrorResponse>(&body)
                .map(|e| format!("{} - {}", e.error.error_type, e.error.message))
                .unwrap_or(body);
            return Err(LlmError::Api {
                provider: "anthropic",
                status: status.as_u16(),
                message,
            });
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::parse(format!("Anthropic response: {e}")))?;

        let text: String = api_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect();

        Ok(AIResponse {
            text,
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
                total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
            },
            model: api_response.model,
            provider: "anthropic".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_system_message_is_lifted() {
        let messages = vec![AIMessage::system("Be warm."), AIMessage::user("Write.")];
        let (system, converted) = AnthropicProvider::convert_messages(&messages);

        assert_eq!(system.as_deref(), Some("Be warm."));
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
    }

    #[test]
    fn test_normalize_model_aliases() {
        assert_eq!(normalize_model("haiku"), "claude-3-5-haiku-20241022");
        assert_eq!(normalize_model("claude-sonnet-4-20250514"), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn test_generate_text_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "system": "Be warm.",
                "max_tokens": 4096
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "[{\"topic\":"},
                    {"type": "text", "text": "\"Naps\"}]"}
                ],
                "usage": {"input_tokens": 5, "output_tokens": 7}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("ak-test").with_base_url(server.uri());
        let messages = vec![AIMessage::system("Be warm."), AIMessage::user("Write.")];

        let response = provider
            .generate_text(DEFAULT_MODEL, &messages, &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(response.text, "[{\"topic\":\"Naps\"}]");
        assert_eq!(response.usage.total_tokens, 12);
    }

    #[tokio::test]
    async fn test_error_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("ak-test").with_base_url(server.uri());
        let err = provider
            .generate_text(DEFAULT_MODEL, &[AIMessage::user("x")], &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("overloaded_error - Overloaded"));
    }
}
