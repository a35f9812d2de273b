//! OpenAI Images API.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::ImageSource;
use crate::error::{api_error, AutopostError, Result};

/// OpenAI API base.
pub const OPENAI_API_URL: &str = "https://api.openai.com";

/// Default image model.
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

const SIZE: &str = "1024x1024";

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

/// `POST /v1/images/generations`.
pub struct OpenAIImages {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIImages {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            // image generation regularly takes close to a minute
            .timeout(Duration::from_secs(180))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ImageSource for OpenAIImages {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "size": SIZE,
                "n": 1,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("openai-images", response).await);
        }

        let body: ImagesResponse = response.json().await?;
        let encoded = body
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| AutopostError::Image("OpenAI returned no b64_json image".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AutopostError::Image(format!("OpenAI image is not valid base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_decodes_b64_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-image-1", "size": "1024x1024"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "created": 1,
                "data": [{"b64_json": "aGVsbG8="}]
            })))
            .mount(&server)
            .await;

        let images = OpenAIImages::new("sk-test", DEFAULT_IMAGE_MODEL).with_base_url(server.uri());
        assert_eq!(images.generate("a dog").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_policy_rejection_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Your request was rejected by the safety system."}
            })))
            .mount(&server)
            .await;

        let images = OpenAIImages::new("sk-test", DEFAULT_IMAGE_MODEL).with_base_url(server.uri());
        let err = images.generate("a dog").await.unwrap_err();
        assert!(err.to_string().contains("safety system"));
    }
}
