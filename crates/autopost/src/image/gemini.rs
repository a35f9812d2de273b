//! Gemini image generation via `generateContent`.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::ImageSource;
use crate::error::{api_error, AutopostError, Result};

/// Generative Language API base.
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Default image-capable model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

/// Gemini fallback image provider.
pub struct GeminiImages {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiImages {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ImageSource for GeminiImages {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("gemini", response).await);
        }

        let body: GenerateResponse = response.json().await?;
        let encoded = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data)
            .map(|d| d.data)
            .ok_or_else(|| AutopostError::Image("Gemini returned no inline image data".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AutopostError::Image(format!("Gemini image is not valid base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_finds_first_inline_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-image:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let images = GeminiImages::new("g-key", DEFAULT_GEMINI_MODEL).with_base_url(server.uri());
        assert_eq!(images.generate("a dog").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_text_only_answer_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "I can't draw that"}]}}]
            })))
            .mount(&server)
            .await;

        let images = GeminiImages::new("g-key", DEFAULT_GEMINI_MODEL).with_base_url(server.uri());
        assert!(matches!(
            images.generate("a dog").await,
            Err(AutopostError::Image(_))
        ));
    }
}
