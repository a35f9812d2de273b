//! Illustration generation with provider fallback.

mod gemini;
mod openai;

pub use gemini::{GeminiImages, DEFAULT_GEMINI_MODEL, GEMINI_API_URL};
pub use openai::{OpenAIImages, DEFAULT_IMAGE_MODEL, OPENAI_API_URL};

use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::content::PostDraft;
use crate::error::{AutopostError, Result};
use crate::retry::RetryPolicy;

/// An image-generation API.
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw image bytes for a prompt.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}

/// A generated image on local disk. The file is removed when dropped.
#[derive(Debug)]
pub struct GeneratedImage {
    pub file: NamedTempFile,
    pub provider: &'static str,
}

impl GeneratedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Illustration prompt built from a draft.
pub struct ImagePrompt;

impl ImagePrompt {
    pub fn render(draft: &PostDraft) -> String {
        let mut lines = vec![
            "Soft hand-drawn minimal illustration.".to_string(),
            "Light neutral background.".to_string(),
            "Calm emotional storytelling mood.".to_string(),
        ];
        if let Some(breed) = &draft.breed {
            lines.push(format!("Dog breed: {breed}"));
        }
        if let Some(color) = &draft.fur_color {
            lines.push(format!("Fur color: {color}"));
        }
        let scene = if draft.image_prompt.is_empty() {
            &draft.topic
        } else {
            &draft.image_prompt
        };
        lines.push(format!("Scene: {scene}"));
        lines.push("1080x1080 square.".to_string());
        lines.push("No text.".to_string());
        lines.push("No watermark.".to_string());
        lines.join("\n")
    }
}

struct Slot {
    source: Arc<dyn ImageSource>,
    policy: RetryPolicy,
}

/// Tries image sources in order, each within its own retry policy.
#[derive(Default)]
pub struct ImageGenerator {
    slots: Vec<Slot>,
}

impl ImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: Arc<dyn ImageSource>, policy: RetryPolicy) -> Self {
        self.slots.push(Slot { source, policy });
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.source.name()).collect()
    }

    /// Render the draft's illustration into a temporary PNG.
    #[instrument(skip_all, fields(topic = %draft.topic))]
    pub async fn generate(&self, draft: &PostDraft) -> Result<GeneratedImage> {
        let prompt = ImagePrompt::render(draft);
        let mut failures = Vec::new();

        for slot in &self.slots {
            let name = slot.source.name();
            let mut attempt = 0;
            while slot.policy.can_retry(attempt) {
                attempt += 1;
                let delay = slot.policy.delay_before(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                match slot.source.generate(&prompt).await {
                    Ok(bytes) => {
                        let file = write_temp(&bytes)?;
                        info!(provider = name, attempt, bytes = bytes.len(), "Image generated");
                        return Ok(GeneratedImage { file, provider: name });
                    }
                    Err(e) => {
                        warn!(provider = name, attempt, error = %e, "Image generation failed");
                        failures.push(format!("{name}#{attempt}: {e}"));
                    }
                }
            }
        }

        Err(AutopostError::Image(if failures.is_empty() {
            "no image providers configured".to_string()
        } else {
            format!("all image providers failed: {}", failures.join("; "))
        }))
    }
}

fn write_temp(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("autopost-")
        .suffix(".png")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
