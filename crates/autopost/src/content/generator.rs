//! Draft generation over an ordered provider chain.

use async_trait::async_trait;
use llm::{extract_json, AIMessage, GenerateOptions, LlmError, LlmResult, ProviderChain};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::prompts::{DraftPromptData, PromptManager, BRAND, RECENT_TOPIC_WINDOW, SYSTEM_PROMPT};
use super::PostDraft;
use crate::error::Result;
use crate::feed::BlogRef;
use crate::sheets::HistoryRow;

/// Drafts requested per generation call.
pub const DRAFTS_PER_BATCH: usize = 3;

/// Drafts from one successful generation call.
#[derive(Debug, Clone)]
pub struct DraftBatch {
    pub drafts: Vec<PostDraft>,
    pub provider: &'static str,
    pub model: String,
}

/// Something that can draft posts given run history and optional blog context.
#[async_trait]
pub trait DraftSource: Send + Sync {
    async fn generate(&self, history: &[HistoryRow], blog: Option<&BlogRef>) -> Result<DraftBatch>;
}

/// Drafts posts with the first provider in the chain that returns a usable batch.
pub struct ContentGenerator {
    chain: ProviderChain,
    prompts: PromptManager,
    options: GenerateOptions,
}

impl ContentGenerator {
    pub fn new(chain: ProviderChain, temperature: f32) -> Result<Self> {
        Ok(Self {
            chain,
            prompts: PromptManager::new()?,
            options: GenerateOptions {
                temperature: Some(temperature),
                max_tokens: Some(4096),
                ..Default::default()
            },
        })
    }

    /// Messages for one call.
    pub fn messages(&self, history: &[HistoryRow], blog: Option<&BlogRef>) -> Result<Vec<AIMessage>> {
        let skip = history.len().saturating_sub(RECENT_TOPIC_WINDOW);
        let recent_topics = history[skip..]
            .iter()
            .map(HistoryRow::topic)
            .filter(|t| !t.is_empty())
            .collect();

        let prompt = self.prompts.drafts(&DraftPromptData {
            brand: BRAND,
            count: DRAFTS_PER_BATCH,
            blog,
            recent_topics,
        })?;

        Ok(vec![AIMessage::system(SYSTEM_PROMPT), AIMessage::user(prompt)])
    }
}

#[async_trait]
impl DraftSource for ContentGenerator {
    #[instrument(skip_all, fields(history = history.len(), blog = blog.is_some()))]
    async fn generate(&self, history: &[HistoryRow], blog: Option<&BlogRef>) -> Result<DraftBatch> {
        let messages = self.messages(history, blog)?;

        let output = self
            .chain
            .generate_with(&messages, &self.options, |response| parse_drafts(&response.text))
            .await?;

        info!(
            provider = output.provider,
            model = %output.model,
            drafts = output.value.len(),
            "Generated post drafts"
        );

        Ok(DraftBatch {
            drafts: output.value,
            provider: output.provider,
            model: output.model,
        })
    }
}

/// Parse and validate model text into at most [`DRAFTS_PER_BATCH`] drafts.
///
/// Accepts a bare array, an object wrapping the array under `posts`, or a
/// single post object. No usable drafts is an error so the chain can fall
/// through to the next provider.
pub fn parse_drafts(text: &str) -> LlmResult<Vec<PostDraft>> {
    let value = extract_json(text)?;
    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("posts") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(obj)],
        },
        _ => Vec::new(),
    };

    let mut drafts: Vec<PostDraft> = items.iter().filter_map(PostDraft::from_value).collect();

    if drafts.is_empty() {
        return Err(LlmError::ResponseParse {
            reason: format!("no usable drafts among {} items", items.len()),
        });
    }
    if drafts.len() > DRAFTS_PER_BATCH {
        warn!(received = drafts.len(), "Too many drafts, keeping the first {DRAFTS_PER_BATCH}");
        drafts.truncate(DRAFTS_PER_BATCH);
    } else if drafts.len() < DRAFTS_PER_BATCH {
        warn!(received = drafts.len(), expected = DRAFTS_PER_BATCH, "Fewer drafts than requested");
    }

    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::{AIProvider, AIResponse, TokenUsage};
    use std::sync::{Arc, Mutex};

    struct CannedProvider {
        name: &'static str,
        reply: std::result::Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedProvider {
        fn new(name: &'static str, reply: std::result::Result<&str, ()>) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AIProvider for CannedProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        fn api_key_env_var(&self) -> &'static str {
            "TEST_KEY"
        }
        fn is_configured(&self) -> bool {
            true
        }
        fn supported_models(&self) -> Vec<&str> {
            vec!["m"]
        }
        async fn generate_text(
            &self,
            model: &str,
            messages: &[AIMessage],
            _options: &GenerateOptions,
        ) -> LlmResult<AIResponse> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages.last().map(|m| m.content.clone()).unwrap_or_default());
            match &self.reply {
                Ok(text) => Ok(AIResponse {
                    text: text.clone(),
                    usage: TokenUsage::default(),
                    model: model.to_string(),
                    provider: self.name.to_string(),
                }),
                Err(()) => Err(LlmError::Api {
                    provider: self.name,
                    status: 500,
                    message: "boom".into(),
                }),
            }
        }
    }

    const THREE: &str = r#"```json
[
  {"topic": "Leash manners", "caption": "a", "hashtags": ["dogs"]},
  {"topic": "Rainy day games", "caption": "b", "hashtags": "fun, play"},
  {"topic": "Senior dog naps", "caption": "c"}
]
```"#;

    fn history(topics: &[&str]) -> Vec<HistoryRow> {
        topics
            .iter()
            .map(|t| HistoryRow::new(vec!["2025-01-01".into(), (*t).to_string()]))
            .collect()
    }

    #[test]
    fn test_parse_drafts_fenced_array() {
        let drafts = parse_drafts(THREE).unwrap();
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[1].hashtags, vec!["#fun", "#play"]);
    }

    #[test]
    fn test_parse_drafts_truncates_and_unwraps_posts_key() {
        let text = r#"{"posts": [{"topic":"a"},{"topic":"b"},{"topic":"c"},{"topic":"d"}]}"#;
        let drafts = parse_drafts(text).unwrap();
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[2].topic, "c");
    }

    #[test]
    fn test_parse_drafts_rejects_empty() {
        assert!(parse_drafts("[]").is_err());
        assert!(parse_drafts(r#"[{"caption": "no topic"}]"#).is_err());
        assert!(parse_drafts("Sorry, I can't help with that.").is_err());
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_returns_garbage() {
        let primary = CannedProvider::new("openai", Ok("not json at all"));
        let fallback = CannedProvider::new("anthropic", Ok(THREE));
        let chain = ProviderChain::new()
            .with(primary.clone(), "m")
            .with(fallback.clone(), "m");
        let generator = ContentGenerator::new(chain, 0.85).unwrap();

        let batch = generator.generate(&[], None).await.unwrap();
        assert_eq!(batch.provider, "anthropic");
        assert_eq!(batch.drafts.len(), 3);
        assert_eq!(primary.prompts.lock().unwrap().len(), 1);
        assert_eq!(
            primary.prompts.lock().unwrap()[0],
            fallback.prompts.lock().unwrap()[0]
        );
    }

    #[tokio::test]
    async fn test_both_providers_failing_is_error() {
        let chain = ProviderChain::new()
            .with(CannedProvider::new("openai", Err(())), "m")
            .with(CannedProvider::new("anthropic", Ok("[]")), "m");
        let generator = ContentGenerator::new(chain, 0.85).unwrap();

        assert!(generator.generate(&[], None).await.is_err());
    }

    #[test]
    fn test_prompt_uses_last_fifteen_topics() {
        let generator = ContentGenerator::new(ProviderChain::new(), 0.85).unwrap();
        let topics: Vec<String> = (0..20).map(|i| format!("topic-{i}")).collect();
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();

        let messages = generator.messages(&history(&refs), None).unwrap();
        let prompt = &messages[1].content;

        assert!(!prompt.contains("- topic-4\n"));
        assert!(prompt.contains("- topic-5\n"));
        assert!(prompt.contains("- topic-19\n"));
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
    }
}
