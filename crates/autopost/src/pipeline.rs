//! Run orchestration.
//!
//! ```text
//! LOAD_HISTORY -> FETCH_BLOG -> (SKIP_BLOG?) -> GENERATE -> SELECT -> PUBLISH -> LOG
//! ```
//!
//! Reading history, generating content, generating the image and writing the
//! log row are fatal. Everything between (storefront upload, each network,
//! comments) degrades to a recorded status and the run continues.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use llm::{AnthropicProvider, OpenAIProvider, ProviderChain};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::content::{normalize_topic, ContentGenerator, DraftSource, PostDraft};
use crate::error::{AutopostError, Result};
use crate::feed::{BlogRef, BlogSource, FeedReader};
use crate::image::{GeminiImages, ImageGenerator, OpenAIImages};
use crate::protocol::PublishProtocol;
use crate::retry::RetryPolicy;
use crate::sheets::{HistoryRow, HistoryStore, LogRow, SheetsClient};
use crate::social::{FacebookPage, InstagramAccount, PublishResult, SocialChannel, SocialPost};
use crate::storefront::{MediaHost, ShopifyClient, StorefrontHost};

/// Generation calls made per post while looking for an unused topic.
pub const MAX_GENERATION_ATTEMPTS: u32 = 3;

/// Pacing for one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub posts_per_run: usize,
    pub inter_post_delay: Duration,
    pub generation_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            posts_per_run: 1,
            inter_post_delay: Duration::from_secs(10),
            generation_attempts: MAX_GENERATION_ATTEMPTS,
        }
    }
}

/// What happened to one post.
#[derive(Debug, Clone, Serialize)]
pub struct PostReport {
    pub topic: String,
    /// Every candidate repeated history and the first one was used anyway.
    pub forced: bool,
    pub attempts: u32,
    pub similarity: f64,
    pub image_provider: &'static str,
    pub image_url: Option<String>,
    #[serde(serialize_with = "serialize_display")]
    pub facebook: PublishResult,
    #[serde(serialize_with = "serialize_display")]
    pub instagram: PublishResult,
}

/// What happened during one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub posts: Vec<PostReport>,
    /// Blog entry offered to the generator, if any.
    pub blog_used: Option<BlogRef>,
    /// A blog entry was fetched but had already been promoted.
    pub skipped_blog: bool,
}

fn serialize_display<S: serde::Serializer>(value: &PublishResult, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(value)
}

struct Selection {
    draft: PostDraft,
    attempts: u32,
    forced: bool,
}

/// The end-to-end content pipeline.
pub struct Pipeline {
    history: Arc<dyn HistoryStore>,
    blog: Arc<dyn BlogSource>,
    drafts: Arc<dyn DraftSource>,
    images: ImageGenerator,
    media_host: Option<Arc<dyn MediaHost>>,
    facebook: Option<Arc<dyn SocialChannel>>,
    instagram: Option<Arc<dyn SocialChannel>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        blog: Arc<dyn BlogSource>,
        drafts: Arc<dyn DraftSource>,
        images: ImageGenerator,
    ) -> Self {
        Self {
            history,
            blog,
            drafts,
            images,
            media_host: None,
            facebook: None,
            instagram: None,
            settings: PipelineSettings::default(),
        }
    }

    #[must_use]
    pub fn with_media_host(mut self, host: Arc<dyn MediaHost>) -> Self {
        self.media_host = Some(host);
        self
    }

    #[must_use]
    pub fn with_facebook(mut self, channel: Arc<dyn SocialChannel>) -> Self {
        self.facebook = Some(channel);
        self
    }

    #[must_use]
    pub fn with_instagram(mut self, channel: Arc<dyn SocialChannel>) -> Self {
        self.instagram = Some(channel);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wire every component from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut chain = ProviderChain::new().with(
            Arc::new(OpenAIProvider::new(config.text.openai_api_key.clone())),
            config.text.openai_model.clone(),
        );
        if let Some(key) = &config.text.anthropic_api_key {
            chain.push(
                Arc::new(AnthropicProvider::new(key.clone())),
                config.text.anthropic_model.clone(),
            );
        }
        let drafts = ContentGenerator::new(chain, config.text.temperature)?;

        let mut images = ImageGenerator::new().with(
            Arc::new(OpenAIImages::new(
                config.text.openai_api_key.clone(),
                config.image.openai_image_model.clone(),
            )),
            RetryPolicy::image_primary(),
        );
        if let Some(key) = &config.image.gemini_api_key {
            images = images.with(
                Arc::new(GeminiImages::new(key.clone(), config.image.gemini_model.clone())),
                RetryPolicy::once(),
            );
        }

        let protocol = PublishProtocol::new(PublishProtocol::default().restart, config.run.poll);

        let mut pipeline = Self::new(
            Arc::new(SheetsClient::new(&config.sheets)),
            Arc::new(FeedReader::new(config.feed_url.clone())),
            Arc::new(drafts),
            images,
        )
        .with_settings(PipelineSettings {
            posts_per_run: config.run.posts_per_run,
            inter_post_delay: config.run.inter_post_delay,
            generation_attempts: MAX_GENERATION_ATTEMPTS,
        });

        if let Some(shopify) = &config.shopify {
            pipeline = pipeline.with_media_host(Arc::new(StorefrontHost::new(
                ShopifyClient::new(shopify),
                protocol,
            )));
        }
        if let Some(facebook) = &config.facebook {
            pipeline = pipeline.with_facebook(Arc::new(FacebookPage::new(facebook)));
        }
        if let Some(instagram) = &config.instagram {
            pipeline = pipeline.with_instagram(Arc::new(InstagramAccount::new(instagram, protocol)));
        }

        Ok(pipeline)
    }

    /// Execute one run.
    #[instrument(skip(self), fields(posts = self.settings.posts_per_run))]
    pub async fn run(&self) -> Result<RunReport> {
        let mut history = self.history.read_rows().await?;
        info!(rows = history.len(), "Loaded history");

        let mut report = RunReport::default();
        let blog = match self.blog.latest().await {
            Some(blog) if blog.appears_in(&history) => {
                info!(link = %blog.link, "Blog already promoted, skipping it");
                report.skipped_blog = true;
                None
            }
            other => other,
        };
        report.blog_used.clone_from(&blog);

        for index in 0..self.settings.posts_per_run {
            if index > 0 && !self.settings.inter_post_delay.is_zero() {
                info!(secs = self.settings.inter_post_delay.as_secs(), "Waiting before next post");
                tokio::time::sleep(self.settings.inter_post_delay).await;
            }

            // the blog is only promoted once per run
            let blog_for_post = if index == 0 { blog.as_ref() } else { None };
            let (post, row) = self.publish_one(&history, blog_for_post).await?;
            history.push(HistoryRow::from(&row));
            report.posts.push(post);
        }

        Ok(report)
    }

    async fn select(&self, history: &[HistoryRow], blog: Option<&BlogRef>) -> Result<Selection> {
        let used: HashSet<String> = history.iter().map(|r| normalize_topic(r.topic())).collect();
        let attempts = self.settings.generation_attempts.max(1);
        let mut last_batch = Vec::new();

        for attempt in 1..=attempts {
            let batch = self.drafts.generate(history, blog).await?;
            if let Some(draft) = batch
                .drafts
                .iter()
                .find(|d| !used.contains(&d.normalized_topic()))
            {
                return Ok(Selection {
                    draft: draft.clone(),
                    attempts: attempt,
                    forced: false,
                });
            }
            warn!(
                attempt,
                topics = ?batch.drafts.iter().map(|d| d.topic.as_str()).collect::<Vec<_>>(),
                "Every candidate repeats a recent topic"
            );
            last_batch = batch.drafts;
        }

        let draft = last_batch
            .into_iter()
            .next()
            .ok_or_else(|| AutopostError::unexpected("content", "generator returned an empty batch"))?;
        warn!(topic = %draft.topic, "No fresh topic found, publishing the first candidate anyway");
        Ok(Selection {
            draft,
            attempts,
            forced: true,
        })
    }

    async fn publish_one(&self, history: &[HistoryRow], blog: Option<&BlogRef>) -> Result<(PostReport, LogRow)> {
        let Selection {
            draft,
            attempts,
            forced,
        } = self.select(history, blog).await?;
        let similarity = similarity_score(&draft.topic, history);
        info!(topic = %draft.topic, attempts, forced, similarity, "Selected draft");

        let image = self.images.generate(&draft).await?;

        let image_url = match &self.media_host {
            Some(host) => host.host_image(image.path()).await,
            None => None,
        };

        let caption = draft.full_caption(blog.map(|b| b.link.as_str()));
        let post = SocialPost {
            caption: &caption,
            image_path: image.path(),
            image_url: image_url.as_deref(),
            comment: Some(draft.engagement_comment.as_str()),
        };

        let facebook = publish_to(self.facebook.as_deref(), &post).await;
        let instagram = publish_to(self.instagram.as_deref(), &post).await;

        let row = LogRow {
            date: chrono::Utc::now().date_naive().to_string(),
            topic: draft.topic.clone(),
            angle: draft.angle.clone(),
            post_type: draft.post_type.to_string(),
            breed: draft.breed.clone().unwrap_or_default(),
            fur_color: draft.fur_color.clone().unwrap_or_default(),
            caption: caption.clone(),
            hashtags: draft.hashtag_line(),
            alt_text: draft.alt_text.clone(),
            image_prompt: draft.image_prompt.clone(),
            image_provider: image.provider.to_string(),
            post_id: post_ids(&facebook, &instagram),
            similarity_score: similarity,
            facebook_status: facebook.status_label().to_string(),
            instagram_status: instagram.status_label().to_string(),
        };
        self.history.append_row(&row).await?;

        info!(
            topic = %draft.topic,
            facebook = %facebook,
            instagram = %instagram,
            "Post complete"
        );

        Ok((
            PostReport {
                topic: draft.topic,
                forced,
                attempts,
                similarity,
                image_provider: image.provider,
                image_url,
                facebook,
                instagram,
            },
            row,
        ))
    }
}

async fn publish_to(channel: Option<&dyn SocialChannel>, post: &SocialPost<'_>) -> PublishResult {
    match channel {
        Some(channel) => channel.publish(post).await,
        None => PublishResult::Disabled,
    }
}

/// `fb:<id>|ig:<id>` for the networks that accepted the post.
fn post_ids(facebook: &PublishResult, instagram: &PublishResult) -> String {
    [("fb", facebook), ("ig", instagram)]
        .into_iter()
        .filter_map(|(prefix, result)| result.post_id().map(|id| format!("{prefix}:{id}")))
        .collect::<Vec<_>>()
        .join("|")
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Highest word-set Jaccard similarity between `topic` and any history
/// topic, rounded to two decimals.
pub fn similarity_score(topic: &str, history: &[HistoryRow]) -> f64 {
    let target = words(topic);
    if target.is_empty() {
        return 0.0;
    }

    let best = history
        .iter()
        .map(|row| words(row.topic()))
        .filter(|other| !other.is_empty())
        .map(|other| {
            let shared = target.intersection(&other).count() as f64;
            let total = target.union(&other).count() as f64;
            shared / total
        })
        .fold(0.0_f64, f64::max);

    (best * 100.0).round() / 100.0
}
