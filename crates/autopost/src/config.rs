//! Runtime configuration, read once from the environment at start-up.
//!
//! # Required
//! - `OPENAI_API_KEY`
//! - `GOOGLE_SHEET_ID`
//! - `GOOGLE_SHEETS_ACCESS_TOKEN`, or `GOOGLE_SHEETS_CLIENT_EMAIL` + `GOOGLE_SHEETS_PRIVATE_KEY`
//!
//! # Channels (enabled when present)
//! - Facebook: `FB_PAGE_ID`, `FB_PAGE_ACCESS_TOKEN`
//! - Instagram: `IG_USER_ID` (+ `FB_PAGE_ACCESS_TOKEN`)
//! - Storefront: `SHOPIFY_STORE_NAME` + `SHOPIFY_ACCESS_TOKEN` or
//!   `SHOPIFY_CLIENT_ID`/`SHOPIFY_CLIENT_SECRET`

use std::time::Duration;

use crate::error::{AutopostError, Result};
use crate::protocol::MAX_POLL_WAIT;
use crate::retry::RetryPolicy;

/// Default blog feed.
pub const DEFAULT_FEED_URL: &str = "https://furryfable.com/feed";

/// Default Meta Graph API version.
pub const DEFAULT_GRAPH_VERSION: &str = "v24.0";

/// Default Shopify Admin API version.
pub const DEFAULT_SHOPIFY_API_VERSION: &str = "2025-01";

/// Default alt text attached to uploaded storefront files.
pub const DEFAULT_ALT_TEXT: &str = "FurryFable Social Content";

/// Text-generation settings.
#[derive(Debug, Clone)]
pub struct TextConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub temperature: f32,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
}

/// Image-generation settings.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub openai_image_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

/// How the storefront client authenticates.
#[derive(Debug, Clone)]
pub enum ShopifyCredentials {
    /// A long-lived Admin API token.
    AccessToken(String),
    /// Exchanged for a short-lived token with the client-credentials grant.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

/// Storefront (Shopify) settings.
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    pub store_name: String,
    pub api_version: String,
    pub credentials: ShopifyCredentials,
    pub alt_text: String,
}

/// Facebook page settings.
#[derive(Debug, Clone)]
pub struct FacebookConfig {
    pub page_id: String,
    pub access_token: String,
    pub graph_version: String,
}

/// Instagram business account settings.
#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub user_id: String,
    pub access_token: String,
    pub graph_version: String,
}

/// How the Sheets client authenticates.
#[derive(Debug, Clone)]
pub enum GoogleCredentials {
    /// A pre-issued OAuth access token.
    AccessToken(String),
    /// Service-account key material.
    ServiceAccount {
        client_email: String,
        private_key: String,
    },
}

/// Google Sheets settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub credentials: GoogleCredentials,
}

/// Orchestrator pacing.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub posts_per_run: usize,
    pub inter_post_delay: Duration,
    pub poll: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            posts_per_run: 1,
            inter_post_delay: Duration::from_secs(10),
            poll: RetryPolicy::polling(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_url: String,
    pub text: TextConfig,
    pub image: ImageConfig,
    pub shopify: Option<ShopifyConfig>,
    pub facebook: Option<FacebookConfig>,
    pub instagram: Option<InstagramConfig>,
    pub sheets: SheetsConfig,
    pub run: RunConfig,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AutopostError::Config(format!("{key} environment variable not set")))
        };
        let parse_or = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| AutopostError::Config(format!("{key} must be a whole number, got {v:?}"))),
                None => Ok(default),
            }
        };

        let text = TextConfig {
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| llm::openai::DEFAULT_MODEL.to_string()),
            temperature: match get("OPENAI_TEMPERATURE") {
                Some(v) => v
                    .parse()
                    .map_err(|_| AutopostError::Config(format!("OPENAI_TEMPERATURE must be a number, got {v:?}")))?,
                None => 0.85,
            },
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_model: get("ANTHROPIC_MODEL")
                .unwrap_or_else(|| llm::anthropic::DEFAULT_MODEL.to_string()),
        };

        let image = ImageConfig {
            openai_image_model: get("OPENAI_IMAGE_MODEL").unwrap_or_else(|| "gpt-image-1".to_string()),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash-image".to_string()),
        };

        let graph_version = get("GRAPH_API_VERSION").unwrap_or_else(|| DEFAULT_GRAPH_VERSION.to_string());
        let page_token = get("FB_PAGE_ACCESS_TOKEN");

        let facebook = match (get("FB_PAGE_ID"), page_token.clone()) {
            (Some(page_id), Some(access_token)) => Some(FacebookConfig {
                page_id,
                access_token,
                graph_version: graph_version.clone(),
            }),
            _ => None,
        };

        let instagram = match (get("IG_USER_ID"), page_token) {
            (Some(user_id), Some(access_token)) => Some(InstagramConfig {
                user_id,
                access_token,
                graph_version,
            }),
            _ => None,
        };

        let shopify = get("SHOPIFY_STORE_NAME").and_then(|store_name| {
            let credentials = match (
                get("SHOPIFY_ACCESS_TOKEN"),
                get("SHOPIFY_CLIENT_ID"),
                get("SHOPIFY_CLIENT_SECRET"),
            ) {
                (Some(token), _, _) => ShopifyCredentials::AccessToken(token),
                (None, Some(client_id), Some(client_secret)) => ShopifyCredentials::ClientCredentials {
                    client_id,
                    client_secret,
                },
                _ => return None,
            };
            Some(ShopifyConfig {
                store_name,
                api_version: get("SHOPIFY_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_SHOPIFY_API_VERSION.to_string()),
                credentials,
                alt_text: get("IMAGE_ALT_TEXT").unwrap_or_else(|| DEFAULT_ALT_TEXT.to_string()),
            })
        });

        let google_credentials = match (
            get("GOOGLE_SHEETS_ACCESS_TOKEN"),
            get("GOOGLE_SHEETS_CLIENT_EMAIL"),
            get("GOOGLE_SHEETS_PRIVATE_KEY"),
        ) {
            (Some(token), _, _) => GoogleCredentials::AccessToken(token),
            (None, Some(client_email), Some(private_key)) => GoogleCredentials::ServiceAccount {
                client_email,
                // keys pasted into CI secrets arrive with literal "\n"
                private_key: private_key.replace("\\n", "\n"),
            },
            _ => {
                return Err(AutopostError::Config(
                    "set GOOGLE_SHEETS_ACCESS_TOKEN or GOOGLE_SHEETS_CLIENT_EMAIL + GOOGLE_SHEETS_PRIVATE_KEY"
                        .to_string(),
                ))
            }
        };

        let sheets = SheetsConfig {
            spreadsheet_id: require("GOOGLE_SHEET_ID")?,
            sheet_name: get("GOOGLE_SHEET_NAME").unwrap_or_else(|| "Sheet1".to_string()),
            credentials: google_credentials,
        };

        let poll = RetryPolicy::fixed(
            u32::try_from(parse_or("POLL_MAX_ATTEMPTS", 10)?).unwrap_or(u32::MAX),
            Duration::from_secs(parse_or("POLL_DELAY_SECS", 5)?),
        );
        let capped = poll.capped(MAX_POLL_WAIT);
        if capped != poll {
            tracing::warn!(
                attempts = poll.max_attempts,
                delay_secs = poll.delay.as_secs(),
                allowed_attempts = capped.max_attempts,
                "Poll budget exceeds two minutes, clamping"
            );
        }

        let run = RunConfig {
            posts_per_run: usize::try_from(parse_or("POSTS_PER_RUN", 1)?.max(1)).unwrap_or(1),
            inter_post_delay: Duration::from_secs(parse_or("INTER_POST_DELAY_SECS", 10)?),
            poll: capped,
        };

        Ok(Self {
            feed_url: get("FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            text,
            image,
            shopify,
            facebook,
            instagram,
            sheets,
            run,
        })
    }

    /// Log which optional channels are active.
    pub fn log_channels(&self) {
        tracing::info!(
            facebook = self.facebook.is_some(),
            instagram = self.instagram.is_some(),
            storefront = self.shopify.is_some(),
            anthropic_fallback = self.text.anthropic_api_key.is_some(),
            gemini_fallback = self.image.gemini_api_key.is_some(),
            "Configured channels"
        );
        if self.instagram.is_some() && self.shopify.is_none() {
            tracing::warn!("Instagram needs a public image URL but the storefront is not configured; Instagram posts will be skipped");
        }
    }
}
