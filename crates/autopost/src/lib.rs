//! Blog-to-social content pipeline.
//!
//! This crate provides:
//! - Blog feed reading (RSS or Atom)
//! - LLM post drafting with provider fallback and output normalization
//! - Illustration generation with provider fallback
//! - Storefront image hosting and Instagram publishing over one
//!   asynchronous publish protocol
//! - Facebook photo posts and engagement comments
//! - Google Sheets history for de-duplication and logging

pub mod config;
pub mod content;
pub mod error;
pub mod feed;
pub mod image;
pub mod pipeline;
pub mod protocol;
pub mod retry;
pub mod sheets;
pub mod social;
pub mod storefront;

// Re-export main types
pub use config::AppConfig;
pub use content::{PostDraft, PostType};
pub use error::{AutopostError, Result};
pub use feed::{BlogRef, BlogSource, FeedReader};
pub use pipeline::{Pipeline, PipelineSettings, PostReport, RunReport};
pub use protocol::{AsyncPublishTarget, PollStatus, PublishOutcome, PublishProtocol, PublishState};
pub use retry::RetryPolicy;
pub use sheets::{HistoryRow, HistoryStore, LogRow};
pub use social::PublishResult;
