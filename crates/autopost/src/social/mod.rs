//! Social network adapters.
//!
//! Each adapter resolves to a [`PublishResult`] instead of an error so that a
//! failure on one network never blocks the other network or the log write.

mod facebook;
mod graph;
mod instagram;

pub use facebook::FacebookPage;
pub use graph::{GraphClient, GRAPH_API_URL};
pub use instagram::{ContainerRequest, InstagramAccount};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of publishing to one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// Live post id.
    Posted(String),
    Failed(String),
    /// The network is configured but this post could not be sent to it.
    Skipped(String),
    /// The network is not configured.
    Disabled,
}

impl PublishResult {
    /// Value written to the status columns of the log.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Posted(_) => "posted",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
            Self::Disabled => "disabled",
        }
    }

    pub fn post_id(&self) -> Option<&str> {
        match self {
            Self::Posted(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for PublishResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posted(id) => write!(f, "posted ({id})"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// Everything a network adapter may need for one post.
#[derive(Debug, Clone, Copy)]
pub struct SocialPost<'a> {
    pub caption: &'a str,
    pub image_path: &'a Path,
    /// Public, query-free image URL if the storefront upload succeeded.
    pub image_url: Option<&'a str>,
    /// Follow-up comment posted under the new post.
    pub comment: Option<&'a str>,
}

/// One social network.
#[async_trait]
pub trait SocialChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, post: &SocialPost<'_>) -> PublishResult;
}

/// Best-effort follow-up comment; failures are logged and swallowed.
pub(crate) async fn add_comment(graph: &GraphClient, network: &str, object_id: &str, comment: Option<&str>) {
    let Some(message) = comment.map(str::trim).filter(|m| !m.is_empty()) else {
        return;
    };
    match graph.comment(object_id, message).await {
        Ok(comment_id) => info!(network, object_id, comment_id = %comment_id, "Engagement comment posted"),
        Err(e) => warn!(network, object_id, error = %e, "Engagement comment failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(PublishResult::Posted("1".into()).status_label(), "posted");
        assert_eq!(PublishResult::Failed("x".into()).status_label(), "failed");
        assert_eq!(PublishResult::Skipped("x".into()).status_label(), "skipped");
        assert_eq!(PublishResult::Disabled.status_label(), "disabled");
        assert_eq!(PublishResult::Posted("123_456".into()).post_id(), Some("123_456"));
        assert_eq!(PublishResult::Disabled.post_id(), None);
    }
}
