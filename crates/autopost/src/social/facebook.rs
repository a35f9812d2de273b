//! Facebook page photo posts.
//!
//! The photo endpoint accepts the raw file and returns a live post id in the
//! same call, so no polling is involved.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use tracing::{info, instrument, warn};

use super::graph::{GraphClient, IdResponse};
use super::{add_comment, PublishResult, SocialChannel, SocialPost};
use crate::config::FacebookConfig;
use crate::error::{AutopostError, Result};

/// A Facebook page posting photos with captions.
pub struct FacebookPage {
    graph: GraphClient,
    page_id: String,
}

impl FacebookPage {
    pub fn new(config: &FacebookConfig) -> Self {
        Self {
            graph: GraphClient::new(&config.graph_version, &config.access_token),
            page_id: config.page_id.clone(),
        }
    }

    pub fn with_graph(graph: GraphClient, page_id: impl Into<String>) -> Self {
        Self {
            graph,
            page_id: page_id.into(),
        }
    }

    /// Upload a photo with its caption. Returns the post id, falling back to the photo id.
    #[instrument(skip(self, caption), fields(page_id = %self.page_id))]
    pub async fn post_photo(&self, caption: &str, image_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image_path).await?;
        let filename = image_path
            .file_name()
            .map_or_else(|| "image.png".to_string(), |n| n.to_string_lossy().into_owned());

        let form = Form::new()
            .text("access_token", self.graph.access_token.clone())
            .text("caption", caption.to_string())
            .part("source", Part::bytes(bytes).file_name(filename));

        let response = self
            .graph
            .http
            .post(self.graph.url(&format!("{}/photos", self.page_id)))
            .multipart(form)
            .send()
            .await?;

        let body: IdResponse = GraphClient::read(response).await?;
        body.post_id
            .or(body.id)
            .ok_or_else(|| AutopostError::unexpected("facebook", "photo response had no id"))
    }
}

#[async_trait]
impl SocialChannel for FacebookPage {
    fn name(&self) -> &'static str {
        "facebook"
    }

    async fn publish(&self, post: &SocialPost<'_>) -> PublishResult {
        match self.post_photo(post.caption, post.image_path).await {
            Ok(post_id) => {
                info!(post_id = %post_id, "Facebook post published");
                add_comment(&self.graph, self.name(), &post_id, post.comment).await;
                PublishResult::Posted(post_id)
            }
            Err(e) => {
                warn!(error = %e, "Facebook post failed");
                PublishResult::Failed(e.to_string())
            }
        }
    }
}
