//! Instagram container + publish flow.
//!
//! A media container is created from a public image URL, its `status_code`
//! is polled until `FINISHED`, then the container is published.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::graph::{GraphClient, IdResponse};
use super::{add_comment, PublishResult, SocialChannel, SocialPost};
use crate::config::InstagramConfig;
use crate::error::{AutopostError, Result};
use crate::protocol::{strip_query, AsyncPublishTarget, PollStatus, PublishOutcome, PublishProtocol};

const SERVICE: &str = "instagram";

/// Input for one container.
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    pub image_url: String,
    pub caption: String,
}

/// An Instagram business account.
pub struct InstagramAccount {
    graph: GraphClient,
    user_id: String,
    protocol: PublishProtocol,
}

impl InstagramAccount {
    pub fn new(config: &InstagramConfig, protocol: PublishProtocol) -> Self {
        Self {
            graph: GraphClient::new(&config.graph_version, &config.access_token),
            user_id: config.user_id.clone(),
            protocol,
        }
    }

    pub fn with_graph(graph: GraphClient, user_id: impl Into<String>, protocol: PublishProtocol) -> Self {
        Self {
            graph,
            user_id: user_id.into(),
            protocol,
        }
    }

    /// Run the full container flow and return the live media id.
    pub async fn publish_image(&self, image_url: &str, caption: &str) -> PublishOutcome<String> {
        let request = ContainerRequest {
            image_url: image_url.to_string(),
            caption: caption.to_string(),
        };
        self.protocol.drive(self, &request).await
    }

    fn id_or_error(body: IdResponse, what: &str) -> Result<String> {
        body.id
            .ok_or_else(|| AutopostError::unexpected(SERVICE, format!("{what} response had no id")))
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl AsyncPublishTarget for InstagramAccount {
    type Request = ContainerRequest;
    type Staged = String;
    type Handle = String;
    type Ready = ();
    type Output = String;

    fn name(&self) -> &'static str {
        SERVICE
    }

    #[instrument(skip(self, request), fields(user_id = %self.user_id))]
    async fn request(&self, request: &ContainerRequest) -> Result<String> {
        let response = self
            .graph
            .http
            .post(self.graph.url(&format!("{}/media", self.user_id)))
            .json(&json!({
                "image_url": strip_query(&request.image_url),
                "caption": request.caption,
                "access_token": self.graph.access_token,
            }))
            .send()
            .await?;

        let container_id = Self::id_or_error(GraphClient::read(response).await?, "media")?;
        info!(container_id = %container_id, "Instagram container created");
        Ok(container_id)
    }

    async fn upload(&self, _request: &ContainerRequest, staged: String) -> Result<String> {
        // the container fetches the image itself
        Ok(staged)
    }

    async fn poll(&self, handle: &String) -> Result<PollStatus<()>> {
        let response = self
            .graph
            .http
            .get(self.graph.url(handle))
            .query(&[
                ("fields", "status_code,status"),
                ("access_token", self.graph.access_token.as_str()),
            ])
            .send()
            .await?;

        let body: StatusResponse = GraphClient::read(response).await?;
        let code = body.status_code.unwrap_or_default();
        Ok(match code.as_str() {
            "FINISHED" => PollStatus::Ready(()),
            "ERROR" | "EXPIRED" => PollStatus::Failed(match body.status {
                Some(detail) => format!("{code}: {detail}"),
                None => code,
            }),
            "" => PollStatus::Pending("UNKNOWN".to_string()),
            _ => PollStatus::Pending(code),
        })
    }

    async fn finalize(&self, handle: &String, _ready: ()) -> Result<String> {
        let response = self
            .graph
            .http
            .post(self.graph.url(&format!("{}/media_publish", self.user_id)))
            .json(&json!({
                "creation_id": handle,
                "access_token": self.graph.access_token,
            }))
            .send()
            .await?;

        Self::id_or_error(GraphClient::read(response).await?, "media_publish")
    }
}

#[async_trait]
impl SocialChannel for InstagramAccount {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn publish(&self, post: &SocialPost<'_>) -> PublishResult {
        let Some(image_url) = post.image_url else {
            warn!("No public image URL, skipping Instagram");
            return PublishResult::Skipped("no public image URL".to_string());
        };

        match self.publish_image(image_url, post.caption).await {
            PublishOutcome::Published { output, polls } => {
                info!(media_id = %output, polls, "Instagram post published");
                add_comment(&self.graph, SERVICE, &output, post.comment).await;
                PublishResult::Posted(output)
            }
            PublishOutcome::Failed { state, reason } => {
                warn!(%state, reason = %reason, "Instagram publish failed");
                PublishResult::Failed(format!("{state}: {reason}"))
            }
            PublishOutcome::TimedOut { polls } => {
                warn!(polls, "Instagram media never became ready");
                PublishResult::Failed(format!("container not ready after {polls} polls"))
            }
        }
    }
}
