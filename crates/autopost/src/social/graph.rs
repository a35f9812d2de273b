//! Minimal Meta Graph API client shared by the Facebook and Instagram adapters.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{api_error, AutopostError, Result};

/// Default API host.
pub const GRAPH_API_URL: &str = "https://graph.facebook.com";

const SERVICE: &str = "meta-graph";

#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    pub id: Option<String>,
    pub post_id: Option<String>,
}

/// Authenticated Graph API client for one access token.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) http: reqwest::Client,
    base_url: String,
    version: String,
    pub(crate) access_token: String,
}

impl GraphClient {
    pub fn new(version: impl Into<String>, access_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: GRAPH_API_URL.to_string(),
            version: version.into(),
            access_token: access_token.into(),
        }
    }

    /// Point at a different API host (for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// `https://graph.facebook.com/{version}/{path}`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.version, path.trim_start_matches('/'))
    }

    /// Map a response to JSON, surfacing Graph error messages.
    pub(crate) async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }
        Ok(response.json().await?)
    }

    /// Add a comment under a post or media object. Returns the comment id.
    pub async fn comment(&self, object_id: &str, message: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url(&format!("{object_id}/comments")))
            .json(&json!({
                "message": message,
                "access_token": self.access_token,
            }))
            .send()
            .await?;

        let body: IdResponse = Self::read(response).await?;
        debug!(object_id, "Comment posted");
        body.id
            .ok_or_else(|| AutopostError::unexpected(SERVICE, "comment response had no id"))
    }
}
