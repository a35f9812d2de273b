//! Public hosting for generated images.
//!
//! Instagram only accepts images by URL, so each generated file is pushed
//! through the storefront's file pipeline to obtain a CDN address first.

mod shopify;

pub use shopify::{ImageUpload, ShopifyClient, UploadTarget};

use async_trait::async_trait;
use std::path::Path;
use tracing::instrument;

use crate::protocol::PublishProtocol;

/// Turns a local image into a public, query-free URL.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// `None` when any step of the upload failed or timed out.
    async fn host_image(&self, path: &Path) -> Option<String>;
}

/// [`MediaHost`] backed by the Shopify file pipeline.
pub struct StorefrontHost {
    client: ShopifyClient,
    protocol: PublishProtocol,
}

impl StorefrontHost {
    pub fn new(client: ShopifyClient, protocol: PublishProtocol) -> Self {
        Self { client, protocol }
    }
}

#[async_trait]
impl MediaHost for StorefrontHost {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn host_image(&self, path: &Path) -> Option<String> {
        let upload = ImageUpload::from_path(path);
        self.protocol
            .drive(&self.client, &upload)
            .await
            .into_option("shopify")
    }
}
