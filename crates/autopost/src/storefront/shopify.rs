//! Shopify Admin GraphQL file upload.
//!
//! `stagedUploadsCreate` hands out a signed, single-use upload form; the bytes
//! go straight to that form, `fileCreate` turns the staged resource into a
//! file record, and `node(id:)` is polled until the CDN URL is populated.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::{ShopifyConfig, ShopifyCredentials};
use crate::error::{api_error, AutopostError, Result};
use crate::protocol::{strip_query, AsyncPublishTarget, PollStatus};

const SERVICE: &str = "shopify";

/// A local image to be hosted.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
}

impl ImageUpload {
    /// Describe a local file, guessing the MIME type from its extension.
    pub fn from_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map_or_else(|| "image.png".to_string(), |n| n.to_string_lossy().into_owned());
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/png",
        };
        Self {
            path: path.to_path_buf(),
            filename,
            mime_type: mime_type.to_string(),
        }
    }
}

/// A staged upload slot. Valid for one POST, within minutes of creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub put_url: String,
    pub resource_url: String,
    /// Signed form fields, in the order they must be sent.
    pub parameters: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
struct GraphQLRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

fn user_errors(errors: &[UserError]) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(AutopostError::GraphQl {
        service: SERVICE,
        messages: errors
            .iter()
            .map(|e| match &e.field {
                Some(field) if !field.is_empty() => format!("{}: {}", field.join("."), e.message),
                _ => e.message.clone(),
            })
            .collect(),
    })
}

const STAGED_UPLOADS_CREATE: &str = r"
    mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
        stagedUploadsCreate(input: $input) {
            stagedTargets {
                url
                resourceUrl
                parameters { name value }
            }
            userErrors { field message }
        }
    }
";

const FILE_CREATE: &str = r"
    mutation fileCreate($files: [FileCreateInput!]!) {
        fileCreate(files: $files) {
            files { id fileStatus }
            userErrors { field message }
        }
    }
";

const FILE_STATUS: &str = r"
    query fileStatus($id: ID!) {
        node(id: $id) {
            ... on MediaImage {
                fileStatus
                image { url }
                fileErrors { message }
            }
        }
    }
";

/// Shopify Admin API client for file uploads.
pub struct ShopifyClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    credentials: ShopifyCredentials,
    alt_text: String,
    token: Mutex<Option<String>>,
}

impl ShopifyClient {
    pub fn new(config: &ShopifyConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: format!("https://{}.myshopify.com", config.store_name),
            api_version: config.api_version.clone(),
            credentials: config.credentials.clone(),
            alt_text: config.alt_text.clone(),
            token: Mutex::new(None),
        }
    }

    /// Point at a different store host (for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn graphql_url(&self) -> String {
        format!("{}/admin/api/{}/graphql.json", self.base_url, self.api_version)
    }

    /// Admin API token, exchanging client credentials on first use.
    async fn access_token(&self) -> Result<String> {
        let (client_id, client_secret) = match &self.credentials {
            ShopifyCredentials::AccessToken(token) => return Ok(token.clone()),
            ShopifyCredentials::ClientCredentials {
                client_id,
                client_secret,
            } => (client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .http
            .post(format!("{}/admin/oauth/access_token", self.base_url))
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": client_id,
                "client_secret": client_secret,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error("shopify-oauth", response).await);
        }

        let body: TokenResponse = response.json().await?;
        debug!("Obtained Shopify access token");
        *cached = Some(body.access_token.clone());
        Ok(body.access_token)
    }

    /// Execute a GraphQL query/mutation.
    async fn execute<V: Serialize, R: DeserializeOwned>(&self, query: &str, variables: V) -> Result<R> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.graphql_url())
            .header("X-Shopify-Access-Token", token)
            .json(&GraphQLRequest { query, variables })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let body: GraphQLResponse<R> = response.json().await?;
        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            return Err(AutopostError::GraphQl {
                service: SERVICE,
                messages: errors.into_iter().map(|e| e.message).collect(),
            });
        }

        body.data
            .ok_or_else(|| AutopostError::unexpected(SERVICE, "no data in GraphQL response"))
    }

    /// Create one staged upload slot.
    #[instrument(skip(self, upload), fields(file = %upload.filename))]
    pub async fn staged_upload(&self, upload: &ImageUpload) -> Result<UploadTarget> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            staged_uploads_create: Payload,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            #[serde(default)]
            staged_targets: Vec<Target>,
            #[serde(default)]
            user_errors: Vec<UserError>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Target {
            url: String,
            resource_url: String,
            #[serde(default)]
            parameters: Vec<Parameter>,
        }
        #[derive(Deserialize)]
        struct Parameter {
            name: String,
            value: String,
        }

        let size = tokio::fs::metadata(&upload.path).await?.len();
        let data: Response = self
            .execute(
                STAGED_UPLOADS_CREATE,
                json!({
                    "input": [{
                        "resource": "IMAGE",
                        "filename": upload.filename,
                        "mimeType": upload.mime_type,
                        "httpMethod": "POST",
                        "fileSize": size.to_string(),
                    }]
                }),
            )
            .await?;

        user_errors(&data.staged_uploads_create.user_errors)?;
        let target = data
            .staged_uploads_create
            .staged_targets
            .into_iter()
            .next()
            .ok_or_else(|| AutopostError::unexpected(SERVICE, "no staged target returned"))?;

        Ok(UploadTarget {
            put_url: target.url,
            resource_url: target.resource_url,
            parameters: target.parameters.into_iter().map(|p| (p.name, p.value)).collect(),
        })
    }

    /// POST the file to a staged target: signed fields first, in order, then `file`.
    #[instrument(skip(self, upload, target), fields(file = %upload.filename))]
    pub async fn push_bytes(&self, upload: &ImageUpload, target: &UploadTarget) -> Result<()> {
        let bytes = tokio::fs::read(&upload.path).await?;
        let mut form = Form::new();
        for (name, value) in &target.parameters {
            form = form.text(name.clone(), value.clone());
        }
        let part = Part::bytes(bytes)
            .file_name(upload.filename.clone())
            .mime_str(&upload.mime_type)?;
        form = form.part("file", part);

        let response = self.http.post(&target.put_url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(api_error("shopify-staged-upload", response).await);
        }
        Ok(())
    }

    /// Create a file record from a staged resource; returns the file id.
    #[instrument(skip(self))]
    pub async fn create_file(&self, resource_url: &str) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            file_create: Payload,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            #[serde(default)]
            files: Vec<File>,
            #[serde(default)]
            user_errors: Vec<UserError>,
        }
        #[derive(Deserialize)]
        struct File {
            id: String,
        }

        let data: Response = self
            .execute(
                FILE_CREATE,
                json!({
                    "files": [{
                        "alt": self.alt_text,
                        "contentType": "IMAGE",
                        "originalSource": resource_url,
                    }]
                }),
            )
            .await?;

        user_errors(&data.file_create.user_errors)?;
        data.file_create
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| AutopostError::unexpected(SERVICE, "fileCreate returned no files"))
    }

    /// One status read for a file.
    pub async fn file_status(&self, file_id: &str) -> Result<PollStatus<String>> {
        #[derive(Deserialize)]
        struct Response {
            node: Option<Node>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Node {
            file_status: Option<String>,
            image: Option<Image>,
            #[serde(default)]
            file_errors: Vec<FileError>,
        }
        #[derive(Deserialize)]
        struct Image {
            url: Option<String>,
        }
        #[derive(Deserialize)]
        struct FileError {
            message: String,
        }

        let data: Response = self.execute(FILE_STATUS, json!({ "id": file_id })).await?;
        let Some(node) = data.node else {
            return Ok(PollStatus::Pending("NOT_FOUND".to_string()));
        };

        let status = node.file_status.unwrap_or_default();
        let url = node.image.and_then(|i| i.url).filter(|u| !u.is_empty());
        Ok(match (status.as_str(), url) {
            ("READY", Some(url)) => PollStatus::Ready(url),
            ("FAILED", _) => {
                let reasons: Vec<String> = node.file_errors.into_iter().map(|e| e.message).collect();
                PollStatus::Failed(if reasons.is_empty() {
                    "file processing failed".to_string()
                } else {
                    reasons.join("; ")
                })
            }
            (other, _) if other.is_empty() => PollStatus::Pending("UNKNOWN".to_string()),
            (other, _) => PollStatus::Pending(other.to_string()),
        })
    }
}

#[async_trait]
impl AsyncPublishTarget for ShopifyClient {
    type Request = ImageUpload;
    type Staged = UploadTarget;
    type Handle = String;
    type Ready = String;
    type Output = String;

    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn request(&self, request: &ImageUpload) -> Result<UploadTarget> {
        self.staged_upload(request).await
    }

    async fn upload(&self, request: &ImageUpload, staged: UploadTarget) -> Result<String> {
        self.push_bytes(request, &staged).await?;
        let file_id = self.create_file(&staged.resource_url).await?;
        info!(file_id = %file_id, "Storefront file created");
        Ok(file_id)
    }

    async fn poll(&self, handle: &String) -> Result<PollStatus<String>> {
        self.file_status(handle).await
    }

    async fn finalize(&self, _handle: &String, ready: String) -> Result<String> {
        Ok(strip_query(&ready))
    }
}
