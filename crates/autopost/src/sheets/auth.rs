//! Google OAuth for the Sheets API.
//!
//! Either a pre-issued access token is used as-is, or a service-account JWT
//! is signed with RS256 and exchanged for a bearer token, which is cached
//! until shortly before it expires.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::GoogleCredentials;
use crate::error::{api_error, AutopostError, Result};

/// Token endpoint for service-account assertions.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Supplies bearer tokens for Sheets requests.
pub struct GoogleAuth {
    credentials: GoogleCredentials,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn new(credentials: GoogleCredentials) -> Self {
        Self {
            credentials,
            token_url: TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Override the token endpoint (for testing).
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// A bearer token valid for at least the next minute.
    pub async fn token(&self, client: &reqwest::Client) -> Result<String> {
        let (client_email, private_key) = match &self.credentials {
            GoogleCredentials::AccessToken(token) => return Ok(token.clone()),
            GoogleCredentials::ServiceAccount {
                client_email,
                private_key,
            } => (client_email, private_key),
        };

        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at - REFRESH_MARGIN_SECS > now) {
            return Ok(token.value.clone());
        }

        let assertion = sign_assertion(client_email, private_key, &self.token_url, now)?;
        let response = client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("google-oauth", response).await);
        }

        let body: TokenResponse = response.json().await?;
        let expires_at = now + body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        debug!(client_email = %client_email, expires_at, "Obtained Google access token");

        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at,
        });
        Ok(body.access_token)
    }
}

fn sign_assertion(client_email: &str, private_key: &str, audience: &str, now: i64) -> Result<String> {
    let claims = Claims {
        iss: client_email,
        scope: SCOPE,
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| AutopostError::Sheets(format!("invalid service account key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| AutopostError::Sheets(format!("failed to sign token request: {e}")))
}
