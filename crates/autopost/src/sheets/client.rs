//! Google Sheets v4 values client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::auth::GoogleAuth;
use super::schema::{HistoryRow, LogRow};
use super::HistoryStore;
use crate::config::SheetsConfig;
use crate::error::{api_error, AutopostError, Result};

/// Default API host.
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Reads and appends rows in one sheet of one spreadsheet.
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    auth: GoogleAuth,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: SHEETS_API_URL.to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            auth: GoogleAuth::new(config.credentials.clone()),
        }
    }

    /// Point at a different API host (for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Replace the token source.
    #[must_use]
    pub fn with_auth(mut self, auth: GoogleAuth) -> Self {
        self.auth = auth;
        self
    }

    fn values_url(&self, range_suffix: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AutopostError::Config(format!("invalid Sheets base URL: {e}")))?;
        let range = format!("{}!{range_suffix}", self.sheet_name);
        url.path_segments_mut()
            .map_err(|()| AutopostError::Config("Sheets base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl HistoryStore for SheetsClient {
    #[instrument(skip(self), fields(sheet = %self.sheet_name))]
    async fn read_rows(&self) -> Result<Vec<HistoryRow>> {
        let token = self.auth.token(&self.client).await?;
        let url = self.values_url("A2:O")?;

        let response = self.client.get(url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(api_error("sheets", response).await);
        }

        let range: ValueRange = response.json().await?;
        let rows: Vec<HistoryRow> = range
            .values
            .into_iter()
            .map(|row| HistoryRow::new(row.iter().map(cell_text).collect()))
            .collect();

        debug!(rows = rows.len(), "Read history rows");
        Ok(rows)
    }

    #[instrument(skip(self, row), fields(sheet = %self.sheet_name, topic = %row.topic))]
    async fn append_row(&self, row: &LogRow) -> Result<()> {
        let token = self.auth.token(&self.client).await?;
        let mut url = self.values_url("A:O")?;
        let path = format!("{}:append", url.path());
        url.set_path(&path);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": [row.to_cells()] }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error("sheets", response).await);
        }

        info!("Appended log row");
        Ok(())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleCredentials;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SheetsClient {
        SheetsClient::new(&SheetsConfig {
            spreadsheet_id: "sheet-123".into(),
            sheet_name: "Sheet1".into(),
            credentials: GoogleCredentials::AccessToken("ya29.test".into()),
        })
        .with_base_url(server.uri())
    }

    fn sample_row() -> LogRow {
        LogRow {
            date: "2025-01-05".into(),
            topic: "Rainy day games".into(),
            angle: "indoor enrichment".into(),
            post_type: "engagement".into(),
            breed: "Beagle".into(),
            fur_color: "tricolor".into(),
            caption: "Stuck inside?".into(),
            hashtags: "#dogs #rainyday".into(),
            alt_text: "A beagle by a window".into(),
            image_prompt: "beagle watching rain".into(),
            image_provider: "openai".into(),
            post_id: "fb:1_2|ig:3".into(),
            similarity_score: 0.25,
            facebook_status: "posted".into(),
            instagram_status: "posted".into(),
        }
    }

    #[tokio::test]
    async fn test_read_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123/values/Sheet1!A2:O"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Sheet1!A2:O3",
                "values": [["2025-01-01", "Leash manners", "x"], ["2025-01-02", "Puppy naps", 0.5]]
            })))
            .mount(&server)
            .await;

        let rows = client(&server).read_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].topic(), "Leash manners");
        assert_eq!(rows[1].cells()[2], "0.5");
    }

    #[tokio::test]
    async fn test_read_empty_sheet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "Sheet1!A2:O"})))
            .mount(&server)
            .await;

        assert!(client(&server).read_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_error_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "The caller does not have permission"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).read_rows().await.unwrap_err();
        assert!(err.to_string().contains("does not have permission"));
    }

    #[tokio::test]
    async fn test_append_then_read_preserves_columns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-123/values/Sheet1!A:O:append"))
            .and(query_param("valueInputOption", "USER_ENTERED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updates": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let sheets = client(&server);
        let row = sample_row();
        sheets.append_row(&row).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let written = body["values"].clone();

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123/values/Sheet1!A2:O"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": written })))
            .mount(&server)
            .await;

        let rows = sheets.read_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells(), row.to_cells().as_slice());
        assert_eq!(LogRow::from_cells(rows[0].cells()), row);
    }
}
