//! Run history kept in a spreadsheet.

mod auth;
mod client;
mod schema;

pub use auth::{GoogleAuth, TOKEN_URL};
pub use client::{SheetsClient, SHEETS_API_URL};
pub use schema::{HistoryRow, LogRow, COLUMN_COUNT, HEADERS};

use async_trait::async_trait;

use crate::error::Result;

/// Append-only store of published posts.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All data rows, oldest first.
    async fn read_rows(&self) -> Result<Vec<HistoryRow>>;

    /// Append one row after the last data row.
    async fn append_row(&self, row: &LogRow) -> Result<()>;
}
