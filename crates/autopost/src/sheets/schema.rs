//! Spreadsheet row layout.

use serde::{Deserialize, Serialize};

/// Number of columns in the log sheet (A through O).
pub const COLUMN_COUNT: usize = 15;

/// Header row matching [`LogRow::to_cells`].
pub const HEADERS: [&str; COLUMN_COUNT] = [
    "date",
    "topic",
    "angle",
    "postType",
    "breed",
    "furColor",
    "caption",
    "hashtags",
    "altText",
    "imagePrompt",
    "imageProvider",
    "postId",
    "similarityScore",
    "facebookStatus",
    "instagramStatus",
];

const TOPIC_COLUMN: usize = 1;

/// One row read back from the log, used only for lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRow {
    cells: Vec<String>,
}

impl HistoryRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// The topic column, or an empty string for short rows.
    pub fn topic(&self) -> &str {
        self.cells.get(TOPIC_COLUMN).map_or("", |s| s.trim())
    }
}

impl AsRef<[String]> for HistoryRow {
    fn as_ref(&self) -> &[String] {
        &self.cells
    }
}

impl From<&LogRow> for HistoryRow {
    fn from(row: &LogRow) -> Self {
        Self::new(row.to_cells())
    }
}

/// One published post, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRow {
    pub date: String,
    pub topic: String,
    pub angle: String,
    pub post_type: String,
    pub breed: String,
    pub fur_color: String,
    pub caption: String,
    pub hashtags: String,
    pub alt_text: String,
    pub image_prompt: String,
    pub image_provider: String,
    pub post_id: String,
    pub similarity_score: f64,
    pub facebook_status: String,
    pub instagram_status: String,
}

impl LogRow {
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.topic.clone(),
            self.angle.clone(),
            self.post_type.clone(),
            self.breed.clone(),
            self.fur_color.clone(),
            self.caption.clone(),
            self.hashtags.clone(),
            self.alt_text.clone(),
            self.image_prompt.clone(),
            self.image_provider.clone(),
            self.post_id.clone(),
            format!("{:.2}", self.similarity_score),
            self.facebook_status.clone(),
            self.instagram_status.clone(),
        ]
    }

    /// Rebuild a row from cells; missing trailing cells become empty.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        Self {
            date: cell(0),
            topic: cell(1),
            angle: cell(2),
            post_type: cell(3),
            breed: cell(4),
            fur_color: cell(5),
            caption: cell(6),
            hashtags: cell(7),
            alt_text: cell(8),
            image_prompt: cell(9),
            image_provider: cell(10),
            post_id: cell(11),
            similarity_score: cell(12).trim().parse().unwrap_or(0.0),
            facebook_status: cell(13),
            instagram_status: cell(14),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_follow_header_order() {
        let row = LogRow {
            date: "2025-01-05".into(),
            topic: "Leash manners".into(),
            post_id: "fb:1|ig:2".into(),
            similarity_score: 0.333,
            instagram_status: "posted".into(),
            ..Default::default()
        };
        let cells = row.to_cells();

        assert_eq!(cells.len(), COLUMN_COUNT);
        assert_eq!(cells[HEADERS.iter().position(|h| *h == "topic").unwrap()], "Leash manners");
        assert_eq!(cells[11], "fb:1|ig:2");
        assert_eq!(cells[12], "0.33");
        assert_eq!(cells[14], "posted");
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let row = LogRow::from_cells(&["2024-12-01".to_string(), "Old topic".to_string()]);
        assert_eq!(row.topic, "Old topic");
        assert_eq!(row.instagram_status, "");
        assert!(row.similarity_score.abs() < f64::EPSILON);

        let history = HistoryRow::new(vec!["2024-12-01".into()]);
        assert_eq!(history.topic(), "");
    }
}
