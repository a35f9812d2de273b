//! Post drafting: prompt templates, provider fallback and the
//! normalization pass applied to whatever the model returns.

mod generator;
mod prompts;

pub use generator::{parse_drafts, ContentGenerator, DraftBatch, DraftSource, DRAFTS_PER_BATCH};
pub use prompts::PromptManager;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of post the model was asked to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PostType {
    Educational,
    Emotional,
    Engagement,
    Other(String),
}

impl PostType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Educational => "educational",
            Self::Emotional => "emotional",
            Self::Engagement => "engagement",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for PostType {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "educational" => Self::Educational,
            "emotional" => Self::Emotional,
            "engagement" => Self::Engagement,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl From<PostType> for String {
    fn from(value: PostType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub topic: String,
    pub angle: String,
    pub post_type: PostType,
    pub breed: Option<String>,
    pub fur_color: Option<String>,
    pub caption: String,
    /// Each entry starts with `#`.
    pub hashtags: Vec<String>,
    pub engagement_comment: String,
    pub image_prompt: String,
    pub alt_text: String,
}

impl PostDraft {
    /// Build a draft from loosely-typed model output.
    ///
    /// Text fields of the wrong type become empty strings and hashtags are
    /// coerced with [`normalize_hashtags`]. Returns `None` for non-objects and
    /// objects without a topic, which cannot be de-duplicated.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        let optional = |key: &str| Some(text(key)).filter(|s| !s.is_empty());

        let topic = text("topic");
        if topic.is_empty() {
            return None;
        }

        Some(Self {
            topic,
            angle: text("angle"),
            post_type: PostType::from(text("postType")),
            breed: optional("breed"),
            fur_color: optional("furColor"),
            caption: text("caption"),
            hashtags: normalize_hashtags(obj.get("hashtags").unwrap_or(&Value::Null)),
            engagement_comment: text("engagementComment"),
            image_prompt: text("imagePrompt"),
            alt_text: text("altText"),
        })
    }

    /// Topic as used for duplicate detection.
    pub fn normalized_topic(&self) -> String {
        normalize_topic(&self.topic)
    }

    /// Hashtags joined by single spaces.
    pub fn hashtag_line(&self) -> String {
        self.hashtags.join(" ")
    }

    /// Caption followed by a blank line and the hashtags. When `blog_link`
    /// appears more than once in the caption only the first occurrence is
    /// kept.
    pub fn full_caption(&self, blog_link: Option<&str>) -> String {
        let caption = match blog_link.filter(|l| !l.is_empty()) {
            Some(link) => collapse_repeated(&self.caption, link),
            None => self.caption.clone(),
        };
        if self.hashtags.is_empty() {
            caption
        } else {
            format!("{caption}\n\n{}", self.hashtag_line())
        }
    }
}

/// Trim and lowercase a topic.
pub fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}

/// Coerce a hashtag field into `#`-prefixed strings.
///
/// Accepts an array of strings, a single string delimited by whitespace or
/// commas, or anything else (which yields an empty list). Order is kept and
/// exact duplicates are dropped.
pub fn normalize_hashtags(value: &Value) -> Vec<String> {
    let mut raw: Vec<&str> = Vec::new();
    match value {
        Value::String(s) => raw.push(s),
        Value::Array(items) => raw.extend(items.iter().filter_map(Value::as_str)),
        _ => {}
    }

    let mut tags: Vec<String> = Vec::new();
    for token in raw
        .into_iter()
        .flat_map(|s| s.split(|c: char| c.is_whitespace() || c == ','))
    {
        let word = token.trim().trim_start_matches('#');
        if word.is_empty() {
            continue;
        }
        let tag = format!("#{word}");
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn collapse_repeated(text: &str, needle: &str) -> String {
    let Some(first) = text.find(needle) else {
        return text.to_string();
    };
    let split = first + needle.len();
    let (head, tail) = text.split_at(split);
    if !tail.contains(needle) {
        return text.to_string();
    }

    let tail = tail.replace(needle, "");
    let joined = format!("{head}{tail}");
    let lines: Vec<&str> = joined.lines().map(str::trim_end).collect();

    // drop blank runs left behind by removed links
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() && out.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hashtags_from_array() {
        let tags = normalize_hashtags(&json!(["dogs", "#puppylove", " DogTraining "]));
        assert_eq!(tags, vec!["#dogs", "#puppylove", "#DogTraining"]);
    }

    #[test]
    fn test_hashtags_from_delimited_string() {
        let tags = normalize_hashtags(&json!("#dogs #pets,#dogs\n#walks"));
        assert_eq!(tags, vec!["#dogs", "#pets", "#walks"]);
    }

    #[test]
    fn test_hashtags_from_missing_or_wrong_type() {
        assert!(normalize_hashtags(&Value::Null).is_empty());
        assert!(normalize_hashtags(&json!(42)).is_empty());
        assert_eq!(normalize_hashtags(&json!([1, "x"])), vec!["#x"]);
    }

    #[test]
    fn test_from_value_defaults_wrong_types() {
        let draft = PostDraft::from_value(&json!({
            "topic": "Winter paw care",
            "postType": "Educational",
            "caption": 12,
            "hashtags": "dogs pets",
            "engagementComment": null,
            "breed": "",
            "furColor": "golden"
        }))
        .unwrap();

        assert_eq!(draft.post_type, PostType::Educational);
        assert_eq!(draft.caption, "");
        assert_eq!(draft.engagement_comment, "");
        assert_eq!(draft.image_prompt, "");
        assert_eq!(draft.alt_text, "");
        assert_eq!(draft.breed, None);
        assert_eq!(draft.fur_color.as_deref(), Some("golden"));
        assert_eq!(draft.hashtags, vec!["#dogs", "#pets"]);
    }

    #[test]
    fn test_from_value_requires_topic() {
        assert!(PostDraft::from_value(&json!({"caption": "hi"})).is_none());
        assert!(PostDraft::from_value(&json!("text")).is_none());
    }

    #[test]
    fn test_post_type_other_round_trip() {
        let t = PostType::from("Storytelling".to_string());
        assert_eq!(t, PostType::Other("Storytelling".into()));
        assert_eq!(t.to_string(), "Storytelling");
    }

    #[test]
    fn test_full_caption_appends_hashtags() {
        let draft = PostDraft::from_value(&json!({
            "topic": "t",
            "caption": "Hello",
            "hashtags": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(draft.full_caption(None), "Hello\n\n#a #b");
    }

    #[test]
    fn test_full_caption_collapses_duplicate_link() {
        let link = "https://furryfable.com/blogs/winter";
        let draft = PostDraft::from_value(&json!({
            "topic": "t",
            "caption": format!("Read this {link}\n\nFull post: {link}"),
            "hashtags": []
        }))
        .unwrap();

        let caption = draft.full_caption(Some(link));
        assert_eq!(caption.matches(link).count(), 1);
        assert!(caption.starts_with("Read this https://"));
        assert!(caption.ends_with("Full post:"));
    }
}
