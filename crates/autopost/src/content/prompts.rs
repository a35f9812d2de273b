//! Prompt templates.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::Result;
use crate::feed::BlogRef;

/// System message sent ahead of every drafting prompt.
pub const SYSTEM_PROMPT: &str = "You are a professional social media strategist.";

/// Brand the posts are written for.
pub const BRAND: &str = "FurryFable";

/// Number of history topics shown to the model.
pub const RECENT_TOPIC_WINDOW: usize = 15;

/// Data rendered into the drafting template.
#[derive(Debug, Serialize)]
pub struct DraftPromptData<'a> {
    pub brand: &'a str,
    pub count: usize,
    pub blog: Option<&'a BlogRef>,
    pub recent_topics: Vec<&'a str>,
}

/// Manages Handlebars prompt templates.
pub struct PromptManager {
    handlebars: Handlebars<'static>,
}

impl PromptManager {
    /// Create a new prompt manager with embedded templates.
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // prompts are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_template_string("drafts", DRAFTS_TEMPLATE)?;

        Ok(Self { handlebars })
    }

    /// Render a template with the given data.
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String> {
        Ok(self.handlebars.render(template, data)?)
    }

    /// Render the drafting prompt.
    pub fn drafts(&self, data: &DraftPromptData<'_>) -> Result<String> {
        self.render("drafts", data)
    }
}

const DRAFTS_TEMPLATE: &str = r#"You are creating {{count}} high-quality social media posts for the brand {{brand}}.

Brand personality:
- Warm
- Intelligent
- Trustworthy
- Friendly but confident
- Community-focused
- Never salesy
- Never promotional of specific brands

{{#if blog}}
There is a new blog post available:
Title: {{blog.title}}
Link: {{blog.link}}
Summary: {{blog.description}}

One of the {{count}} posts MUST meaningfully reference this blog.
Do NOT fabricate additional links.
{{else}}
No new blog post today.
Do NOT reference any blog.
{{/if}}

Recent topics already used:
{{#each recent_topics}}
- {{this}}
{{else}}
(none yet)
{{/each}}

Topic Diversity & Rotation Rules:
- Do NOT repeat topics from the recent list.
- Avoid clustering medical topics (dental, illness, vet visits, hydration).
- At least 2 of the {{count}} posts must NOT be health-related.
- Rotate between:
  1. Pet-owner bonding
  2. Training
  3. Enrichment
  4. Seasonal care
  5. Behavior insights
  6. Fun facts
  7. Lifestyle moments
  8. Safety tips
  9. Emotional storytelling
  10. Light nutrition (non-medical)

Hard Restrictions:
- No fake statistics.
- No fake links.
- No product brands.
- No fabricated medical claims.
- No overly clinical tone.
- No repetitive themes.

For EACH post, return:

{
  "topic": short theme title,
  "angle": short angle summary,
  "postType": "educational" | "emotional" | "engagement",
  "breed": optional breed if relevant,
  "furColor": optional,
  "caption": full caption text,
  "hashtags": 6-8 relevant hashtags as array,
  "engagementComment": 1-2 sentence brand-voice comment that encourages replies, asks ONE clear open-ended question, sounds like the brand (not a follower) and never reacts like a user,
  "imagePrompt": short scene description for image generation,
  "altText": one sentence describing the image for screen readers
}

Return ONLY a valid JSON array with exactly {{count}} posts.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> BlogRef {
        BlogRef {
            title: "Winter Walks".into(),
            link: "https://furryfable.com/blogs/winter?a=1&b=2".into(),
            description: "Keep paws warm.".into(),
        }
    }

    #[test]
    fn test_drafts_with_blog() {
        let prompts = PromptManager::new().unwrap();
        let blog = blog();
        let text = prompts
            .drafts(&DraftPromptData {
                brand: BRAND,
                count: 3,
                blog: Some(&blog),
                recent_topics: vec!["Leash training", "Puppy teeth"],
            })
            .unwrap();

        assert!(text.contains("brand FurryFable"));
        assert!(text.contains("Link: https://furryfable.com/blogs/winter?a=1&b=2"));
        assert!(text.contains("MUST meaningfully reference this blog"));
        assert!(text.contains("- Leash training\n"));
        assert!(text.contains("exactly 3 posts"));
    }

    #[test]
    fn test_drafts_without_blog() {
        let prompts = PromptManager::new().unwrap();
        let text = prompts
            .drafts(&DraftPromptData {
                brand: BRAND,
                count: 3,
                blog: None,
                recent_topics: vec![],
            })
            .unwrap();

        assert!(text.contains("No new blog post today."));
        assert!(text.contains("(none yet)"));
        assert!(!text.contains("Link:"));
    }
}
