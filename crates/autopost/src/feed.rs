//! Blog feed reader.
//!
//! Fetches the syndication feed once per run and keeps only the newest entry.
//! Every failure path resolves to `None`; the next scheduled run tries again.

use async_trait::async_trait;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{AutopostError, Result};

/// The most recent blog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogRef {
    pub title: String,
    pub link: String,
    pub description: String,
}

impl BlogRef {
    /// Whether any cell of any history row already mentions this entry.
    pub fn appears_in<'a, I, R>(&self, rows: I) -> bool
    where
        I: IntoIterator<Item = &'a R>,
        R: AsRef<[String]> + 'a + ?Sized,
    {
        if self.link.is_empty() {
            return false;
        }
        rows.into_iter()
            .any(|row| row.as_ref().iter().any(|cell| cell.contains(&self.link)))
    }
}

/// Something that can produce the latest blog entry.
#[async_trait]
pub trait BlogSource: Send + Sync {
    /// Latest entry, or `None` when unavailable.
    async fn latest(&self) -> Option<BlogRef>;
}

/// HTTP feed reader accepting RSS 2.0 or Atom.
pub struct FeedReader {
    client: reqwest::Client,
    url: String,
}

impl FeedReader {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("autopost/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Option<BlogRef>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(crate::error::api_error("feed", response).await);
        }
        let body = response.bytes().await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl BlogSource for FeedReader {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn latest(&self) -> Option<BlogRef> {
        match self.fetch().await {
            Ok(Some(blog)) => {
                info!(title = %blog.title, link = %blog.link, "Fetched latest blog entry");
                Some(blog)
            }
            Ok(None) => {
                info!("Feed has no entries");
                None
            }
            Err(e) => {
                warn!(error = %e, "Feed unavailable, continuing without blog context");
                None
            }
        }
    }
}

/// Parse the first item of an RSS channel or the first entry of an Atom feed.
pub fn parse_feed(body: &[u8]) -> Result<Option<BlogRef>> {
    match rss::Channel::read_from(body) {
        Ok(channel) => {
            debug!(items = channel.items().len(), "Parsed RSS channel");
            return Ok(channel.items().first().map(|item| BlogRef {
                title: clean(item.title().unwrap_or_default()),
                link: item.link().unwrap_or_default().trim().to_string(),
                description: clean(
                    item.description()
                        .or_else(|| item.content())
                        .unwrap_or_default(),
                ),
            }));
        }
        Err(rss_err) => debug!(error = %rss_err, "Not an RSS channel, trying Atom"),
    }

    let feed = atom_syndication::Feed::read_from(body)
        .map_err(|e| AutopostError::Feed(format!("neither RSS nor Atom: {e}")))?;
    debug!(entries = feed.entries().len(), "Parsed Atom feed");

    Ok(feed.entries().first().map(|entry| {
        let link = entry
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|l| l.href().trim().to_string())
            .unwrap_or_default();
        let description = entry
            .summary()
            .map(|s| s.value.clone())
            .or_else(|| entry.content().and_then(|c| c.value().map(str::to_string)))
            .unwrap_or_default();
        BlogRef {
            title: clean(&entry.title().value),
            link,
            description: clean(&description),
        }
    }))
}

/// Drop markup, decode entities and collapse whitespace.
fn clean(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    let plain = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    plain.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>FurryFable</title>
  <link>https://furryfable.com</link>
  <description>Blog</description>
  <item>
    <title>Walking Your Dog in Winter</title>
    <link>https://furryfable.com/blogs/winter-walks</link>
    <description><![CDATA[<p>Keep paws <b>warm</b> and dry.</p>]]></description>
  </item>
  <item>
    <title>Older Post</title>
    <link>https://furryfable.com/blogs/older</link>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>FurryFable</title>
  <id>urn:furryfable</id>
  <updated>2025-01-01T00:00:00Z</updated>
  <entry>
    <title>Puppy Teething Guide</title>
    <id>urn:teething</id>
    <updated>2025-01-01T00:00:00Z</updated>
    <link rel="alternate" href="https://furryfable.com/blogs/teething"/>
    <summary>Chew toys help.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_first_item() {
        let blog = parse_feed(RSS.as_bytes()).unwrap().unwrap();
        assert_eq!(blog.title, "Walking Your Dog in Winter");
        assert_eq!(blog.link, "https://furryfable.com/blogs/winter-walks");
        assert_eq!(blog.description, "Keep paws warm and dry.");
    }

    #[test]
    fn test_description_keeps_text_and_decodes_entities() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>FurryFable</title>
  <link>https://furryfable.com</link>
  <description>Blog</description>
  <item>
    <title>Treat Math</title>
    <link>https://furryfable.com/blogs/treat-math</link>
    <description><![CDATA[<p>Keep treats < 10% of daily calories. Don&#8217;t overdo it &amp; stay consistent [&#8230;]</p>]]></description>
  </item>
</channel></rss>"#;

        let blog = parse_feed(feed.as_bytes()).unwrap().unwrap();
        assert_eq!(
            blog.description,
            "Keep treats < 10% of daily calories. Don\u{2019}t overdo it & stay consistent [\u{2026}]"
        );
    }

    #[test]
    fn test_parse_atom_first_entry() {
        let blog = parse_feed(ATOM.as_bytes()).unwrap().unwrap();
        assert_eq!(blog.title, "Puppy Teething Guide");
        assert_eq!(blog.link, "https://furryfable.com/blogs/teething");
        assert_eq!(blog.description, "Chew toys help.");
    }

    #[test]
    fn test_empty_channel_is_none() {
        let xml = r#"<rss version="2.0"><channel><title>t</title><link>l</link><description>d</description></channel></rss>"#;
        assert!(parse_feed(xml.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_feed(b"<html>nope</html>").is_err());
    }

    #[test]
    fn test_appears_in_history() {
        let blog = BlogRef {
            title: "t".into(),
            link: "https://furryfable.com/blogs/winter-walks".into(),
            description: String::new(),
        };
        let rows = vec![
            vec!["2025-01-01".to_string(), "Leash training".to_string()],
            vec![
                "2025-01-02".to_string(),
                "Read more: https://furryfable.com/blogs/winter-walks #dogs".to_string(),
            ],
        ];
        assert!(blog.appears_in(&rows));
        assert!(!blog.appears_in(&rows[..1]));
    }

    #[tokio::test]
    async fn test_reader_fetches_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let reader = FeedReader::new(format!("{}/feed", server.uri()));
        let blog = reader.latest().await.unwrap();
        assert_eq!(blog.title, "Walking Your Dog in Winter");
    }

    #[tokio::test]
    async fn test_reader_soft_fails_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let reader = FeedReader::new(format!("{}/feed", server.uri()));
        assert!(reader.latest().await.is_none());
    }
}
