//! Autopost CLI - blog-to-social content pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autopost::config::AppConfig;
use autopost::feed::{BlogSource, FeedReader};
use autopost::pipeline::{Pipeline, PipelineSettings, MAX_GENERATION_ATTEMPTS};
use autopost::protocol::PublishProtocol;
use autopost::sheets::{HistoryStore, LogRow, SheetsClient};
use autopost::social::InstagramAccount;
use autopost::storefront::{MediaHost, ShopifyClient, StorefrontHost};
use autopost::PublishOutcome;

/// Autopost CLI - draft, illustrate and publish social posts.
#[derive(Parser)]
#[command(name = "autopost")]
#[command(about = "Blog-to-social content pipeline")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline once
    Run {
        /// Posts to publish (overrides POSTS_PER_RUN)
        #[arg(long)]
        posts: Option<usize>,

        /// Seconds between posts (overrides INTER_POST_DELAY_SECS)
        #[arg(long)]
        delay_secs: Option<u64>,
    },

    /// Print the latest blog feed entry
    Feed,

    /// Print recent log rows
    History {
        /// Rows to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Upload an image to the storefront and print its CDN URL
    Upload {
        /// Local image file
        path: PathBuf,
    },

    /// Publish one image URL to Instagram
    Instagram {
        /// Public, query-free image URL
        #[arg(long)]
        image_url: String,

        /// Caption text
        #[arg(long)]
        caption: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("autopost=debug,llm=debug,info")
        } else {
            EnvFilter::new("autopost=info,llm=info,warn")
        }
    });

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Run { posts, delay_secs } => run_pipeline(posts, delay_secs).await,
        Commands::Feed => run_feed().await,
        Commands::History { limit } => run_history(limit).await,
        Commands::Upload { path } => run_upload(path).await,
        Commands::Instagram { image_url, caption } => run_instagram(&image_url, &caption).await,
    }
}

async fn run_pipeline(posts: Option<usize>, delay_secs: Option<u64>) -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    config.log_channels();

    let settings = PipelineSettings {
        posts_per_run: posts.unwrap_or(config.run.posts_per_run).max(1),
        inter_post_delay: delay_secs.map_or(config.run.inter_post_delay, Duration::from_secs),
        generation_attempts: MAX_GENERATION_ATTEMPTS,
    };
    tracing::info!(
        posts = settings.posts_per_run,
        delay_secs = settings.inter_post_delay.as_secs(),
        "Starting run"
    );

    let pipeline = Pipeline::from_config(&config)?.with_settings(settings);
    let report = pipeline.run().await.context("Run aborted")?;
    tracing::debug!(report = %serde_json::to_string(&report)?, "Run report");

    println!("\n📊 Run Summary");
    match (&report.blog_used, report.skipped_blog) {
        (Some(blog), _) => println!("   Blog: {} ({})", blog.title, blog.link),
        (None, true) => println!("   Blog: already promoted, skipped"),
        (None, false) => println!("   Blog: none"),
    }
    for post in &report.posts {
        println!(
            "   📝 {}{} [attempts {}, similarity {:.2}]",
            post.topic,
            if post.forced { " (forced)" } else { "" },
            post.attempts,
            post.similarity
        );
        println!("      Image: {} {}", post.image_provider, post.image_url.as_deref().unwrap_or("(not hosted)"));
        println!("      Facebook: {}", post.facebook);
        println!("      Instagram: {}", post.instagram);
    }

    Ok(())
}

async fn run_feed() -> Result<()> {
    let url = std::env::var("FEED_URL").unwrap_or_else(|_| autopost::config::DEFAULT_FEED_URL.to_string());
    let reader = FeedReader::new(url);

    match reader.latest().await {
        Some(blog) => {
            println!("📰 {}", blog.title);
            println!("   {}", blog.link);
            if !blog.description.is_empty() {
                println!("   {}", blog.description);
            }
        }
        None => println!("none"),
    }
    Ok(())
}

async fn run_history(limit: usize) -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let sheets = SheetsClient::new(&config.sheets);
    let rows = sheets.read_rows().await?;

    if rows.is_empty() {
        println!("No rows logged yet.");
        return Ok(());
    }

    let skip = rows.len().saturating_sub(limit);
    for row in &rows[skip..] {
        let row = LogRow::from_cells(row.cells());
        println!(
            "{} | {} | {} | fb={} ig={} | {}",
            row.date, row.topic, row.post_type, row.facebook_status, row.instagram_status, row.post_id
        );
    }
    println!("Total: {} rows", rows.len());
    Ok(())
}

async fn run_upload(path: PathBuf) -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let shopify = config
        .shopify
        .as_ref()
        .context("Storefront not configured (SHOPIFY_STORE_NAME and credentials)")?;
    let protocol = PublishProtocol::new(PublishProtocol::default().restart, config.run.poll);
    let host = StorefrontHost::new(ShopifyClient::new(shopify), protocol);

    let url = host
        .host_image(&path)
        .await
        .with_context(|| format!("Upload of {} did not complete", path.display()))?;
    println!("{url}");
    Ok(())
}

async fn run_instagram(image_url: &str, caption: &str) -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let instagram = config
        .instagram
        .as_ref()
        .context("Instagram not configured (IG_USER_ID and FB_PAGE_ACCESS_TOKEN)")?;
    let protocol = PublishProtocol::new(PublishProtocol::default().restart, config.run.poll);
    let account = InstagramAccount::new(instagram, protocol);

    match account.publish_image(image_url, caption).await {
        PublishOutcome::Published { output, polls } => {
            println!("🚀 Published {output} after {polls} status checks");
            Ok(())
        }
        PublishOutcome::Failed { state, reason } => anyhow::bail!("Instagram publish failed in {state}: {reason}"),
        PublishOutcome::TimedOut { polls } => anyhow::bail!("Instagram media not ready after {polls} status checks"),
    }
}
