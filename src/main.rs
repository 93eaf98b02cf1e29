use anyhow::{Context, Result};
use clap::Parser;
use flick::api::HttpFeedApi;
use flick::config::Config;
use flick::feed::{FeedController, FeedEvent, FeedGateway, FeedItem, LoadMore, ViewportTracker};
use flick::util::{format_count, strip_control_chars, truncate_to_width};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod app;
mod ui;

use app::App;

/// Idle time after which headless mode assumes background work is done.
const SETTLE_QUIET: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "flick", about = "Terminal client for short-video and poll feeds")]
struct Args {
    /// Feed API base URL (overrides the config file)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Path to config.toml (default: ~/.config/flick/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the first page plus N more pages to stdout and exit
    #[arg(long, value_name = "N")]
    print: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            tracing::warn!("HOME not set, using default configuration");
            Config::default()
        }
    };
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(concat!("flick/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let api = HttpFeedApi::new(client, &config.api_base_url)
        .with_context(|| format!("Invalid API base URL '{}'", config.api_base_url))?
        .with_token(config.api_token())
        .with_timeout(config.request_timeout());
    tracing::info!(base_url = %api.base_url(), "Using feed API");

    let gateway = Arc::new(FeedGateway::new(Arc::new(api), config.cache_ttl()));
    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(64);
    let feed = FeedController::new(gateway, config.feed_options(), event_tx);
    let viewport = ViewportTracker::new(
        f64::from(config.item_height),
        config.preload_threshold,
        config.load_more_lookahead,
    );

    if let Some(pages) = args.print {
        return print_feed(feed, event_rx, pages).await;
    }

    let mut app = App::new(feed, viewport);
    ui::run(&mut app, event_rx).await?;
    Ok(())
}

// ============================================================================
// Headless Mode
// ============================================================================

/// Loads the first batch plus `pages` more and prints one line per item.
async fn print_feed(
    mut feed: FeedController,
    mut rx: mpsc::Receiver<FeedEvent>,
    pages: usize,
) -> Result<()> {
    feed.load_initial();
    wait_until(&mut feed, &mut rx, |f| !f.initial_loading()).await;
    if let Some(err) = feed.error() {
        anyhow::bail!("Initial load failed: {err}");
    }

    let mut loaded = 0;
    while loaded < pages {
        match feed.load_more() {
            LoadMore::Appended(_) => loaded += 1,
            LoadMore::Requested => {
                wait_until(&mut feed, &mut rx, |f| !f.loading()).await;
                if let Some(err) = feed.error() {
                    eprintln!("Warning: {err}");
                    break;
                }
                loaded += 1;
            }
            LoadMore::Skipped => break,
        }
    }

    settle(&mut feed, &mut rx).await;

    for (i, item) in feed.items().iter().enumerate() {
        println!("{}", item_line(i, item));
    }
    if !feed.has_more() {
        println!("-- end of feed ({} items)", feed.items().len());
    }
    Ok(())
}

/// Applies task events until `done` holds. Every spawned task reports
/// exactly once, panics included.
async fn wait_until(
    feed: &mut FeedController,
    rx: &mut mpsc::Receiver<FeedEvent>,
    done: impl Fn(&FeedController) -> bool,
) {
    while !done(feed) {
        match rx.recv().await {
            Some(event) => {
                feed.handle_event(event);
            }
            None => break,
        }
    }
}

/// Applies events until the channel has been quiet for a while, so detail
/// upgrades started by the last load land before printing.
async fn settle(feed: &mut FeedController, rx: &mut mpsc::Receiver<FeedEvent>) {
    while let Ok(Some(event)) = tokio::time::timeout(SETTLE_QUIET, rx.recv()).await {
        feed.handle_event(event);
    }
}

fn item_line(index: usize, item: &FeedItem) -> String {
    let author = strip_control_chars(item.author());
    let caption = strip_control_chars(item.caption());
    let detail = match item {
        FeedItem::Full(full) => format!(
            "{} likes, {} votes",
            format_count(full.like_count),
            format_count(full.total_votes())
        ),
        FeedItem::Lightweight(_) => "preview".to_string(),
    };
    format!(
        "{:>4}  {:<12} @{:<16} {:<48} [{detail}]",
        index + 1,
        item.id().as_str(),
        truncate_to_width(&author, 16),
        truncate_to_width(&caption, 48)
    )
}
