//! CLI entry point for the fetcher tool.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fetcher_core::ban::BodyContains;
use fetcher_core::config::FetcherConfig;
use fetcher_core::fetcher::{DEFAULT_STALE_AFTER, Downloader, Fetched, ParseMode, Request};
use fetcher_core::throttle::ThrottleBounds;
use tracing::{debug, error, info, warn};

mod cli;

use cli::{Args, DEFAULT_CACHE_FILE, DEFAULT_THROTTLE_MAX_MS, DEFAULT_THROTTLE_MIN_MS};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries fetched content, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = match &args.config {
        Some(path) => FetcherConfig::load(path)?,
        None => FetcherConfig::load_default()?.unwrap_or_default(),
    };

    let urls = collect_urls(&args.urls)?;
    if urls.is_empty() {
        info!("No input provided. Pass URLs as arguments or pipe them via stdin.");
        return Ok(());
    }

    let downloader = build_downloader(&args, &config).await?;
    let mode = if args.raw {
        ParseMode::Raw
    } else if args.html {
        ParseMode::Html
    } else {
        ParseMode::Auto
    };

    let mut failed = 0usize;
    for url in &urls {
        let mut request = Request::new(url.as_str()).mode(mode);
        request.params.clone_from(&args.headers);

        match downloader.open(&request).await {
            Ok(fetched) => {
                info!(url = %url, origin = ?fetched.origin, "fetched");
                write_output(fetched, args.links)?;
            }
            Err(e) => {
                error!(url = %url, error = %e, "fetch failed");
                failed += 1;
            }
        }
    }

    info!(
        total = urls.len(),
        failed,
        waited_ms = downloader.throttle().total_waited().as_millis(),
        "done"
    );

    if failed > 0 {
        bail!("{failed} of {} URLs failed", urls.len());
    }
    Ok(())
}

async fn build_downloader(args: &Args, config: &FetcherConfig) -> Result<Downloader> {
    let cache_path = args
        .cache
        .clone()
        .or_else(|| config.cache_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE));

    let min_ms = args
        .throttle_min
        .or(config.throttle_min_ms)
        .unwrap_or(DEFAULT_THROTTLE_MIN_MS);
    let max_ms = args
        .throttle_max
        .or(config.throttle_max_ms)
        .unwrap_or(DEFAULT_THROTTLE_MAX_MS.max(min_ms));
    let bounds = ThrottleBounds::from_millis(min_ms, max_ms).context("invalid throttle bounds")?;

    let stale_after = args
        .stale_after
        .map(Duration::from_secs)
        .or_else(|| config.stale_after())
        .unwrap_or(DEFAULT_STALE_AFTER);

    let mut builder = Downloader::builder(&cache_path, bounds).stale_after(stale_after);

    if config.connect_timeout_secs.is_some() || config.read_timeout_secs.is_some() {
        let defaults = fetcher_core::transport::HttpTransportOptions::default();
        builder = builder.timeouts(
            config
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            config
                .read_timeout_secs
                .map_or(defaults.read_timeout, Duration::from_secs),
        );
    }
    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.as_str());
    }
    for (name, value) in &config.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(marker) = args.ban_marker.as_ref().or(config.ban_marker.as_ref()) {
        debug!(marker = %marker, "ban detection enabled");
        builder = builder.ban_detector(BodyContains::new(marker.as_bytes()));
    }

    debug!(
        cache = %cache_path.display(),
        min_ms,
        max_ms,
        stale_after_secs = stale_after.as_secs(),
        "opening downloader"
    );
    builder
        .build()
        .await
        .with_context(|| format!("failed to open cache '{}'", cache_path.display()))
}

fn collect_urls(args: &[String]) -> Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args.to_vec());
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }

    let mut urls = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        urls.push(trimmed.to_string());
    }
    Ok(urls)
}

fn write_output(fetched: Fetched, links_only: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();

    if links_only {
        match fetched.html() {
            Some(document) => {
                for link in document.links() {
                    writeln!(stdout, "{link}")?;
                }
            }
            None => warn!(url = %fetched.url, "not HTML, no links to print"),
        }
        return Ok(());
    }

    stdout.write_all(&fetched.into_bytes())?;
    stdout.flush()?;
    Ok(())
}
