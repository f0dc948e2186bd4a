//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Default cache file, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "fetcher-cache.sqlite";

/// Default lower throttle bound in milliseconds.
pub const DEFAULT_THROTTLE_MIN_MS: u64 = 1000;

/// Default upper throttle bound in milliseconds.
pub const DEFAULT_THROTTLE_MAX_MS: u64 = 3000;

/// Fetch URLs through a compressed disk cache with randomized throttling.
///
/// Resources younger than the staleness threshold are served from the cache
/// without touching the network. HTML is printed with every link rewritten
/// to an absolute URL.
#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to fetch (read from stdin, one per line, when omitted)
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Cache database file
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/fetcher/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Refetch cached resources at least this old, in seconds (0 always refetches)
    #[arg(long, value_name = "SECS")]
    pub stale_after: Option<u64>,

    /// Minimum delay between network requests in milliseconds (max 600000)
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub throttle_min: Option<u64>,

    /// Maximum delay between network requests in milliseconds (max 600000)
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub throttle_max: Option<u64>,

    /// Print bytes as received, never parsing HTML
    #[arg(long, conflicts_with = "html")]
    pub raw: bool,

    /// Parse every response as HTML
    #[arg(long)]
    pub html: bool,

    /// Print the absolute links of HTML documents instead of their markup
    #[arg(long, conflicts_with = "raw")]
    pub links: bool,

    /// Treat responses whose body contains TEXT as a ban
    #[arg(long, value_name = "TEXT")]
    pub ban_marker: Option<String>,

    /// Extra request header, part of the cache key (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
