//! Default User-Agent for network requests.
//!
//! Scraped sites commonly serve degraded pages or ban pages to clients that
//! identify as tools, so requests present as a desktop browser unless the
//! caller configures otherwise.

/// Browser User-Agent sent when none is configured.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Returns the User-Agent to send when none is configured.
#[must_use]
pub(crate) fn default_user_agent() -> &'static str {
    BROWSER_USER_AGENT
}
