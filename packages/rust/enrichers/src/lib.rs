//! Lead enrichment collaborators.
//!
//! - [`WebsiteAnalyzer`]: is the site up, does it use HTTPS, any contact data on it
//! - [`SocialExtractor`]: social profile links from the homepage and contact pages
//! - [`HunterEnricher`]: optional domain search against Hunter.io, quota-aware
//!
//! All of them fetch through [`HttpFetcher`], which retries transient failures
//! with exponential backoff, and process leads one at a time with a fixed
//! pause in between.

pub mod contacts;
pub mod http;
pub mod hunter;
pub mod social;
pub mod website;

pub use http::{FetchedPage, HttpFetcher};
pub use hunter::HunterEnricher;
pub use social::SocialExtractor;
pub use website::WebsiteAnalyzer;

use std::time::Duration;

/// Fixed pause between outbound calls; zero disables it.
pub(crate) async fn throttle(delay_ms: u64) {
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

/// Add `https://` when the scheme is missing and drop trailing slashes.
pub fn normalize_site_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_site_urls() {
        assert_eq!(normalize_site_url("exemplo.com.br/"), "https://exemplo.com.br");
        assert_eq!(normalize_site_url("http://exemplo.com.br"), "http://exemplo.com.br");
        assert_eq!(normalize_site_url(" https://a.com/path// "), "https://a.com/path");
    }
}
