use std::time::Duration;

use eyre::{Result, WrapErr};

use crate::watchers::IndexerClient;

/// Parse a comma-separated endpoint URL string into individual trimmed URLs.
/// Order is kept as priority order; later duplicates are dropped.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for url in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Create indexer clients for each URL, in priority order.
pub fn create_indexer_clients(
    urls: &[String],
    token: Option<&str>,
    timeout: Duration,
) -> Result<Vec<IndexerClient>> {
    if urls.is_empty() {
        return Err(eyre::eyre!("At least one indexer URL is required"));
    }
    urls.iter()
        .map(|url| {
            url::Url::parse(url).wrap_err_with(|| format!("Invalid indexer URL: {}", url))?;
            IndexerClient::new(url, token, timeout)
        })
        .collect()
}
