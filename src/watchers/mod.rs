//! Source Reader
//!
//! Queries an ordered list of interchangeable indexer endpoints for the
//! transactions of the deposit application, falling back to the next
//! endpoint on any failure, and pages through results up to a hard cap.

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::metrics;

pub mod indexer;

pub use indexer::IndexerClient;

/// Indexer search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxQuery {
    pub application_id: u64,
    pub min_round: u64,
    pub limit: u32,
    pub next_token: Option<String>,
}

/// A source transaction with its base64 encoded logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTransaction {
    pub id: String,
    pub confirmed_round: u64,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxPage {
    pub transactions: Vec<SourceTransaction>,
    pub next_token: Option<String>,
}

/// Result of one bounded scan
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    /// All transactions seen, sorted ascending by confirmed round
    pub transactions: Vec<SourceTransaction>,
    pub pages: u32,
    /// False when the page cap stopped the scan with results remaining
    pub exhausted: bool,
}

/// One indexer endpoint
#[async_trait]
pub trait IndexerEndpoint: Send + Sync {
    fn url(&self) -> &str;

    async fn search_transactions(&self, query: &TxQuery) -> Result<TxPage>;
}

/// Current head round of a chain
#[async_trait]
pub trait ChainHead: Send + Sync {
    async fn head_round(&self) -> Result<u64>;
}

pub struct SourceReader {
    endpoints: Vec<Box<dyn IndexerEndpoint>>,
    application_id: u64,
}

impl SourceReader {
    pub fn new(endpoints: Vec<Box<dyn IndexerEndpoint>>, application_id: u64) -> Self {
        Self {
            endpoints,
            application_id,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn primary_url(&self) -> Option<&str> {
        self.endpoints.first().map(|e| e.url())
    }

    /// Run one query, trying endpoints in order until one succeeds
    pub async fn query(
        &self,
        min_round: u64,
        limit: u32,
        next_token: Option<String>,
    ) -> Result<TxPage, RelayError> {
        let query = TxQuery {
            application_id: self.application_id,
            min_round,
            limit,
            next_token,
        };

        let mut last_error = String::from("no indexer endpoints configured");
        for endpoint in &self.endpoints {
            match endpoint.search_transactions(&query).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!(
                        url = endpoint.url(),
                        min_round,
                        error = %e,
                        "Indexer endpoint failed, trying next"
                    );
                    metrics::record_indexer_failover(endpoint.url());
                    last_error = format!("{}: {:#}", endpoint.url(), e);
                }
            }
        }

        Err(RelayError::SourceUnavailable {
            attempted: self.endpoints.len(),
            last_error,
        })
    }

    /// Page forward from `min_round`, fetching at most `max_pages` pages.
    /// Transactions come back sorted by confirmed round regardless of the
    /// order the endpoint returned them in.
    pub async fn scan(
        &self,
        min_round: u64,
        limit: u32,
        max_pages: u32,
    ) -> Result<ScanBatch, RelayError> {
        let mut batch = ScanBatch::default();
        let mut next_token = None;

        loop {
            if batch.pages >= max_pages {
                debug!(pages = batch.pages, "Page cap reached, deferring to next cycle");
                break;
            }

            let page = self.query(min_round, limit, next_token.take()).await?;
            batch.pages += 1;
            let empty = page.transactions.is_empty();
            batch.transactions.extend(page.transactions);

            match page.next_token {
                Some(token) if !empty => next_token = Some(token),
                _ => {
                    batch.exhausted = true;
                    break;
                }
            }
        }

        batch.transactions.sort_by_key(|tx| tx.confirmed_round);
        Ok(batch)
    }
}
