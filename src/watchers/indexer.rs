//! Indexer HTTP client

use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::{de, Deserialize, Deserializer};
use tracing::debug;

use super::{IndexerEndpoint, SourceTransaction, TxPage, TxQuery};

const TOKEN_HEADER: &str = "X-Indexer-API-Token";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    transactions: Vec<IndexedTransaction>,
    #[serde(rename = "next-token", default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexedTransaction {
    id: String,
    #[serde(
        rename = "confirmed-round",
        default,
        deserialize_with = "deserialize_string_or_u64"
    )]
    confirmed_round: u64,
    #[serde(default)]
    logs: Vec<String>,
}

/// One indexer endpoint
#[derive(Clone)]
pub struct IndexerClient {
    url: String,
    token: Option<String>,
    client: Client,
}

impl std::fmt::Debug for IndexerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerClient")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl IndexerClient {
    pub fn new(url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
            client,
        })
    }
}

#[async_trait]
impl IndexerEndpoint for IndexerClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn search_transactions(&self, query: &TxQuery) -> Result<TxPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("application-id", query.application_id.to_string()),
            ("min-round", query.min_round.to_string()),
            ("limit", query.limit.to_string()),
            ("tx-type", "appl".to_string()),
        ];
        if let Some(next) = &query.next_token {
            params.push(("next", next.clone()));
        }

        let mut request = self
            .client
            .get(format!("{}/v2/transactions", self.url))
            .query(&params);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .wrap_err_with(|| format!("Indexer request to {} failed", self.url))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Indexer query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let body: SearchResponse = response
            .json()
            .await
            .wrap_err("Malformed indexer response")?;

        debug!(
            url = %self.url,
            min_round = query.min_round,
            count = body.transactions.len(),
            has_next = body.next_token.is_some(),
            "Indexer page fetched"
        );

        Ok(TxPage {
            transactions: body
                .transactions
                .into_iter()
                .map(|tx| SourceTransaction {
                    id: tx.id,
                    confirmed_round: tx.confirmed_round,
                    logs: tx.logs,
                })
                .collect(),
            next_token: body.next_token.filter(|t| !t.is_empty()),
        })
    }
}

/// Some indexer deployments return rounds as strings.
/// Handles both string "123" and numeric 123 formats.
fn deserialize_string_or_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrU64Visitor;

    impl de::Visitor<'_> for StringOrU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or unsigned integer")
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<u64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<u64, E>
        where
            E: de::Error,
        {
            u64::try_from(value).map_err(|_| E::custom(format!("negative round: {}", value)))
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<u64, E>
        where
            E: de::Error,
        {
            value.parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(StringOrU64Visitor)
}
