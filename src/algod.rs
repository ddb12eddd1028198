//! Node REST client
//!
//! Used on the source side for the head round and on the destination side
//! for escrow state, account holdings, transaction parameters, submission,
//! and confirmation.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use eyre::{eyre, Result, WrapErr};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::address_codec::Address;
use crate::watchers::ChainHead;
use crate::writers::transaction::TxParams;

const TOKEN_HEADER: &str = "X-Algo-API-Token";

#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    #[serde(rename = "last-round")]
    pub last_round: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TealValue {
    #[serde(rename = "type")]
    pub value_type: u64,
    #[serde(default)]
    pub uint: u64,
    #[serde(default)]
    pub bytes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateEntry {
    /// Base64 encoded key name
    pub key: String,
    pub value: TealValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApplicationParams {
    #[serde(rename = "global-state", default)]
    global_state: Vec<StateEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApplicationResponse {
    #[serde(default)]
    params: ApplicationParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetHolding {
    #[serde(rename = "asset-id")]
    pub asset_id: u64,
    #[serde(default)]
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    assets: Vec<AssetHolding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestedParams {
    #[serde(default)]
    pub fee: u64,
    #[serde(rename = "min-fee", default)]
    pub min_fee: u64,
    #[serde(rename = "last-round")]
    pub last_round: u64,
    #[serde(rename = "genesis-id")]
    pub genesis_id: String,
    /// Base64 encoded genesis hash
    #[serde(rename = "genesis-hash")]
    pub genesis_hash: String,
}

impl SuggestedParams {
    /// Validity window `[last_round, last_round + validity_rounds]`
    pub fn to_tx_params(&self, validity_rounds: u64) -> Result<TxParams> {
        let hash = base64::engine::general_purpose::STANDARD
            .decode(&self.genesis_hash)
            .wrap_err("Invalid genesis hash encoding")?;
        let genesis_hash: [u8; 32] = hash
            .as_slice()
            .try_into()
            .map_err(|_| eyre!("Genesis hash must be 32 bytes, got {}", hash.len()))?;

        Ok(TxParams {
            first_valid: self.last_round,
            last_valid: self.last_round + validity_rounds,
            genesis_id: self.genesis_id.clone(),
            genesis_hash,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendingTransaction {
    #[serde(rename = "confirmed-round", default)]
    pub confirmed_round: u64,
    #[serde(rename = "pool-error", default)]
    pub pool_error: String,
}

/// Client for one node endpoint
#[derive(Clone)]
pub struct AlgodClient {
    base_url: String,
    token: String,
    client: Client,
}

impl std::fmt::Debug for AlgodClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgodClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl AlgodClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.header(TOKEN_HEADER, &self.token)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = self
            .get(path)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to query {}", what))?;
        let response = check_status(response, what).await?;
        response
            .json()
            .await
            .wrap_err_with(|| format!("Malformed {} response", what))
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.get_json("/v2/status", "node status").await
    }

    /// Block until the node has seen a round after `round`
    pub async fn status_after_block(&self, round: u64) -> Result<NodeStatus> {
        self.get_json(
            &format!("/v2/status/wait-for-block-after/{}", round),
            "node status",
        )
        .await
    }

    pub async fn application_global_state(&self, app_id: u64) -> Result<Vec<StateEntry>> {
        let app: ApplicationResponse = self
            .get_json(&format!("/v2/applications/{}", app_id), "application")
            .await?;
        Ok(app.params.global_state)
    }

    /// Read a uint global-state value by key name; an absent key reads as zero
    pub async fn global_uint(&self, app_id: u64, key: &str) -> Result<u64> {
        let encoded_key = base64::engine::general_purpose::STANDARD.encode(key.as_bytes());
        let state = self.application_global_state(app_id).await?;
        Ok(state
            .iter()
            .find(|entry| entry.key == encoded_key)
            .map(|entry| entry.value.uint)
            .unwrap_or(0))
    }

    pub async fn account_assets(&self, address: &Address) -> Result<Vec<AssetHolding>> {
        let account: AccountResponse = self
            .get_json(&format!("/v2/accounts/{}", address), "account")
            .await?;
        Ok(account.assets)
    }

    pub async fn suggested_params(&self) -> Result<SuggestedParams> {
        self.get_json("/v2/transactions/params", "transaction params")
            .await
    }

    /// Submit a signed transaction, returning the node-reported id
    pub async fn send_raw_transaction(&self, signed: &[u8]) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/v2/transactions", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(signed.to_vec());
        let response = self
            .authorize(request)
            .send()
            .await
            .wrap_err("Failed to submit transaction")?;
        let response = check_status(response, "transaction submission").await?;
        let submitted: SubmitResponse = response
            .json()
            .await
            .wrap_err("Malformed submission response")?;
        Ok(submitted.tx_id)
    }

    pub async fn pending_transaction(&self, tx_id: &str) -> Result<PendingTransaction> {
        self.get_json(
            &format!("/v2/transactions/pending/{}", tx_id),
            "pending transaction",
        )
        .await
    }

    /// Wait for `tx_id` to be confirmed within `max_rounds` rounds
    pub async fn wait_for_confirmation(&self, tx_id: &str, max_rounds: u64) -> Result<u64> {
        let start = self.status().await?.last_round;
        let mut current = start;

        while current < start + max_rounds {
            let pending = self.pending_transaction(tx_id).await?;
            if pending.confirmed_round > 0 {
                debug!(tx_id, round = pending.confirmed_round, "Transaction confirmed");
                return Ok(pending.confirmed_round);
            }
            if !pending.pool_error.is_empty() {
                return Err(eyre!(
                    "Transaction {} rejected: {}",
                    tx_id,
                    pending.pool_error
                ));
            }
            let status = self.status_after_block(current).await?;
            current = status.last_round.max(current + 1);
        }

        Err(eyre!(
            "Transaction {} not confirmed after {} rounds",
            tx_id,
            max_rounds
        ))
    }
}

#[async_trait]
impl ChainHead for AlgodClient {
    async fn head_round(&self) -> Result<u64> {
        Ok(self.status().await?.last_round)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(eyre!("{} request failed: {} - {}", what, status, body))
}
