//! Common types for the relayer
//!
//! Deposit events decoded from source-chain logs, and the durable relayer
//! state that tracks scan progress and every deposit already acted upon.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

use crate::address_codec::Address;

/// Unique 32-byte key of a deposit, chosen by the depositor on the source chain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepositId(pub [u8; 32]);

impl DepositId {
    /// String form used as the key of the processed map (standard base64)
    pub fn to_key(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    pub fn from_key(key: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(key)
            .map_err(|e| eyre!("Invalid deposit id key {}: {}", key, e))?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| eyre!("Deposit id must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(raw))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

impl fmt::Debug for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DepositId({})", self.to_hex())
    }
}

/// A deposit decoded from a source-chain log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub deposit_id: DepositId,
    /// Destination-chain account; raw key bytes via `as_bytes`, encoded form via `Display`
    pub receiver: Address,
    pub amount: u64,
    /// Round at which the emitting transaction was confirmed
    pub source_round: u64,
    /// Correlation transaction id embedded in the payload (v4 layout only)
    pub source_tx_id: Option<String>,
}

/// Outcome recorded for a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Withdrawal confirmed on the destination chain
    Released,
    /// Receiver cannot hold the asset; needs manual remediation
    ReceiverIneligible,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Released => "released",
            RecordStatus::ReceiverIneligible => "receiver_ineligible",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted outcome for one deposit id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub status: RecordStatus,
    pub source_round: u64,
    /// Id of the source transaction that emitted the log
    #[serde(default)]
    pub source_tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_tx_id: Option<String>,
    pub amount: u64,
    pub receiver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_used: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl ProcessedRecord {
    pub fn released(
        event: &DepositEvent,
        source_tx_id: &str,
        destination_tx_id: String,
        nonce_used: u64,
    ) -> Self {
        Self {
            status: RecordStatus::Released,
            source_round: event.source_round,
            source_tx_id: Some(source_tx_id.to_string()),
            correlation_tx_id: event.source_tx_id.clone(),
            destination_tx_id: Some(destination_tx_id),
            amount: event.amount,
            receiver: event.receiver.to_string(),
            nonce_used: Some(nonce_used),
            recorded_at: Utc::now(),
        }
    }

    pub fn ineligible(event: &DepositEvent, source_tx_id: &str) -> Self {
        Self {
            status: RecordStatus::ReceiverIneligible,
            source_round: event.source_round,
            source_tx_id: Some(source_tx_id.to_string()),
            correlation_tx_id: event.source_tx_id.clone(),
            destination_tx_id: None,
            amount: event.amount,
            receiver: event.receiver.to_string(),
            nonce_used: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Durable relayer progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerState {
    /// Lowest source round not yet fully scanned
    #[serde(default)]
    pub cursor_round: u64,
    /// Deposit id key -> recorded outcome
    #[serde(default)]
    pub processed: BTreeMap<String, ProcessedRecord>,
}

impl RelayerState {
    /// Move the cursor forward to `round`; never moves it back.
    /// Returns true if the cursor changed.
    pub fn advance_cursor(&mut self, round: u64) -> bool {
        if round > self.cursor_round {
            self.cursor_round = round;
            true
        } else {
            false
        }
    }

    pub fn is_processed(&self, id: &DepositId) -> bool {
        self.processed.contains_key(&id.to_key())
    }

    pub fn get(&self, id: &DepositId) -> Option<&ProcessedRecord> {
        self.processed.get(&id.to_key())
    }

    pub fn record(&mut self, id: &DepositId, record: ProcessedRecord) {
        self.processed.insert(id.to_key(), record);
    }

    pub fn count_by_status(&self, status: RecordStatus) -> usize {
        self.processed
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    /// Structural checks beyond what deserialization enforces
    pub fn validate(&self) -> Result<()> {
        for (key, record) in &self.processed {
            DepositId::from_key(key)?;
            if record.status == RecordStatus::Released
                && (record.destination_tx_id.is_none() || record.nonce_used.is_none())
            {
                return Err(eyre!(
                    "Released record {} is missing destination tx id or nonce",
                    key
                ));
            }
        }
        Ok(())
    }
}
