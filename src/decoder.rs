//! Deposit log decoding
//!
//! The source application logs `prefix | payload` for every deposit. Two
//! payload layouts exist in deployed contracts and they carry no version
//! field, so the active layout is chosen by configuration:
//!
//! ```text
//! v4:   deposit_id(32) | receiver(32) | amount(8, BE) | correlation_txid(32)
//! mint: deposit_id(32) | amount(8, BE) | receiver(32)
//! ```
//!
//! Anything that does not match is simply not a deposit; decoding never fails
//! loudly because the same application may log unrelated data.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use eyre::{eyre, Result};

use crate::address_codec::{encode_tx_id, Address};
use crate::types::{DepositEvent, DepositId};

/// Payload layout emitted by the deployed log contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    V4,
    Mint,
}

impl PayloadLayout {
    /// Minimum payload length after the prefix
    pub fn payload_len(&self) -> usize {
        match self {
            PayloadLayout::V4 => 32 + 32 + 8 + 32,
            PayloadLayout::Mint => 32 + 8 + 32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadLayout::V4 => "v4",
            PayloadLayout::Mint => "mint",
        }
    }
}

impl fmt::Display for PayloadLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadLayout {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4" => Ok(PayloadLayout::V4),
            "mint" => Ok(PayloadLayout::Mint),
            other => Err(eyre!("Unknown log layout '{}', expected v4 or mint", other)),
        }
    }
}

/// Decodes deposit logs for one prefix/layout pair
#[derive(Debug, Clone)]
pub struct LogDecoder {
    prefix: Vec<u8>,
    layout: PayloadLayout,
}

impl LogDecoder {
    pub fn new(prefix: impl Into<Vec<u8>>, layout: PayloadLayout) -> Self {
        Self {
            prefix: prefix.into(),
            layout,
        }
    }

    pub fn layout(&self) -> PayloadLayout {
        self.layout
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Decode a raw log line. `None` means "not a deposit".
    pub fn decode(&self, raw: &[u8], source_round: u64) -> Option<DepositEvent> {
        let payload = raw.strip_prefix(self.prefix.as_slice())?;
        if payload.len() < self.layout.payload_len() {
            return None;
        }

        let deposit_id = DepositId(read_32(payload, 0)?);
        let (receiver, amount, source_tx_id) = match self.layout {
            PayloadLayout::V4 => (
                Address::new(read_32(payload, 32)?),
                read_u64_be(payload, 64)?,
                Some(encode_tx_id(&read_32(payload, 72)?)),
            ),
            PayloadLayout::Mint => (
                Address::new(read_32(payload, 40)?),
                read_u64_be(payload, 32)?,
                None,
            ),
        };

        Some(DepositEvent {
            deposit_id,
            receiver,
            amount,
            source_round,
            source_tx_id,
        })
    }

    /// Decode a base64 log as returned by the indexer
    pub fn decode_base64(&self, encoded: &str, source_round: u64) -> Option<DepositEvent> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        self.decode(&raw, source_round)
    }
}

fn read_32(payload: &[u8], offset: usize) -> Option<[u8; 32]> {
    payload.get(offset..offset + 32)?.try_into().ok()
}

fn read_u64_be(payload: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = payload.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
