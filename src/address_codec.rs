//! AVM Address Encoding
//!
//! VOI and Algorand share the same account format: the 32-byte ed25519
//! public key followed by a 4-byte checksum, base32 encoded without padding.
//!
//! ## Address Format
//!
//! ```text
//! base32( Public Key (32 bytes) | SHA-512/256(Public Key)[28..32] )  -> 58 chars
//! ```
//!
//! Transaction ids use the same alphabet over a bare 32-byte hash (52 chars).

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use eyre::{eyre, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512_256};

/// Length of an encoded account address
pub const ADDRESS_LEN: usize = 58;

/// Length of an encoded transaction id
pub const TX_ID_LEN: usize = 52;

const CHECKSUM_LEN: usize = 4;

/// A 32-byte AVM account public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, failing unless it is exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| eyre!("Address must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base32 encoding with the trailing checksum
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(32 + CHECKSUM_LEN);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&checksum(&self.0));
        BASE32_NOPAD.encode(&buf)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl FromStr for Address {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != ADDRESS_LEN {
            return Err(eyre!(
                "Address must be {} characters, got {}",
                ADDRESS_LEN,
                s.len()
            ));
        }

        let decoded = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| eyre!("Invalid base32 address {}: {}", s, e))?;
        if decoded.len() != 32 + CHECKSUM_LEN {
            return Err(eyre!("Decoded address has wrong length: {}", decoded.len()));
        }

        let (key, sum) = decoded.split_at(32);
        let address = Self::from_slice(key)?;
        if checksum(&address.0).as_slice() != sum {
            return Err(eyre!("Address checksum mismatch: {}", s));
        }
        Ok(address)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// SHA-512/256 digest, the hash used for checksums and transaction ids
pub fn sha512_256(data: &[u8]) -> [u8; 32] {
    let digest = Sha512_256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn checksum(key: &[u8; 32]) -> [u8; CHECKSUM_LEN] {
    let hash = sha512_256(key);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash[32 - CHECKSUM_LEN..]);
    out
}

/// Render a raw 32-byte transaction hash as a transaction id
pub fn encode_tx_id(hash: &[u8; 32]) -> String {
    BASE32_NOPAD.encode(hash)
}
