//! Application-call transactions
//!
//! Transactions are encoded as canonical msgpack: map keys sorted, zero and
//! empty fields omitted, integers in their shortest form. The signature and
//! transaction id are both computed over `"TX" || encoding`.

use ed25519_dalek::{Signer, SigningKey};
use eyre::{eyre, Result};

use crate::address_codec::{encode_tx_id, sha512_256, Address};

const TX_TAG: &[u8] = b"TX";

/// Network parameters needed to build a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxParams {
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
}

/// A NoOp application call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCallTxn {
    pub sender: Address,
    pub app_id: u64,
    pub args: Vec<Vec<u8>>,
    pub accounts: Vec<Address>,
    pub foreign_assets: Vec<u64>,
    pub fee: u64,
    pub params: TxParams,
    pub note: Vec<u8>,
}

/// Signed transaction ready for submission
#[derive(Debug, Clone)]
pub struct SignedTxn {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl AppCallTxn {
    /// Canonical msgpack encoding of the transaction body
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);

        let present = [
            !self.args.is_empty(),
            !self.foreign_assets.is_empty(),
            !self.accounts.is_empty(),
            self.app_id != 0,
            self.fee != 0,
            self.params.first_valid != 0,
            !self.params.genesis_id.is_empty(),
            true, // gh
            true, // lv
            !self.note.is_empty(),
            true, // snd
            true, // type
        ];
        let len = present.iter().filter(|p| **p).count() as u32;
        rmp::encode::write_map_len(&mut buf, len).map_err(encode_err)?;

        if !self.args.is_empty() {
            write_key(&mut buf, "apaa")?;
            rmp::encode::write_array_len(&mut buf, self.args.len() as u32).map_err(encode_err)?;
            for arg in &self.args {
                rmp::encode::write_bin(&mut buf, arg).map_err(encode_err)?;
            }
        }
        if !self.foreign_assets.is_empty() {
            write_key(&mut buf, "apas")?;
            rmp::encode::write_array_len(&mut buf, self.foreign_assets.len() as u32)
                .map_err(encode_err)?;
            for asset in &self.foreign_assets {
                rmp::encode::write_uint(&mut buf, *asset).map_err(encode_err)?;
            }
        }
        if !self.accounts.is_empty() {
            write_key(&mut buf, "apat")?;
            rmp::encode::write_array_len(&mut buf, self.accounts.len() as u32)
                .map_err(encode_err)?;
            for account in &self.accounts {
                rmp::encode::write_bin(&mut buf, account.as_bytes()).map_err(encode_err)?;
            }
        }
        if self.app_id != 0 {
            write_key(&mut buf, "apid")?;
            rmp::encode::write_uint(&mut buf, self.app_id).map_err(encode_err)?;
        }
        if self.fee != 0 {
            write_key(&mut buf, "fee")?;
            rmp::encode::write_uint(&mut buf, self.fee).map_err(encode_err)?;
        }
        if self.params.first_valid != 0 {
            write_key(&mut buf, "fv")?;
            rmp::encode::write_uint(&mut buf, self.params.first_valid).map_err(encode_err)?;
        }
        if !self.params.genesis_id.is_empty() {
            write_key(&mut buf, "gen")?;
            rmp::encode::write_str(&mut buf, &self.params.genesis_id).map_err(encode_err)?;
        }
        write_key(&mut buf, "gh")?;
        rmp::encode::write_bin(&mut buf, &self.params.genesis_hash).map_err(encode_err)?;
        write_key(&mut buf, "lv")?;
        rmp::encode::write_uint(&mut buf, self.params.last_valid).map_err(encode_err)?;
        if !self.note.is_empty() {
            write_key(&mut buf, "note")?;
            rmp::encode::write_bin(&mut buf, &self.note).map_err(encode_err)?;
        }
        write_key(&mut buf, "snd")?;
        rmp::encode::write_bin(&mut buf, self.sender.as_bytes()).map_err(encode_err)?;
        write_key(&mut buf, "type")?;
        rmp::encode::write_str(&mut buf, "appl").map_err(encode_err)?;

        Ok(buf)
    }

    /// Bytes covered by the signature and the transaction id
    pub fn bytes_to_sign(&self) -> Result<Vec<u8>> {
        let mut out = TX_TAG.to_vec();
        out.extend_from_slice(&self.encode()?);
        Ok(out)
    }

    pub fn id(&self) -> Result<String> {
        Ok(encode_tx_id(&sha512_256(&self.bytes_to_sign()?)))
    }

    pub fn sign(&self, key: &SigningKey) -> Result<SignedTxn> {
        let body = self.encode()?;
        let mut message = TX_TAG.to_vec();
        message.extend_from_slice(&body);

        let signature = key.sign(&message);
        let id = encode_tx_id(&sha512_256(&message));

        let mut bytes = Vec::with_capacity(body.len() + 80);
        rmp::encode::write_map_len(&mut bytes, 2).map_err(encode_err)?;
        write_key(&mut bytes, "sig")?;
        rmp::encode::write_bin(&mut bytes, &signature.to_bytes()).map_err(encode_err)?;
        write_key(&mut bytes, "txn")?;
        bytes.extend_from_slice(&body);

        Ok(SignedTxn { id, bytes })
    }
}

fn write_key(buf: &mut Vec<u8>, key: &str) -> Result<()> {
    rmp::encode::write_str(buf, key).map_err(encode_err)
}

fn encode_err<E: std::fmt::Display>(e: E) -> eyre::Report {
    eyre!("msgpack encoding failed: {}", e)
}
