//! Account keys from 25-word mnemonics
//!
//! AVM wallets export an ed25519 seed as 25 words from the BIP-39 English
//! list: 24 words carry the 32-byte seed as little-endian 11-bit groups and
//! the last word is a checksum (first 11 bits of SHA-512/256 of the seed).

use bip39::Language;
use ed25519_dalek::SigningKey;
use eyre::{eyre, Result};

use crate::address_codec::{sha512_256, Address};

/// Number of words in an account mnemonic
pub const MNEMONIC_WORDS: usize = 25;

const KEY_LEN: usize = 32;

/// Signing key plus the account address it controls
pub struct AccountKey {
    signing_key: SigningKey,
    address: Address,
}

impl AccountKey {
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let seed = mnemonic_to_seed(phrase)?;
        Ok(Self::from_seed(seed))
    }

    pub fn from_seed(seed: [u8; KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = Address::new(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// Decode a 25-word mnemonic into the 32-byte ed25519 seed
pub fn mnemonic_to_seed(phrase: &str) -> Result<[u8; KEY_LEN]> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.len() != MNEMONIC_WORDS {
        return Err(eyre!(
            "Mnemonic must have {} words, got {}",
            MNEMONIC_WORDS,
            words.len()
        ));
    }

    let mut indices = Vec::with_capacity(MNEMONIC_WORDS);
    for word in &words {
        indices.push(word_index(word)?);
    }

    let (data_words, checksum_word) = indices.split_at(MNEMONIC_WORDS - 1);
    let bytes = from_11_bit(data_words);
    // 24 * 11 = 264 bits: 32 key bytes plus one byte of zero padding
    if bytes.len() != KEY_LEN + 1 || bytes[KEY_LEN] != 0 {
        return Err(eyre!("Mnemonic does not encode a 32-byte key"));
    }

    let mut seed = [0u8; KEY_LEN];
    seed.copy_from_slice(&bytes[..KEY_LEN]);

    if checksum_word[0] != checksum_index(&seed) {
        return Err(eyre!("Mnemonic checksum word does not match"));
    }

    Ok(seed)
}

/// Encode a 32-byte seed as a 25-word mnemonic
pub fn seed_to_mnemonic(seed: &[u8; KEY_LEN]) -> String {
    let list = Language::English.word_list();
    let mut indices = to_11_bit(seed);
    indices.push(checksum_index(seed));
    indices
        .iter()
        .map(|&i| list[i as usize])
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_index(word: &str) -> Result<u16> {
    let lower = word.to_ascii_lowercase();
    Language::English
        .word_list()
        .iter()
        .position(|w| *w == lower)
        .map(|i| i as u16)
        .ok_or_else(|| eyre!("Unknown mnemonic word: {}", word))
}

fn checksum_index(seed: &[u8; KEY_LEN]) -> u16 {
    let hash = sha512_256(seed);
    to_11_bit(&hash[..2])[0]
}

fn to_11_bit(data: &[u8]) -> Vec<u16> {
    let mut buffer: u32 = 0;
    let mut bits = 0;
    let mut out = Vec::with_capacity(data.len() * 8 / 11 + 1);
    for &byte in data {
        buffer |= (byte as u32) << bits;
        bits += 8;
        if bits >= 11 {
            out.push((buffer & 0x7ff) as u16);
            buffer >>= 11;
            bits -= 11;
        }
    }
    if bits != 0 {
        out.push((buffer & 0x7ff) as u16);
    }
    out
}

fn from_11_bit(words: &[u16]) -> Vec<u8> {
    let mut buffer: u32 = 0;
    let mut bits = 0;
    let mut out = Vec::with_capacity(words.len() * 11 / 8 + 1);
    for &word in words {
        buffer |= (word as u32) << bits;
        bits += 11;
        while bits >= 8 {
            out.push((buffer & 0xff) as u8);
            buffer >>= 8;
            bits -= 8;
        }
    }
    if bits != 0 {
        out.push((buffer & 0xff) as u8);
    }
    out
}
