//! AVM bridge relayer
//!
//! Watches deposit logs emitted by an application on the source chain and
//! releases the matching amount from an escrow application on the
//! destination chain, one replay-protected withdrawal per deposit.

pub mod address_codec;
pub mod algod;
pub mod api;
pub mod config;
pub mod decoder;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod relay;
pub mod rpc_fallback;
pub mod store;
pub mod types;
pub mod watchers;
pub mod writers;
