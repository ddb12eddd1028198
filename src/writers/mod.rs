//! Destination Executor
//!
//! Reads the escrow's replay counter, checks receiver eligibility, and
//! submits the signed `withdraw` call, waiting for confirmation.

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

use crate::address_codec::Address;
use crate::algod::AlgodClient;
use crate::keys::AccountKey;

pub mod transaction;

use transaction::AppCallTxn;

/// Escrow global-state key holding the replay counter
pub const NONCE_KEY: &str = "nonce";

/// Operation tag passed as the first application argument
pub const WITHDRAW_METHOD: &[u8] = b"withdraw";

/// A single withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub receiver: Address,
    pub amount: u64,
    /// Must equal the escrow counter + 1
    pub nonce: u64,
    /// Attached as the transaction note
    pub note: Vec<u8>,
}

impl WithdrawRequest {
    /// Application arguments in call order
    pub fn app_args(&self) -> Vec<Vec<u8>> {
        vec![
            WITHDRAW_METHOD.to_vec(),
            self.receiver.as_bytes().to_vec(),
            self.amount.to_be_bytes().to_vec(),
            self.nonce.to_be_bytes().to_vec(),
        ]
    }
}

/// Destination chain operations needed by the relay loop
#[async_trait]
pub trait Destination: Send + Sync {
    /// Escrow replay counter; an absent key reads as zero
    async fn current_nonce(&self) -> Result<u64>;

    /// Whether `receiver` can hold the released asset. Lookup failures
    /// count as not eligible.
    async fn is_eligible(&self, receiver: &Address) -> bool;

    /// Submit and confirm a withdrawal, returning the destination tx id
    async fn withdraw(&self, request: &WithdrawRequest) -> Result<String>;
}

/// Settings for [`EscrowWriter`]
#[derive(Debug, Clone)]
pub struct EscrowSettings {
    pub app_id: u64,
    pub asset_id: u64,
    pub flat_fee: u64,
    pub confirm_rounds: u64,
    pub validity_rounds: u64,
}

/// Submits withdrawals to the escrow application
pub struct EscrowWriter {
    client: AlgodClient,
    key: AccountKey,
    settings: EscrowSettings,
}

impl EscrowWriter {
    pub fn new(client: AlgodClient, key: AccountKey, settings: EscrowSettings) -> Self {
        Self {
            client,
            key,
            settings,
        }
    }

    pub fn sender(&self) -> Address {
        self.key.address()
    }

    pub fn settings(&self) -> &EscrowSettings {
        &self.settings
    }

    async fn build_call(&self, request: &WithdrawRequest) -> Result<AppCallTxn> {
        let params = self
            .client
            .suggested_params()
            .await
            .wrap_err("Failed to fetch transaction params")?;
        let fee = self.settings.flat_fee.max(params.min_fee);

        Ok(AppCallTxn {
            sender: self.key.address(),
            app_id: self.settings.app_id,
            args: request.app_args(),
            accounts: vec![request.receiver],
            foreign_assets: vec![self.settings.asset_id],
            fee,
            params: params.to_tx_params(self.settings.validity_rounds)?,
            note: request.note.clone(),
        })
    }
}

#[async_trait]
impl Destination for EscrowWriter {
    async fn current_nonce(&self) -> Result<u64> {
        self.client
            .global_uint(self.settings.app_id, NONCE_KEY)
            .await
            .wrap_err("Failed to read escrow nonce")
    }

    async fn is_eligible(&self, receiver: &Address) -> bool {
        match self.client.account_assets(receiver).await {
            Ok(assets) => assets.iter().any(|a| a.asset_id == self.settings.asset_id),
            Err(e) => {
                warn!(
                    receiver = %receiver,
                    asset_id = self.settings.asset_id,
                    error = %e,
                    "Eligibility lookup failed, treating receiver as not eligible"
                );
                false
            }
        }
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<String> {
        let txn = self.build_call(request).await?;
        let signed = txn.sign(self.key.signing_key())?;

        debug!(
            tx_id = %signed.id,
            receiver = %request.receiver,
            amount = request.amount,
            nonce = request.nonce,
            "Submitting withdrawal"
        );

        // Once submitted the transaction may confirm, so a differing id from
        // the node is only reported; confirmation tracks the local id.
        let submitted = self.client.send_raw_transaction(&signed.bytes).await?;
        if submitted != signed.id {
            warn!(
                tx_id = %signed.id,
                node_tx_id = %submitted,
                "Node returned a different tx id than computed locally"
            );
        }

        let round = self
            .client
            .wait_for_confirmation(&signed.id, self.settings.confirm_rounds)
            .await?;

        info!(
            tx_id = %signed.id,
            round,
            nonce = request.nonce,
            "Withdrawal confirmed"
        );

        Ok(signed.id)
    }
}
