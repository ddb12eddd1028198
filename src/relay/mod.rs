//! Relay Loop
//!
//! One cycle: observe the source head, page through the deposit
//! application's transactions from the cursor, decode logs, skip deposits
//! already recorded, and release the rest on the destination chain. Every
//! recorded outcome is persisted before the loop moves on.
//!
//! The cursor only ever covers rounds whose transactions were all handled.
//! Starting a transaction at round `r` marks every round below `r` as done;
//! round `r` itself is marked done once the scan passes it. A failure in the
//! middle of a round therefore leaves that round to be rescanned, and the
//! processed map turns the rescan into a no-op for deposits already handled.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::SharedStats;
use crate::decoder::LogDecoder;
use crate::error::RelayError;
use crate::metrics;
use crate::store::StateStore;
use crate::types::{DepositEvent, ProcessedRecord, RecordStatus, RelayerState};
use crate::watchers::{ChainHead, SourceReader};
use crate::writers::{Destination, WithdrawRequest};

pub mod backoff;

pub use backoff::Backoff;

/// Loop tuning
#[derive(Debug, Clone)]
pub struct RelayerSettings {
    pub page_size: u32,
    pub max_pages: u32,
    pub poll_interval: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Empty scans move the cursor up to `head - empty_advance_lag`
    pub empty_advance_lag: u64,
    /// Cold start begins at `head - start_lookback`
    pub start_lookback: u64,
    /// Explicit cold start round
    pub start_round: Option<u64>,
}

impl Default for RelayerSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_pages: 5,
            poll_interval: Duration::from_secs(20),
            min_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(180),
            empty_advance_lag: 50,
            start_lookback: 4000,
            start_round: None,
        }
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub head_round: Option<u64>,
    pub cursor_before: u64,
    pub cursor_after: u64,
    pub pages: u32,
    pub transactions: usize,
    /// Deposit logs decoded, including ones already processed
    pub decoded: usize,
    pub duplicates: usize,
    pub released: usize,
    pub ineligible: usize,
    pub skipped_zero_amount: usize,
    pub exhausted: bool,
}

pub struct Relayer {
    settings: RelayerSettings,
    decoder: LogDecoder,
    source: SourceReader,
    head: Box<dyn ChainHead>,
    destination: Box<dyn Destination>,
    store: StateStore,
    state: RelayerState,
    stats: Option<SharedStats>,
    consecutive_failures: u32,
}

impl Relayer {
    /// Build a relayer, loading any previously persisted state
    pub fn new(
        settings: RelayerSettings,
        decoder: LogDecoder,
        source: SourceReader,
        head: Box<dyn ChainHead>,
        destination: Box<dyn Destination>,
        store: StateStore,
    ) -> Self {
        let state = store.load();
        info!(
            cursor = state.cursor_round,
            processed = state.processed.len(),
            path = %store.path().display(),
            "Loaded relayer state"
        );

        Self {
            settings,
            decoder,
            source,
            head,
            destination,
            store,
            state,
            stats: None,
            consecutive_failures: 0,
        }
    }

    /// Publish progress snapshots to the health server
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn state(&self) -> &RelayerState {
        &self.state
    }

    pub fn settings(&self) -> &RelayerSettings {
        &self.settings
    }

    /// Pick the starting cursor when no progress has been recorded yet
    pub async fn initialize(&mut self) -> Result<u64, RelayError> {
        if self.state.cursor_round > 0 {
            info!(cursor = self.state.cursor_round, "Resuming from stored cursor");
            return Ok(self.state.cursor_round);
        }

        let start = match self.settings.start_round {
            Some(round) => {
                info!(cursor = round, "Using configured start round");
                round
            }
            None => match self.head.head_round().await {
                Ok(head) => {
                    let start = head.saturating_sub(self.settings.start_lookback);
                    info!(
                        head,
                        lookback = self.settings.start_lookback,
                        cursor = start,
                        "Cold start near head"
                    );
                    start
                }
                Err(e) => {
                    warn!(error = %e, "Head lookup failed on cold start, scanning from round 0");
                    0
                }
            },
        };

        self.state.advance_cursor(start);
        self.persist()?;
        metrics::set_cursor_round(self.state.cursor_round);
        Ok(self.state.cursor_round)
    }

    /// Run one scan/execute cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport, RelayError> {
        let mut report = CycleReport {
            cursor_before: self.state.cursor_round,
            ..Default::default()
        };

        report.head_round = match self.head.head_round().await {
            Ok(head) => {
                metrics::set_head_round(head);
                Some(head)
            }
            Err(e) => {
                warn!(error = %e, "Source head lookup failed, head unknown this cycle");
                None
            }
        };

        let scan_from = self.state.cursor_round;
        let batch = self
            .source
            .scan(scan_from, self.settings.page_size, self.settings.max_pages)
            .await?;
        report.pages = batch.pages;
        report.transactions = batch.transactions.len();
        report.exhausted = batch.exhausted;

        let mut last_round = None;
        for tx in &batch.transactions {
            if tx.confirmed_round == 0 {
                continue;
            }
            self.state.advance_cursor(tx.confirmed_round);

            for log in &tx.logs {
                let Some(event) = self.decoder.decode_base64(log, tx.confirmed_round) else {
                    continue;
                };
                report.decoded += 1;
                self.handle_deposit(&event, &tx.id, &mut report).await?;
            }
            last_round = Some(tx.confirmed_round);
        }

        if let Some(last) = last_round {
            // A capped scan may have cut round `last` short; rescan it unless
            // that would make no progress at all.
            let done_through = if batch.exhausted || last == scan_from {
                last + 1
            } else {
                last
            };
            if !batch.exhausted && last == scan_from {
                warn!(
                    round = last,
                    pages = batch.pages,
                    "Page cap reached within a single round, moving past it"
                );
            }
            self.state.advance_cursor(done_through);
        }

        // A cycle without deposit logs jumps toward the head even when the
        // page cap cut the scan short.
        if report.decoded == 0 {
            if let Some(head) = report.head_round {
                let target = head.saturating_sub(self.settings.empty_advance_lag);
                if self.state.advance_cursor(target) {
                    debug!(head, cursor = target, "No deposits found, advanced cursor toward head");
                }
            }
        }

        self.persist()?;
        report.cursor_after = self.state.cursor_round;
        metrics::set_cursor_round(report.cursor_after);

        Ok(report)
    }

    async fn handle_deposit(
        &mut self,
        event: &DepositEvent,
        source_tx_id: &str,
        report: &mut CycleReport,
    ) -> Result<(), RelayError> {
        if self.state.is_processed(&event.deposit_id) {
            report.duplicates += 1;
            return Ok(());
        }

        if event.amount == 0 {
            warn!(
                deposit_id = %event.deposit_id,
                source_tx_id,
                "Deposit has zero amount, skipping"
            );
            report.skipped_zero_amount += 1;
            return Ok(());
        }

        metrics::record_deposit_detected(self.decoder.layout().as_str());

        if !self.destination.is_eligible(&event.receiver).await {
            warn!(
                deposit_id = %event.deposit_id,
                receiver = %event.receiver,
                amount = event.amount,
                "Receiver not eligible for the destination asset, recording for manual remediation"
            );
            self.state.record(
                &event.deposit_id,
                ProcessedRecord::ineligible(event, source_tx_id),
            );
            self.persist()?;
            metrics::record_withdrawal(RecordStatus::ReceiverIneligible.as_str(), event.amount);
            report.ineligible += 1;
            return Ok(());
        }

        info!(
            deposit_id = %event.deposit_id,
            receiver = %event.receiver,
            amount = event.amount,
            source_round = event.source_round,
            "Deposit detected"
        );

        let current = self
            .destination
            .current_nonce()
            .await
            .map_err(RelayError::Destination)?;
        let nonce = current + 1;

        let request = WithdrawRequest {
            receiver: event.receiver,
            amount: event.amount,
            nonce,
            note: event.deposit_id.0.to_vec(),
        };
        let destination_tx_id = self
            .destination
            .withdraw(&request)
            .await
            .map_err(RelayError::Submission)?;

        self.state.record(
            &event.deposit_id,
            ProcessedRecord::released(event, source_tx_id, destination_tx_id.clone(), nonce),
        );
        self.persist()?;
        metrics::record_withdrawal(RecordStatus::Released.as_str(), event.amount);
        report.released += 1;

        info!(
            deposit_id = %event.deposit_id,
            destination_tx_id = %destination_tx_id,
            nonce,
            "Released on destination"
        );

        Ok(())
    }

    fn persist(&self) -> Result<(), RelayError> {
        self.store
            .save(&self.state)
            .map_err(RelayError::Persistence)
    }

    /// Run cycles until shutdown is requested or a fatal error occurs.
    /// Shutdown is only observed between cycles.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<(), RelayError> {
        let mut backoff = Backoff::new(self.settings.min_backoff, self.settings.max_backoff);
        metrics::UP.set(1.0);

        loop {
            let started = Instant::now();
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    metrics::record_cycle(true, started.elapsed().as_secs_f64());
                    metrics::record_successful_poll();
                    self.consecutive_failures = 0;
                    metrics::set_consecutive_failures(0);
                    backoff.reset();

                    if report.decoded == 0 {
                        info!(
                            head = ?report.head_round,
                            cursor = report.cursor_after,
                            "No new deposits"
                        );
                    } else {
                        info!(
                            cursor = report.cursor_after,
                            released = report.released,
                            ineligible = report.ineligible,
                            duplicates = report.duplicates,
                            "Cycle complete"
                        );
                    }
                    self.publish_stats(Some(&report), None).await;
                    self.settings.poll_interval
                }
                Err(e) => {
                    metrics::record_cycle(false, started.elapsed().as_secs_f64());
                    metrics::record_error(e.kind());

                    if e.is_fatal() {
                        error!(error = %e, "Fatal relayer error, stopping");
                        metrics::UP.set(0.0);
                        return Err(e);
                    }

                    self.consecutive_failures += 1;
                    metrics::set_consecutive_failures(self.consecutive_failures);
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        kind = e.kind(),
                        consecutive_failures = self.consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Relay cycle failed, backing off"
                    );
                    self.publish_stats(None, Some(e.to_string())).await;
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown requested, relay loop stopping");
                    break;
                }
            }
        }

        metrics::UP.set(0.0);
        Ok(())
    }

    async fn publish_stats(&self, report: Option<&CycleReport>, last_error: Option<String>) {
        let Some(stats) = &self.stats else {
            return;
        };
        let mut stats = stats.write().await;
        stats.cursor_round = self.state.cursor_round;
        stats.released = self.state.count_by_status(RecordStatus::Released);
        stats.receiver_ineligible = self.state.count_by_status(RecordStatus::ReceiverIneligible);
        stats.consecutive_failures = self.consecutive_failures;
        stats.last_error = last_error;
        if let Some(report) = report {
            if report.head_round.is_some() {
                stats.head_round = report.head_round;
            }
            stats.cycles_completed += 1;
            stats.last_cycle_at = Some(chrono::Utc::now());
        }
    }
}
