//! Relay loop behaviour against in-memory source, head, and destination
//!
//! Run with: cargo test --test relay_loop_test

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use avm_relayer::address_codec::Address;
use avm_relayer::api::{RelayerStats, SharedStats};
use avm_relayer::decoder::{LogDecoder, PayloadLayout};
use avm_relayer::error::RelayError;
use avm_relayer::relay::{Relayer, RelayerSettings};
use avm_relayer::store::StateStore;
use avm_relayer::types::{DepositId, RecordStatus, RelayerState};
use avm_relayer::watchers::{
    ChainHead, IndexerEndpoint, SourceReader, SourceTransaction, TxPage, TxQuery,
};
use avm_relayer::writers::{Destination, WithdrawRequest};
use base64::Engine as _;
use eyre::{eyre, Result};
use tempfile::TempDir;
use tokio::sync::RwLock;

const PREFIX: &[u8] = b"NUGGET_V4|";
const APP_ID: u64 = 4001;

mod helpers {
    use super::*;

    pub fn deposit_log(id: u8, receiver: u8, amount: u64) -> String {
        let mut log = PREFIX.to_vec();
        log.extend_from_slice(&[id; 32]);
        log.extend_from_slice(&[receiver; 32]);
        log.extend_from_slice(&amount.to_be_bytes());
        log.extend_from_slice(&[0xcc; 32]);
        base64::engine::general_purpose::STANDARD.encode(log)
    }

    pub fn unrelated_log() -> String {
        base64::engine::general_purpose::STANDARD.encode(b"OTHER_APP|hello")
    }

    pub fn tx(round: u64, logs: Vec<String>) -> SourceTransaction {
        SourceTransaction {
            id: format!("SRC{}-{}", round, logs.len()),
            confirmed_round: round,
            logs,
        }
    }

    pub fn state_path(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("state.json")
    }

    /// Indexer that serves a fixed transaction list, paged by `limit`
    #[derive(Clone, Default)]
    pub struct MockIndexer {
        pub transactions: Arc<Mutex<Vec<SourceTransaction>>>,
        pub fail: Arc<Mutex<bool>>,
        pub queries: Arc<Mutex<Vec<TxQuery>>>,
    }

    impl MockIndexer {
        pub fn with(transactions: Vec<SourceTransaction>) -> Self {
            let indexer = Self::default();
            *indexer.transactions.lock().unwrap() = transactions;
            indexer
        }
    }

    #[async_trait]
    impl IndexerEndpoint for MockIndexer {
        fn url(&self) -> &str {
            "mock://indexer"
        }

        async fn search_transactions(&self, query: &TxQuery) -> Result<TxPage> {
            self.queries.lock().unwrap().push(query.clone());
            if *self.fail.lock().unwrap() {
                return Err(eyre!("HTTP 503 Service Unavailable"));
            }

            let matching: Vec<SourceTransaction> = self
                .transactions
                .lock()
                .unwrap()
                .iter()
                .filter(|tx| tx.confirmed_round >= query.min_round)
                .cloned()
                .collect();

            let limit = query.limit as usize;
            let page: usize = query
                .next_token
                .as_deref()
                .map(|t| t.parse().unwrap())
                .unwrap_or(0);
            let start = page * limit;
            let chunk: Vec<SourceTransaction> =
                matching.iter().skip(start).take(limit).cloned().collect();
            let next_token = (start + limit < matching.len()).then(|| (page + 1).to_string());

            Ok(TxPage {
                transactions: chunk,
                next_token,
            })
        }
    }

    #[derive(Clone, Default)]
    pub struct MockHead {
        pub round: Arc<Mutex<Option<u64>>>,
    }

    impl MockHead {
        pub fn at(round: u64) -> Self {
            Self {
                round: Arc::new(Mutex::new(Some(round))),
            }
        }

        pub fn unavailable() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ChainHead for MockHead {
        async fn head_round(&self) -> Result<u64> {
            self.round
                .lock()
                .unwrap()
                .ok_or_else(|| eyre!("status endpoint unreachable"))
        }
    }

    /// Escrow that enforces `nonce == counter + 1` like the real contract
    #[derive(Clone, Default)]
    pub struct MockEscrow {
        pub nonce: Arc<Mutex<u64>>,
        pub ineligible: Arc<Mutex<HashSet<[u8; 32]>>>,
        pub withdrawals: Arc<Mutex<Vec<WithdrawRequest>>>,
        /// Zero-based withdraw call numbers that fail before reaching the chain
        pub failing_calls: Arc<Mutex<HashSet<usize>>>,
        pub calls: Arc<Mutex<usize>>,
    }

    impl MockEscrow {
        pub fn withdrawal_count(&self) -> usize {
            self.withdrawals.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Destination for MockEscrow {
        async fn current_nonce(&self) -> Result<u64> {
            Ok(*self.nonce.lock().unwrap())
        }

        async fn is_eligible(&self, receiver: &Address) -> bool {
            !self.ineligible.lock().unwrap().contains(receiver.as_bytes())
        }

        async fn withdraw(&self, request: &WithdrawRequest) -> Result<String> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            if self.failing_calls.lock().unwrap().contains(&call) {
                return Err(eyre!("transaction rejected by node"));
            }

            let mut nonce = self.nonce.lock().unwrap();
            if request.nonce != *nonce + 1 {
                return Err(eyre!(
                    "bad nonce: expected {}, got {}",
                    *nonce + 1,
                    request.nonce
                ));
            }
            *nonce = request.nonce;
            self.withdrawals.lock().unwrap().push(request.clone());
            Ok(format!("DEST{}", request.nonce))
        }
    }

    pub fn settings() -> RelayerSettings {
        RelayerSettings {
            page_size: 20,
            max_pages: 5,
            poll_interval: Duration::from_millis(10),
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            empty_advance_lag: 50,
            start_lookback: 4000,
            start_round: None,
        }
    }

    pub fn build_relayer(
        settings: RelayerSettings,
        indexer: &MockIndexer,
        head: &MockHead,
        escrow: &MockEscrow,
        store: StateStore,
    ) -> Relayer {
        Relayer::new(
            settings,
            LogDecoder::new(PREFIX, PayloadLayout::V4),
            SourceReader::new(vec![Box::new(indexer.clone())], APP_ID),
            Box::new(head.clone()),
            Box::new(escrow.clone()),
            store,
        )
    }

    /// Store pre-seeded with a cursor
    pub fn store_at(dir: &TempDir, cursor: u64) -> StateStore {
        let store = StateStore::new(state_path(dir));
        store
            .save(&RelayerState {
                cursor_round: cursor,
                ..Default::default()
            })
            .unwrap();
        store
    }
}

use helpers::*;

#[tokio::test]
async fn test_rescanned_deposit_released_once() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![
        tx(10, vec![deposit_log(1, 2, 500)]),
        // Same deposit id surfaced again in a later transaction
        tx(12, vec![deposit_log(1, 2, 500)]),
    ]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let store = store_at(&dir, 5);

    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());
    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(escrow.withdrawal_count(), 1);

    // Simulate a restart whose snapshot points back before the deposit
    let mut state = store.load();
    state.cursor_round = 5;
    store.save(&state).unwrap();

    let mut restarted = relayer_with_store(&indexer, &head, &escrow, store.clone());
    let report = restarted.run_cycle().await.unwrap();
    assert_eq!(report.released, 0);
    assert_eq!(report.duplicates, 2);
    assert_eq!(escrow.withdrawal_count(), 1);

    let state = store.load();
    assert_eq!(state.count_by_status(RecordStatus::Released), 1);
    let record = state.get(&DepositId([1; 32])).unwrap();
    assert_eq!(record.nonce_used, Some(1));
    assert_eq!(record.destination_tx_id.as_deref(), Some("DEST1"));
    assert_eq!(record.source_tx_id.as_deref(), Some("SRC10-1"));
}

fn relayer_with_store(
    indexer: &MockIndexer,
    head: &MockHead,
    escrow: &MockEscrow,
    store: StateStore,
) -> Relayer {
    build_relayer(settings(), indexer, head, escrow, store)
}

#[tokio::test]
async fn test_out_of_order_transactions_processed_ascending() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![
        tx(30, vec![deposit_log(3, 9, 300)]),
        tx(10, vec![deposit_log(1, 9, 100)]),
        tx(20, vec![deposit_log(2, 9, 200)]),
    ]);
    let head = MockHead::at(40);
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 1));

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.released, 3);

    let withdrawals = escrow.withdrawals.lock().unwrap().clone();
    let amounts: Vec<u64> = withdrawals.iter().map(|w| w.amount).collect();
    let nonces: Vec<u64> = withdrawals.iter().map(|w| w.nonce).collect();
    assert_eq!(amounts, vec![100, 200, 300]);
    assert_eq!(nonces, vec![1, 2, 3]);
    assert_eq!(withdrawals[0].note, vec![1u8; 32]);

    assert_eq!(relayer.state().cursor_round, 31);
    assert_eq!(relayer.state().get(&DepositId([2; 32])).unwrap().source_round, 20);
}

#[tokio::test]
async fn test_cursor_never_decreases_across_restarts() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![tx(500, vec![deposit_log(1, 2, 10)])]);
    let head = MockHead::at(600);
    let escrow = MockEscrow::default();
    let store = store_at(&dir, 400);

    let mut observed = vec![store.load().cursor_round];

    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());
    relayer.run_cycle().await.unwrap();
    observed.push(relayer.state().cursor_round);

    // Head regresses (e.g. a lagging node) and then disappears
    *head.round.lock().unwrap() = Some(100);
    relayer.run_cycle().await.unwrap();
    observed.push(relayer.state().cursor_round);

    *head.round.lock().unwrap() = None;
    relayer.run_cycle().await.unwrap();
    observed.push(relayer.state().cursor_round);
    drop(relayer);

    // Restart from the saved snapshot
    let mut restarted = relayer_with_store(&indexer, &head, &escrow, store.clone());
    observed.push(restarted.state().cursor_round);
    restarted.initialize().await.unwrap();
    observed.push(restarted.state().cursor_round);

    *head.round.lock().unwrap() = Some(2000);
    restarted.run_cycle().await.unwrap();
    observed.push(restarted.state().cursor_round);

    assert!(
        observed.windows(2).all(|w| w[0] <= w[1]),
        "cursor went backwards: {:?}",
        observed
    );
    assert_eq!(*observed.last().unwrap(), 1950);
    assert_eq!(escrow.withdrawal_count(), 1);
}

#[tokio::test]
async fn test_empty_scan_advances_to_head_minus_lag() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![tx(200, vec![unrelated_log()])]);
    let head = MockHead::at(1000);
    let escrow = MockEscrow::default();
    let store = store_at(&dir, 100);
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.decoded, 0);
    assert_eq!(report.cursor_before, 100);
    assert_eq!(report.cursor_after, 950);
    assert_eq!(store.load().cursor_round, 950);
}

#[tokio::test]
async fn test_capped_scan_without_deposits_advances_to_head_minus_lag() {
    let dir = TempDir::new().unwrap();
    let backlog: Vec<SourceTransaction> = (101..=300).map(|r| tx(r, vec![unrelated_log()])).collect();
    let indexer = MockIndexer::with(backlog);
    let head = MockHead::at(1000);
    let escrow = MockEscrow::default();
    let store = store_at(&dir, 100);
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.pages, 5);
    assert!(!report.exhausted);
    assert_eq!(report.decoded, 0);
    assert_eq!(report.cursor_after, 950);
    assert_eq!(store.load().cursor_round, 950);
    assert_eq!(escrow.withdrawal_count(), 0);
}

#[tokio::test]
async fn test_empty_scan_with_unknown_head_keeps_cursor() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    let head = MockHead::unavailable();
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 100));

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.head_round, None);
    assert_eq!(report.cursor_after, 100);
}

#[tokio::test]
async fn test_empty_scan_near_head_does_not_move_backwards() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    let head = MockHead::at(1000);
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 990));

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.cursor_after, 990);
}

#[tokio::test]
async fn test_cold_start_uses_lookback_from_head() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    let head = MockHead::at(5000);
    let escrow = MockEscrow::default();
    let store = StateStore::new(state_path(&dir));
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());

    assert_eq!(relayer.initialize().await.unwrap(), 1000);
    assert_eq!(store.load().cursor_round, 1000);
}

#[tokio::test]
async fn test_cold_start_lookback_clamps_at_zero() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    let head = MockHead::at(1200);
    let escrow = MockEscrow::default();
    let store = StateStore::new(state_path(&dir));
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store);

    assert_eq!(relayer.initialize().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cold_start_override_and_stored_cursor() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    let head = MockHead::at(5000);
    let escrow = MockEscrow::default();

    let mut with_override = settings();
    with_override.start_round = Some(777);
    let mut relayer = build_relayer(
        with_override.clone(),
        &indexer,
        &head,
        &escrow,
        StateStore::new(state_path(&dir)),
    );
    assert_eq!(relayer.initialize().await.unwrap(), 777);

    // A stored cursor wins over both the override and the head
    let resume_dir = TempDir::new().unwrap();
    let mut resumed = build_relayer(with_override, &indexer, &head, &escrow, store_at(&resume_dir, 4321));
    assert_eq!(resumed.initialize().await.unwrap(), 4321);
}

#[tokio::test]
async fn test_cold_start_without_head_starts_at_zero() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    let head = MockHead::unavailable();
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(
        settings(),
        &indexer,
        &head,
        &escrow,
        StateStore::new(state_path(&dir)),
    );
    assert_eq!(relayer.initialize().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ineligible_receiver_recorded_without_submission() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![tx(10, vec![deposit_log(4, 7, 1234)])]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    escrow.ineligible.lock().unwrap().insert([7u8; 32]);
    let store = store_at(&dir, 1);
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.ineligible, 1);
    assert_eq!(escrow.withdrawal_count(), 0);

    let state = store.load();
    let record = state.get(&DepositId([4; 32])).unwrap();
    assert_eq!(record.status, RecordStatus::ReceiverIneligible);
    assert_eq!(record.amount, 1234);
    assert_eq!(record.receiver, Address::new([7u8; 32]).to_string());
    assert!(record.destination_tx_id.is_none());
    assert!(record.nonce_used.is_none());

    // Registering later does not trigger an automatic retry
    escrow.ineligible.lock().unwrap().clear();
    let mut state = store.load();
    state.cursor_round = 1;
    store.save(&state).unwrap();
    let mut restarted = relayer_with_store(&indexer, &head, &escrow, store);
    restarted.run_cycle().await.unwrap();
    assert_eq!(escrow.withdrawal_count(), 0);
}

#[tokio::test]
async fn test_submission_failure_retried_with_fresh_nonce() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![tx(10, vec![deposit_log(5, 2, 42)])]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    *escrow.nonce.lock().unwrap() = 7;
    escrow.failing_calls.lock().unwrap().insert(0);
    let store = store_at(&dir, 1);
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());

    let err = relayer.run_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::Submission(_)));
    assert!(!err.is_fatal());
    assert!(!relayer.state().is_processed(&DepositId([5; 32])));
    assert!(relayer.state().cursor_round <= 10);

    // Another writer advanced the counter in the meantime
    *escrow.nonce.lock().unwrap() = 8;

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.released, 1);
    let record = store.load().get(&DepositId([5; 32])).cloned().unwrap();
    assert_eq!(record.nonce_used, Some(9));
    assert_eq!(relayer.state().cursor_round, 11);
}

#[tokio::test]
async fn test_failure_mid_round_rescans_that_round() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![
        tx(10, vec![deposit_log(1, 2, 10)]),
        SourceTransaction {
            id: "SRC10-second".to_string(),
            confirmed_round: 10,
            logs: vec![deposit_log(2, 2, 20)],
        },
        tx(11, vec![deposit_log(3, 2, 30)]),
    ]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    escrow.failing_calls.lock().unwrap().insert(1);
    let store = store_at(&dir, 1);
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store.clone());

    // Deposit 1 is released, deposit 2 (same round) fails
    let err = relayer.run_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::Submission(_)));
    assert!(relayer.state().is_processed(&DepositId([1; 32])));
    assert_eq!(relayer.state().cursor_round, 10);
    assert_eq!(store.load().cursor_round, 10);

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.released, 2);
    assert_eq!(relayer.state().cursor_round, 12);

    let withdrawals = escrow.withdrawals.lock().unwrap().clone();
    let amounts: Vec<u64> = withdrawals.iter().map(|w| w.amount).collect();
    assert_eq!(amounts, vec![10, 20, 30]);
}

#[tokio::test]
async fn test_zero_amount_deposit_skipped() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![tx(10, vec![deposit_log(6, 2, 0)])]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 1));

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.skipped_zero_amount, 1);
    assert_eq!(escrow.withdrawal_count(), 0);
    assert!(!relayer.state().is_processed(&DepositId([6; 32])));
    // A decoded deposit was seen, so no jump toward the head
    assert_eq!(relayer.state().cursor_round, 11);
}

#[tokio::test]
async fn test_malformed_logs_do_not_abort_batch() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![
        tx(
            10,
            vec![
                "%%% not base64 %%%".to_string(),
                unrelated_log(),
                base64::engine::general_purpose::STANDARD.encode(PREFIX),
                deposit_log(8, 2, 99),
            ],
        ),
        tx(0, vec![deposit_log(9, 2, 1)]),
    ]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 0));

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.decoded, 1);
    assert_eq!(report.released, 1);
    // Unconfirmed transactions are ignored
    assert!(!relayer.state().is_processed(&DepositId([9; 32])));
}

#[tokio::test]
async fn test_persistence_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let path = blocker.join("state.json");

    let indexer = MockIndexer::with(vec![tx(10, vec![deposit_log(1, 2, 10)])]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, StateStore::new(path));

    let (_tx, rx) = tokio::sync::mpsc::channel::<()>(1);
    let err = relayer.run(rx).await.unwrap_err();
    assert!(matches!(err, RelayError::Persistence(_)));
    assert!(err.is_fatal());
    // The withdrawal went out; the loop stopped before doing anything else
    assert_eq!(escrow.withdrawal_count(), 1);
}

#[tokio::test]
async fn test_page_cap_defers_remaining_pages() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![
        tx(5, vec![deposit_log(1, 2, 1)]),
        tx(6, vec![deposit_log(2, 2, 2)]),
        tx(7, vec![deposit_log(3, 2, 3)]),
    ]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let mut capped = settings();
    capped.page_size = 1;
    capped.max_pages = 2;
    let mut relayer = build_relayer(capped, &indexer, &head, &escrow, store_at(&dir, 1));

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.pages, 2);
    assert!(!report.exhausted);
    assert_eq!(report.released, 2);
    assert_eq!(indexer.queries.lock().unwrap().len(), 2);
    // Round 6 may have been cut short by the cap, so it is scanned again
    assert_eq!(relayer.state().cursor_round, 6);

    let report = relayer.run_cycle().await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.duplicates, 1);
    assert!(report.exhausted);
    assert_eq!(relayer.state().cursor_round, 8);
    assert_eq!(escrow.withdrawal_count(), 3);

    let queries = indexer.queries.lock().unwrap().clone();
    assert_eq!(queries[2].min_round, 6);
    assert_eq!(queries[2].application_id, APP_ID);
    assert_eq!(queries[3].next_token.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_source_outage_backs_off_and_honours_shutdown() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::default();
    *indexer.fail.lock().unwrap() = true;
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 50))
        .with_stats(stats.clone());

    let (tx, rx) = tokio::sync::mpsc::channel::<()>(1);
    tx.send(()).await.unwrap();
    relayer.run(rx).await.unwrap();

    let stats = stats.read().await;
    assert_eq!(stats.consecutive_failures, 1);
    assert_eq!(stats.cycles_completed, 0);
    assert!(stats.last_error.as_deref().unwrap().contains("indexer endpoints failed"));
    assert_eq!(relayer.state().cursor_round, 50);
}

#[tokio::test]
async fn test_successful_cycle_publishes_stats() {
    let dir = TempDir::new().unwrap();
    let indexer = MockIndexer::with(vec![tx(60, vec![deposit_log(1, 2, 10)])]);
    let head = MockHead::at(100);
    let escrow = MockEscrow::default();
    let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));
    let mut relayer = build_relayer(settings(), &indexer, &head, &escrow, store_at(&dir, 50))
        .with_stats(stats.clone());

    let (tx, rx) = tokio::sync::mpsc::channel::<()>(1);
    tx.send(()).await.unwrap();
    relayer.run(rx).await.unwrap();

    let stats = stats.read().await;
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.head_round, Some(100));
    assert_eq!(stats.cursor_round, 61);
    assert!(stats.last_cycle_at.is_some());
}
