//! Prometheus metrics for the AVM relayer
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};

lazy_static! {
    // Cycle metrics
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "avm_relayer_cycles_total",
        "Total number of relay cycles by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref CYCLE_DURATION: Histogram = register_histogram!(
        "avm_relayer_cycle_duration_seconds",
        "Wall time of a relay cycle",
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    // Round tracking
    pub static ref ROUND: GaugeVec = register_gauge_vec!(
        "avm_relayer_round",
        "Source chain rounds: scan cursor and observed head",
        &["kind"]
    ).unwrap();

    // Deposit metrics
    pub static ref DEPOSITS_DETECTED: CounterVec = register_counter_vec!(
        "avm_relayer_deposits_detected_total",
        "Total number of new deposit events decoded",
        &["layout"]
    ).unwrap();

    pub static ref WITHDRAWALS: CounterVec = register_counter_vec!(
        "avm_relayer_withdrawals_total",
        "Deposits settled on the destination chain by recorded status",
        &["status"]
    ).unwrap();

    pub static ref VOLUME_RELEASED: Counter = register_counter!(
        "avm_relayer_volume_released_total",
        "Total amount released (in base units)"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "avm_relayer_errors_total",
        "Total number of cycle errors",
        &["kind"]
    ).unwrap();

    pub static ref INDEXER_FAILOVERS: CounterVec = register_counter_vec!(
        "avm_relayer_indexer_failovers_total",
        "Indexer queries that failed and fell through to the next endpoint",
        &["endpoint"]
    ).unwrap();

    pub static ref CONSECUTIVE_FAILURES: Gauge = register_gauge!(
        "avm_relayer_consecutive_failures",
        "Number of consecutive failed cycles"
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "avm_relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: Gauge = register_gauge!(
        "avm_relayer_last_successful_poll_timestamp",
        "Unix timestamp of last successful cycle"
    ).unwrap();
}

/// Record a finished cycle
pub fn record_cycle(success: bool, seconds: f64) {
    let outcome = if success { "success" } else { "failure" };
    CYCLES.with_label_values(&[outcome]).inc();
    CYCLE_DURATION.observe(seconds);
}

/// Update the scan cursor
pub fn set_cursor_round(round: u64) {
    ROUND.with_label_values(&["cursor"]).set(round as f64);
}

/// Update the observed source head
pub fn set_head_round(round: u64) {
    ROUND.with_label_values(&["head"]).set(round as f64);
}

/// Record a deposit detected
pub fn record_deposit_detected(layout: &str) {
    DEPOSITS_DETECTED.with_label_values(&[layout]).inc();
}

/// Record a settled deposit
pub fn record_withdrawal(status: &str, amount: u64) {
    WITHDRAWALS.with_label_values(&[status]).inc();
    if status == "released" {
        VOLUME_RELEASED.inc_by(amount as f64);
    }
}

/// Record an error
pub fn record_error(kind: &str) {
    ERRORS.with_label_values(&[kind]).inc();
}

/// Record an indexer endpoint failing over
pub fn record_indexer_failover(endpoint: &str) {
    INDEXER_FAILOVERS.with_label_values(&[endpoint]).inc();
}

/// Update consecutive failures
pub fn set_consecutive_failures(count: u32) {
    CONSECUTIVE_FAILURES.set(count as f64);
}

/// Record last successful poll
pub fn record_successful_poll() {
    LAST_SUCCESSFUL_POLL.set(chrono::Utc::now().timestamp() as f64);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> eyre::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
