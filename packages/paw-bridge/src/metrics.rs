//! Prometheus metrics for the PAW bridge.
//!
//! Exposed on the /metrics endpoint for scraping.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Deposit pipeline
    pub static ref DEPOSITS_DETECTED: CounterVec = register_counter_vec!(
        "bridge_deposits_detected_total",
        "Deposit confirmations observed on the hot wallet",
        &["source"]
    ).unwrap();

    pub static ref DEPOSITS_REFUNDED: CounterVec = register_counter_vec!(
        "bridge_deposits_refunded_total",
        "Deposits refunded instead of credited",
        &["reason"]
    ).unwrap();

    // Conversions
    pub static ref SWAPS: CounterVec = register_counter_vec!(
        "bridge_swaps_total",
        "Completed swaps per direction",
        &["direction"]
    ).unwrap();

    pub static ref WITHDRAWALS_SENT: CounterVec = register_counter_vec!(
        "bridge_withdrawals_sent_total",
        "Withdrawals paid out from the hot wallet",
        &["status"]
    ).unwrap();

    // Queue
    pub static ref JOBS_ENQUEUED: CounterVec = register_counter_vec!(
        "bridge_jobs_enqueued_total",
        "Jobs accepted by the queue",
        &["topic"]
    ).unwrap();

    pub static ref JOBS_COMPLETED: CounterVec = register_counter_vec!(
        "bridge_jobs_completed_total",
        "Jobs completed successfully",
        &["topic"]
    ).unwrap();

    pub static ref JOBS_RETRIED: CounterVec = register_counter_vec!(
        "bridge_jobs_retried_total",
        "Job retries scheduled with backoff",
        &["topic"]
    ).unwrap();

    pub static ref JOBS_FAILED: CounterVec = register_counter_vec!(
        "bridge_jobs_failed_total",
        "Jobs failed terminally",
        &["topic", "code"]
    ).unwrap();

    // Store
    pub static ref LOCK_RETRIES: CounterVec = register_counter_vec!(
        "bridge_lock_retries_total",
        "Named-lock acquisition retries",
        &["lock"]
    ).unwrap();

    // Chain state
    pub static ref LAST_SCANNED_BLOCK: Gauge = register_gauge!(
        "bridge_last_scanned_evm_block",
        "Last EVM block fully processed by the scanner"
    ).unwrap();

    pub static ref WALLET_BALANCE: GaugeVec = register_gauge_vec!(
        "bridge_wallet_balance_units",
        "Custody wallet balances in atomic units",
        &["wallet"]
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "bridge_up",
        "Whether the bridge is up and running"
    ).unwrap();
}

/// Record a deposit confirmation ("stream" or "sweep")
pub fn record_deposit_detected(source: &str) {
    DEPOSITS_DETECTED.with_label_values(&[source]).inc();
}

/// Record a refunded deposit ("unclaimed" or "precision")
pub fn record_deposit_refunded(reason: &str) {
    DEPOSITS_REFUNDED.with_label_values(&[reason]).inc();
}

/// Record a completed swap ("to-wrapped" or "to-native")
pub fn record_swap(direction: &str) {
    SWAPS.with_label_values(&[direction]).inc();
}

/// Record a withdrawal outcome ("sent" or "pending")
pub fn record_withdrawal(status: &str) {
    WITHDRAWALS_SENT.with_label_values(&[status]).inc();
}

pub fn record_job_enqueued(topic: &str) {
    JOBS_ENQUEUED.with_label_values(&[topic]).inc();
}

pub fn record_job_completed(topic: &str) {
    JOBS_COMPLETED.with_label_values(&[topic]).inc();
}

pub fn record_job_retry(topic: &str) {
    JOBS_RETRIED.with_label_values(&[topic]).inc();
}

pub fn record_job_failed(topic: &str, code: &str) {
    JOBS_FAILED.with_label_values(&[topic, code]).inc();
}

/// Lock retries are labelled by lock kind, not full key, to bound cardinality.
pub fn record_lock_retry(name: &str) {
    let kind = name.split(':').next().unwrap_or("unknown");
    LOCK_RETRIES.with_label_values(&[kind]).inc();
}

pub fn set_last_scanned_block(block: u64) {
    LAST_SCANNED_BLOCK.set(block as f64);
}

pub fn set_wallet_balance(wallet: &str, units: f64) {
    WALLET_BALANCE.with_label_values(&[wallet]).set(units);
}
