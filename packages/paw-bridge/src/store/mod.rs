//! The ledger store: authoritative per-user balances, claims, append-only
//! operation records, audit rows, and the EVM scan cursor.
//!
//! Every balance mutation runs inside a transaction while holding the named
//! lock for the touched key (`balance:<native>` or `swap-to-wrapped:<native>`),
//! so concurrent workers linearise at the store. Record inserts are
//! conflict-gated on their natural keys: a duplicate insert is a no-op that
//! leaves the balance untouched.

use alloy::primitives::U256;
use async_trait::async_trait;

use pawchain_rs::types::NativeAddress;

use crate::error::BridgeResult;

pub mod locks;
pub mod pg;

pub use pg::PgLedgerStore;

/// Cap on history query results, newest first.
pub const HISTORY_LIMIT: i64 = 1000;

#[derive(Debug, Clone)]
pub struct DepositRecord {
    pub native: String,
    pub amount: U256,
    pub ts_ms: i64,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct WithdrawalRecord {
    pub native: String,
    pub amount: U256,
    pub ts_ms: i64,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct SwapToWrappedRecord {
    pub native: String,
    pub evm: String,
    pub amount: U256,
    pub ts_ms: i64,
    pub receipt: String,
    pub uuid: U256,
}

#[derive(Debug, Clone)]
pub struct SwapToNativeRecord {
    pub evm: String,
    pub native: String,
    pub amount: U256,
    pub ts_ms: i64,
    pub hash: String,
}

/// Persistence capability consumed by the bridge service and watchers.
///
/// Mutating methods return `Ok(false)` when the record already existed
/// (at-most-once insertion); the balance is untouched in that case.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance in atomic units; zero for unknown addresses.
    async fn balance(&self, native: &NativeAddress) -> BridgeResult<U256>;

    /// The EVM address of a live (unexpired) pending claim, if any.
    async fn pending_claim(&self, native: &NativeAddress) -> BridgeResult<Option<String>>;

    /// Create a pending claim with a 300 s TTL. Returns false without
    /// touching state when a different live pending claim occupies the slot.
    async fn store_pending_claim(&self, native: &NativeAddress, evm: &str) -> BridgeResult<bool>;

    /// Whether a confirmed claim exists for this native address.
    async fn is_claimed(&self, native: &NativeAddress) -> BridgeResult<bool>;

    /// Whether a confirmed claim binds exactly this (native, evm) pair.
    async fn has_claim(&self, native: &NativeAddress, evm: &str) -> BridgeResult<bool>;

    /// Promote the live pending claim to a confirmed one. Returns false when
    /// no live pending claim exists. A native address that already holds a
    /// confirmed claim keeps it unchanged.
    async fn confirm_claim(&self, native: &NativeAddress) -> BridgeResult<bool>;

    /// Record a deposit and credit the balance. No-op on a known hash.
    async fn store_deposit(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool>;

    async fn has_deposit(&self, native: &NativeAddress, hash: &str) -> BridgeResult<bool>;

    /// Record a withdrawal and debit the balance. No-op on a known
    /// (native, ts) key.
    async fn store_withdrawal(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool>;

    async fn has_withdrawal_at(&self, native: &NativeAddress, ts_ms: i64) -> BridgeResult<bool>;

    /// Record a native→wrapped swap and debit the balance.
    async fn store_swap_to_wrapped(&self, record: &SwapToWrappedRecord) -> BridgeResult<bool>;

    /// Record a wrapped→native swap and credit the balance. No-op on a known
    /// (evm, hash) key.
    async fn store_swap_to_native(&self, record: &SwapToNativeRecord) -> BridgeResult<bool>;

    async fn has_swap_to_native(&self, evm: &str, hash: &str) -> BridgeResult<bool>;

    /// Last EVM block the scanner has fully processed.
    async fn scan_cursor(&self) -> BridgeResult<u64>;

    /// Advance the cursor; writes only if strictly greater than the stored
    /// value, so the cursor never moves backwards.
    async fn advance_scan_cursor(&self, block: u64) -> BridgeResult<()>;

    async fn deposit_history(&self, native: &NativeAddress)
        -> BridgeResult<Vec<DepositRecord>>;
    async fn withdrawal_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<WithdrawalRecord>>;
    async fn swap_to_wrapped_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<SwapToWrappedRecord>>;
    async fn swap_to_native_history(&self, evm: &str) -> BridgeResult<Vec<SwapToNativeRecord>>;
}
