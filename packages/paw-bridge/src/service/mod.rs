//! Bridge business logic: claims, deposits, withdrawals, and both swap
//! directions.
//!
//! The service depends only on capability traits (store, queue, chain
//! clients, blacklist oracle); production wiring and tests inject their own
//! implementations. Queue workers call back into the service through its
//! [`JobProcessor`] impl — handlers are installed at construction time, and at
//! runtime the queue invokes them by topic.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use pawchain_rs::challenge::{
    claim_challenge, recover_signer, swap_challenge, withdraw_challenge, MintReceiptSigner,
};
use pawchain_rs::evm::EvmClient;
use pawchain_rs::l1::L1Client;
use pawchain_rs::types::{
    format_paw, has_sub_cent_precision, parse_paw, parse_units, units_to_wrapped_wei,
    wrapped_wei_to_units, NativeAddress,
};

use crate::blacklist::BlacklistOracle;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::queue::{Job, JobProcessor, JobQueue};
use crate::store::{LedgerStore, SwapToNativeRecord, SwapToWrappedRecord};
use crate::types::{
    DepositJob, EvmScanJob, SwapToNativeJob, SwapToWrappedJob, Topic, WithdrawalJob,
};

pub mod rebalance;

pub use rebalance::RebalancePolicy;

/// Blocks per catch-up scan slice.
const SCAN_SLICE: u64 = 1000;

/// Outcome of a claim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Pending claim stored (or already pending for the same pair)
    Ok,
    /// A confirmed claim already binds this exact pair
    AlreadyDone,
}

pub struct BridgeService {
    store: Arc<dyn LedgerStore>,
    queue: Arc<dyn JobQueue>,
    l1: Arc<dyn L1Client>,
    evm: Arc<dyn EvmClient>,
    blacklist: Arc<dyn BlacklistOracle>,
    receipts: MintReceiptSigner,
    hot_wallet: NativeAddress,
    cold_wallet: NativeAddress,
    rebalance: RebalancePolicy,
}

impl BridgeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        queue: Arc<dyn JobQueue>,
        l1: Arc<dyn L1Client>,
        evm: Arc<dyn EvmClient>,
        blacklist: Arc<dyn BlacklistOracle>,
        receipts: MintReceiptSigner,
        hot_wallet: NativeAddress,
        cold_wallet: NativeAddress,
        rebalance: RebalancePolicy,
    ) -> Self {
        Self {
            store,
            queue,
            l1,
            evm,
            blacklist,
            receipts,
            hot_wallet,
            cold_wallet,
            rebalance,
        }
    }

    pub fn hot_wallet(&self) -> &NativeAddress {
        &self.hot_wallet
    }

    // ========================================================================
    // Claim
    // ========================================================================

    /// Bind a native address to an EVM address, pending an on-chain deposit.
    pub async fn claim(
        &self,
        native: &NativeAddress,
        evm: &str,
        signature: &str,
    ) -> BridgeResult<ClaimOutcome> {
        let evm_address = parse_evm_address(evm)?;
        let evm = checksum(evm_address);

        let challenge = claim_challenge(native);
        let recovered =
            recover_signer(&challenge, signature).map_err(|_| BridgeError::InvalidSignature)?;
        if recovered != evm_address {
            return Err(BridgeError::InvalidSignature);
        }

        if let Some(entry) = self.blacklist.entry(native).await? {
            tracing::warn!(native = %native, alias = %entry.alias, "claim from blacklisted address");
            return Err(BridgeError::Blacklisted(native.to_string()));
        }

        if self.store.has_claim(native, &evm).await? {
            return Ok(ClaimOutcome::AlreadyDone);
        }

        match self.store.pending_claim(native).await? {
            Some(pending) if pending != evm => return Err(BridgeError::InvalidOwner),
            Some(_) => return Ok(ClaimOutcome::Ok), // already pending for this pair
            None => {}
        }

        if !self.store.store_pending_claim(native, &evm).await? {
            // Lost the slot to a concurrent claim
            return Err(BridgeError::InvalidOwner);
        }
        tracing::info!(native = %native, evm = %evm, "pending claim stored");
        Ok(ClaimOutcome::Ok)
    }

    // ========================================================================
    // Deposit
    // ========================================================================

    pub async fn process_deposit(&self, job: &DepositJob) -> BridgeResult<serde_json::Value> {
        let native = parse_native(&job.native)?;
        let amount = parse_units(&job.amount)
            .map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;

        // A first deposit confirms the sender's pending claim
        if self.store.pending_claim(&native).await?.is_some() {
            self.store.confirm_claim(&native).await?;
        }

        // Pocket the send block; safe on replay
        self.l1.receive(&job.hash).await.map_err(BridgeError::External)?;

        if !self.store.is_claimed(&native).await? {
            return self.refund_deposit(&native, amount, &job.hash, "unclaimed").await;
        }

        if has_sub_cent_precision(amount) {
            return self.refund_deposit(&native, amount, &job.hash, "precision").await;
        }

        let stored = self
            .store
            .store_deposit(&native, amount, job.ts_ms, &job.hash)
            .await?;
        if !stored {
            tracing::info!(native = %native, hash = %job.hash, "deposit replayed, already credited");
            return Ok(json!({ "duplicate": true }));
        }

        tracing::info!(
            native = %native,
            amount = %format_paw(amount),
            hash = %job.hash,
            "deposit credited"
        );

        self.rebalance_hot_wallet(amount).await?;

        Ok(json!({
            "credited": format_paw(amount),
            "hash": job.hash,
        }))
    }

    async fn refund_deposit(
        &self,
        native: &NativeAddress,
        amount: U256,
        hash: &str,
        reason: &str,
    ) -> BridgeResult<serde_json::Value> {
        let refund_hash = self
            .l1
            .send(native, amount)
            .await
            .map_err(BridgeError::External)?;
        metrics::record_deposit_refunded(reason);
        tracing::info!(
            native = %native,
            amount = %format_paw(amount),
            deposit_hash = %hash,
            refund_hash = %refund_hash,
            reason,
            "deposit refunded"
        );
        Ok(json!({
            "refunded": format_paw(amount),
            "reason": reason,
            "hash": refund_hash,
        }))
    }

    /// Hot→cold sweep after a credited deposit.
    async fn rebalance_hot_wallet(&self, deposit: U256) -> BridgeResult<()> {
        let hot = self
            .l1
            .balance(&self.hot_wallet)
            .await
            .map_err(BridgeError::External)?;
        let cold = self
            .l1
            .balance(&self.cold_wallet)
            .await
            .map_err(BridgeError::External)?;
        metrics::set_wallet_balance("hot", units_as_f64(hot));
        metrics::set_wallet_balance("cold", units_as_f64(cold));

        let send = self.rebalance.cold_send(hot, cold, deposit);
        if send == U256::ZERO {
            return Ok(());
        }

        let hash = self
            .l1
            .send(&self.cold_wallet, send)
            .await
            .map_err(BridgeError::External)?;
        tracing::info!(
            amount = %format_paw(send),
            hot = %format_paw(hot),
            cold = %format_paw(cold),
            hash = %hash,
            "swept hot wallet excess to cold storage"
        );
        Ok(())
    }

    // ========================================================================
    // Withdrawal
    // ========================================================================

    pub async fn process_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<serde_json::Value> {
        let native = parse_native(&job.native)?;
        let evm_address = parse_evm_address(&job.evm)?;
        let evm = checksum(evm_address);

        if self.store.has_withdrawal_at(&native, job.ts_ms).await? {
            return Err(BridgeError::AlreadyProcessed);
        }

        // Delayed-retry replacements omit the signature: the first attempt
        // validated it.
        if let Some(signature) = &job.signature {
            let challenge = withdraw_challenge(&job.amount, &native);
            let recovered = recover_signer(&challenge, signature)
                .map_err(|_| BridgeError::InvalidSignature)?;
            if recovered != evm_address {
                return Err(BridgeError::InvalidSignature);
            }
        }

        if !self.store.is_claimed(&native).await? || !self.store.has_claim(&native, &evm).await? {
            return Err(BridgeError::InvalidOwner);
        }

        if job.amount.trim().starts_with('-') {
            return Err(BridgeError::InvalidRequest("negative amount".to_string()));
        }
        let amount =
            parse_paw(&job.amount).map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;

        if self.store.balance(&native).await? < amount {
            return Err(BridgeError::InsufficientBalance);
        }

        let hot = self
            .l1
            .balance(&self.hot_wallet)
            .await
            .map_err(BridgeError::External)?;
        if hot < amount {
            self.queue.enqueue_pending_withdrawal(job).await?;
            metrics::record_withdrawal("pending");
            tracing::info!(
                native = %native,
                amount = %job.amount,
                hot = %format_paw(hot),
                "hot wallet cannot cover withdrawal, replaced with delayed job"
            );
            return Err(BridgeError::PendingLiquidity);
        }

        let hash = self
            .l1
            .send(&native, amount)
            .await
            .map_err(BridgeError::External)?;
        let stored = self
            .store
            .store_withdrawal(&native, amount, job.ts_ms, &hash)
            .await?;
        if !stored {
            return Err(BridgeError::AlreadyProcessed);
        }

        metrics::record_withdrawal("sent");
        tracing::info!(
            native = %native,
            amount = %format_paw(amount),
            hash = %hash,
            "withdrawal sent"
        );

        Ok(json!({
            "native": native.as_str(),
            "amount": format_paw(amount),
            "hash": hash,
        }))
    }

    // ========================================================================
    // Swap native → wrapped
    // ========================================================================

    pub async fn process_swap_to_wrapped(
        &self,
        job: &SwapToWrappedJob,
    ) -> BridgeResult<serde_json::Value> {
        let native = parse_native(&job.native)?;
        let evm_address = parse_evm_address(&job.evm)?;
        let evm = checksum(evm_address);

        let challenge = swap_challenge(&job.amount, &native);
        let recovered = recover_signer(&challenge, &job.signature)
            .map_err(|_| BridgeError::InvalidSignature)?;
        if recovered != evm_address {
            return Err(BridgeError::InvalidSignature);
        }

        if !self.store.has_claim(&native, &evm).await? {
            return Err(BridgeError::InvalidOwner);
        }

        if job.amount.trim().starts_with('-') {
            return Err(BridgeError::InvalidRequest("negative amount".to_string()));
        }
        let amount =
            parse_paw(&job.amount).map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;

        if self.store.balance(&native).await? < amount {
            return Err(BridgeError::InsufficientBalance);
        }

        // Read before mutating: a failure here retries without side effects
        let wrapped_balance = self
            .evm
            .wrapped_balance(evm_address)
            .await
            .map_err(BridgeError::External)?;

        let uuid = U256::from(now_ms() as u64);
        let receipt = self
            .receipts
            .sign(evm_address, units_to_wrapped_wei(amount), uuid)
            .map_err(BridgeError::External)?;

        let record = SwapToWrappedRecord {
            native: native.to_string(),
            evm: evm.clone(),
            amount,
            ts_ms: job.ts_ms,
            receipt: receipt.receipt.clone(),
            uuid,
        };
        self.store.store_swap_to_wrapped(&record).await?;

        metrics::record_swap("to-wrapped");
        tracing::info!(
            native = %native,
            evm = %evm,
            amount = %format_paw(amount),
            uuid = %uuid,
            "mint receipt issued"
        );

        Ok(json!({
            "receipt": receipt.receipt,
            "uuid": uuid.to_string(),
            "wrappedBalance": wrapped_balance.to_string(),
        }))
    }

    // ========================================================================
    // Swap wrapped → native
    // ========================================================================

    pub async fn process_swap_to_native(
        &self,
        job: &SwapToNativeJob,
    ) -> BridgeResult<serde_json::Value> {
        if self.store.has_swap_to_native(&job.evm, &job.hash).await? {
            tracing::info!(evm = %job.evm, hash = %job.hash, "burn replayed, already credited");
            return Ok(json!({ "duplicate": true }));
        }

        let amount = parse_units(&job.amount)
            .map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;

        let record = SwapToNativeRecord {
            evm: job.evm.clone(),
            native: job.native.clone(),
            amount,
            ts_ms: job.ts_ms,
            hash: job.hash.clone(),
        };
        let stored = self.store.store_swap_to_native(&record).await?;
        if !stored {
            return Ok(json!({ "duplicate": true }));
        }

        metrics::record_swap("to-native");
        tracing::info!(
            evm = %job.evm,
            native = %job.native,
            amount = %format_paw(amount),
            hash = %job.hash,
            "burn credited; funds reclaimable via withdrawal"
        );

        // Credit is the complete settlement: no outgoing L1 transaction here
        Ok(json!({
            "credited": format_paw(amount),
            "hash": job.hash,
        }))
    }

    // ========================================================================
    // EVM catch-up scan
    // ========================================================================

    pub async fn process_evm_scan(&self, job: &EvmScanJob) -> BridgeResult<serde_json::Value> {
        // Slices already scanned (this run or a previous attempt) advanced
        // the cursor; a retry only covers the unscanned suffix.
        let cursor = self.store.scan_cursor().await?;
        let mut from = job.from.max(cursor + 1);

        while from <= job.to {
            let to = (from + SCAN_SLICE - 1).min(job.to);

            let events = self
                .evm
                .swap_to_native_logs(from, to)
                .await
                .map_err(BridgeError::External)?;

            for event in events {
                let block_ts = self
                    .evm
                    .block_timestamp(event.block_number)
                    .await
                    .map_err(BridgeError::External)?;
                let wrapped_balance = self
                    .evm
                    .wrapped_balance(event.from)
                    .await
                    .map_err(BridgeError::External)?;

                let swap = SwapToNativeJob {
                    evm: checksum(event.from),
                    native: event.paw.clone(),
                    amount: wrapped_wei_to_units(event.amount_wei).to_string(),
                    wrapped_balance: wrapped_balance.to_string(),
                    hash: event.tx_hash.clone(),
                    ts_ms: block_ts as i64 * 1000,
                };
                self.queue.enqueue_swap_to_native(&swap).await?;
                tracing::info!(
                    evm = %swap.evm,
                    native = %swap.native,
                    hash = %swap.hash,
                    block = event.block_number,
                    "burn event handed off"
                );
            }

            self.store.advance_scan_cursor(to).await?;
            metrics::set_last_scanned_block(to);
            from = to + 1;
        }

        Ok(json!({ "scanned_to": job.to }))
    }
}

/// Queue workers dispatch by topic into the service.
#[async_trait]
impl JobProcessor for BridgeService {
    async fn process(&self, job: &Job) -> BridgeResult<serde_json::Value> {
        match job.topic {
            Topic::Deposit => self.process_deposit(&job.parse_payload()?).await,
            Topic::Withdrawal => self.process_withdrawal(&job.parse_payload()?).await,
            Topic::SwapToWrapped => self.process_swap_to_wrapped(&job.parse_payload()?).await,
            Topic::SwapToNative => self.process_swap_to_native(&job.parse_payload()?).await,
            Topic::EvmScan => self.process_evm_scan(&job.parse_payload()?).await,
        }
    }
}

fn parse_native(s: &str) -> BridgeResult<NativeAddress> {
    NativeAddress::parse(s).map_err(|e| BridgeError::InvalidRequest(e.to_string()))
}

fn parse_evm_address(s: &str) -> BridgeResult<Address> {
    Address::from_str(s).map_err(|_| BridgeError::InvalidRequest(format!("bad evm address: {}", s)))
}

/// EIP-55 rendering used for storage and comparison.
fn checksum(address: Address) -> String {
    address.to_checksum(None)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn units_as_f64(units: U256) -> f64 {
    // Metrics only; precision loss above 2^53 units is acceptable there
    units.to_string().parse().unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_normalises_case() {
        let lower = parse_evm_address("0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359").unwrap();
        let upper = parse_evm_address("0xFB6916095CA1DF60BB79CE92CE3EA74C37C5D359").unwrap();
        assert_eq!(checksum(lower), checksum(upper));
        assert_eq!(checksum(lower), "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359");
    }
}
