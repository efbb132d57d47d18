//! Bridge service tests against in-memory doubles of the capability traits.
//!
//! Signatures are real EIP-191 signatures from throwaway keys; only the
//! store, queue, chain clients, and blacklist oracle are doubled.

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use pawchain_rs::challenge::{
    claim_challenge, swap_challenge, withdraw_challenge, MintReceiptSigner,
};
use pawchain_rs::evm::{EvmClient, SwapToNativeEvent};
use pawchain_rs::l1::{L1Client, Receivable};
use pawchain_rs::types::{parse_paw, NativeAddress};

use paw_bridge::blacklist::{BlacklistEntry, BlacklistOracle};
use paw_bridge::error::{BridgeError, BridgeResult};
use paw_bridge::queue::JobQueue;
use paw_bridge::service::{BridgeService, ClaimOutcome, RebalancePolicy};
use paw_bridge::store::{
    DepositRecord, LedgerStore, SwapToNativeRecord, SwapToWrappedRecord, WithdrawalRecord,
};
use paw_bridge::types::{
    DepositJob, EvmScanJob, SwapToNativeJob, SwapToWrappedJob, WithdrawalJob,
};

// ─── In-memory store ────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreInner {
    balances: HashMap<String, U256>,
    pending_claims: HashMap<String, String>,
    claims: HashMap<String, String>,
    deposits: Vec<DepositRecord>,
    withdrawals: Vec<WithdrawalRecord>,
    swaps_to_wrapped: Vec<SwapToWrappedRecord>,
    swaps_to_native: Vec<SwapToNativeRecord>,
    cursor: u64,
    pending_claim_stores: u32,
}

#[derive(Default)]
struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    fn pending_claim_stores(&self) -> u32 {
        self.inner.lock().unwrap().pending_claim_stores
    }

    fn set_balance(&self, native: &str, units: U256) {
        self.inner
            .lock()
            .unwrap()
            .balances
            .insert(native.to_string(), units);
    }

    fn deposits(&self) -> Vec<DepositRecord> {
        self.inner.lock().unwrap().deposits.clone()
    }

    fn withdrawals(&self) -> Vec<WithdrawalRecord> {
        self.inner.lock().unwrap().withdrawals.clone()
    }

    fn swaps_to_wrapped(&self) -> Vec<SwapToWrappedRecord> {
        self.inner.lock().unwrap().swaps_to_wrapped.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, native: &NativeAddress) -> BridgeResult<U256> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .balances
            .get(native.as_str())
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn pending_claim(&self, native: &NativeAddress) -> BridgeResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pending_claims
            .get(native.as_str())
            .cloned())
    }

    async fn store_pending_claim(&self, native: &NativeAddress, evm: &str) -> BridgeResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending_claims.contains_key(native.as_str()) {
            return Ok(false);
        }
        inner
            .pending_claims
            .insert(native.to_string(), evm.to_string());
        inner.pending_claim_stores += 1;
        Ok(true)
    }

    async fn is_claimed(&self, native: &NativeAddress) -> BridgeResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .claims
            .contains_key(native.as_str()))
    }

    async fn has_claim(&self, native: &NativeAddress, evm: &str) -> BridgeResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .claims
            .get(native.as_str())
            .is_some_and(|bound| bound == evm))
    }

    async fn confirm_claim(&self, native: &NativeAddress) -> BridgeResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(evm) = inner.pending_claims.remove(native.as_str()) else {
            return Ok(false);
        };
        inner.claims.entry(native.to_string()).or_insert(evm);
        Ok(true)
    }

    async fn store_deposit(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .deposits
            .iter()
            .any(|d| d.native == native.as_str() && d.hash == hash)
        {
            return Ok(false);
        }
        inner.deposits.push(DepositRecord {
            native: native.to_string(),
            amount,
            ts_ms,
            hash: hash.to_string(),
        });
        *inner
            .balances
            .entry(native.to_string())
            .or_insert(U256::ZERO) += amount;
        Ok(true)
    }

    async fn has_deposit(&self, native: &NativeAddress, hash: &str) -> BridgeResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .deposits
            .iter()
            .any(|d| d.native == native.as_str() && d.hash == hash))
    }

    async fn store_withdrawal(
        &self,
        native: &NativeAddress,
        amount: U256,
        ts_ms: i64,
        hash: &str,
    ) -> BridgeResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .withdrawals
            .iter()
            .any(|w| w.native == native.as_str() && w.ts_ms == ts_ms)
        {
            return Ok(false);
        }
        let balance = inner
            .balances
            .entry(native.to_string())
            .or_insert(U256::ZERO);
        if *balance < amount {
            return Err(BridgeError::InsufficientBalance);
        }
        *balance -= amount;
        inner.withdrawals.push(WithdrawalRecord {
            native: native.to_string(),
            amount,
            ts_ms,
            hash: hash.to_string(),
        });
        Ok(true)
    }

    async fn has_withdrawal_at(&self, native: &NativeAddress, ts_ms: i64) -> BridgeResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .withdrawals
            .iter()
            .any(|w| w.native == native.as_str() && w.ts_ms == ts_ms))
    }

    async fn store_swap_to_wrapped(&self, record: &SwapToWrappedRecord) -> BridgeResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .swaps_to_wrapped
            .iter()
            .any(|s| s.receipt == record.receipt)
        {
            return Ok(false);
        }
        let balance = inner
            .balances
            .entry(record.native.clone())
            .or_insert(U256::ZERO);
        if *balance < record.amount {
            return Err(BridgeError::InsufficientBalance);
        }
        *balance -= record.amount;
        inner.swaps_to_wrapped.push(record.clone());
        Ok(true)
    }

    async fn store_swap_to_native(&self, record: &SwapToNativeRecord) -> BridgeResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .swaps_to_native
            .iter()
            .any(|s| s.evm == record.evm && s.hash == record.hash)
        {
            return Ok(false);
        }
        *inner
            .balances
            .entry(record.native.clone())
            .or_insert(U256::ZERO) += record.amount;
        inner.swaps_to_native.push(record.clone());
        Ok(true)
    }

    async fn has_swap_to_native(&self, evm: &str, hash: &str) -> BridgeResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .swaps_to_native
            .iter()
            .any(|s| s.evm == evm && s.hash == hash))
    }

    async fn scan_cursor(&self) -> BridgeResult<u64> {
        Ok(self.inner.lock().unwrap().cursor)
    }

    async fn advance_scan_cursor(&self, block: u64) -> BridgeResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if block > inner.cursor {
            inner.cursor = block;
        }
        Ok(())
    }

    async fn deposit_history(&self, native: &NativeAddress) -> BridgeResult<Vec<DepositRecord>> {
        let mut records: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .deposits
            .iter()
            .filter(|d| d.native == native.as_str())
            .cloned()
            .collect();
        records.sort_by_key(|d| -d.ts_ms);
        Ok(records)
    }

    async fn withdrawal_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<WithdrawalRecord>> {
        let mut records: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .withdrawals
            .iter()
            .filter(|w| w.native == native.as_str())
            .cloned()
            .collect();
        records.sort_by_key(|w| -w.ts_ms);
        Ok(records)
    }

    async fn swap_to_wrapped_history(
        &self,
        native: &NativeAddress,
    ) -> BridgeResult<Vec<SwapToWrappedRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .swaps_to_wrapped
            .iter()
            .filter(|s| s.native == native.as_str())
            .cloned()
            .collect())
    }

    async fn swap_to_native_history(&self, evm: &str) -> BridgeResult<Vec<SwapToNativeRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .swaps_to_native
            .iter()
            .filter(|s| s.evm == evm)
            .cloned()
            .collect())
    }
}

// ─── In-memory queue ────────────────────────────────────────────────────────

#[derive(Default)]
struct QueueInner {
    ids: HashSet<String>,
    pending_withdrawals: Vec<WithdrawalJob>,
    swaps_to_native: Vec<SwapToNativeJob>,
}

#[derive(Default)]
struct MemoryQueue {
    inner: Mutex<QueueInner>,
}

impl MemoryQueue {
    fn pending_withdrawals(&self) -> Vec<WithdrawalJob> {
        self.inner.lock().unwrap().pending_withdrawals.clone()
    }

    fn swaps_to_native(&self) -> Vec<SwapToNativeJob> {
        self.inner.lock().unwrap().swaps_to_native.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue_deposit(&self, job: &DepositJob) -> BridgeResult<()> {
        self.inner.lock().unwrap().ids.insert(job.job_id());
        Ok(())
    }

    async fn enqueue_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<()> {
        self.inner.lock().unwrap().ids.insert(job.job_id());
        Ok(())
    }

    async fn enqueue_swap_to_wrapped(&self, job: &SwapToWrappedJob) -> BridgeResult<()> {
        self.inner.lock().unwrap().ids.insert(job.job_id());
        Ok(())
    }

    async fn enqueue_swap_to_native(&self, job: &SwapToNativeJob) -> BridgeResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.ids.insert(job.job_id()) {
            inner.swaps_to_native.push(job.clone());
        }
        Ok(())
    }

    async fn enqueue_evm_scan(&self, job: &EvmScanJob) -> BridgeResult<()> {
        self.inner.lock().unwrap().ids.insert(job.job_id());
        Ok(())
    }

    async fn enqueue_pending_withdrawal(&self, job: &WithdrawalJob) -> BridgeResult<()> {
        let mut replacement = job.clone();
        replacement.attempt += 1;
        replacement.signature = None;
        let mut inner = self.inner.lock().unwrap();
        if inner.ids.insert(replacement.pending_job_id()) {
            inner.pending_withdrawals.push(replacement);
        }
        Ok(())
    }

    async fn pending_withdrawals_amount(&self) -> BridgeResult<U256> {
        let inner = self.inner.lock().unwrap();
        let mut total = U256::ZERO;
        for job in &inner.pending_withdrawals {
            total += parse_paw(&job.amount).map_err(BridgeError::External)?;
        }
        Ok(total)
    }
}

// ─── In-memory chain clients ────────────────────────────────────────────────

#[derive(Default)]
struct L1Inner {
    balances: HashMap<String, U256>,
    receivables: Vec<Receivable>,
    receives: Vec<String>,
    sends: Vec<(String, U256)>,
}

#[derive(Default)]
struct MemoryL1 {
    inner: Mutex<L1Inner>,
}

impl MemoryL1 {
    fn set_balance(&self, account: &str, units: U256) {
        self.inner
            .lock()
            .unwrap()
            .balances
            .insert(account.to_string(), units);
    }

    fn receives(&self) -> Vec<String> {
        self.inner.lock().unwrap().receives.clone()
    }

    fn sends(&self) -> Vec<(String, U256)> {
        self.inner.lock().unwrap().sends.clone()
    }
}

#[async_trait]
impl L1Client for MemoryL1 {
    async fn balance(&self, account: &NativeAddress) -> eyre::Result<U256> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .balances
            .get(account.as_str())
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn receivables(&self, _account: &NativeAddress) -> eyre::Result<Vec<Receivable>> {
        Ok(self.inner.lock().unwrap().receivables.clone())
    }

    async fn receive(&self, hash: &str) -> eyre::Result<()> {
        self.inner.lock().unwrap().receives.push(hash.to_string());
        Ok(())
    }

    async fn send(&self, to: &NativeAddress, units: U256) -> eyre::Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.sends.push((to.to_string(), units));
        Ok(format!("SEND-{}", inner.sends.len()))
    }
}

#[derive(Default)]
struct EvmInner {
    latest_block: u64,
    wrapped_balances: HashMap<Address, U256>,
    events: Vec<SwapToNativeEvent>,
}

#[derive(Default)]
struct MemoryEvm {
    inner: Mutex<EvmInner>,
}

impl MemoryEvm {
    fn set_wrapped_balance(&self, account: Address, wei: U256) {
        self.inner
            .lock()
            .unwrap()
            .wrapped_balances
            .insert(account, wei);
    }

    fn push_event(&self, event: SwapToNativeEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.latest_block = inner.latest_block.max(event.block_number);
        inner.events.push(event);
    }
}

#[async_trait]
impl EvmClient for MemoryEvm {
    async fn latest_block(&self) -> eyre::Result<u64> {
        Ok(self.inner.lock().unwrap().latest_block)
    }

    async fn block_timestamp(&self, number: u64) -> eyre::Result<u64> {
        Ok(1_700_000_000 + number)
    }

    async fn wrapped_balance(&self, account: Address) -> eyre::Result<U256> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .wrapped_balances
            .get(&account)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn swap_to_native_logs(&self, from: u64, to: u64) -> eyre::Result<Vec<SwapToNativeEvent>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to)
            .cloned()
            .collect())
    }
}

struct StaticBlacklist {
    banned: HashSet<String>,
}

#[async_trait]
impl BlacklistOracle for StaticBlacklist {
    async fn entry(&self, native: &NativeAddress) -> BridgeResult<Option<BlacklistEntry>> {
        Ok(self.banned.get(native.as_str()).map(|address| BlacklistEntry {
            address: address.clone(),
            alias: "known bad actor".to_string(),
            kind: "scam".to_string(),
        }))
    }
}

// ─── Harness ────────────────────────────────────────────────────────────────

fn paw_addr(seed: &str) -> NativeAddress {
    let mut body = seed.to_string();
    while body.len() < 60 {
        body.push('1');
    }
    NativeAddress::parse(&format!("paw_{}", body)).expect("test address is valid")
}

struct User {
    native: NativeAddress,
    signer: PrivateKeySigner,
}

impl User {
    fn new(seed: &str) -> Self {
        Self {
            native: paw_addr(seed),
            signer: PrivateKeySigner::random(),
        }
    }

    fn evm(&self) -> String {
        self.signer.address().to_checksum(None)
    }

    fn sign(&self, message: &str) -> String {
        let signature = self.signer.sign_message_sync(message.as_bytes()).unwrap();
        format!("0x{}", hex::encode(signature.as_bytes()))
    }
}

struct Harness {
    service: BridgeService,
    store: Arc<MemoryStore>,
    queue: Arc<MemoryQueue>,
    l1: Arc<MemoryL1>,
    evm: Arc<MemoryEvm>,
    hot: NativeAddress,
    cold: NativeAddress,
}

fn harness_with(banned: &[&NativeAddress], reserve: &str, ratio: u32) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let queue = Arc::new(MemoryQueue::default());
    let l1 = Arc::new(MemoryL1::default());
    let evm = Arc::new(MemoryEvm::default());
    let hot = paw_addr("hot");
    let cold = paw_addr("kold");
    let blacklist = Arc::new(StaticBlacklist {
        banned: banned.iter().map(|a| a.to_string()).collect(),
    });

    let service = BridgeService::new(
        store.clone(),
        queue.clone(),
        l1.clone(),
        evm.clone(),
        blacklist,
        MintReceiptSigner::from_signer(PrivateKeySigner::random(), 56),
        hot.clone(),
        cold.clone(),
        RebalancePolicy {
            reserve_units: parse_paw(reserve).unwrap(),
            hot_ratio_pct: ratio,
        },
    );

    Harness {
        service,
        store,
        queue,
        l1,
        evm,
        hot,
        cold,
    }
}

fn harness() -> Harness {
    harness_with(&[], "2", 20)
}

fn deposit_job(user: &User, amount_paw: &str, hash: &str) -> DepositJob {
    DepositJob {
        native: user.native.to_string(),
        amount: parse_paw(amount_paw).unwrap().to_string(),
        ts_ms: 1_700_000_000_000,
        hash: hash.to_string(),
    }
}

fn withdrawal_job(user: &User, amount: &str, ts_ms: i64) -> WithdrawalJob {
    WithdrawalJob {
        native: user.native.to_string(),
        amount: amount.to_string(),
        evm: user.evm(),
        signature: Some(user.sign(&withdraw_challenge(amount, &user.native))),
        ts_ms,
        attempt: 0,
    }
}

async fn claim_and_confirm(h: &Harness, user: &User) {
    let sig = user.sign(&claim_challenge(&user.native));
    assert_eq!(
        h.service.claim(&user.native, &user.evm(), &sig).await.unwrap(),
        ClaimOutcome::Ok
    );
    assert!(h
        .store
        .confirm_claim(&user.native)
        .await
        .expect("confirm never errors"));
}

// ─── Claim scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn double_claim_by_same_user() {
    let h = harness();
    let user = User::new("xuser");
    let sig = user.sign(&claim_challenge(&user.native));

    // First claim stores the pending binding
    assert_eq!(
        h.service.claim(&user.native, &user.evm(), &sig).await.unwrap(),
        ClaimOutcome::Ok
    );
    // Re-claiming the same pair before confirmation is idempotent
    assert_eq!(
        h.service.claim(&user.native, &user.evm(), &sig).await.unwrap(),
        ClaimOutcome::Ok
    );
    assert_eq!(h.store.pending_claim_stores(), 1);

    // A deposit confirms the claim; the next identical claim reports done
    h.service
        .process_deposit(&deposit_job(&user, "1", "D1"))
        .await
        .unwrap();
    assert_eq!(
        h.service.claim(&user.native, &user.evm(), &sig).await.unwrap(),
        ClaimOutcome::AlreadyDone
    );
    assert_eq!(h.store.pending_claim_stores(), 1);
}

#[tokio::test]
async fn claim_collision_rejects_second_owner() {
    let h = harness();
    let first = User::new("xuser");
    let intruder = User {
        native: first.native.clone(),
        signer: PrivateKeySigner::random(),
    };

    let sig = first.sign(&claim_challenge(&first.native));
    assert_eq!(
        h.service.claim(&first.native, &first.evm(), &sig).await.unwrap(),
        ClaimOutcome::Ok
    );

    let intruder_sig = intruder.sign(&claim_challenge(&intruder.native));
    let result = h
        .service
        .claim(&intruder.native, &intruder.evm(), &intruder_sig)
        .await;
    assert!(matches!(result, Err(BridgeError::InvalidOwner)));
    assert_eq!(h.store.pending_claim_stores(), 1);
}

#[tokio::test]
async fn claim_with_wrong_signature_rejected() {
    let h = harness();
    let user = User::new("xuser");
    // Signature over a different user's challenge does not recover to evm
    let other = User::new("other");
    let sig = user.sign(&claim_challenge(&other.native));

    let result = h.service.claim(&user.native, &user.evm(), &sig).await;
    assert!(matches!(result, Err(BridgeError::InvalidSignature)));
    assert_eq!(h.store.pending_claim_stores(), 0);
}

#[tokio::test]
async fn blacklisted_address_cannot_claim() {
    let banned = User::new("banned");
    let h = harness_with(&[&banned.native], "2", 20);
    let sig = banned.sign(&claim_challenge(&banned.native));

    let result = h.service.claim(&banned.native, &banned.evm(), &sig).await;
    assert!(matches!(result, Err(BridgeError::Blacklisted(_))));
    assert_eq!(h.store.pending_claim_stores(), 0);
}

// ─── Deposit scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn deposit_to_unclaimed_wallet_is_refunded() {
    let h = harness();
    let sender = User::new("sender");

    let result = h
        .service
        .process_deposit(&deposit_job(&sender, "1", "D1"))
        .await
        .unwrap();

    assert_eq!(result["reason"], "unclaimed");
    assert_eq!(h.l1.receives(), vec!["D1".to_string()]);
    assert_eq!(
        h.l1.sends(),
        vec![(sender.native.to_string(), parse_paw("1").unwrap())]
    );
    assert!(h.store.deposits().is_empty());
    assert_eq!(h.store.balance(&sender.native).await.unwrap(), U256::ZERO);
}

#[tokio::test]
async fn deposit_with_excess_precision_is_refunded() {
    let h = harness();
    let sender = User::new("sender");
    claim_and_confirm(&h, &sender).await;

    let result = h
        .service
        .process_deposit(&deposit_job(&sender, "1.466", "D2"))
        .await
        .unwrap();

    assert_eq!(result["reason"], "precision");
    assert_eq!(
        h.l1.sends(),
        vec![(sender.native.to_string(), parse_paw("1.466").unwrap())]
    );
    assert!(h.store.deposits().is_empty());
}

#[tokio::test]
async fn deposit_is_idempotent_on_hash() {
    let h = harness();
    let sender = User::new("sender");
    claim_and_confirm(&h, &sender).await;

    h.service
        .process_deposit(&deposit_job(&sender, "10", "D3"))
        .await
        .unwrap();
    let replay = h
        .service
        .process_deposit(&deposit_job(&sender, "10", "D3"))
        .await
        .unwrap();

    assert_eq!(replay["duplicate"], true);
    assert_eq!(h.store.deposits().len(), 1);
    assert_eq!(
        h.store.balance(&sender.native).await.unwrap(),
        parse_paw("10").unwrap()
    );
}

#[tokio::test]
async fn deposit_triggers_hot_cold_sweep() {
    let h = harness();
    let sender = User::new("sender");
    claim_and_confirm(&h, &sender).await;
    h.l1.set_balance(h.hot.as_str(), parse_paw("50").unwrap());

    h.service
        .process_deposit(&deposit_job(&sender, "10", "D4"))
        .await
        .unwrap();

    // min(50-2, 10) = 10 whole PAW, 80% of it moves to cold
    let sweep = h
        .l1
        .sends()
        .into_iter()
        .find(|(to, _)| to == h.cold.as_str())
        .expect("cold sweep sent");
    assert_eq!(sweep.1, parse_paw("8").unwrap());
}

#[tokio::test]
async fn small_deposit_skips_sweep() {
    let h = harness();
    let sender = User::new("sender");
    claim_and_confirm(&h, &sender).await;
    h.l1.set_balance(h.hot.as_str(), parse_paw("50").unwrap());

    h.service
        .process_deposit(&deposit_job(&sender, "0.9", "D5"))
        .await
        .unwrap();

    assert!(h.l1.sends().iter().all(|(to, _)| to != h.cold.as_str()));
}

// ─── Withdrawal scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn negative_withdrawal_rejected() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("200").unwrap());
    h.l1.set_balance(h.hot.as_str(), parse_paw("100").unwrap());

    let result = h
        .service
        .process_withdrawal(&withdrawal_job(&user, "-5", 1))
        .await;

    match result {
        Err(BridgeError::InvalidRequest(message)) => {
            assert!(message.contains("negative"), "got: {}", message)
        }
        other => panic!("expected negative rejection, got {:?}", other.map(|_| ())),
    }
    assert!(h.l1.sends().is_empty());
    assert!(h.store.withdrawals().is_empty());
}

#[tokio::test]
async fn withdrawal_with_insufficient_hot_liquidity_goes_pending() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("200").unwrap());
    h.l1.set_balance(h.hot.as_str(), parse_paw("100").unwrap());

    let result = h
        .service
        .process_withdrawal(&withdrawal_job(&user, "150", 7))
        .await;

    assert!(matches!(result, Err(BridgeError::PendingLiquidity)));
    assert!(h.l1.sends().is_empty());
    assert!(h.store.withdrawals().is_empty());

    let pending = h.queue.pending_withdrawals();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt, 1);
    assert!(pending[0].signature.is_none());
    assert_eq!(
        h.queue.pending_withdrawals_amount().await.unwrap(),
        parse_paw("150").unwrap()
    );
}

#[tokio::test]
async fn withdrawal_is_idempotent_on_timestamp() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("200").unwrap());
    h.l1.set_balance(h.hot.as_str(), parse_paw("300").unwrap());

    let job = withdrawal_job(&user, "150", 42);
    let first = h.service.process_withdrawal(&job).await.unwrap();
    assert_eq!(first["amount"], "150");

    let second = h.service.process_withdrawal(&job).await;
    assert!(matches!(second, Err(BridgeError::AlreadyProcessed)));

    assert_eq!(h.l1.sends().len(), 1);
    assert_eq!(h.store.withdrawals().len(), 1);
    assert_eq!(
        h.store.balance(&user.native).await.unwrap(),
        parse_paw("50").unwrap()
    );
}

#[tokio::test]
async fn withdrawal_requires_claim_ownership() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("200").unwrap());
    h.l1.set_balance(h.hot.as_str(), parse_paw("300").unwrap());

    // A different key signs for the same native address
    let thief = User {
        native: user.native.clone(),
        signer: PrivateKeySigner::random(),
    };
    let result = h
        .service
        .process_withdrawal(&withdrawal_job(&thief, "10", 9))
        .await;

    assert!(matches!(result, Err(BridgeError::InvalidOwner)));
    assert!(h.l1.sends().is_empty());
}

#[tokio::test]
async fn withdrawal_exceeding_ledger_balance_rejected() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("5").unwrap());
    h.l1.set_balance(h.hot.as_str(), parse_paw("300").unwrap());

    let result = h
        .service
        .process_withdrawal(&withdrawal_job(&user, "10", 11))
        .await;
    assert!(matches!(result, Err(BridgeError::InsufficientBalance)));
    assert!(h.l1.sends().is_empty());
}

// ─── Swap scenarios ─────────────────────────────────────────────────────────

#[tokio::test]
async fn swap_without_claim_yields_no_receipt() {
    let h = harness();
    let owner = User::new("xuser");
    claim_and_confirm(&h, &owner).await;
    h.store.set_balance(owner.native.as_str(), parse_paw("100").unwrap());

    // 0xC signs correctly but the claim binds the address to 0xA
    let outsider = User {
        native: owner.native.clone(),
        signer: PrivateKeySigner::random(),
    };
    let job = SwapToWrappedJob {
        native: outsider.native.to_string(),
        amount: "10".to_string(),
        evm: outsider.evm(),
        signature: outsider.sign(&swap_challenge("10", &outsider.native)),
        ts_ms: 1,
    };

    let result = h.service.process_swap_to_wrapped(&job).await;
    assert!(matches!(result, Err(BridgeError::InvalidOwner)));
    assert!(h.store.swaps_to_wrapped().is_empty());
    assert_eq!(
        h.store.balance(&owner.native).await.unwrap(),
        parse_paw("100").unwrap()
    );
}

#[tokio::test]
async fn swap_to_wrapped_issues_receipt_and_debits() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("100").unwrap());
    h.evm.set_wrapped_balance(
        user.signer.address(),
        U256::from(5_000_000_000_000_000_000u64),
    );

    let job = SwapToWrappedJob {
        native: user.native.to_string(),
        amount: "40".to_string(),
        evm: user.evm(),
        signature: user.sign(&swap_challenge("40", &user.native)),
        ts_ms: 3,
    };
    let result = h.service.process_swap_to_wrapped(&job).await.unwrap();

    assert!(result["receipt"].as_str().unwrap().starts_with("0x"));
    assert_eq!(result["wrappedBalance"], "5000000000000000000");
    assert_eq!(
        h.store.balance(&user.native).await.unwrap(),
        parse_paw("60").unwrap()
    );

    let swaps = h.store.swaps_to_wrapped();
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0].amount, parse_paw("40").unwrap());
}

#[tokio::test]
async fn swap_exceeding_balance_rejected() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.store.set_balance(user.native.as_str(), parse_paw("10").unwrap());

    let job = SwapToWrappedJob {
        native: user.native.to_string(),
        amount: "11".to_string(),
        evm: user.evm(),
        signature: user.sign(&swap_challenge("11", &user.native)),
        ts_ms: 4,
    };
    let result = h.service.process_swap_to_wrapped(&job).await;
    assert!(matches!(result, Err(BridgeError::InsufficientBalance)));
    assert!(h.store.swaps_to_wrapped().is_empty());
}

#[tokio::test]
async fn swap_to_native_credits_once() {
    let h = harness();
    let user = User::new("xuser");

    let job = SwapToNativeJob {
        evm: user.evm(),
        native: user.native.to_string(),
        amount: parse_paw("25").unwrap().to_string(),
        wrapped_balance: "0".to_string(),
        hash: "0xBURN1".to_string(),
        ts_ms: 1_700_000_123_000,
    };

    h.service.process_swap_to_native(&job).await.unwrap();
    assert_eq!(
        h.store.balance(&user.native).await.unwrap(),
        parse_paw("25").unwrap()
    );
    // No outgoing L1 transaction: credit is the full settlement
    assert!(h.l1.sends().is_empty());

    let replay = h.service.process_swap_to_native(&job).await.unwrap();
    assert_eq!(replay["duplicate"], true);
    assert_eq!(
        h.store.balance(&user.native).await.unwrap(),
        parse_paw("25").unwrap()
    );
}

// ─── EVM scan ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn evm_scan_walks_slices_and_advances_cursor() {
    let h = harness();
    let user = User::new("xuser");
    let evm_address = user.signer.address();

    h.evm.push_event(SwapToNativeEvent {
        from: evm_address,
        paw: user.native.to_string(),
        amount_wei: U256::from(2_000_000_000_000_000_000u64), // 2 PAW
        tx_hash: "0xB1".to_string(),
        block_number: 150,
    });
    h.evm.push_event(SwapToNativeEvent {
        from: evm_address,
        paw: user.native.to_string(),
        amount_wei: U256::from(3_000_000_000_000_000_000u64),
        tx_hash: "0xB2".to_string(),
        block_number: 1800,
    });

    h.service
        .process_evm_scan(&EvmScanJob { from: 1, to: 2500 })
        .await
        .unwrap();

    assert_eq!(h.store.scan_cursor().await.unwrap(), 2500);
    let swaps = h.queue.swaps_to_native();
    assert_eq!(swaps.len(), 2);
    assert_eq!(swaps[0].amount, parse_paw("2").unwrap().to_string());
    // block.timestamp seconds become milliseconds
    assert_eq!(swaps[0].ts_ms, (1_700_000_000 + 150) * 1000);

    // A replay only covers the unscanned suffix and re-enqueues nothing
    h.service
        .process_evm_scan(&EvmScanJob { from: 1, to: 2500 })
        .await
        .unwrap();
    assert_eq!(h.queue.swaps_to_native().len(), 2);
}

#[tokio::test]
async fn scan_cursor_is_monotone() {
    let h = harness();
    h.store.advance_scan_cursor(10).await.unwrap();
    h.store.advance_scan_cursor(5).await.unwrap();
    assert_eq!(h.store.scan_cursor().await.unwrap(), 10);
}

// ─── Invariants ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn balance_equals_sum_of_confirmed_records() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.l1.set_balance(h.hot.as_str(), parse_paw("1000").unwrap());

    h.service
        .process_deposit(&deposit_job(&user, "10", "D1"))
        .await
        .unwrap();
    h.service
        .process_swap_to_wrapped(&SwapToWrappedJob {
            native: user.native.to_string(),
            amount: "3".to_string(),
            evm: user.evm(),
            signature: user.sign(&swap_challenge("3", &user.native)),
            ts_ms: 2,
        })
        .await
        .unwrap();
    h.service
        .process_swap_to_native(&SwapToNativeJob {
            evm: user.evm(),
            native: user.native.to_string(),
            amount: parse_paw("2").unwrap().to_string(),
            wrapped_balance: "0".to_string(),
            hash: "0xB1".to_string(),
            ts_ms: 3,
        })
        .await
        .unwrap();
    h.service
        .process_withdrawal(&withdrawal_job(&user, "4", 4))
        .await
        .unwrap();

    let deposits: U256 = h.store.deposits().iter().map(|d| d.amount).sum();
    let withdrawals: U256 = h.store.withdrawals().iter().map(|w| w.amount).sum();
    let to_wrapped: U256 = h.store.swaps_to_wrapped().iter().map(|s| s.amount).sum();
    let to_native = parse_paw("2").unwrap();

    let reconstructed = deposits + to_native - withdrawals - to_wrapped;
    assert_eq!(h.store.balance(&user.native).await.unwrap(), reconstructed);
    assert_eq!(reconstructed, parse_paw("5").unwrap());
}

#[tokio::test]
async fn full_round_trip_returns_balance_to_zero() {
    let h = harness();
    let user = User::new("xuser");
    claim_and_confirm(&h, &user).await;
    h.l1.set_balance(h.hot.as_str(), parse_paw("1000").unwrap());

    h.service
        .process_deposit(&deposit_job(&user, "12", "D1"))
        .await
        .unwrap();
    h.service
        .process_swap_to_wrapped(&SwapToWrappedJob {
            native: user.native.to_string(),
            amount: "12".to_string(),
            evm: user.evm(),
            signature: user.sign(&swap_challenge("12", &user.native)),
            ts_ms: 2,
        })
        .await
        .unwrap();
    // User mints, burns, and the watcher hands the burn back
    h.service
        .process_swap_to_native(&SwapToNativeJob {
            evm: user.evm(),
            native: user.native.to_string(),
            amount: parse_paw("12").unwrap().to_string(),
            wrapped_balance: "0".to_string(),
            hash: "0xBURN".to_string(),
            ts_ms: 3,
        })
        .await
        .unwrap();
    h.service
        .process_withdrawal(&withdrawal_job(&user, "12", 4))
        .await
        .unwrap();

    assert_eq!(h.store.balance(&user.native).await.unwrap(), U256::ZERO);
}
