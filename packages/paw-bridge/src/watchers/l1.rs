//! L1 watcher: confirmation stream plus receivable sweep.
//!
//! Two independent sources feed the same deposit pipeline:
//!
//! - **Stream**: websocket confirmations for the hot wallet, forwarded by the
//!   subscription task in pawchain-rs.
//! - **Sweep**: every 60 s, list pending receivables on the hot wallet and
//!   classify them the same way. The sweep reconciles anything the socket
//!   missed, so a dropped connection degrades to sweep latency instead of
//!   losing deposits.
//!
//! Classification: a send from our own wallets is pocketed and nothing else
//! (self-pay from rebalancing or refunds); a send to any account other than
//! the hot wallet is logged and ignored; everything else becomes a deposit
//! job. The queue's natural ids make the two sources race-free.

use alloy::primitives::U256;
use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use pawchain_rs::l1::{spawn_confirmation_stream, L1Client};
use pawchain_rs::types::{parse_units, raw_to_units, NativeAddress};

use crate::metrics;
use crate::queue::JobQueue;
use crate::types::DepositJob;

pub struct L1Watcher {
    l1: Arc<dyn L1Client>,
    queue: Arc<dyn JobQueue>,
    ws_url: String,
    hot_wallet: NativeAddress,
    cold_wallet: NativeAddress,
    sweep_interval: Duration,
}

impl L1Watcher {
    pub fn new(
        l1: Arc<dyn L1Client>,
        queue: Arc<dyn JobQueue>,
        ws_url: String,
        hot_wallet: NativeAddress,
        cold_wallet: NativeAddress,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            l1,
            queue,
            ws_url,
            hot_wallet,
            cold_wallet,
            sweep_interval,
        }
    }

    /// Run the stream consumer and the periodic sweep until the stream task
    /// dies (it reconnects internally, so that only happens at shutdown).
    pub async fn run(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(256);
        let _stream_task =
            spawn_confirmation_stream(self.ws_url.clone(), self.hot_wallet.clone(), tx);

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            hot_wallet = %self.hot_wallet,
            sweep_secs = self.sweep_interval.as_secs(),
            "L1 watcher started"
        );

        loop {
            tokio::select! {
                message = rx.recv() => {
                    let Some(message) = message else {
                        return Err(eyre::eyre!("confirmation stream ended"));
                    };
                    if let Err(e) = self
                        .classify(&message.sender, &message.receiver, &message.amount_raw, &message.hash, "stream")
                        .await
                    {
                        tracing::error!(hash = %message.hash, error = %e, "failed to handle confirmation");
                    }
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_receivables().await {
                        tracing::warn!(error = %e, "receivable sweep failed, will retry next tick");
                    }
                }
            }
        }
    }

    /// Reconcile receivables the socket may have missed.
    async fn sweep_receivables(&self) -> Result<()> {
        let receivables = self.l1.receivables(&self.hot_wallet).await?;
        if !receivables.is_empty() {
            tracing::debug!(count = receivables.len(), "sweeping pending receivables");
        }
        for receivable in receivables {
            if let Err(e) = self
                .classify(
                    &receivable.source,
                    self.hot_wallet.as_str(),
                    &receivable.amount_raw.to_string(),
                    &receivable.hash,
                    "sweep",
                )
                .await
            {
                tracing::error!(hash = %receivable.hash, error = %e, "failed to handle receivable");
            }
        }
        Ok(())
    }

    /// Shared classification for both sources.
    async fn classify(
        &self,
        sender: &str,
        receiver: &str,
        amount_raw: &str,
        hash: &str,
        source: &str,
    ) -> Result<()> {
        // Self-pays (rebalance legs, refunds) are pocketed and nothing more
        if sender == self.hot_wallet.as_str() || sender == self.cold_wallet.as_str() {
            self.l1.receive(hash).await?;
            tracing::debug!(hash = %hash, "pocketed self-pay");
            return Ok(());
        }

        if receiver != self.hot_wallet.as_str() {
            tracing::info!(
                sender = %sender,
                receiver = %receiver,
                hash = %hash,
                "confirmation not addressed to the hot wallet, ignoring"
            );
            return Ok(());
        }

        if NativeAddress::parse(sender).is_err() {
            tracing::error!(sender = %sender, hash = %hash, "malformed sender address, ignoring");
            return Ok(());
        }

        let raw: U256 = parse_units(amount_raw)?;
        let units = raw_to_units(raw);

        let job = DepositJob {
            native: sender.to_string(),
            amount: units.to_string(),
            ts_ms: chrono::Utc::now().timestamp_millis(),
            hash: hash.to_string(),
        };
        self.queue.enqueue_deposit(&job).await?;
        metrics::record_deposit_detected(source);

        tracing::info!(
            native = %sender,
            amount_units = %units,
            hash = %hash,
            source,
            "deposit queued"
        );
        Ok(())
    }
}
