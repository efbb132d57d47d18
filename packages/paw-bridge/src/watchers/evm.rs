//! EVM watcher for wPAW burns.
//!
//! Polls the chain behind a confirmation margin and enqueues `evm-scan` jobs
//! covering the unscanned range. The scan processor walks the range in
//! 1000-block slices, hands each burn off as a swap-to-native job, and
//! advances the persisted cursor per slice — so a restart (or a failed slice
//! retried by queue policy) resumes exactly at the unscanned suffix.

use eyre::Result;
use std::sync::Arc;
use std::time::Duration;

use pawchain_rs::evm::EvmClient;

use crate::queue::JobQueue;
use crate::store::LedgerStore;
use crate::types::EvmScanJob;

pub struct EvmWatcher {
    evm: Arc<dyn EvmClient>,
    store: Arc<dyn LedgerStore>,
    queue: Arc<dyn JobQueue>,
    confirmations: u64,
    poll_interval: Duration,
}

impl EvmWatcher {
    pub fn new(
        evm: Arc<dyn EvmClient>,
        store: Arc<dyn LedgerStore>,
        queue: Arc<dyn JobQueue>,
        confirmations: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            evm,
            store,
            queue,
            confirmations,
            poll_interval,
        }
    }

    /// Run the watcher loop
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            confirmations = self.confirmations,
            poll_ms = self.poll_interval.as_millis() as u64,
            "EVM watcher started"
        );

        loop {
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "EVM watcher tick failed, will retry");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn tick(&self) -> Result<()> {
        let latest = self.evm.latest_block().await?;
        // Only blocks at least `confirmations` deep are final enough
        let safe = latest.saturating_sub(self.confirmations);

        let cursor = self.store.scan_cursor().await.map_err(|e| eyre::eyre!(e))?;
        if safe <= cursor {
            return Ok(());
        }

        let job = EvmScanJob {
            from: cursor + 1,
            to: safe,
        };
        tracing::debug!(from = job.from, to = job.to, "scheduling EVM scan");
        self.queue
            .enqueue_evm_scan(&job)
            .await
            .map_err(|e| eyre::eyre!(e))?;
        Ok(())
    }
}
