use eyre::Result;
use tokio::sync::watch;
use tracing::{error, info};

pub mod evm;
pub mod l1;

pub use evm::EvmWatcher;
pub use l1::L1Watcher;

/// Manages both chain watchers
pub struct WatcherManager {
    l1_watcher: L1Watcher,
    evm_watcher: EvmWatcher,
}

impl WatcherManager {
    pub fn new(l1_watcher: L1Watcher, evm_watcher: EvmWatcher) -> Self {
        Self {
            l1_watcher,
            evm_watcher,
        }
    }

    /// Run both watchers concurrently.
    /// Returns when any watcher fails or shutdown signal received.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tokio::select! {
            result = self.l1_watcher.run() => {
                error!("L1 watcher stopped: {:?}", result);
                result
            }
            result = self.evm_watcher.run() => {
                error!("EVM watcher stopped: {:?}", result);
                result
            }
            _ = shutdown.changed() => {
                info!("Shutdown signal received, stopping watchers");
                Ok(())
            }
        }
    }
}
