use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use paw_bridge::api::{self, AppState};
use paw_bridge::blacklist::HttpBlacklistOracle;
use paw_bridge::config::Config;
use paw_bridge::metrics;
use paw_bridge::notify::NotificationBus;
use paw_bridge::queue::PgQueue;
use paw_bridge::service::{BridgeService, RebalancePolicy};
use paw_bridge::store::pg::{create_pool, run_migrations};
use paw_bridge::store::PgLedgerStore;
use paw_bridge::types::Topic;
use paw_bridge::watchers::{EvmWatcher, L1Watcher, WatcherManager};

use pawchain_rs::challenge::MintReceiptSigner;
use pawchain_rs::evm::HttpEvmClient;
use pawchain_rs::l1::PawNodeClient;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting PAW bridge");

    let config = Config::load()?;
    tracing::info!(
        hot_wallet = %config.node.hot_wallet,
        evm_chain_id = config.evm.chain_id,
        api_port = config.bridge.api_port,
        "Configuration loaded"
    );

    // Connect to database and run migrations
    let pool = create_pool(&config.database.url).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database ready");

    // Chain clients
    let l1 = Arc::new(PawNodeClient::new(
        &config.node.rpc_url,
        &config.node.wallet_id,
        config.node.hot_wallet.clone(),
    )?);
    let evm = Arc::new(HttpEvmClient::new(
        &config.evm.rpc_url,
        &config.evm.wpaw_address,
    )?);
    let blacklist = Arc::new(HttpBlacklistOracle::new(&config.bridge.blacklist_url)?);
    let receipts = MintReceiptSigner::new(&config.evm.private_key, config.evm.chain_id)?;
    tracing::info!(bridge_signer = %receipts.address(), "Mint receipt signer ready");

    // Store, queue, service
    let store = Arc::new(PgLedgerStore::new(pool.clone()));
    let queue = Arc::new(PgQueue::new(pool.clone()));

    let service = Arc::new(BridgeService::new(
        store.clone(),
        queue.clone(),
        l1.clone(),
        evm.clone(),
        blacklist,
        receipts,
        config.node.hot_wallet.clone(),
        config.node.cold_wallet.clone(),
        RebalancePolicy {
            reserve_units: config.node.hot_reserve_units,
            hot_ratio_pct: config.node.hot_ratio_pct,
        },
    ));

    // Install the service as the processor for every topic, then start the
    // workers. Registration happens before start; the cycle (service
    // enqueues, workers call back into the service) is wiring, not shared
    // mutable state.
    for topic in Topic::all() {
        queue.register_processor(topic, service.clone()).await;
    }

    // Shutdown wiring
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    queue.start(shutdown_rx.clone()).await;

    // Notification bus pumps job outcomes into per-user SSE streams
    let notify = NotificationBus::new();
    tokio::spawn(notify.clone().run(queue.subscribe_outcomes()));

    // Watchers
    let l1_watcher = L1Watcher::new(
        l1,
        queue.clone(),
        config.node.ws_url.clone(),
        config.node.hot_wallet.clone(),
        config.node.cold_wallet.clone(),
        Duration::from_secs(config.bridge.sweep_interval_secs),
    );
    let evm_watcher = EvmWatcher::new(
        evm,
        store.clone(),
        queue.clone(),
        config.evm.confirmations,
        Duration::from_millis(config.bridge.evm_poll_interval_ms),
    );
    let watchers = WatcherManager::new(l1_watcher, evm_watcher);

    // API server
    let state = AppState {
        service,
        store,
        queue,
        notify,
        hot_wallet: config.node.hot_wallet.clone(),
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], config.bridge.api_port));
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(addr, state).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    metrics::UP.set(1.0);

    let mut shutdown = shutdown_rx;
    tokio::select! {
        result = watchers.run(shutdown.clone()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Watcher manager error");
            }
        }
        _ = api_task => {
            tracing::error!("API server stopped");
        }
        _ = shutdown.changed() => {}
    }

    metrics::UP.set(0.0);
    tracing::info!("PAW bridge stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,paw_bridge=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
