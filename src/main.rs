use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallet_ledger::application::query::QueryService;
use wallet_ledger::application::seed::{populate_initial_wallets, total_balance};
use wallet_ledger::application::transfer::TransferEngine;
use wallet_ledger::config::Config;
use wallet_ledger::domain::ports::LedgerStoreRef;
use wallet_ledger::infrastructure::in_memory::InMemoryLedgerStore;
use wallet_ledger::interfaces::http::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log))
        .into_diagnostic()?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = open_store(&config)?;

    populate_initial_wallets(&*store, config.seed_wallets, config.seed_balance)
        .await
        .into_diagnostic()?;
    let accounts = store.accounts().await.into_diagnostic()?;
    let total = total_balance(&accounts);
    info!(wallets = accounts.len(), total, "ledger ready");

    let state = AppState {
        engine: Arc::new(TransferEngine::new(
            Arc::clone(&store),
            config.retry_policy(),
        )),
        queries: QueryService::new(Arc::clone(&store)),
        transfer_timeout: config.transfer_timeout(),
        query_timeout: config.query_timeout(),
    };

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .into_diagnostic()?;
    info!(address = %config.listen, "server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    info!("server stopped");
    Ok(())
}

fn open_store(config: &Config) -> Result<LedgerStoreRef> {
    match &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            // Use persistent storage (RocksDB)
            let store = wallet_ledger::infrastructure::rocksdb::RocksDBLedgerStore::open(
                db_path,
                config.lock_timeout(),
            )
            .into_diagnostic()?;
            info!(path = %db_path.display(), "opened RocksDB ledger");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(db_path) => Err(miette::miette!(
            "--db-path {} requires building with the `storage-rocksdb` feature",
            db_path.display()
        )),
        None => {
            // Use in-memory storage
            info!("using in-memory ledger; balances are lost on exit");
            Ok(Arc::new(InMemoryLedgerStore::with_lock_timeout(
                config.lock_timeout(),
            )))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
