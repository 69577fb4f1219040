mod api;
mod cli;
mod signal_handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::{Cli, Command};
use hyve_core::{AddressRegistry, ConfirmationTracker, EventBus, Poller};
use hyve_rpc::{HttpExplorerClient, HttpNodeClient};
use hyve_types::Config;

fn setup_logs() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_env("HYVE_LOG")
                .unwrap_or_else(|_| EnvFilter::default().add_directive("info".parse().unwrap())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn default_config_path() -> anyhow::Result<String> {
    let home = std::env::var("HYVE_HOME").map_err(|_| anyhow!("HYVE_HOME is not set"))?;
    Ok(format!("{home}/.local/hyve/db.yml"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logs();

    let args = Cli::parse();

    let config_path = match args.config_path {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            // Exit code -1 on missing/invalid config at startup, per spec §6.
            tracing::error!(path = %config_path, error = %err, "failed to load configuration");
            std::process::exit(-1);
        }
    };

    match args.command {
        Command::Run { bind, poll_interval_secs } => run(config, bind, poll_interval_secs).await?,
    }

    tracing::info!("hyve-indexer finished");
    Ok(())
}

async fn run(config: Config, bind: String, poll_interval_secs: u64) -> anyhow::Result<()> {
    let store = Arc::new(hyve_core::PgStore::connect(&config.db.url).await?);
    let node: Arc<dyn hyve_rpc::NodeClient> = Arc::new(HttpNodeClient::new(config.hydra_rpc.url.clone()));
    let explorer: Arc<dyn hyve_rpc::ExplorerClient> = Arc::new(HttpExplorerClient::new(config.hy_db_client.url.clone()));
    let registry = Arc::new(AddressRegistry::new());
    let events = Arc::new(EventBus::new(store.clone()));

    let poller = Arc::new(
        Poller::new(store.clone(), node.clone(), explorer.clone(), registry.clone(), events.clone()).await?,
    );
    let tracker = Arc::new(ConfirmationTracker::new(
        store.clone(),
        node.clone(),
        explorer.clone(),
        registry.clone(),
        events.clone(),
        poller.clone(),
    ));

    let (shutdown_tx, mut shutdown_rx_ingestion) = tokio::sync::broadcast::channel(16);
    let mut shutdown_rx_server = shutdown_tx.subscribe();

    let ingestion_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx_ingestion.recv() => {
                    tracing::info!("ingestion worker shutting down");
                    return Ok::<(), anyhow::Error>(());
                }
                result = poller.poll_once() => {
                    match result {
                        Ok(true) => {
                            if let Err(err) = tracker.sweep().await {
                                tracing::error!(error = %err, "confirmation sweep failed");
                            }
                        }
                        Ok(false) => {}
                        Err(err) => tracing::error!(error = %err, "ingestion pass failed"),
                    }
                    tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;
                }
            }
        }
    });

    let state = api::AppState {
        store,
        events,
        node,
        registry,
        mainnet: !config.hydra_rpc.url.contains("testnet"),
    };
    let app = api::router(state);
    let addr: SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "hyve-indexer HTTP API listening");

    let server_task = async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx_server.recv().await;
            })
            .await
            .map_err(anyhow::Error::from)
    };

    let (signals_result, ingestion_result, server_result) = tokio::join!(
        signal_handlers::handle_all_signals(shutdown_tx),
        ingestion_task,
        server_task,
    );

    if let Err(err) = signals_result {
        tracing::error!(error = %err, "signal handler failed");
    }
    match ingestion_result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(error = %err, "ingestion task failed"),
        Err(err) => tracing::error!(error = %err, "ingestion task panicked"),
    }
    if let Err(err) = server_result {
        tracing::error!(error = %err, "HTTP server failed");
    }

    Ok(())
}
