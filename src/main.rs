use std::sync::Arc;

use avm_relayer::algod::AlgodClient;
use avm_relayer::api::{self, RelayerStats, SharedStats};
use avm_relayer::config::Config;
use avm_relayer::decoder::LogDecoder;
use avm_relayer::keys::AccountKey;
use avm_relayer::relay::Relayer;
use avm_relayer::rpc_fallback::create_indexer_clients;
use avm_relayer::store::StateStore;
use avm_relayer::watchers::{IndexerEndpoint, SourceReader};
use avm_relayer::writers::EscrowWriter;
use tokio::sync::RwLock;

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

    tracing::info!("Starting AVM Bridge Relayer");

    let config = Config::load()?;
    let timeout = config.request_timeout();

    let indexers = create_indexer_clients(
        &config.source.indexer_urls,
        config.source.indexer_token.as_deref(),
        timeout,
    )?;
    let endpoints: Vec<Box<dyn IndexerEndpoint>> = indexers
        .into_iter()
        .map(|client| Box::new(client) as Box<dyn IndexerEndpoint>)
        .collect();
    let source = SourceReader::new(endpoints, config.source.log_app_id);

    let source_algod = AlgodClient::new(
        &config.source.algod_url,
        &config.source.algod_token,
        timeout,
    )?;
    let dest_algod = AlgodClient::new(
        &config.destination.algod_url,
        &config.destination.algod_token,
        timeout,
    )?;

    let admin = AccountKey::from_mnemonic(&config.destination.admin_mnemonic)?;
    let admin_address = admin.address();
    let writer = EscrowWriter::new(dest_algod, admin, config.destination.escrow_settings());

    tracing::info!(
        source_app_id = config.source.log_app_id,
        indexer = source.primary_url().unwrap_or_default(),
        indexer_endpoints = source.endpoint_count(),
        escrow_app_id = config.destination.escrow_app_id,
        asset_id = config.destination.asset_id,
        admin = %admin_address,
        layout = %config.source.log_layout,
        state_file = %config.state_file.display(),
        "Configuration loaded"
    );

    let decoder = LogDecoder::new(
        config.source.log_prefix.as_bytes(),
        config.source.log_layout,
    );

    let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));
    let mut relayer = Relayer::new(
        config.relayer.settings(),
        decoder,
        source,
        Box::new(source_algod),
        Box::new(writer),
        StateStore::new(&config.state_file),
    )
    .with_stats(stats.clone());

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Setup signal handler
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    // Start health/metrics server
    if let Some(bind_addr) = config.api_bind_addr.clone() {
        let api_stats = stats.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(&bind_addr, api_stats).await {
                tracing::error!(error = %e, "API server error");
            }
        });
    }

    relayer.initialize().await?;
    relayer.run(shutdown_rx).await?;

    tracing::info!("AVM Bridge Relayer stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,avm_relayer=debug"));

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
