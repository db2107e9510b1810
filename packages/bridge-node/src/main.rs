//! Bridge Node
//!
//! Runs the bridge coordinator with its HTTP API, timeout sweeper and
//! event monitor until SIGINT or SIGTERM.
//!
//! # Flow
//!
//! 1. A watcher reports a source-chain lock via `POST /transactions`
//! 2. Validators attest via `POST /transactions/{tx_id}/attestations`
//! 3. Once attested weight reaches the threshold, the release is triggered
//! 4. Transactions not completed before the timeout become refundable
//!    and anyone may claim the refund via `POST /transactions/{tx_id}/refund`

use bridge_node::{server, Config, Node};
use tokio::sync::mpsc;
use tracing::{error, info};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting Bridge Node");

    let config = Config::load()?;
    info!(
        local_chain_id = %config.local_chain_id,
        fee_bps = config.fee_bps,
        transaction_timeout_secs = config.transaction_timeout_secs,
        genesis = ?config.genesis_path,
        validator_tokens = config.validator_tokens.len(),
        "Configuration loaded"
    );

    let node = Node::build(&config)?;
    info!(
        chains = node.bridge.get_chain_count(),
        threshold = node.bridge.consensus().threshold(),
        "Bridge coordinator ready"
    );

    // One shutdown channel per task
    let (sweeper_tx, sweeper_rx) = mpsc::channel::<()>(1);
    let (monitor_tx, monitor_rx) = mpsc::channel::<()>(1);
    let (server_tx, server_rx) = mpsc::channel::<()>(1);

    let mut sweeper = node.sweeper();
    let sweeper_handle = tokio::spawn(async move {
        if let Err(e) = sweeper.run(sweeper_rx).await {
            error!(error = %e, "Sweeper failed");
        }
    });

    let mut monitor = node.monitor();
    let monitor_handle = tokio::spawn(async move {
        if let Err(e) = monitor.run(monitor_rx).await {
            error!(error = %e, "Event monitor failed");
        }
    });

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = server_tx.send(()).await;
        let _ = sweeper_tx.send(()).await;
        let _ = monitor_tx.send(()).await;
    });

    // The server runs on the main task; it returns after shutdown or on bind failure
    let result = server::start_server(
        &config.api_bind_address,
        config.api_port,
        node.app_state(),
        server_rx,
    )
    .await;

    sweeper_handle.abort();
    monitor_handle.abort();
    let _ = sweeper_handle.await;
    let _ = monitor_handle.await;

    result?;
    info!("Bridge Node stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_node=debug,bridge_core=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

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
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
