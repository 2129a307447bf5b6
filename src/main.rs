//! Parking gateway - USSD, WhatsApp and IVR pay-for-parking service
//!
//! Module structure:
//! - `domain/` - Core types, tariff engine, error taxonomy
//! - `io/` - External interfaces (stores, payment API, WhatsApp, HTTP)
//! - `services/` - Router and per-channel orchestration
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use parking_gateway::infra::{Config, Metrics};
use parking_gateway::io::{
    open_store, start_http_server, AppState, DisabledNotifier, HttpFeeLookup, InfobipNotifier,
    MpesaPushClient, Notifier, TwimlRenderer,
};
use parking_gateway::services::{Collaborators, ParkingService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parking gateway - pay-for-parking over USSD, WhatsApp and IVR
#[derive(Parser, Debug)]
#[command(name = "parking-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug to see unrecognized inputs
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(git_hash = env!("GIT_HASH"), "parking-gateway starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        bind = %config.bind_address(),
        port = %config.port(),
        ussd_sentinel = %config.ussd_sentinel(),
        operator_a_store = %config.operator_a_store(),
        operator_b_store = %config.operator_b_store(),
        cross_operator_policy = %config.cross_operator_policy().as_str(),
        whatsapp_enabled = %config.whatsapp().enabled,
        "config_loaded"
    );

    let operator_a = open_store(config.operator_a_store())
        .await
        .context("Failed to open Operator A store")?;
    let operator_b = open_store(config.operator_b_store())
        .await
        .context("Failed to open Operator B store")?;

    let notifier: Arc<dyn Notifier> = if config.whatsapp().enabled {
        Arc::new(InfobipNotifier::new(config.whatsapp()).context("Failed to build WhatsApp client")?)
    } else {
        Arc::new(DisabledNotifier)
    };

    let collaborators = Collaborators {
        operator_a,
        operator_b,
        operator_b_fees: Arc::new(
            HttpFeeLookup::new(config.operator_b_fee_url(), config.operator_b_timeout_ms())
                .context("Failed to build fee lookup client")?,
        ),
        payments: Arc::new(
            MpesaPushClient::new(config.push_url(), config.push_timeout_ms())
                .context("Failed to build payment client")?,
        ),
        notifier,
    };

    let metrics = Arc::new(Metrics::new());
    let service = Arc::new(
        ParkingService::new(&config, collaborators, metrics.clone())
            .context("Invalid USSD routing table")?,
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start metrics reporter
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.port())
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address(), config.port()))?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;

    let state = Arc::new(AppState {
        service,
        twiml: TwimlRenderer::new(config.ivr_voice(), config.ivr_action()),
        service_name: config.branding().service_name.clone(),
        max_body_bytes: config.max_body_bytes(),
    });

    start_http_server(listener, state, shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("HTTP server failed")?;

    metrics.report().log();
    info!("parking-gateway shutdown complete");
    Ok(())
}
