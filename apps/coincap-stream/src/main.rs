//! CoinCap Stream Binary
//!
//! Subscribes to a CoinCap channel and logs every message.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin coincap-stream
//! ```
//!
//! Ctrl+C stops the subscription. On Unix, `SIGHUP` forces a reconnect.
//!
//! # Environment Variables
//!
//! - `COINCAP_CHANNEL`: "trades" | "global" (default: trades)
//! - `COINCAP_STREAM_ENDPOINT`: streaming host (default: coincap.io)
//! - `COINCAP_STREAM_SECURE`: use wss (default: true)
//! - `COINCAP_STREAM_PORT`: port override
//! - `COINCAP_HEARTBEAT_INTERVAL_SECS` / `COINCAP_HEARTBEAT_TIMEOUT_SECS`:
//!   heartbeat overrides
//! - `COINCAP_METRICS_PORT`: Prometheus metrics port (default: 9090, 0 disables)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use anyhow::Context;
use coincap_stream::infrastructure::telemetry;
use coincap_stream::{
    ClientConfig, CoincapClient, Control, GLOBAL_CHANNEL, Global, TRADES_CHANNEL, Trade,
    init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;

/// Buffered messages between the transport and the logger.
const SINK_CAPACITY: usize = 256;

/// Buffered control signals.
const CONTROL_CAPACITY: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(
        otel = telemetry_guard.is_exporting(),
        "Starting CoinCap stream"
    );

    let config = ClientConfig::from_env()?;
    log_config(&config);

    if config.metrics_port != 0 {
        let addr = init_metrics(config.metrics_port).context("failed to start metrics exporter")?;
        tracing::info!(%addr, "Prometheus metrics listening");
    }

    let channel = std::env::var("COINCAP_CHANNEL").unwrap_or_else(|_| TRADES_CHANNEL.to_string());
    let client = CoincapClient::new(&config)?;

    let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
    tokio::spawn(forward_signals(control_tx));

    let result = match channel.as_str() {
        TRADES_CHANNEL => {
            let (tx, rx) = mpsc::channel::<Trade>(SINK_CAPACITY);
            tokio::spawn(log_trades(rx));
            client.subscribe_trades(tx, control_rx).await
        }
        GLOBAL_CHANNEL => {
            let (tx, rx) = mpsc::channel::<Global>(SINK_CAPACITY);
            tokio::spawn(log_global(rx));
            client.subscribe_global(tx, control_rx).await
        }
        other => anyhow::bail!("unsupported channel {other:?}, expected trades or global"),
    };

    match result {
        Ok(()) => {
            tracing::info!("Subscription stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Subscription failed");
            Err(e.into())
        }
    }
}

async fn log_trades(mut rx: mpsc::Receiver<Trade>) {
    while let Some(trade) = rx.recv().await {
        tracing::info!(
            coin = %trade.msg.coin,
            exchange = %trade.msg.exchange_id,
            market = %trade.data.market_id,
            price = ?trade.data.price,
            volume = ?trade.data.volume,
            "Trade"
        );
    }
}

async fn log_global(mut rx: mpsc::Receiver<Global>) {
    while let Some(global) = rx.recv().await {
        tracing::info!(
            btc_price = ?global.btc_price,
            total_cap = ?global.total_cap,
            dom = ?global.dom,
            "Global"
        );
    }
}

/// Translate process signals into control signals until the subscription
/// drops its receiver.
async fn forward_signals(control: mpsc::Sender<Control>) {
    #[cfg(unix)]
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable, reset disabled");
            None
        }
    };

    loop {
        #[cfg(unix)]
        let reset = async {
            match hangup.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending().await,
            }
        };

        #[cfg(not(unix))]
        let reset = std::future::pending::<Option<()>>();

        let signal = tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Ctrl+C handler failed, stopping");
                }
                tracing::info!("Received Ctrl+C, stopping subscription");
                Control::Stop
            }
            Some(()) = reset => {
                tracing::info!("Received SIGHUP, resetting subscription");
                Control::Reset
            }
        };

        if control.send(signal).await.is_err() || signal.is_terminal() {
            return;
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn log_config(config: &ClientConfig) {
    tracing::info!(
        stream_url = %config.stream.url(),
        api_base_url = %config.api.base_url,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}
