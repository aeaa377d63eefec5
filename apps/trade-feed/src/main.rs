//! Trade Feed Binary
//!
//! Connects to the trading backend's STOMP endpoint, mounts the trade feed,
//! portfolio, and orders consumers for one user, and serves their state on
//! the status endpoint until interrupted.
//!
//! # Usage
//!
//! ```bash
//! TRADE_FEED_USER_ID=1 cargo run -p trade-feed
//! ```
//!
//! # Environment Variables
//!
//! Required:
//! - `TRADE_FEED_USER_ID`: user whose portfolio and orders are shown
//!
//! Optional:
//! - `TRADE_FEED_WS_URL`: STOMP WebSocket endpoint (default: ws://localhost:8080/ws/websocket)
//! - `TRADE_FEED_STOMP_HOST`: STOMP `host` header (default: endpoint host)
//! - `TRADE_FEED_STOMP_LOGIN`, `TRADE_FEED_STOMP_PASSCODE`: broker credentials
//! - `TRADE_FEED_RECONNECT_DELAY_MS`: delay between reconnects (default: 5000)
//! - `TRADE_FEED_HEARTBEAT_OUTGOING_MS`, `TRADE_FEED_HEARTBEAT_INCOMING_MS`: (default: 4000)
//! - `TRADE_FEED_MAX_RECONNECT_ATTEMPTS`: protocol faults before giving up (default: 5)
//! - `TRADE_FEED_HANDSHAKE_TIMEOUT_SECS`: connect deadline (default: 10)
//! - `TRADE_FEED_API_BASE_URL`: REST base URL (default: http://localhost:8080)
//! - `TRADE_FEED_API_TOKEN`: bearer token for the REST API
//! - `TRADE_FEED_HTTP_TIMEOUT_SECS`: REST request timeout (default: 10)
//! - `TRADE_FEED_FEED_CAPACITY`: events kept in the feed (default: 100)
//! - `TRADE_FEED_STATUS_PORT`: status endpoint port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: tracing export
//! - `RUST_LOG`: log filter

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use trade_feed::application::services::{ConsumerProbe, ConsumerState};
use trade_feed::infrastructure::telemetry;
use trade_feed::{
    ConnectionManager, DashboardConfig, HttpTradingApi, OrdersView, PortfolioView, StatusServer,
    StatusState, TRADES_TOPIC, TradeFeed, TradingApi, init_metrics,
};

/// Time allowed for background tasks to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting trade feed");

    let config = DashboardConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown = CancellationToken::new();

    let manager = ConnectionManager::new(config.connection_config());
    let _state_log = manager.on_state_change(|state| {
        tracing::info!(state = %state, "Connection state");
    });

    let feed = Arc::new(TradeFeed::attach(manager.registry(), config.feed_capacity));
    let _trade_log = manager.registry().subscribe(TRADES_TOPIC, |event| {
        tracing::info!(
            id = event.id(),
            ticker = event.ticker(),
            side = %event.side(),
            quantity = event.quantity(),
            price = %event.price(),
            "Trade"
        );
    });

    let api: Arc<dyn TradingApi> = Arc::new(HttpTradingApi::new(&config.http_config())?);
    let portfolio = Arc::new(PortfolioView::mount(
        Arc::clone(&api),
        manager.registry(),
        config.user_id,
    ));
    let orders = Arc::new(OrdersView::mount(api, manager.registry(), config.user_id));

    spawn_state_log("portfolio", portfolio.subscribe(), shutdown.clone(), |p| {
        format!("{} holdings, total {}", p.holdings.len(), p.total_value())
    });
    spawn_state_log("orders", orders.subscribe(), shutdown.clone(), |o| {
        format!("{} pending, {} in history", o.pending.len(), o.history.len())
    });

    if config.status_port == 0 {
        tracing::info!("Status server disabled");
    } else {
        let consumers: Vec<Arc<dyn ConsumerProbe>> = vec![
            Arc::clone(&portfolio) as Arc<dyn ConsumerProbe>,
            Arc::clone(&orders) as Arc<dyn ConsumerProbe>,
        ];
        let state = Arc::new(StatusState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&manager),
            Arc::clone(&feed),
            consumers,
        ));
        let server = StatusServer::new(config.status_port, state, shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Status server error");
            }
        });
    }

    manager.connect();
    tracing::info!("Trade feed ready");

    await_shutdown().await;

    manager.disconnect();
    portfolio.unmount();
    orders.unmount();
    feed.detach();
    shutdown.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    tracing::info!(events = feed.len(), "Trade feed stopped");
    Ok(())
}

/// Log every applied state of one consumer.
fn spawn_state_log<T, F>(
    name: &'static str,
    mut rx: watch::Receiver<ConsumerState<T>>,
    shutdown: CancellationToken,
    summarize: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&T) -> String + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let state = rx.borrow_and_update();
            if let Some(error) = &state.error {
                tracing::warn!(consumer = name, sequence = state.sequence, error = %error, "Refresh failed");
            } else if let Some(data) = &state.data
                && !state.loading
            {
                tracing::info!(consumer = name, sequence = state.sequence, summary = %summarize(data), "Refreshed");
            }
        }
    });
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &DashboardConfig) {
    tracing::info!(
        user = %config.user_id,
        feed_capacity = config.feed_capacity,
        status_port = config.status_port,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.stream.url,
        api_base_url = %config.api.base_url,
        reconnect_delay_ms = u64::try_from(config.stream.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        "Endpoints"
    );
}

/// Wait for Ctrl+C or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
