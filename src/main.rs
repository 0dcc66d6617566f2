//! # AWS Monitor
//!
//! Live data monitoring for an automatic weather station over MQTT.
//!
//! Two independent flows run until Ctrl+C:
//!
//! 1. **Receiver** (background task)
//!    - Subscribes to the station topic
//!    - Parses every payload, gates it and appends new rows to the store
//!
//! 2. **Dashboard** (foreground)
//!    - Every refresh interval (5 minutes by default), or when Enter is
//!      pressed, reads the store's last row
//!    - Prints the ten metric cards when the row changed, otherwise a
//!      "no new data" notice
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use aws_monitor::config::{Config, LoggingConfig};
use aws_monitor::dashboard::cards::{render_frame, render_status};
use aws_monitor::dashboard::Dashboard;
use aws_monitor::gatekeeper::{Gatekeeper, GatekeeperState};
use aws_monitor::receiver::{self, mqtt::MqttSource, Ingestor, LiveStatus};
use aws_monitor::store::{JsonlRowStore, RowStore};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside `[logging].log_dir`
const LOG_FILE_PREFIX: &str = "aws-monitor.log";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("AWS Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(JsonlRowStore::new(&config.store.path));
    info!("Row store at {}", store.path().display());
    if let Err(e) = store.ensure_header().await {
        warn!("Failed to prepare row store header: {}", e);
    }

    let state = if config.gatekeeper.seed_from_store {
        receiver::seed_state(store.as_ref()).await
    } else {
        GatekeeperState::default()
    };

    let gatekeeper = Gatekeeper::new(
        config.gatekeeper.cooldown(),
        config.gatekeeper.reset_rain_on_new_day,
    );
    let mut ingestor = Ingestor::new(store.clone(), gatekeeper, state)
        .with_write_failure_policy(config.store.write_failure, config.store.max_pending);
    let live_status = ingestor.subscribe_status();

    let mut source = MqttSource::new(&config.mqtt);
    info!("Subscribing to '{}' on {}", source.topic(), source.broker());

    let retry_delay = Duration::from_millis(config.mqtt.reconnect_delay_ms);
    let receiver_task = tokio::spawn(async move {
        receiver::run(&mut source, &mut ingestor, retry_delay).await;
    });

    if config.dashboard.enabled {
        run_dashboard(store, live_status, config.dashboard.refresh_interval()).await;
    } else {
        info!("Dashboard disabled, press Ctrl+C to exit");
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received Ctrl+C, shutting down...");
    }

    receiver_task.abort();
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. With a log directory set,
/// output goes to a daily rolling file through a non-blocking writer whose
/// guard must be kept alive; otherwise to stderr, leaving stdout to the
/// dashboard.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Foreground render loop: periodic tick, manual refresh on Enter, Ctrl+C to stop
async fn run_dashboard<S: RowStore + ?Sized>(
    store: Arc<S>,
    live_status: watch::Receiver<LiveStatus>,
    period: Duration,
) {
    let mut dashboard = Dashboard::new(store);
    let mut tick = interval(period);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("Refreshing every {}s, press Enter to refresh now, Ctrl+C to exit", period.as_secs());

    loop {
        tokio::select! {
            _ = tick.tick() => {
                show(&mut dashboard, &live_status).await;
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        debug!("Manual refresh");
                        show(&mut dashboard, &live_status).await;
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("Stdin unavailable, manual refresh disabled: {}", e);
                        stdin_open = false;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }
}

async fn show<S: RowStore + ?Sized>(dashboard: &mut Dashboard<S>, live_status: &watch::Receiver<LiveStatus>) {
    match dashboard.refresh().await {
        Ok(frame) => print!("{}", render_frame(&frame, Local::now())),
        Err(e) => warn!("Dashboard refresh failed: {}", e),
    }

    let notice = render_status(&live_status.borrow());
    if let Some(notice) = notice {
        print!("{}", notice);
    }
}
