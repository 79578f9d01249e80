use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use buy_notifier::config::load_config;
use buy_notifier::dedup::DedupStore;
use buy_notifier::metrics::{start_metrics_server, Metrics};
use buy_notifier::notify::Notifier;
use buy_notifier::watcher::{watch_chain, WatcherSettings};
use buy_notifier::webhook::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config();

    tracing_subscriber::fmt()
        .json()
        .with_level(true)
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    if config.has_placeholder_secret() {
        warn!("webhook_secret is still the placeholder value, incoming signatures are guessable");
    }

    let dedup = DedupStore::connect(&config.database_url, config.dedup_max_entries).await?;

    let metrics = Arc::new(Metrics::new());
    start_metrics_server(Arc::clone(&metrics), config.metrics_port);

    let notifier = Arc::new(Notifier::from_config(&config, Arc::clone(&metrics))?);

    let shutdown_tx = broadcast::channel::<()>(1).0;

    if config.enable_watcher {
        let settings = WatcherSettings::from_config(&config)?;
        let notifier = Arc::clone(&notifier);
        let metrics = Arc::clone(&metrics);
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                res = watch_chain(settings, notifier, metrics) => {
                    // A dead feed must not keep running silently; let the
                    // supervisor restart us from the current head.
                    if let Err(e) = res {
                        error!("Chain watcher failed: {e:#}");
                        std::process::exit(1);
                    }
                }
                _ = shutdown_rx.recv() => { info!("Shutdown chain watcher"); }
            }
        });
    }

    let shutdown_tx_ctrl = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        let _ = shutdown_tx_ctrl.send(());
    });

    let state = AppState {
        config: Arc::new(config.clone()),
        dedup,
        notifier,
        metrics,
    };
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Webhook server on http://{addr}");

    let mut shutdown_rx_http = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx_http.recv().await;
        })
        .await?;

    Ok(())
}
