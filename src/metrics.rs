use std::sync::Arc;

use axum::{routing::get, Router};
use prometheus::{IntCounter, Registry, TextEncoder};
use tracing::{error, info};

pub struct Metrics {
    registry: Registry,
    events_processed: IntCounter,
    notification_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let events_processed = prometheus::register_int_counter_with_registry!(
            "events_processed",
            "Purchase events processed to completion",
            registry
        )
        .unwrap();
        let notification_failures = prometheus::register_int_counter_with_registry!(
            "notification_failures",
            "Channel sends that failed",
            registry
        )
        .unwrap();
        Self {
            registry,
            events_processed,
            notification_failures,
        }
    }

    pub fn increment_events(&self) {
        self.events_processed.inc();
    }

    pub fn increment_notification_failures(&self) {
        self.notification_failures.inc();
    }

    pub fn export(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub fn start_metrics_server(metrics: Arc<Metrics>, port: u16) {
    tokio::spawn(async move {
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move { metrics.export() }
            }),
        );
        let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics listener on {port}: {e}");
                return;
            }
        };
        info!("Metrics server on {port}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    });
}
