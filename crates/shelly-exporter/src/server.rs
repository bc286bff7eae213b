//! Composition root: registry, device registration and the HTTP endpoint.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use shelly_api::TransportConfig;
use shelly_core::{DeviceConfig, DeviceConnector, DeviceRegistry, MetricsHub, Registration, ShellyConnector};

use crate::config::Settings;
use crate::error::ExporterError;

/// Build the registry, bind the listener and serve until a shutdown signal.
pub async fn run(settings: Settings) -> Result<(), ExporterError> {
    let metrics = Arc::new(MetricsHub::new()?);
    let connector = ShellyConnector::new(
        TransportConfig::with_timeout(settings.timeout),
        Arc::clone(&metrics),
    );
    let registry = Arc::new(DeviceRegistry::new(connector, Arc::clone(&metrics)));

    let listener = TcpListener::bind(settings.listen)
        .await
        .map_err(|source| ExporterError::Bind {
            addr: settings.listen,
            source,
        })?;

    serve(
        listener,
        registry,
        metrics,
        settings.devices,
        settings.update_interval,
        shutdown_signal(),
    )
    .await
}

/// Serve `/metrics` and `/healthz` on `listener` while registering
/// `devices` in the background. Returns once `shutdown` resolves and every
/// polling task has stopped.
pub async fn serve<C, F>(
    listener: TcpListener,
    registry: Arc<DeviceRegistry<C>>,
    metrics: Arc<MetricsHub>,
    devices: Vec<DeviceConfig>,
    interval: Duration,
    shutdown: F,
) -> Result<(), ExporterError>
where
    C: DeviceConnector,
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "serving metrics");
    }

    // Discovery can take up to one request timeout per device; keep it off
    // the startup path so the endpoint is up immediately.
    let registrations = tokio::spawn(register_all(Arc::clone(&registry), devices, interval));

    let served = axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown)
        .await;

    // The registration task must be gone before the registry is drained,
    // or it could reserve a host that nothing ever cancels.
    registrations.abort();
    let _ = registrations.await;
    registry.shutdown().await;
    info!("all device tasks stopped");

    served.map_err(ExporterError::Io)
}

async fn register_all<C: DeviceConnector>(
    registry: Arc<DeviceRegistry<C>>,
    devices: Vec<DeviceConfig>,
    interval: Duration,
) {
    for device in devices {
        let host = device.host.clone();
        match registry.register(device, interval).await {
            Ok(Registration::Started(device)) => info!(
                host = %device.host,
                device_type = %device.device_type,
                switches = ?device.switch_ids,
                covers = ?device.cover_ids,
                "device registered"
            ),
            Ok(Registration::AlreadyRegistered) => {}
            Err(e) => error!(host = %host, error = %e, "failed to register device"),
        }
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────

pub fn router(metrics: Arc<MetricsHub>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<MetricsHub>>) -> Response {
    match metrics.encode_text() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics.content_type())], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
