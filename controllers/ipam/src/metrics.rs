//! Prometheus metrics and probe endpoints.
//!
//! Serves `/metrics`, `/healthz` and `/readyz`. Readiness flips once the
//! watcher has finished its initial listing.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use ipam_core::IpamResult;
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Controller metrics and readiness state shared by all tasks.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    results: IntCounterVec,
    status_updates: IntCounterVec,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();
        let results = IntCounterVec::new(
            Opts::new("ipam_results_total", "Allocation results by operation and outcome"),
            &["operation", "outcome"],
        )?;
        let status_updates = IntCounterVec::new(
            Opts::new("ipam_status_updates_total", "IPAM status writes by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(results.clone()))?;
        registry.register(Box::new(status_updates.clone()))?;

        Ok(Self {
            registry,
            results,
            status_updates,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn record_result(&self, result: &IpamResult) {
        let outcome = if result.succeeded { "success" } else { "failure" };
        self.results
            .with_label_values(&[result.operation.kind.as_str(), outcome])
            .inc();
    }

    /// `outcome` is one of `patched`, `unchanged`, `missing` or `error`
    pub fn record_status_update(&self, outcome: &str) {
        self.status_updates.with_label_values(&[outcome]).inc();
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> Result<String, ControllerError> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}

/// Build the metrics and probe router
pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serve the router on `addr` until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    metrics: Metrics,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("failed to bind {}: {}", addr, e)))?;
    info!("Metrics server listening on http://{}", addr);

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ControllerError::Metrics(format!("metrics server failed: {}", e)))
}

async fn metrics_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("# failed to encode metrics: {}\n", e),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz_handler(State(metrics): State<Metrics>) -> impl IntoResponse {
    if metrics.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ipam_core::{Operation, ResourceRef};
    use tower::ServiceExt;

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(get_status(router(metrics.clone()), "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get_status(router(metrics.clone()), "/healthz").await, StatusCode::OK);

        metrics.set_ready(true);
        assert_eq!(get_status(router(metrics), "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_counters() {
        let metrics = Metrics::new().unwrap();
        let op = Operation::create(ResourceRef::new("ipam", "kube-system"), None, Some("a"), "dev");
        metrics.record_result(&IpamResult::failure(op));
        metrics.record_status_update("patched");

        assert_eq!(get_status(router(metrics.clone()), "/metrics").await, StatusCode::OK);
        let body = metrics.render().unwrap();
        assert!(body.contains(r#"ipam_results_total{operation="create",outcome="failure"} 1"#));
        assert!(body.contains(r#"ipam_status_updates_total{outcome="patched"} 1"#));
    }
}
