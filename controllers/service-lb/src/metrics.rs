//! Prometheus metrics and the HTTP endpoint serving them with the probes.

use crate::error::ControllerError;
use axum::{
    Router,
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Controller metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    reconciliations: IntCounterVec,
    reconcile_duration: Histogram,
    cloud_mutations: IntCounterVec,
    registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Arc::new(Registry::new());

        let reconciliations = IntCounterVec::new(
            Opts::new("service_lb_reconcile_total", "Reconciliation passes by result"),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;

        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new(
                "service_lb_reconcile_duration_seconds",
                "Duration of reconciliation passes in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        let cloud_mutations = IntCounterVec::new(
            Opts::new("service_lb_cloud_mutations_total", "Mutating cloud API calls by action"),
            &["action"],
        )?;
        registry.register(Box::new(cloud_mutations.clone()))?;

        Ok(Self {
            reconciliations,
            reconcile_duration,
            cloud_mutations,
            registry,
        })
    }

    /// Count a finished pass; `result` is `success` or an error reason
    pub fn observe_reconcile(&self, result: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&[result]).inc();
        self.reconcile_duration.observe(elapsed.as_secs_f64());
    }

    /// Count one successful mutating cloud call
    pub fn count_mutation(&self, action: &str) {
        self.cloud_mutations.with_label_values(&[action]).inc();
    }

    #[cfg(test)]
    pub fn mutation_count(&self, action: &str) -> u64 {
        self.cloud_mutations.with_label_values(&[action]).get()
    }

    /// Render every registered metric in the text exposition format
    pub fn export_text(&self) -> Result<String, ControllerError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Shared state of the HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpState {
    metrics: Metrics,
    ready: Arc<AtomicBool>,
}

impl HttpState {
    pub fn new(metrics: Metrics, ready: Arc<AtomicBool>) -> Self {
        Self { metrics, ready }
    }
}

/// Serve `/metrics`, `/healthz` and `/readyz` until the task is dropped
pub async fn serve(addr: SocketAddr, state: HttpState) -> Result<(), ControllerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::InvalidConfig(format!("cannot bind {}: {}", addr, e)))?;
    info!("Metrics listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| ControllerError::Watch(format!("metrics server stopped: {}", e)))
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(Arc::new(state))
}

async fn metrics(AxumState(state): AxumState<Arc<HttpState>>) -> Response {
    match state.metrics.export_text() {
        Ok(body) => body.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz() -> &'static str {
    "Ok"
}

async fn readyz(AxumState(state): AxumState<Arc<HttpState>>) -> Response {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "Ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NotReady").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_exported_as_text() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_reconcile("success", Duration::from_millis(250));
        metrics.count_mutation("CreateLoadBalancer");
        metrics.count_mutation("CreateLoadBalancer");

        assert_eq!(metrics.mutation_count("CreateLoadBalancer"), 2);
        let text = metrics.export_text().unwrap();
        assert!(text.contains("service_lb_reconcile_total{result=\"success\"} 1"));
        assert!(text.contains("service_lb_cloud_mutations_total{action=\"CreateLoadBalancer\"} 2"));
        assert!(text.contains("service_lb_reconcile_duration_seconds_count 1"));
    }

    #[tokio::test]
    async fn test_readiness_follows_flag() {
        let ready = Arc::new(AtomicBool::new(false));
        let state = Arc::new(HttpState::new(Metrics::new().unwrap(), ready.clone()));

        let response = readyz(AxumState(state.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        ready.store(true, Ordering::Relaxed);
        let response = readyz(AxumState(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
