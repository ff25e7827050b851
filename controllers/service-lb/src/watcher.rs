//! Service and EndpointSlice watching.
//!
//! Services are reconciled through `kube_runtime::Controller`; EndpointSlice
//! changes are mapped back to their Service by the service-name label. Every
//! Service is requeued after the resync interval so drift on the cloud side
//! and node changes are picked up.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::reconciler::endpoints::SERVICE_NAME_LABEL;
use crate::sync_tracker::SyncTracker;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Coalesces bursts of events for one Service
const DEBOUNCE: Duration = Duration::from_secs(1);

/// Shared state of the reconcile loop
pub struct Context {
    pub reconciler: Reconciler,
    pub tracker: SyncTracker,
    pub metrics: Metrics,
    pub resync: Duration,
}

fn key_of(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_else(|| "default".to_string()),
        service.name_any()
    )
}

/// Service an EndpointSlice belongs to
fn owning_service(slice: &EndpointSlice) -> Option<ObjectRef<Service>> {
    let namespace = slice.namespace()?;
    let name = slice.labels().get(SERVICE_NAME_LABEL)?;
    Some(ObjectRef::new(name).within(&namespace))
}

async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = key_of(&service);
    debug!("Reconciling Service {}", key);
    let started = Instant::now();

    match ctx.reconciler.reconcile_service(&service).await {
        Ok(()) => {
            ctx.metrics.observe_reconcile("success", started.elapsed());
            if service.metadata.deletion_timestamp.is_some() {
                ctx.tracker.forget(&key);
                return Ok(Action::await_change());
            }
            if !ctx.tracker.is_synced(&key) {
                info!("Service {} synced", key);
            }
            ctx.tracker.mark_synced(&key);
            Ok(Action::requeue(ctx.resync))
        }
        Err(e) => {
            ctx.metrics.observe_reconcile(e.reason(), started.elapsed());
            Err(e)
        }
    }
}

fn error_policy(service: Arc<Service>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = key_of(&service);
    if !error.is_retryable() {
        // Retrying cannot help until the Service changes
        warn!("Service {} needs attention: {}", key, error);
        return Action::await_change();
    }
    let delay = ctx.tracker.record_failure(&key);
    error!(
        "Reconciliation of Service {} failed (attempt {}), retrying in {:?}: {}",
        key,
        ctx.tracker.error_count(&key),
        delay,
        error
    );
    Action::requeue(delay)
}

/// Run the Service controller until a shutdown signal arrives
pub async fn watch_services(
    services: Api<Service>,
    slices: Api<EndpointSlice>,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Result<(), ControllerError> {
    info!("Starting Service watcher");

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(concurrency);

    Controller::new(services, watcher::Config::default())
        .watches(slices, watcher::Config::default().labels(SERVICE_NAME_LABEL), |slice| {
            owning_service(&slice)
        })
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => debug!("Reconciled Service {}", object),
                Err(e) => debug!("Controller event: {}", e),
            }
        })
        .await;

    info!("Service watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_slice_maps_to_service() {
        let slice = endpoint_slice("web", "http", 8080, &[("10.0.0.1", "n1", true)]);
        let service = owning_service(&slice).unwrap();
        assert_eq!(service.name, "web");
        assert_eq!(service.namespace.as_deref(), Some("default"));

        let mut unlabeled = slice.clone();
        unlabeled.metadata.labels = None;
        assert!(owning_service(&unlabeled).is_none());
    }

    #[test]
    fn test_service_key() {
        let service = create_test_service(vec![], &[]);
        assert_eq!(key_of(&service), "default/web");
    }
}
