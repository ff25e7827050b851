//! Main controller implementation.
//!
//! Wires the cloud client, reconciler and watcher together, serves metrics
//! and probes, and runs until a shutdown signal.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::metrics::{self, HttpState, Metrics};
use crate::reconciler::wait::PollConfig;
use crate::reconciler::{LoadBalancerManager, Reconciler};
use crate::sync_tracker::SyncTracker;
use crate::watcher::{self, Context};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Api, Client};
use slb_client::{CloudProvider, SlbClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// Service load-balancer controller
pub struct Controller {
    config: ControllerConfig,
    client: Client,
    context: Arc<Context>,
    ready: Arc<AtomicBool>,
}

impl Controller {
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Service load-balancer controller");

        let client = Client::try_default().await?;

        let cloud: Arc<dyn CloudProvider> = Arc::new(
            SlbClient::with_timeout(
                config.cloud_endpoint.clone(),
                config.cloud_token.clone(),
                config.region_id.clone(),
                config.cloud_timeout,
            )
            .map_err(|e| ControllerError::cloud("create cloud client", e))?,
        );

        let metrics = Metrics::new()?;
        let manager = LoadBalancerManager::new(cloud, metrics.clone(), PollConfig::default(), config.vpc_id.clone());
        let reconciler = Reconciler::new(
            client.clone(),
            manager,
            Box::new(KubeEventPublisher::new(client.clone())),
            config.cluster_id.clone(),
        );

        let context = Arc::new(Context {
            reconciler,
            tracker: SyncTracker::new(),
            metrics,
            resync: config.resync_interval,
        });

        Ok(Self {
            config,
            client,
            context,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn run(self) -> Result<(), ControllerError> {
        let (services, slices): (Api<Service>, Api<EndpointSlice>) = match self.config.namespace.as_deref() {
            Some(ns) => (Api::namespaced(self.client.clone(), ns), Api::namespaced(self.client.clone(), ns)),
            None => (Api::all(self.client.clone()), Api::all(self.client.clone())),
        };

        let http_state = HttpState::new(self.context.metrics.clone(), self.ready.clone());
        let metrics_server = tokio::spawn(metrics::serve(self.config.metrics_addr, http_state));

        let watcher = tokio::spawn(watcher::watch_services(
            services,
            slices,
            self.context.clone(),
            self.config.concurrency,
        ));
        self.ready.store(true, Ordering::Relaxed);
        info!("Controller started");

        let result = tokio::select! {
            res = watcher => match res {
                Ok(inner) => inner,
                Err(e) => Err(ControllerError::Watch(format!("watcher task failed: {}", e))),
            },
            res = metrics_server => match res {
                Ok(Ok(())) => Err(ControllerError::Watch("metrics server exited".to_string())),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(ControllerError::Watch(format!("metrics server task failed: {}", e))),
            },
        };

        self.ready.store(false, Ordering::Relaxed);
        debug!("Dropping sync state of {} Services", self.context.tracker.len());
        self.context.tracker.clear();
        if let Err(e) = &result {
            error!("Controller stopped: {}", e);
        } else {
            info!("Controller stopped");
        }
        result
    }
}
