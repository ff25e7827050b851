//! Service reconciliation.
//!
//! One pass: finalizer, topology, desired model, actual model, plan, apply,
//! then status and events. Cloud work lives in [`LoadBalancerManager`]; the
//! Kubernetes side lives in [`Reconciler`].

pub mod applier;
pub mod endpoints;
pub mod local;
pub mod planner;
pub mod remote;
pub mod wait;
pub mod weight;

use crate::error::ControllerError;
use crate::events::{EventPublisher, actions, reasons};
use crate::metrics::Metrics;
use crate::model::LoadBalancer;
use applier::ModelApplier;
use endpoints::{Topology, fetch_topology};
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use local::{LocalModelBuilder, backend_selection, wants_load_balancer};
use remote::RemoteModelBuilder;
use serde_json::{Value, json};
use slb_client::CloudProvider;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wait::PollConfig;

/// Finalizer guarding cloud resources of a Service
pub const FINALIZER: &str = "service.k8s.alibaba/resources";

/// Converges the cloud side for one desired model
pub struct LoadBalancerManager {
    cloud: Arc<dyn CloudProvider>,
    metrics: Metrics,
    poll: PollConfig,
    vpc_id: Option<String>,
}

impl LoadBalancerManager {
    pub fn new(cloud: Arc<dyn CloudProvider>, metrics: Metrics, poll: PollConfig, vpc_id: Option<String>) -> Self {
        Self {
            cloud,
            metrics,
            poll,
            vpc_id,
        }
    }

    pub fn cloud(&self) -> &dyn CloudProvider {
        self.cloud.as_ref()
    }

    pub fn vpc_id(&self) -> Option<&str> {
        self.vpc_id.as_deref()
    }

    /// Snapshot, plan and apply. Returns the actual state after the pass.
    pub async fn ensure(&self, local: &LoadBalancer) -> Result<LoadBalancer, ControllerError> {
        let remote = RemoteModelBuilder::new(self.cloud()).build(local).await?;
        ModelApplier::new(self.cloud(), self.poll)
            .with_metrics(&self.metrics)
            .with_vpc(self.vpc_id())
            .apply(local, &remote)
            .await
    }
}

/// Reconciles Services against the cloud
pub struct Reconciler {
    client: Client,
    manager: LoadBalancerManager,
    events: Box<dyn EventPublisher>,
    cluster_id: String,
}

impl Reconciler {
    pub fn new(client: Client, manager: LoadBalancerManager, events: Box<dyn EventPublisher>, cluster_id: String) -> Self {
        Self {
            client,
            manager,
            events,
            cluster_id,
        }
    }

    /// Reconcile one Service.
    ///
    /// A Service that wants a load balancer gets the finalizer before any
    /// cloud mutation. Once it no longer wants one, owned cloud resources are
    /// removed and the finalizer is released.
    pub async fn reconcile_service(&self, service: &Service) -> Result<(), ControllerError> {
        let wants = wants_load_balancer(service);
        if !wants && !has_finalizer(service) {
            debug!("Service {} has no load balancer to manage", service_key(service));
            return Ok(());
        }

        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let action = if wants { actions::ENSURE } else { actions::DELETE };

        match self.sync(&api, service, wants).await {
            Ok(result) => {
                let (reason, note) = match (wants, result.attributes.address.as_deref()) {
                    (true, Some(address)) => (
                        reasons::ENSURED,
                        format!("Ensured load balancer {} at {}", result.id().unwrap_or_default(), address),
                    ),
                    (true, None) => (
                        reasons::ENSURED,
                        format!("Ensured load balancer {}", result.id().unwrap_or_default()),
                    ),
                    (false, _) => (reasons::DELETED, "Released cloud resources".to_string()),
                };
                self.events
                    .publish(&service.object_ref(&()), EventType::Normal, reason, action, Some(note))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.events
                    .publish(
                        &service.object_ref(&()),
                        EventType::Warning,
                        reasons::SYNC_FAILED,
                        action,
                        Some(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn sync(&self, api: &Api<Service>, service: &Service, wants: bool) -> Result<LoadBalancer, ControllerError> {
        let name = service.name_any();

        let topology = if wants {
            if !has_finalizer(service) {
                patch_finalizers(api, &name, finalizers_with(service)).await?;
            }
            let selection = backend_selection(service)?;
            fetch_topology(
                &self.client,
                self.manager.cloud(),
                self.manager.vpc_id(),
                service,
                selection.policy,
            )
            .await?
        } else {
            Topology::default()
        };

        let local = LocalModelBuilder::new(&self.cluster_id).build(service, &topology)?;
        let result = self.manager.ensure(&local).await?;

        if wants {
            let address = result.attributes.address.as_deref();
            if ingress_ip(service) != address {
                api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(address)))
                    .await?;
                info!("Service {} ingress set to {}", service_key(service), address.unwrap_or("(none)"));
            }
        } else {
            if ingress_ip(service).is_some() {
                if let Err(e) = api
                    .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(None)))
                    .await
                {
                    // The Service may be gone already
                    warn!("Failed to clear ingress of {}: {}", service_key(service), e);
                }
            }
            patch_finalizers(api, &name, finalizers_without(service)).await?;
            info!("Released load balancer of {}", service_key(service));
        }
        Ok(result)
    }
}

async fn patch_finalizers(api: &Api<Service>, name: &str, finalizers: Vec<String>) -> Result<(), ControllerError> {
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

fn service_key(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_else(|| "default".to_string()),
        service.name_any()
    )
}

pub fn has_finalizer(service: &Service) -> bool {
    service.finalizers().iter().any(|f| f == FINALIZER)
}

fn finalizers_with(service: &Service) -> Vec<String> {
    let mut finalizers = service.finalizers().to_vec();
    if !finalizers.iter().any(|f| f == FINALIZER) {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

fn finalizers_without(service: &Service) -> Vec<String> {
    service
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect()
}

/// First ingress IP in the Service status
pub fn ingress_ip(service: &Service) -> Option<&str> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?
        .ip
        .as_deref()
}

fn status_patch(address: Option<&str>) -> Value {
    let ingress: Vec<Value> = address.map(|ip| json!({ "ip": ip })).into_iter().collect();
    json!({ "status": { "loadBalancer": { "ingress": ingress } } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;
    use crate::test_utils::*;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};
    use slb_client::MockCloudProvider;
    use std::time::Duration;

    fn manager(mock: &MockCloudProvider) -> (LoadBalancerManager, Metrics) {
        let metrics = Metrics::new().unwrap();
        let poll = PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(500),
        };
        let manager = LoadBalancerManager::new(Arc::new(mock.clone()), metrics.clone(), poll, None);
        (manager, metrics)
    }

    fn desired(service: &Service) -> LoadBalancer {
        let topology = Topology {
            nodes: vec![node("n1", "i-1", true)],
            ..Default::default()
        };
        LocalModelBuilder::new(TEST_CLUSTER).build(service, &topology).unwrap()
    }

    #[tokio::test]
    async fn test_manager_counts_mutations() {
        let mock = MockCloudProvider::default();
        let (manager, metrics) = manager(&mock);
        let service = create_test_service(vec![service_port("http", 80, Some(30080))], &[]);

        let result = manager.ensure(&desired(&service)).await.unwrap();
        assert!(result.exists());
        assert_eq!(result.listeners[0].protocol(), Protocol::Tcp);
        assert_eq!(metrics.mutation_count("CreateLoadBalancer"), 1);
        assert_eq!(metrics.mutation_count("CreateListener"), 1);

        manager.ensure(&desired(&service)).await.unwrap();
        assert_eq!(metrics.mutation_count("CreateLoadBalancer"), 1);
    }

    #[test]
    fn test_finalizer_lists() {
        let mut service = create_test_service(vec![], &[]);
        assert!(!has_finalizer(&service));
        service.metadata.finalizers = Some(vec!["other".to_string()]);

        let with = finalizers_with(&service);
        assert_eq!(with, vec!["other".to_string(), FINALIZER.to_string()]);
        service.metadata.finalizers = Some(with);
        assert!(has_finalizer(&service));
        assert_eq!(finalizers_with(&service).len(), 2);
        assert_eq!(finalizers_without(&service), vec!["other".to_string()]);
    }

    #[test]
    fn test_ingress_status() {
        let mut service = create_test_service(vec![], &[]);
        assert_eq!(ingress_ip(&service), None);
        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some("47.100.0.2".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(ingress_ip(&service), Some("47.100.0.2"));

        assert_eq!(
            status_patch(Some("47.100.0.2")),
            json!({ "status": { "loadBalancer": { "ingress": [{ "ip": "47.100.0.2" }] } } })
        );
        assert_eq!(status_patch(None), json!({ "status": { "loadBalancer": { "ingress": [] } } }));
    }
}
