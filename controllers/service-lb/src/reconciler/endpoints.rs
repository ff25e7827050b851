//! Backend candidates from cluster topology.
//!
//! `fetch_topology` reads the nodes and endpoint slices a Service needs, and
//! resolves pod IPs to network interfaces in ENI mode. `backend_targets`
//! turns that snapshot into unweighted targets for one Service port.

use crate::error::ControllerError;
use crate::model::{BackendKind, BackendTarget, TrafficPolicy};
use k8s_openapi::api::core::v1::{Node, Service, ServicePort};
use k8s_openapi::api::discovery::v1::{Endpoint, EndpointSlice};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use slb_client::CloudProvider;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Label linking endpoint slices to their Service
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";
/// Nodes carrying either label never receive load balancer traffic
pub const EXCLUDE_NODE_LABELS: [&str; 2] = [
    "node.kubernetes.io/exclude-from-external-load-balancers",
    "alpha.service-controller.kubernetes.io/exclude-balancer",
];

/// Cluster state a Service's backends are computed from
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub endpoint_slices: Vec<EndpointSlice>,
    /// Pod IP to network interface id, filled in ENI mode only
    pub eni_by_ip: HashMap<String, String>,
}

/// How backends are selected for a Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    pub policy: TrafficPolicy,
    /// Nodes must carry all of these labels
    pub node_labels: BTreeMap<String, String>,
    /// Skip cordoned nodes
    pub remove_unscheduled: bool,
}

/// Read the topology of a Service
pub async fn fetch_topology(
    client: &Client,
    cloud: &dyn CloudProvider,
    vpc_id: Option<&str>,
    service: &Service,
    policy: TrafficPolicy,
) -> Result<Topology, ControllerError> {
    let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
    let name = service.name_any();

    let nodes = Api::<Node>::all(client.clone())
        .list(&ListParams::default())
        .await?
        .items;
    let endpoint_slices = Api::<EndpointSlice>::namespaced(client.clone(), &namespace)
        .list(&ListParams::default().labels(&format!("{}={}", SERVICE_NAME_LABEL, name)))
        .await?
        .items;

    let mut topology = Topology {
        nodes,
        endpoint_slices,
        eni_by_ip: HashMap::new(),
    };

    if policy == TrafficPolicy::Eni {
        topology.eni_by_ip = resolve_enis(cloud, vpc_id, &topology.endpoint_slices).await?;
    }

    debug!(
        "Topology for {}/{}: {} nodes, {} endpoint slices, {} ENIs",
        namespace,
        name,
        topology.nodes.len(),
        topology.endpoint_slices.len(),
        topology.eni_by_ip.len()
    );
    Ok(topology)
}

/// Instance id from a node's provider id, e.g. `alicloud://cn-hangzhou.i-abc` -> `i-abc`
pub fn instance_id(node: &Node) -> Option<String> {
    let provider_id = node.spec.as_ref()?.provider_id.as_deref()?;
    let trimmed = provider_id.trim_start_matches("alicloud://");
    let id = trimmed.rsplit('.').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Whether a node may receive traffic under `selection`
pub fn node_is_eligible(node: &Node, selection: &BackendSelection) -> bool {
    let labels = node.labels();
    if EXCLUDE_NODE_LABELS.iter().any(|l| labels.contains_key(*l)) {
        return false;
    }
    if !selection
        .node_labels
        .iter()
        .all(|(k, v)| labels.get(k) == Some(v))
    {
        return false;
    }
    if selection.remove_unscheduled
        && node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false)
    {
        return false;
    }
    node_is_ready(node)
}

fn is_ready(endpoint: &Endpoint) -> bool {
    endpoint
        .conditions
        .as_ref()
        .and_then(|c| c.ready)
        .unwrap_or(true)
}

/// Target port of `port` in an endpoint slice, matched by port name
fn slice_port(slice: &EndpointSlice, port: &ServicePort) -> Option<i32> {
    let wanted = port.name.as_deref().unwrap_or_default();
    slice
        .ports
        .as_ref()?
        .iter()
        .find(|p| p.name.as_deref().unwrap_or_default() == wanted)
        .and_then(|p| p.port)
}

/// Unweighted targets for one Service port. Local targets are one per endpoint.
pub fn backend_targets(
    port: &ServicePort,
    topology: &Topology,
    selection: &BackendSelection,
    description: &str,
) -> Result<Vec<BackendTarget>, ControllerError> {
    let ecs_target = |server_id: String, node_port: i32| BackendTarget {
        server_id,
        server_ip: None,
        port: node_port,
        weight: 0,
        kind: BackendKind::Ecs,
        description: description.to_string(),
    };

    match selection.policy {
        TrafficPolicy::Cluster => {
            let node_port = require_node_port(port)?;
            Ok(topology
                .nodes
                .iter()
                .filter(|n| node_is_eligible(n, selection))
                .filter_map(|n| {
                    let id = instance_id(n);
                    if id.is_none() {
                        warn!("Node {} has no provider id, skipping", n.name_any());
                    }
                    id
                })
                .map(|id| ecs_target(id, node_port))
                .collect())
        }
        TrafficPolicy::Local => {
            let node_port = require_node_port(port)?;
            let instances: HashMap<String, String> = topology
                .nodes
                .iter()
                .filter(|n| node_is_eligible(n, selection))
                .filter_map(|n| instance_id(n).map(|id| (n.name_any(), id)))
                .collect();
            Ok(topology
                .endpoint_slices
                .iter()
                .filter(|slice| slice_port(slice, port).is_some())
                .flat_map(|slice| slice.endpoints.iter())
                .filter(|ep| is_ready(ep))
                .filter_map(|ep| ep.node_name.as_ref().and_then(|node| instances.get(node)))
                .map(|id| ecs_target(id.clone(), node_port))
                .collect())
        }
        TrafficPolicy::Eni => {
            let mut targets = Vec::new();
            for slice in &topology.endpoint_slices {
                let Some(target_port) = slice_port(slice, port) else {
                    continue;
                };
                for ip in slice
                    .endpoints
                    .iter()
                    .filter(|ep| is_ready(ep))
                    .flat_map(|ep| ep.addresses.iter())
                {
                    match topology.eni_by_ip.get(ip) {
                        Some(eni) => targets.push(BackendTarget {
                            server_id: eni.clone(),
                            server_ip: Some(ip.clone()),
                            port: target_port,
                            weight: 0,
                            kind: BackendKind::Eni,
                            description: description.to_string(),
                        }),
                        None => warn!("No network interface found for pod IP {}, skipping", ip),
                    }
                }
            }
            Ok(targets)
        }
    }
}

fn require_node_port(port: &ServicePort) -> Result<i32, ControllerError> {
    port.node_port.ok_or_else(|| {
        ControllerError::Validation(format!(
            "port {} has no node port; ecs backends need one",
            port.port
        ))
    })
}

/// Map ready pod IPs to their network interface ids
pub async fn resolve_enis(
    cloud: &dyn CloudProvider,
    vpc_id: Option<&str>,
    slices: &[EndpointSlice],
) -> Result<HashMap<String, String>, ControllerError> {
    let ips: Vec<String> = slices
        .iter()
        .flat_map(|slice| slice.endpoints.iter())
        .filter(|ep| is_ready(ep))
        .flat_map(|ep| ep.addresses.iter().cloned())
        .collect();
    if ips.is_empty() {
        return Ok(HashMap::new());
    }
    let Some(vpc_id) = vpc_id else {
        return Err(ControllerError::InvalidConfig(
            "VPC_ID is required for eni backends".to_string(),
        ));
    };
    let interfaces = cloud
        .describe_network_interfaces(vpc_id, &ips)
        .await
        .map_err(|e| ControllerError::cloud(format!("describe network interfaces in {}", vpc_id), e))?;
    Ok(interfaces
        .into_iter()
        .map(|eni| (eni.private_ip_address, eni.network_interface_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use slb_client::{MockCloudProvider, NetworkInterface};

    fn selection(policy: TrafficPolicy) -> BackendSelection {
        BackendSelection {
            policy,
            node_labels: BTreeMap::new(),
            remove_unscheduled: false,
        }
    }

    #[test]
    fn test_instance_id_from_provider_id() {
        assert_eq!(instance_id(&node("n1", "i-abc", true)).as_deref(), Some("i-abc"));
        let mut bare = node("n2", "i-x", true);
        bare.spec.as_mut().unwrap().provider_id = Some("alicloud://i-plain".to_string());
        assert_eq!(instance_id(&bare).as_deref(), Some("i-plain"));
        bare.spec.as_mut().unwrap().provider_id = None;
        assert_eq!(instance_id(&bare), None);
    }

    #[test]
    fn test_cluster_policy_uses_eligible_nodes() {
        let mut excluded = node("n3", "i-3", true);
        excluded
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(EXCLUDE_NODE_LABELS[0].to_string(), String::new());
        let topology = Topology {
            nodes: vec![node("n1", "i-1", true), node("n2", "i-2", false), excluded],
            ..Default::default()
        };

        let targets = backend_targets(&service_port("http", 80, Some(30080)), &topology, &selection(TrafficPolicy::Cluster), "k8s/80/web/default/c1")
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].server_id, "i-1");
        assert_eq!(targets[0].port, 30080);
        assert_eq!(targets[0].description, "k8s/80/web/default/c1");
    }

    #[test]
    fn test_backend_label_and_unscheduled_filters() {
        let mut labelled = node("n1", "i-1", true);
        labelled
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert("pool".to_string(), "edge".to_string());
        let mut cordoned = labelled.clone();
        cordoned.metadata.name = Some("n2".to_string());
        cordoned.spec.as_mut().unwrap().provider_id = Some("alicloud://cn-hangzhou.i-2".to_string());
        cordoned.spec.as_mut().unwrap().unschedulable = Some(true);
        let topology = Topology {
            nodes: vec![labelled, cordoned, node("n3", "i-3", true)],
            ..Default::default()
        };

        let mut sel = selection(TrafficPolicy::Cluster);
        sel.node_labels.insert("pool".to_string(), "edge".to_string());
        let port = service_port("", 80, Some(30080));
        assert_eq!(backend_targets(&port, &topology, &sel, "").unwrap().len(), 2);

        sel.remove_unscheduled = true;
        let targets = backend_targets(&port, &topology, &sel, "").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].server_id, "i-1");
    }

    #[test]
    fn test_local_policy_one_target_per_endpoint() {
        let topology = Topology {
            nodes: vec![node("n1", "i-1", true), node("n2", "i-2", true)],
            endpoint_slices: vec![endpoint_slice(
                "web",
                "http",
                8080,
                &[("10.0.0.1", "n1", true), ("10.0.0.2", "n1", true), ("10.0.0.3", "n2", false)],
            )],
            ..Default::default()
        };

        let targets = backend_targets(&service_port("http", 80, Some(30080)), &topology, &selection(TrafficPolicy::Local), "")
            .unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.server_id == "i-1" && t.port == 30080));
    }

    #[test]
    fn test_eni_policy_targets_pods() {
        let topology = Topology {
            endpoint_slices: vec![endpoint_slice(
                "web",
                "http",
                8080,
                &[("10.0.0.1", "n1", true), ("10.0.0.9", "n1", true)],
            )],
            eni_by_ip: HashMap::from([("10.0.0.1".to_string(), "eni-1".to_string())]),
            ..Default::default()
        };

        let targets = backend_targets(&service_port("http", 80, None), &topology, &selection(TrafficPolicy::Eni), "")
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].server_id, "eni-1");
        assert_eq!(targets[0].server_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(targets[0].port, 8080);
        assert_eq!(targets[0].kind, BackendKind::Eni);
    }

    #[test]
    fn test_missing_node_port_is_validation_error() {
        let err = backend_targets(&service_port("http", 80, None), &Topology::default(), &selection(TrafficPolicy::Cluster), "")
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_resolve_enis_from_cloud() {
        let mock = MockCloudProvider::default();
        mock.add_network_interface(NetworkInterface {
            network_interface_id: "eni-1".to_string(),
            private_ip_address: "10.0.0.1".to_string(),
            vpc_id: "vpc-1".to_string(),
        });
        mock.add_network_interface(NetworkInterface {
            network_interface_id: "eni-other".to_string(),
            private_ip_address: "10.0.0.2".to_string(),
            vpc_id: "vpc-2".to_string(),
        });
        let slices = vec![endpoint_slice(
            "web",
            "http",
            8080,
            &[("10.0.0.1", "n1", true), ("10.0.0.2", "n1", true), ("10.0.0.3", "n1", false)],
        )];

        let enis = resolve_enis(&mock, Some("vpc-1"), &slices).await.unwrap();
        assert_eq!(enis, HashMap::from([("10.0.0.1".to_string(), "eni-1".to_string())]));

        let err = resolve_enis(&mock, None, &slices).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
        assert!(resolve_enis(&mock, None, &[]).await.unwrap().is_empty());
    }
}
