//! Test utilities for unit testing the reconciler
//!
//! Builders for Services, nodes and endpoint slices, plus a cloud-side
//! load balancer fixture for the mock provider.

use crate::annotation::ANNOTATION_PREFIX;
use crate::model::ServiceIdentity;
use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeSpec, NodeStatus, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::discovery::v1::{Endpoint, EndpointConditions, EndpointPort, EndpointSlice};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use slb_client::{LB_STATUS_ACTIVE, LoadBalancerAttribute};
use std::collections::BTreeMap;

pub const TEST_UID: &str = "6f0b2c39-2d0e-4c6e-9a53-1f6d1c1e7f42";
pub const TEST_CLUSTER: &str = "c1";

pub fn identity() -> ServiceIdentity {
    ServiceIdentity {
        namespace: "default".to_string(),
        name: "web".to_string(),
        uid: TEST_UID.to_string(),
        cluster_id: TEST_CLUSTER.to_string(),
    }
}

/// TCP Service port; an empty name means unnamed
pub fn service_port(name: &str, port: i32, node_port: Option<i32>) -> ServicePort {
    ServicePort {
        name: (!name.is_empty()).then(|| name.to_string()),
        port,
        node_port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn udp_port(name: &str, port: i32, node_port: Option<i32>) -> ServicePort {
    ServicePort {
        protocol: Some("UDP".to_string()),
        ..service_port(name, port, node_port)
    }
}

/// LoadBalancer Service `default/web` with annotations given without prefix
pub fn create_test_service(ports: Vec<ServicePort>, annotations: &[(&str, &str)]) -> Service {
    let annotations: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| (format!("{}{}", ANNOTATION_PREFIX, k), v.to_string()))
        .collect();
    Service {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            uid: Some(TEST_UID.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(ports),
            external_traffic_policy: Some("Cluster".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn node(name: &str, instance_id: &str, ready: bool) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::new()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(format!("alicloud://cn-hangzhou.{}", instance_id)),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Endpoint slice with one port; endpoints are `(ip, node, ready)`
pub fn endpoint_slice(service: &str, port_name: &str, port: i32, endpoints: &[(&str, &str, bool)]) -> EndpointSlice {
    EndpointSlice {
        metadata: ObjectMeta {
            name: Some(format!("{}-abcde", service)),
            namespace: Some("default".to_string()),
            labels: Some(BTreeMap::from([(
                "kubernetes.io/service-name".to_string(),
                service.to_string(),
            )])),
            ..Default::default()
        },
        address_type: "IPv4".to_string(),
        endpoints: endpoints
            .iter()
            .map(|(ip, node, ready)| Endpoint {
                addresses: vec![ip.to_string()],
                node_name: Some(node.to_string()),
                conditions: Some(EndpointConditions {
                    ready: Some(*ready),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect(),
        ports: Some(vec![EndpointPort {
            name: (!port_name.is_empty()).then(|| port_name.to_string()),
            port: Some(port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
    }
}

/// Active load balancer as the cloud reports it
pub fn cloud_load_balancer(id: &str, name: &str) -> LoadBalancerAttribute {
    LoadBalancerAttribute {
        load_balancer_id: id.to_string(),
        load_balancer_name: name.to_string(),
        load_balancer_status: LB_STATUS_ACTIVE.to_string(),
        address: "47.100.0.1".to_string(),
        address_type: "internet".to_string(),
        address_ip_version: "ipv4".to_string(),
        internet_charge_type: "paybytraffic".to_string(),
        load_balancer_spec: Some("slb.s1.small".to_string()),
        delete_protection: "off".to_string(),
        modification_protection_status: "NonProtection".to_string(),
        ..Default::default()
    }
}
