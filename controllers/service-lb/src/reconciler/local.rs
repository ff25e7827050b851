//! Desired state from a Service and its topology.

use crate::annotation::{self as keys, AnnotationRequest};
use crate::error::ControllerError;
use crate::model::{
    BackendGroup, LoadBalancer, LoadBalancerAttributes, Listener, ListenerConfig, NamedKey, Protocol,
    ServiceIdentity, TrafficPolicy,
};
use crate::reconciler::endpoints::{BackendSelection, Topology, backend_targets};
use crate::reconciler::weight::assign_weights;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use kube::ResourceExt;
use std::collections::{HashMap, HashSet};

const LOAD_BALANCER_TYPE: &str = "LoadBalancer";

/// Identity of a Service within a cluster
pub fn service_identity(service: &Service, cluster_id: &str) -> ServiceIdentity {
    ServiceIdentity {
        namespace: service.namespace().unwrap_or_else(|| "default".to_string()),
        name: service.name_any(),
        uid: service.uid().unwrap_or_default(),
        cluster_id: cluster_id.to_string(),
    }
}

/// True while the Service asks this controller for a load balancer
pub fn wants_load_balancer(service: &Service) -> bool {
    let Some(spec) = service.spec.as_ref() else {
        return false;
    };
    service.metadata.deletion_timestamp.is_none()
        && spec.type_.as_deref() == Some(LOAD_BALANCER_TYPE)
        && spec.load_balancer_class.is_none()
}

/// Backend selection for a Service
pub fn backend_selection(service: &Service) -> Result<BackendSelection, ControllerError> {
    let request = AnnotationRequest::new(service.metadata.annotations.as_ref());
    let local_traffic = service
        .spec
        .as_ref()
        .and_then(|s| s.external_traffic_policy.as_deref())
        == Some("Local");
    let policy = match request.parse_one_of(keys::BACKEND_TYPE, &["ecs", "eni"])?.as_deref() {
        Some("eni") => TrafficPolicy::Eni,
        _ if local_traffic => TrafficPolicy::Local,
        _ => TrafficPolicy::Cluster,
    };
    Ok(BackendSelection {
        policy,
        node_labels: request.parse_labels(keys::BACKEND_LABEL)?,
        remove_unscheduled: request.parse_flag(keys::REMOVE_UNSCHEDULED)?.as_deref() == Some("on"),
    })
}

/// Builds the desired load balancer for a Service
pub struct LocalModelBuilder<'a> {
    cluster_id: &'a str,
}

impl<'a> LocalModelBuilder<'a> {
    pub fn new(cluster_id: &'a str) -> Self {
        Self { cluster_id }
    }

    /// Desired model. A Service that no longer wants a load balancer yields an
    /// inert model marked for teardown.
    pub fn build(&self, service: &Service, topology: &Topology) -> Result<LoadBalancer, ControllerError> {
        let identity = service_identity(service, self.cluster_id);
        let request = AnnotationRequest::new(service.metadata.annotations.as_ref());

        if !wants_load_balancer(service) {
            return Ok(inert_model(identity, &request));
        }

        let mut model = LoadBalancer::new(identity);
        model.attributes = load_balancer_attributes(&request)?;

        let ports = service
            .spec
            .as_ref()
            .and_then(|s| s.ports.clone())
            .unwrap_or_default();
        let declarations = PortDeclarations::parse(&request, &ports)?;
        let selection = backend_selection(service)?;
        let weight = explicit_weight(&request)?;

        for port in &ports {
            let protocol = declarations.protocol_of(port);
            let key = NamedKey::new(&model.service, port.port);
            let label = key.to_string();

            let mut config = ListenerConfig::from_annotations(protocol, &request)?;
            if let Some(target) = declarations.forward.get(&port.port) {
                config.set_forward_port(*target);
            }

            let mut listener = Listener {
                port: port.port,
                description: label.clone(),
                vgroup_name: None,
                vgroup_id: None,
                status: None,
                config,
            };

            if !listener.config.is_forwarding() {
                let targets = backend_targets(port, topology, &selection, &label)?;
                let user_group = declarations.user_groups.get(&port.port).cloned();
                listener.vgroup_name = Some(label.clone());
                listener.vgroup_id = user_group.clone();
                model.vgroups.push(BackendGroup {
                    named_key: Some(key),
                    name: label,
                    is_user_managed: user_group.is_some(),
                    vgroup_id: user_group,
                    service_port: port.port,
                    backends: assign_weights(selection.policy, targets, weight),
                });
            }
            model.listeners.push(listener);
        }
        Ok(model)
    }
}

/// Model carrying just enough to tear down what the Service owns
fn inert_model(identity: ServiceIdentity, request: &AnnotationRequest<'_>) -> LoadBalancer {
    let mut model = LoadBalancer::new(identity);
    model.tear_down = true;
    model.attributes.load_balancer_id = request.get(keys::LOAD_BALANCER_ID).map(str::to_string);
    model.attributes.is_user_managed = model.attributes.load_balancer_id.is_some();
    // Malformed values must not block teardown
    model.attributes.preserve_on_delete = request
        .parse_bool(keys::PRESERVE_ON_DELETE)
        .ok()
        .flatten()
        .unwrap_or(false);
    model
}

fn load_balancer_attributes(request: &AnnotationRequest<'_>) -> Result<LoadBalancerAttributes, ControllerError> {
    let owned = |key: &str| request.get(key).map(str::to_string);
    let internet_charge_type = request.parse_one_of(keys::CHARGE_TYPE, &["paybytraffic", "paybybandwidth"])?;
    let bandwidth = if internet_charge_type.as_deref() == Some("paybybandwidth") {
        request.parse_i32(keys::BANDWIDTH)?
    } else {
        None
    };
    let load_balancer_id = owned(keys::LOAD_BALANCER_ID);

    Ok(LoadBalancerAttributes {
        is_user_managed: load_balancer_id.is_some(),
        load_balancer_id,
        name: owned(keys::LOAD_BALANCER_NAME),
        address: None,
        status: None,
        address_type: request.parse_one_of(keys::ADDRESS_TYPE, &["internet", "intranet"])?,
        ip_version: request.parse_one_of(keys::IP_VERSION, &["ipv4", "ipv6"])?,
        internet_charge_type,
        bandwidth,
        instance_charge_type: request.parse_one_of(keys::INSTANCE_CHARGE_TYPE, &["PayBySpec", "PayByCLCU"])?,
        spec: owned(keys::SPEC),
        resource_group_id: owned(keys::RESOURCE_GROUP_ID),
        master_zone_id: owned(keys::MASTER_ZONE_ID),
        slave_zone_id: owned(keys::SLAVE_ZONE_ID),
        vswitch_id: owned(keys::VSWITCH_ID),
        delete_protection: request.parse_flag(keys::DELETE_PROTECTION)?,
        modification_protection: request
            .parse_one_of(keys::MODIFICATION_PROTECTION, &["ConsoleProtection", "NonProtection"])?,
        modification_protection_reason: None,
        tags: request.parse_labels(keys::ADDITIONAL_TAGS)?,
        force_override_listeners: request.parse_bool(keys::FORCE_OVERRIDE_LISTENERS)?.unwrap_or(false),
        preserve_on_delete: request.parse_bool(keys::PRESERVE_ON_DELETE)?.unwrap_or(false),
    })
}

fn explicit_weight(request: &AnnotationRequest<'_>) -> Result<Option<i32>, ControllerError> {
    match request.parse_i32(keys::WEIGHT)? {
        Some(w) if !(0..=100).contains(&w) => Err(ControllerError::Validation(format!(
            "weight must be between 0 and 100, got {}",
            w
        ))),
        weight => Ok(weight),
    }
}

/// Port-keyed annotations checked against the Service's declared ports
#[derive(Debug, Default)]
struct PortDeclarations {
    protocols: HashMap<i32, Protocol>,
    /// HTTP port -> HTTPS port
    forward: HashMap<i32, i32>,
    /// Service port -> user-managed VServer group id
    user_groups: HashMap<i32, String>,
}

impl PortDeclarations {
    fn parse(request: &AnnotationRequest<'_>, ports: &[ServicePort]) -> Result<Self, ControllerError> {
        let mut seen = HashSet::new();
        for port in ports {
            if !seen.insert(port.port) {
                return Err(ControllerError::Validation(format!(
                    "port {} is declared more than once",
                    port.port
                )));
            }
        }
        let declared = |number: i32| ports.iter().find(|p| p.port == number);

        let mut declarations = Self::default();

        for (protocol, port) in request.parse_pairs(keys::PROTOCOL_PORT, ':')? {
            let parsed = Protocol::parse(&protocol).ok_or_else(|| {
                ControllerError::Validation(format!("protocol-port: unknown protocol '{}'", protocol))
            })?;
            let number = parse_port(keys::PROTOCOL_PORT, &port)?;
            let service_port = declared(number).ok_or_else(|| {
                ControllerError::Validation(format!("protocol-port: port {} is not declared on the Service", number))
            })?;
            if is_udp(service_port) && parsed != Protocol::Udp {
                return Err(ControllerError::Validation(format!(
                    "protocol-port: {} cannot be served on UDP port {}",
                    parsed, number
                )));
            }
            declarations.protocols.insert(number, parsed);
        }

        for (source, target) in request.parse_pairs(keys::FORWARD_PORT, ':')? {
            let source = parse_port(keys::FORWARD_PORT, &source)?;
            let target = parse_port(keys::FORWARD_PORT, &target)?;
            for number in [source, target] {
                if declared(number).is_none() {
                    return Err(ControllerError::Validation(format!(
                        "forward-port: port {} is not declared on the Service",
                        number
                    )));
                }
            }
            let source_protocol = declarations.protocols.get(&source).copied();
            let target_protocol = declarations.protocols.get(&target).copied();
            if source_protocol != Some(Protocol::Http) || target_protocol != Some(Protocol::Https) {
                return Err(ControllerError::Validation(format!(
                    "forward-port: {}:{} must go from an http to an https port",
                    source, target
                )));
            }
            declarations.forward.insert(source, target);
        }

        for (vgroup_id, port) in request.parse_pairs(keys::VGROUP_PORT, ':')? {
            let number = parse_port(keys::VGROUP_PORT, &port)?;
            if declared(number).is_none() {
                return Err(ControllerError::Validation(format!(
                    "vgroup-port: port {} is not declared on the Service",
                    number
                )));
            }
            declarations.user_groups.insert(number, vgroup_id);
        }

        Ok(declarations)
    }

    fn protocol_of(&self, port: &ServicePort) -> Protocol {
        match self.protocols.get(&port.port) {
            Some(protocol) => *protocol,
            None if is_udp(port) => Protocol::Udp,
            None => Protocol::Tcp,
        }
    }
}

fn is_udp(port: &ServicePort) -> bool {
    port.protocol.as_deref().is_some_and(|p| p.eq_ignore_ascii_case("udp"))
}

fn parse_port(key: &str, value: &str) -> Result<i32, ControllerError> {
    value
        .parse::<i32>()
        .ok()
        .filter(|p| (1..=65535).contains(p))
        .ok_or_else(|| ControllerError::Validation(format!("{}: '{}' is not a port", key, value)))
}
