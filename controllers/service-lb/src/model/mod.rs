//! Load balancer model shared by the local and remote builders.
//!
//! The same shape describes both the desired state (built from the Service)
//! and the actual state (built from the cloud). Every optional attribute is an
//! `Option`: `None` means "not specified", never zero or off.

pub mod listener_config;
pub mod naming;

pub use listener_config::{CommonConfig, HttpConfig, HttpOptions, HttpsConfig, ListenerConfig, TcpConfig, UdpConfig};
pub use naming::NamedKey;

use slb_client::{BACKEND_TYPE_ECS, BACKEND_TYPE_ENI, BackendServer, ListenerSettings, Tag};
use std::collections::BTreeMap;
use std::fmt;

/// Listener protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    /// Port space the listener occupies: UDP, or TCP for everything else
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            _ => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend target type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Node instance, traffic goes to the node port
    Ecs,
    /// Pod network interface, traffic goes to the pod
    Eni,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecs => BACKEND_TYPE_ECS,
            Self::Eni => BACKEND_TYPE_ENI,
        }
    }
}

/// Which topology entities become backends and how weight is spread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPolicy {
    /// Every eligible node, uniform weight
    Cluster,
    /// Nodes running ready endpoints, weight proportional to pods per node
    Local,
    /// Pods attached directly via their network interface, uniform weight
    Eni,
}

/// Identity of the Service a model belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub cluster_id: String,
}

impl ServiceIdentity {
    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn default_load_balancer_name(&self) -> String {
        naming::default_load_balancer_name(&self.uid)
    }

    /// Value of the reuse tag on load balancers this Service borrows
    pub fn reuse_tag_value(&self) -> String {
        format!("{}/{}/{}", self.cluster_id, self.namespace, self.name)
    }
}

/// Load balancer attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerAttributes {
    pub load_balancer_id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub status: Option<String>,
    /// `internet` or `intranet`, immutable
    pub address_type: Option<String>,
    /// `ipv4` or `ipv6`, immutable
    pub ip_version: Option<String>,
    pub internet_charge_type: Option<String>,
    pub bandwidth: Option<i32>,
    pub instance_charge_type: Option<String>,
    pub spec: Option<String>,
    /// Immutable
    pub resource_group_id: Option<String>,
    /// Immutable
    pub master_zone_id: Option<String>,
    /// Immutable
    pub slave_zone_id: Option<String>,
    /// Creation only
    pub vswitch_id: Option<String>,
    pub delete_protection: Option<String>,
    pub modification_protection: Option<String>,
    pub modification_protection_reason: Option<String>,
    pub tags: BTreeMap<String, String>,
    /// Set when the Service names an existing load balancer
    pub is_user_managed: bool,
    pub force_override_listeners: bool,
    pub preserve_on_delete: bool,
}

impl LoadBalancerAttributes {
    pub fn tag_list(&self) -> Vec<Tag> {
        self.tags.iter().map(|(k, v)| Tag::new(k, v)).collect()
    }
}

/// One listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub port: i32,
    /// Named key of the owning Service; foreign listeners carry anything else
    pub description: String,
    /// VServer group the listener forwards to, by name (local) or resolved id
    pub vgroup_name: Option<String>,
    pub vgroup_id: Option<String>,
    pub status: Option<String>,
    pub config: ListenerConfig,
}

impl Listener {
    pub fn protocol(&self) -> Protocol {
        self.config.protocol()
    }

    /// Settings sent to the cloud for this listener
    pub fn settings(&self) -> ListenerSettings {
        let mut settings = self.config.to_settings();
        settings.description = Some(self.description.clone());
        settings.vserver_group_id = self.vgroup_id.clone();
        settings
    }

    /// `tcp/80`
    pub fn identity(&self) -> String {
        format!("{}/{}", self.protocol(), self.port)
    }
}

/// VServer group for one Service port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendGroup {
    /// Decoded ownership marker; `None` for groups not created by the controller
    pub named_key: Option<NamedKey>,
    pub name: String,
    pub vgroup_id: Option<String>,
    /// Group supplied by the user via `vgroup-port`, never created or deleted
    pub is_user_managed: bool,
    pub service_port: i32,
    pub backends: Vec<BackendTarget>,
}

/// One backend server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub server_id: String,
    pub server_ip: Option<String>,
    pub port: i32,
    pub weight: i32,
    pub kind: BackendKind,
    /// Named key of the group that added it
    pub description: String,
}

/// Identity of a backend within a group
pub type BackendKey = (String, Option<String>, i32);

impl BackendTarget {
    /// Server id and port, plus IP for ENIs
    pub fn key(&self) -> BackendKey {
        let ip = match self.kind {
            BackendKind::Eni => self.server_ip.clone(),
            BackendKind::Ecs => None,
        };
        (self.server_id.clone(), ip, self.port)
    }

    pub fn to_backend_server(&self) -> BackendServer {
        BackendServer {
            server_id: self.server_id.clone(),
            server_ip: self.server_ip.clone(),
            port: self.port,
            weight: self.weight,
            server_type: self.kind.as_str().to_string(),
            description: self.description.clone(),
        }
    }

    pub fn from_backend_server(server: &BackendServer) -> Self {
        Self {
            server_id: server.server_id.clone(),
            server_ip: server.server_ip.clone(),
            port: server.port,
            weight: server.weight,
            kind: if server.server_type == BACKEND_TYPE_ENI {
                BackendKind::Eni
            } else {
                BackendKind::Ecs
            },
            description: server.description.clone(),
        }
    }
}

/// Root aggregate: one load balancer with its listeners and VServer groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub service: ServiceIdentity,
    pub attributes: LoadBalancerAttributes,
    pub listeners: Vec<Listener>,
    pub vgroups: Vec<BackendGroup>,
    /// The Service no longer wants a load balancer; owned resources are removed
    pub tear_down: bool,
}

impl LoadBalancer {
    /// Empty model for a Service
    pub fn new(service: ServiceIdentity) -> Self {
        Self {
            service,
            attributes: LoadBalancerAttributes::default(),
            listeners: Vec::new(),
            vgroups: Vec::new(),
            tear_down: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.load_balancer_id.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_key_uses_ip_only_for_eni() {
        let mut target = BackendTarget {
            server_id: "i-1".to_string(),
            server_ip: Some("10.0.0.5".to_string()),
            port: 30080,
            weight: 100,
            kind: BackendKind::Ecs,
            description: String::new(),
        };
        assert_eq!(target.key(), ("i-1".to_string(), None, 30080));

        target.kind = BackendKind::Eni;
        assert_eq!(target.key().1.as_deref(), Some("10.0.0.5"));

        let server = target.to_backend_server();
        assert_eq!(server.server_type, "eni");
        assert_eq!(BackendTarget::from_backend_server(&server), target);
    }

    #[test]
    fn test_protocol_transport() {
        assert_eq!(Protocol::parse("HTTPS"), Some(Protocol::Https));
        assert_eq!(Protocol::parse("sctp"), None);
        assert_eq!(Protocol::Http.transport(), Protocol::Tcp.transport());
        assert_ne!(Protocol::Udp.transport(), Protocol::Tcp.transport());
    }
}
