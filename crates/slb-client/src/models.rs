//! SLB API models
//!
//! These models mirror the request/response shapes of the Server Load Balancer
//! API (`DescribeLoadBalancerAttribute`, `DescribeLoadBalancerListeners`,
//! `DescribeVServerGroupAttribute`, ...). Field names serialize as PascalCase.

use serde::{Deserialize, Serialize};

/// Maximum number of backend servers the API accepts in a single
/// add/remove/set call.
pub const API_MAX_BACKENDS_PER_CALL: usize = 40;

/// Load balancer status reported once provisioning has finished
pub const LB_STATUS_ACTIVE: &str = "active";

/// Listener status values
pub const LISTENER_STATUS_RUNNING: &str = "running";
/// Listener was stopped administratively
pub const LISTENER_STATUS_STOPPED: &str = "stopped";

/// Backend server type for instances (nodes)
pub const BACKEND_TYPE_ECS: &str = "ecs";
/// Backend server type for elastic network interfaces (pods)
pub const BACKEND_TYPE_ENI: &str = "eni";

/// Resource tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub tag_key: String,
    pub tag_value: String,
}

impl Tag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag_key: key.into(),
            tag_value: value.into(),
        }
    }
}

/// Filter for `DescribeLoadBalancers`
///
/// All set fields must match. Tags match when the load balancer carries every
/// listed key/value pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Entry returned by `DescribeLoadBalancers`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerSummary {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    pub load_balancer_status: String,
    #[serde(default)]
    pub address: String,
}

/// Full load balancer attributes (`DescribeLoadBalancerAttribute`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerAttribute {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    pub load_balancer_status: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address_type: String,
    #[serde(default, rename = "AddressIPVersion")]
    pub address_ip_version: String,
    #[serde(default)]
    pub internet_charge_type: String,
    #[serde(default)]
    pub bandwidth: Option<i32>,
    #[serde(default)]
    pub load_balancer_spec: Option<String>,
    #[serde(default)]
    pub instance_charge_type: Option<String>,
    #[serde(default)]
    pub resource_group_id: String,
    #[serde(default)]
    pub master_zone_id: String,
    #[serde(default)]
    pub slave_zone_id: String,
    #[serde(default, rename = "VSwitchId")]
    pub vswitch_id: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub delete_protection: String,
    #[serde(default)]
    pub modification_protection_status: String,
    #[serde(default)]
    pub modification_protection_reason: String,
}

/// Request body for `CreateLoadBalancer`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateLoadBalancerRequest {
    pub load_balancer_name: String,
    pub address_type: String,
    #[serde(default, rename = "AddressIPVersion", skip_serializing_if = "Option::is_none")]
    pub address_ip_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_charge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_charge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave_zone_id: Option<String>,
    #[serde(default, rename = "VSwitchId", skip_serializing_if = "Option::is_none")]
    pub vswitch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_protection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_protection_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_protection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// Idempotency token; repeated requests with the same token create at most one instance
    pub client_token: String,
}

/// Response of `CreateLoadBalancer`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateLoadBalancerResponse {
    pub load_balancer_id: String,
    #[serde(default)]
    pub address: String,
}

/// Listener settings shared by the per-protocol create and set-attribute calls.
///
/// Every field is optional: an absent field is left untouched by the API on
/// update and receives the provider default on create. Which fields a
/// protocol honours is decided by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "VServerGroupId", skip_serializing_if = "Option::is_none")]
    pub vserver_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub established_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_connect_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_connect_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout: Option<i32>,
    #[serde(default, rename = "HealthCheckURI", skip_serializing_if = "Option::is_none")]
    pub health_check_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_http_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_session_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_forward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_certificate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_http2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cipher_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_forwarded_for_proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_drain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_drain_timeout: Option<i32>,
}

/// Invokes `$m!` with every `ListenerSettings` field.
macro_rules! listener_setting_fields {
    ($m:ident) => {
        $m!(
            description, vserver_group_id, bandwidth, scheduler, persistence_timeout,
            established_timeout, acl_status, acl_type, acl_id, health_check, health_check_type,
            health_check_connect_port, health_check_connect_timeout, health_check_interval,
            healthy_threshold, unhealthy_threshold, health_check_timeout, health_check_uri,
            health_check_domain, health_check_http_code, sticky_session, sticky_session_type,
            cookie, cookie_timeout, listener_forward, forward_port, server_certificate_id,
            enable_http2, tls_cipher_policy, idle_timeout, request_timeout,
            x_forwarded_for_proto, connection_drain, connection_drain_timeout
        )
    };
}

impl ListenerSettings {
    /// Overlays every field set in `other` onto `self`.
    pub fn merge(&mut self, other: &ListenerSettings) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        listener_setting_fields!(overlay);
    }

    /// Fields set in `self` whose value differs from `current`.
    ///
    /// Fields left unset in `self` are never reported, whatever `current` holds.
    #[must_use]
    pub fn changes_from(&self, current: &ListenerSettings) -> ListenerSettings {
        let mut changes = ListenerSettings::default();
        macro_rules! compare {
            ($($field:ident),*) => {
                $(
                    if self.$field.is_some() && self.$field != current.$field {
                        changes.$field = self.$field.clone();
                    }
                )*
            };
        }
        listener_setting_fields!(compare);
        changes
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == ListenerSettings::default()
    }
}

/// Listener as returned by `DescribeLoadBalancerListeners`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerAttribute {
    pub listener_port: i32,
    /// `tcp`, `udp`, `http` or `https`
    pub listener_protocol: String,
    /// `running`, `stopped`, `starting`, `configuring`
    pub status: String,
    #[serde(flatten)]
    pub settings: ListenerSettings,
}

/// Backend server entry of a VServer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendServer {
    pub server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<String>,
    pub port: i32,
    pub weight: i32,
    /// `ecs` or `eni`
    #[serde(rename = "Type")]
    pub server_type: String,
    #[serde(default)]
    pub description: String,
}

/// VServer group with its backends (`DescribeVServerGroupAttribute`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VServerGroup {
    #[serde(rename = "VServerGroupId")]
    pub vserver_group_id: String,
    #[serde(rename = "VServerGroupName")]
    pub vserver_group_name: String,
    #[serde(default)]
    pub backend_servers: Vec<BackendServer>,
}

/// Elastic network interface (`DescribeNetworkInterfaces`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInterface {
    pub network_interface_id: String,
    pub private_ip_address: String,
    #[serde(default)]
    pub vpc_id: String,
}
