//! CloudProvider trait for mocking
//!
//! This trait abstracts the load balancer API so the controller can be tested
//! against an in-memory implementation. `SlbClient` implements it over HTTP.

use crate::error::CloudError;
use crate::models::*;

/// Trait for Server Load Balancer API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Listener operations are keyed by `(load balancer id, port, protocol)`.
#[async_trait::async_trait]
pub trait CloudProvider: Send + Sync {
    /// Region every call is scoped to
    fn region_id(&self) -> &str;

    // Load balancer operations
    async fn describe_load_balancers(&self, query: &LoadBalancerQuery) -> Result<Vec<LoadBalancerSummary>, CloudError>;
    async fn describe_load_balancer_attribute(&self, lb_id: &str) -> Result<LoadBalancerAttribute, CloudError>;
    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> Result<CreateLoadBalancerResponse, CloudError>;
    async fn delete_load_balancer(&self, lb_id: &str) -> Result<(), CloudError>;
    async fn set_load_balancer_name(&self, lb_id: &str, name: &str) -> Result<(), CloudError>;
    async fn modify_load_balancer_internet_spec(&self, lb_id: &str, charge_type: &str, bandwidth: Option<i32>) -> Result<(), CloudError>;
    async fn modify_load_balancer_instance_spec(&self, lb_id: &str, spec: &str) -> Result<(), CloudError>;
    async fn modify_load_balancer_instance_charge_type(&self, lb_id: &str, charge_type: &str, spec: Option<&str>) -> Result<(), CloudError>;
    async fn set_load_balancer_delete_protection(&self, lb_id: &str, flag: &str) -> Result<(), CloudError>;
    async fn set_load_balancer_modification_protection(&self, lb_id: &str, status: &str, reason: Option<&str>) -> Result<(), CloudError>;

    // Tag operations
    async fn tag_resources(&self, lb_id: &str, tags: &[Tag]) -> Result<(), CloudError>;
    async fn untag_resources(&self, lb_id: &str, keys: &[String]) -> Result<(), CloudError>;
    async fn list_tag_resources(&self, lb_id: &str) -> Result<Vec<Tag>, CloudError>;

    // Listener operations
    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>, CloudError>;
    async fn create_tcp_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn create_udp_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn create_http_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn create_https_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn set_tcp_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn set_udp_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn set_http_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn set_https_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError>;
    async fn start_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError>;
    async fn stop_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError>;
    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError>;

    // VServer group operations
    /// Lists the VServer groups of a load balancer including their backends.
    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>, CloudError>;
    /// Creates a VServer group and returns its id.
    async fn create_vserver_group(&self, lb_id: &str, name: &str, backends: &[BackendServer]) -> Result<String, CloudError>;
    async fn delete_vserver_group(&self, vgroup_id: &str) -> Result<(), CloudError>;
    async fn add_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError>;
    async fn remove_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError>;
    /// Updates weight/description of backends already in the group.
    async fn set_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError>;

    // Network operations
    /// Resolves private IPs to elastic network interfaces within a VPC.
    async fn describe_network_interfaces(&self, vpc_id: &str, private_ips: &[String]) -> Result<Vec<NetworkInterface>, CloudError>;
}
