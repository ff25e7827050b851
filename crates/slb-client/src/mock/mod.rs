//! Mock CloudProvider for unit testing
//!
//! This module provides an in-memory implementation of [`CloudProvider`] that
//! enforces the API rules the controller depends on, so reconciliation logic
//! can be tested without a cloud account.
//!
//! The mock is organized into domain-specific modules:
//! - `load_balancer.rs` - Load balancers, tags and network interfaces
//! - `listener.rs` - Listeners
//! - `vserver_group.rs` - VServer groups and their backends
//!
//! Every call is appended to a call log (`calls()`), and any action can be made
//! to fail with `fail_on()`.

mod listener;
mod load_balancer;
mod vserver_group;

use crate::error::CloudError;
use crate::models::*;
use crate::provider_trait::CloudProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Stored VServer group together with the load balancer it belongs to
#[derive(Debug, Clone)]
pub(crate) struct StoredVServerGroup {
    pub(crate) lb_id: String,
    pub(crate) group: VServerGroup,
}

/// Mock CloudProvider for testing
#[derive(Debug, Clone)]
pub struct MockCloudProvider {
    pub(crate) region_id: String,
    // In-memory storage for resources
    pub(crate) load_balancers: Arc<Mutex<HashMap<String, LoadBalancerAttribute>>>,
    pub(crate) tags: Arc<Mutex<HashMap<String, Vec<Tag>>>>,
    pub(crate) listeners: Arc<Mutex<HashMap<String, Vec<ListenerAttribute>>>>,
    pub(crate) vserver_groups: Arc<Mutex<HashMap<String, StoredVServerGroup>>>,
    pub(crate) network_interfaces: Arc<Mutex<Vec<NetworkInterface>>>,
    // Remaining "inactive" polls per freshly created load balancer
    pub(crate) pending_activation: Arc<Mutex<HashMap<String, u32>>>,
    pub(crate) activation_polls: Arc<Mutex<u32>>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
    pub(crate) failures: Arc<Mutex<HashMap<String, (String, String)>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl Default for MockCloudProvider {
    fn default() -> Self {
        Self::new("cn-hangzhou")
    }
}

impl MockCloudProvider {
    /// Create a new mock provider
    pub fn new(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            load_balancers: Arc::new(Mutex::new(HashMap::new())),
            tags: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            vserver_groups: Arc::new(Mutex::new(HashMap::new())),
            network_interfaces: Arc::new(Mutex::new(Vec::new())),
            pending_activation: Arc::new(Mutex::new(HashMap::new())),
            activation_polls: Arc::new(Mutex::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a load balancer to the mock store (for test setup)
    pub fn add_load_balancer(&self, lb: LoadBalancerAttribute, tags: Vec<Tag>) {
        let id = lb.load_balancer_id.clone();
        self.load_balancers.lock().unwrap().insert(id.clone(), lb);
        self.tags.lock().unwrap().insert(id.clone(), tags);
        self.listeners.lock().unwrap().entry(id).or_default();
    }

    /// Add a listener to the mock store (for test setup)
    pub fn add_listener(&self, lb_id: &str, listener: ListenerAttribute) {
        self.listeners
            .lock()
            .unwrap()
            .entry(lb_id.to_string())
            .or_default()
            .push(listener);
    }

    /// Add a VServer group to the mock store (for test setup)
    pub fn add_vserver_group(&self, lb_id: &str, group: VServerGroup) {
        self.vserver_groups.lock().unwrap().insert(
            group.vserver_group_id.clone(),
            StoredVServerGroup {
                lb_id: lb_id.to_string(),
                group,
            },
        );
    }

    /// Add a network interface to the mock store (for test setup)
    pub fn add_network_interface(&self, eni: NetworkInterface) {
        self.network_interfaces.lock().unwrap().push(eni);
    }

    /// Report newly created load balancers as inactive for `polls` describes
    pub fn set_activation_polls(&self, polls: u32) {
        *self.activation_polls.lock().unwrap() = polls;
    }

    /// Make every subsequent call of `action` fail with the given API code
    pub fn fail_on(&self, action: &str, code: &str) {
        self.failures.lock().unwrap().insert(
            action.to_string(),
            (code.to_string(), format!("injected failure for {}", action)),
        );
    }

    /// Remove an injected failure
    pub fn clear_failure(&self, action: &str) {
        self.failures.lock().unwrap().remove(action);
    }

    /// Every call made so far, as `Action` or `Action:target`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change cloud state (everything but describe/list)
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("Describe") && !c.starts_with("List"))
            .collect()
    }

    /// Number of calls of a given action
    pub fn call_count(&self, action: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.as_str() == action || c.starts_with(&format!("{}:", action)))
            .count()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Snapshot of a stored load balancer
    pub fn load_balancer(&self, lb_id: &str) -> Option<LoadBalancerAttribute> {
        self.load_balancers.lock().unwrap().get(lb_id).cloned()
    }

    /// Ids of every stored load balancer
    pub fn load_balancer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.load_balancers.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the tags of a load balancer
    pub fn tags_of(&self, lb_id: &str) -> Vec<Tag> {
        self.tags.lock().unwrap().get(lb_id).cloned().unwrap_or_default()
    }

    /// Snapshot of the listeners of a load balancer
    pub fn listeners_of(&self, lb_id: &str) -> Vec<ListenerAttribute> {
        self.listeners.lock().unwrap().get(lb_id).cloned().unwrap_or_default()
    }

    /// Snapshot of the VServer groups of a load balancer
    pub fn vserver_groups_of(&self, lb_id: &str) -> Vec<VServerGroup> {
        let mut groups: Vec<VServerGroup> = self
            .vserver_groups
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.lb_id == lb_id)
            .map(|g| g.group.clone())
            .collect();
        groups.sort_by(|a, b| a.vserver_group_name.cmp(&b.vserver_group_name));
        groups
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    /// Log a call and return the injected failure, if any
    pub(crate) fn record(&self, action: &str, target: &str) -> Result<(), CloudError> {
        let entry = if target.is_empty() {
            action.to_string()
        } else {
            format!("{}:{}", action, target)
        };
        self.calls.lock().unwrap().push(entry);

        match self.failures.lock().unwrap().get(action) {
            Some((code, message)) => Err(CloudError::api(code.clone(), message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl CloudProvider for MockCloudProvider {
    fn region_id(&self) -> &str {
        &self.region_id
    }

    async fn describe_load_balancers(&self, query: &LoadBalancerQuery) -> Result<Vec<LoadBalancerSummary>, CloudError> {
        load_balancer::describe_load_balancers(self, query).await
    }

    async fn describe_load_balancer_attribute(&self, lb_id: &str) -> Result<LoadBalancerAttribute, CloudError> {
        load_balancer::describe_load_balancer_attribute(self, lb_id).await
    }

    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> Result<CreateLoadBalancerResponse, CloudError> {
        load_balancer::create_load_balancer(self, request).await
    }

    async fn delete_load_balancer(&self, lb_id: &str) -> Result<(), CloudError> {
        load_balancer::delete_load_balancer(self, lb_id).await
    }

    async fn set_load_balancer_name(&self, lb_id: &str, name: &str) -> Result<(), CloudError> {
        load_balancer::modify(self, "SetLoadBalancerName", lb_id, |lb| {
            lb.load_balancer_name = name.to_string();
        })
        .await
    }

    async fn modify_load_balancer_internet_spec(&self, lb_id: &str, charge_type: &str, bandwidth: Option<i32>) -> Result<(), CloudError> {
        load_balancer::modify(self, "ModifyLoadBalancerInternetSpec", lb_id, |lb| {
            lb.internet_charge_type = charge_type.to_string();
            if bandwidth.is_some() {
                lb.bandwidth = bandwidth;
            }
        })
        .await
    }

    async fn modify_load_balancer_instance_spec(&self, lb_id: &str, spec: &str) -> Result<(), CloudError> {
        load_balancer::modify(self, "ModifyLoadBalancerInstanceSpec", lb_id, |lb| {
            lb.load_balancer_spec = Some(spec.to_string());
        })
        .await
    }

    async fn modify_load_balancer_instance_charge_type(&self, lb_id: &str, charge_type: &str, spec: Option<&str>) -> Result<(), CloudError> {
        load_balancer::modify(self, "ModifyLoadBalancerInstanceChargeType", lb_id, |lb| {
            lb.instance_charge_type = Some(charge_type.to_string());
            if let Some(spec) = spec {
                lb.load_balancer_spec = Some(spec.to_string());
            }
        })
        .await
    }

    async fn set_load_balancer_delete_protection(&self, lb_id: &str, flag: &str) -> Result<(), CloudError> {
        load_balancer::modify(self, "SetLoadBalancerDeleteProtection", lb_id, |lb| {
            lb.delete_protection = flag.to_string();
        })
        .await
    }

    async fn set_load_balancer_modification_protection(&self, lb_id: &str, status: &str, reason: Option<&str>) -> Result<(), CloudError> {
        load_balancer::modify(self, "SetLoadBalancerModificationProtection", lb_id, |lb| {
            lb.modification_protection_status = status.to_string();
            lb.modification_protection_reason = reason.unwrap_or_default().to_string();
        })
        .await
    }

    async fn tag_resources(&self, lb_id: &str, tags: &[Tag]) -> Result<(), CloudError> {
        load_balancer::tag_resources(self, lb_id, tags).await
    }

    async fn untag_resources(&self, lb_id: &str, keys: &[String]) -> Result<(), CloudError> {
        load_balancer::untag_resources(self, lb_id, keys).await
    }

    async fn list_tag_resources(&self, lb_id: &str) -> Result<Vec<Tag>, CloudError> {
        load_balancer::list_tag_resources(self, lb_id).await
    }

    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>, CloudError> {
        listener::describe_listeners(self, lb_id).await
    }

    async fn create_tcp_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::create_listener(self, lb_id, port, "tcp", settings).await
    }

    async fn create_udp_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::create_listener(self, lb_id, port, "udp", settings).await
    }

    async fn create_http_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::create_listener(self, lb_id, port, "http", settings).await
    }

    async fn create_https_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::create_listener(self, lb_id, port, "https", settings).await
    }

    async fn set_tcp_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::set_listener_attribute(self, lb_id, port, "tcp", settings).await
    }

    async fn set_udp_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::set_listener_attribute(self, lb_id, port, "udp", settings).await
    }

    async fn set_http_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::set_listener_attribute(self, lb_id, port, "http", settings).await
    }

    async fn set_https_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        listener::set_listener_attribute(self, lb_id, port, "https", settings).await
    }

    async fn start_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
        listener::set_status(self, "StartLoadBalancerListener", lb_id, port, protocol, LISTENER_STATUS_RUNNING).await
    }

    async fn stop_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
        listener::set_status(self, "StopLoadBalancerListener", lb_id, port, protocol, LISTENER_STATUS_STOPPED).await
    }

    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
        listener::delete_listener(self, lb_id, port, protocol).await
    }

    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>, CloudError> {
        vserver_group::describe_vserver_groups(self, lb_id).await
    }

    async fn create_vserver_group(&self, lb_id: &str, name: &str, backends: &[BackendServer]) -> Result<String, CloudError> {
        vserver_group::create_vserver_group(self, lb_id, name, backends).await
    }

    async fn delete_vserver_group(&self, vgroup_id: &str) -> Result<(), CloudError> {
        vserver_group::delete_vserver_group(self, vgroup_id).await
    }

    async fn add_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        vserver_group::add_backend_servers(self, vgroup_id, backends).await
    }

    async fn remove_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        vserver_group::remove_backend_servers(self, vgroup_id, backends).await
    }

    async fn set_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        vserver_group::set_backend_servers(self, vgroup_id, backends).await
    }

    async fn describe_network_interfaces(&self, vpc_id: &str, private_ips: &[String]) -> Result<Vec<NetworkInterface>, CloudError> {
        load_balancer::describe_network_interfaces(self, vpc_id, private_ips).await
    }
}
