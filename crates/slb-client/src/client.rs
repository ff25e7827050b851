//! SLB API client
//!
//! Implements [`CloudProvider`] over the JSON action gateway described in
//! [`crate::common`].

use crate::common::HttpClient;
use crate::common::query::describe_all;
use crate::error::CloudError;
use crate::models::*;
use crate::provider_trait::CloudProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// SLB API client
#[derive(Debug, Clone)]
pub struct SlbClient {
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagResource {
    tag_key: String,
    tag_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagResourcesResponse {
    #[serde(default)]
    tag_resources: Vec<TagResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListenersResponse {
    #[serde(default)]
    listeners: Vec<ListenerAttribute>,
}

#[derive(Debug, Deserialize)]
struct VServerGroupSummary {
    #[serde(rename = "VServerGroupId")]
    vserver_group_id: String,
}

#[derive(Debug, Deserialize)]
struct VServerGroupsResponse {
    #[serde(rename = "VServerGroups", default)]
    vserver_groups: Vec<VServerGroupSummary>,
}

#[derive(Debug, Deserialize)]
struct CreateVServerGroupResponse {
    #[serde(rename = "VServerGroupId")]
    vserver_group_id: String,
}

impl SlbClient {
    /// Create a new SLB client with the default timeout
    ///
    /// # Arguments
    /// * `base_url` - Gateway base URL (e.g., "http://slb-gateway:8080")
    /// * `token` - Bearer token for authentication
    /// * `region_id` - Region every call is scoped to
    pub fn new(base_url: String, token: String, region_id: String) -> Result<Self, CloudError> {
        Self::with_timeout(base_url, token, region_id, DEFAULT_TIMEOUT)
    }

    /// Create a new SLB client with an explicit request timeout
    pub fn with_timeout(
        base_url: String,
        token: String,
        region_id: String,
        timeout: Duration,
    ) -> Result<Self, CloudError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token, region_id),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Serialize listener settings and add the listener key
    fn listener_params(lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<Value, CloudError> {
        let mut params = match serde_json::to_value(settings)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.insert("LoadBalancerId".to_string(), json!(lb_id));
        params.insert("ListenerPort".to_string(), json!(port));
        Ok(Value::Object(params))
    }

    async fn listener_call(&self, action: &str, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        debug!("{} on {}:{}", action, lb_id, port);
        let params = Self::listener_params(lb_id, port, settings)?;
        self.http.call_unit(action, &params).await
    }

    async fn backend_call(&self, action: &str, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        if backends.len() > API_MAX_BACKENDS_PER_CALL {
            return Err(CloudError::InvalidRequest(format!(
                "{} accepts at most {} backend servers, got {}",
                action,
                API_MAX_BACKENDS_PER_CALL,
                backends.len()
            )));
        }
        debug!("{} on {} with {} backends", action, vgroup_id, backends.len());
        self.http
            .call_unit(
                action,
                &json!({ "VServerGroupId": vgroup_id, "BackendServers": backends }),
            )
            .await
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, CloudError> {
    Ok(serde_json::to_value(value)?)
}

#[async_trait::async_trait]
impl CloudProvider for SlbClient {
    fn region_id(&self) -> &str {
        self.http.region_id()
    }

    async fn describe_load_balancers(&self, query: &LoadBalancerQuery) -> Result<Vec<LoadBalancerSummary>, CloudError> {
        debug!("Describing load balancers: {:?}", query);
        describe_all(&self.http, "DescribeLoadBalancers", to_value(query)?).await
    }

    async fn describe_load_balancer_attribute(&self, lb_id: &str) -> Result<LoadBalancerAttribute, CloudError> {
        self.http
            .call("DescribeLoadBalancerAttribute", &json!({ "LoadBalancerId": lb_id }))
            .await
    }

    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> Result<CreateLoadBalancerResponse, CloudError> {
        debug!("Creating load balancer {}", request.load_balancer_name);
        self.http.call("CreateLoadBalancer", &to_value(request)?).await
    }

    async fn delete_load_balancer(&self, lb_id: &str) -> Result<(), CloudError> {
        self.http
            .call_unit("DeleteLoadBalancer", &json!({ "LoadBalancerId": lb_id }))
            .await
    }

    async fn set_load_balancer_name(&self, lb_id: &str, name: &str) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "SetLoadBalancerName",
                &json!({ "LoadBalancerId": lb_id, "LoadBalancerName": name }),
            )
            .await
    }

    async fn modify_load_balancer_internet_spec(&self, lb_id: &str, charge_type: &str, bandwidth: Option<i32>) -> Result<(), CloudError> {
        let mut params = json!({ "LoadBalancerId": lb_id, "InternetChargeType": charge_type });
        if let (Some(bandwidth), Some(map)) = (bandwidth, params.as_object_mut()) {
            map.insert("Bandwidth".to_string(), json!(bandwidth));
        }
        self.http.call_unit("ModifyLoadBalancerInternetSpec", &params).await
    }

    async fn modify_load_balancer_instance_spec(&self, lb_id: &str, spec: &str) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "ModifyLoadBalancerInstanceSpec",
                &json!({ "LoadBalancerId": lb_id, "LoadBalancerSpec": spec }),
            )
            .await
    }

    async fn modify_load_balancer_instance_charge_type(&self, lb_id: &str, charge_type: &str, spec: Option<&str>) -> Result<(), CloudError> {
        let mut params = json!({ "LoadBalancerId": lb_id, "InstanceChargeType": charge_type });
        if let (Some(spec), Some(map)) = (spec, params.as_object_mut()) {
            map.insert("LoadBalancerSpec".to_string(), json!(spec));
        }
        self.http.call_unit("ModifyLoadBalancerInstanceChargeType", &params).await
    }

    async fn set_load_balancer_delete_protection(&self, lb_id: &str, flag: &str) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "SetLoadBalancerDeleteProtection",
                &json!({ "LoadBalancerId": lb_id, "DeleteProtection": flag }),
            )
            .await
    }

    async fn set_load_balancer_modification_protection(&self, lb_id: &str, status: &str, reason: Option<&str>) -> Result<(), CloudError> {
        let mut params = json!({ "LoadBalancerId": lb_id, "ModificationProtectionStatus": status });
        if let (Some(reason), Some(map)) = (reason, params.as_object_mut()) {
            map.insert("ModificationProtectionReason".to_string(), json!(reason));
        }
        self.http.call_unit("SetLoadBalancerModificationProtection", &params).await
    }

    async fn tag_resources(&self, lb_id: &str, tags: &[Tag]) -> Result<(), CloudError> {
        debug!("Tagging {} with {} tags", lb_id, tags.len());
        self.http
            .call_unit(
                "TagResources",
                &json!({ "ResourceType": "instance", "ResourceId": [lb_id], "Tag": tags }),
            )
            .await
    }

    async fn untag_resources(&self, lb_id: &str, keys: &[String]) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "UntagResources",
                &json!({ "ResourceType": "instance", "ResourceId": [lb_id], "TagKey": keys }),
            )
            .await
    }

    async fn list_tag_resources(&self, lb_id: &str) -> Result<Vec<Tag>, CloudError> {
        let response: TagResourcesResponse = self.http
            .call(
                "ListTagResources",
                &json!({ "ResourceType": "instance", "ResourceId": [lb_id] }),
            )
            .await?;
        Ok(response
            .tag_resources
            .into_iter()
            .map(|t| Tag::new(t.tag_key, t.tag_value))
            .collect())
    }

    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>, CloudError> {
        let response: ListenersResponse = self.http
            .call("DescribeLoadBalancerListeners", &json!({ "LoadBalancerId": [lb_id] }))
            .await?;
        Ok(response.listeners)
    }

    async fn create_tcp_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("CreateLoadBalancerTCPListener", lb_id, port, settings).await
    }

    async fn create_udp_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("CreateLoadBalancerUDPListener", lb_id, port, settings).await
    }

    async fn create_http_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("CreateLoadBalancerHTTPListener", lb_id, port, settings).await
    }

    async fn create_https_listener(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("CreateLoadBalancerHTTPSListener", lb_id, port, settings).await
    }

    async fn set_tcp_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("SetLoadBalancerTCPListenerAttribute", lb_id, port, settings).await
    }

    async fn set_udp_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("SetLoadBalancerUDPListenerAttribute", lb_id, port, settings).await
    }

    async fn set_http_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("SetLoadBalancerHTTPListenerAttribute", lb_id, port, settings).await
    }

    async fn set_https_listener_attribute(&self, lb_id: &str, port: i32, settings: &ListenerSettings) -> Result<(), CloudError> {
        self.listener_call("SetLoadBalancerHTTPSListenerAttribute", lb_id, port, settings).await
    }

    async fn start_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "StartLoadBalancerListener",
                &json!({ "LoadBalancerId": lb_id, "ListenerPort": port, "ListenerProtocol": protocol }),
            )
            .await
    }

    async fn stop_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "StopLoadBalancerListener",
                &json!({ "LoadBalancerId": lb_id, "ListenerPort": port, "ListenerProtocol": protocol }),
            )
            .await
    }

    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
        self.http
            .call_unit(
                "DeleteLoadBalancerListener",
                &json!({ "LoadBalancerId": lb_id, "ListenerPort": port, "ListenerProtocol": protocol }),
            )
            .await
    }

    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>, CloudError> {
        let response: VServerGroupsResponse = self.http
            .call("DescribeVServerGroups", &json!({ "LoadBalancerId": lb_id }))
            .await?;

        let mut groups = Vec::with_capacity(response.vserver_groups.len());
        for summary in response.vserver_groups {
            let group: VServerGroup = self.http
                .call(
                    "DescribeVServerGroupAttribute",
                    &json!({ "VServerGroupId": summary.vserver_group_id }),
                )
                .await?;
            groups.push(group);
        }
        Ok(groups)
    }

    async fn create_vserver_group(&self, lb_id: &str, name: &str, backends: &[BackendServer]) -> Result<String, CloudError> {
        debug!("Creating VServer group {} on {}", name, lb_id);
        let response: CreateVServerGroupResponse = self.http
            .call(
                "CreateVServerGroup",
                &json!({ "LoadBalancerId": lb_id, "VServerGroupName": name, "BackendServers": backends }),
            )
            .await?;
        Ok(response.vserver_group_id)
    }

    async fn delete_vserver_group(&self, vgroup_id: &str) -> Result<(), CloudError> {
        self.http
            .call_unit("DeleteVServerGroup", &json!({ "VServerGroupId": vgroup_id }))
            .await
    }

    async fn add_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        self.backend_call("AddVServerGroupBackendServers", vgroup_id, backends).await
    }

    async fn remove_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        self.backend_call("RemoveVServerGroupBackendServers", vgroup_id, backends).await
    }

    async fn set_vserver_group_backend_servers(&self, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
        self.backend_call("SetVServerGroupAttribute", vgroup_id, backends).await
    }

    async fn describe_network_interfaces(&self, vpc_id: &str, private_ips: &[String]) -> Result<Vec<NetworkInterface>, CloudError> {
        if private_ips.is_empty() {
            return Ok(Vec::new());
        }
        describe_all(
            &self.http,
            "DescribeNetworkInterfaces",
            json!({ "VpcId": vpc_id, "PrivateIpAddress": private_ips }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_params_carry_key_and_settings() {
        let settings = ListenerSettings {
            vserver_group_id: Some("rsp-1".to_string()),
            bandwidth: Some(-1),
            ..Default::default()
        };
        let params = SlbClient::listener_params("lb-1", 443, &settings).expect("params");
        assert_eq!(params["LoadBalancerId"], "lb-1");
        assert_eq!(params["ListenerPort"], 443);
        assert_eq!(params["VServerGroupId"], "rsp-1");
        assert!(params.get("Scheduler").is_none());
    }

    #[tokio::test]
    async fn test_oversized_backend_batch_is_rejected_locally() {
        let client = SlbClient::new(
            "http://127.0.0.1:1".to_string(),
            "token".to_string(),
            "cn-hangzhou".to_string(),
        )
        .expect("client");
        let backends: Vec<BackendServer> = (0..41)
            .map(|i| BackendServer {
                server_id: format!("i-{}", i),
                server_ip: None,
                port: 30080,
                weight: 100,
                server_type: BACKEND_TYPE_ECS.to_string(),
                description: String::new(),
            })
            .collect();
        let err = client
            .add_vserver_group_backend_servers("rsp-1", &backends)
            .await
            .expect_err("batch too large");
        assert!(matches!(err, CloudError::InvalidRequest(_)));
    }
}
