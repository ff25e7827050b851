//! Actual state from the cloud.
//!
//! The load balancer is located by explicit id, then by the creation tag,
//! then by the default name. More than one match is never resolved silently.

use crate::error::ControllerError;
use crate::model::{
    BackendGroup, BackendTarget, LoadBalancer, LoadBalancerAttributes, Listener, ListenerConfig, NamedKey,
    Protocol, naming,
};
use slb_client::{CloudError, CloudProvider, LoadBalancerAttribute, LoadBalancerQuery, Tag};
use tracing::{debug, warn};

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub struct RemoteModelBuilder<'a> {
    cloud: &'a dyn CloudProvider,
}

impl<'a> RemoteModelBuilder<'a> {
    pub fn new(cloud: &'a dyn CloudProvider) -> Self {
        Self { cloud }
    }

    /// Snapshot of the load balancer `local` describes. Not found yields a
    /// model without id.
    pub async fn build(&self, local: &LoadBalancer) -> Result<LoadBalancer, ControllerError> {
        let mut remote = LoadBalancer::new(local.service.clone());
        remote.tear_down = local.tear_down;

        let Some(lb_id) = self.locate(local).await? else {
            debug!("No load balancer found for {}", local.service.key());
            return Ok(remote);
        };

        let attribute = match self.cloud.describe_load_balancer_attribute(&lb_id).await {
            Ok(attribute) => attribute,
            Err(CloudError::NotFound(_)) if local.tear_down => return Ok(remote),
            Err(CloudError::NotFound(_)) if local.attributes.is_user_managed => {
                return Err(ControllerError::Validation(format!(
                    "load balancer {} referenced by {} does not exist",
                    lb_id,
                    local.service.key()
                )));
            }
            Err(e) => return Err(ControllerError::cloud(format!("describe load balancer {}", lb_id), e)),
        };
        remote.attributes = attributes_from_cloud(&attribute);
        remote.attributes.is_user_managed = local.attributes.is_user_managed;
        remote.attributes.force_override_listeners = local.attributes.force_override_listeners;
        remote.attributes.preserve_on_delete = local.attributes.preserve_on_delete;

        let tags = self
            .cloud
            .list_tag_resources(&lb_id)
            .await
            .map_err(|e| ControllerError::cloud(format!("list tags of {}", lb_id), e))?;
        remote.attributes.tags = tags.into_iter().map(|t| (t.tag_key, t.tag_value)).collect();

        let groups = self
            .cloud
            .describe_vserver_groups(&lb_id)
            .await
            .map_err(|e| ControllerError::cloud(format!("describe VServer groups of {}", lb_id), e))?;
        remote.vgroups = groups
            .iter()
            .map(|group| {
                let named_key = NamedKey::parse(&group.vserver_group_name);
                let is_user_managed = local
                    .vgroups
                    .iter()
                    .any(|g| g.is_user_managed && g.vgroup_id.as_deref() == Some(group.vserver_group_id.as_str()));
                BackendGroup {
                    service_port: named_key.as_ref().map_or(0, |k| k.port),
                    named_key,
                    name: group.vserver_group_name.clone(),
                    vgroup_id: Some(group.vserver_group_id.clone()),
                    is_user_managed,
                    backends: group.backend_servers.iter().map(BackendTarget::from_backend_server).collect(),
                }
            })
            .collect();

        let listeners = self
            .cloud
            .describe_listeners(&lb_id)
            .await
            .map_err(|e| ControllerError::cloud(format!("describe listeners of {}", lb_id), e))?;
        for listener in listeners {
            let Some(protocol) = Protocol::parse(&listener.listener_protocol) else {
                warn!(
                    "Ignoring listener {}/{} on {}: unknown protocol",
                    listener.listener_protocol, listener.listener_port, lb_id
                );
                continue;
            };
            let vgroup_name = listener.settings.vserver_group_id.as_deref().and_then(|id| {
                remote
                    .vgroups
                    .iter()
                    .find(|g| g.vgroup_id.as_deref() == Some(id))
                    .map(|g| g.name.clone())
            });
            remote.listeners.push(Listener {
                port: listener.listener_port,
                description: listener.settings.description.clone().unwrap_or_default(),
                vgroup_name,
                vgroup_id: listener.settings.vserver_group_id.clone(),
                status: Some(listener.status.clone()),
                config: ListenerConfig::from_remote(protocol, &listener.settings),
            });
        }

        debug!(
            "Remote model for {}: {} with {} listeners, {} VServer groups",
            local.service.key(),
            lb_id,
            remote.listeners.len(),
            remote.vgroups.len()
        );
        Ok(remote)
    }

    async fn locate(&self, local: &LoadBalancer) -> Result<Option<String>, ControllerError> {
        if let Some(id) = &local.attributes.load_balancer_id {
            return Ok(Some(id.clone()));
        }

        let default_name = local.service.default_load_balancer_name();
        let by_tag = LoadBalancerQuery {
            tags: vec![Tag::new(naming::TAG_CREATED_BY_CONTROLLER, &default_name)],
            ..Default::default()
        };
        if let Some(id) = self.find_unique(&by_tag, "tag").await? {
            return Ok(Some(id));
        }

        let by_name = LoadBalancerQuery {
            load_balancer_name: Some(default_name),
            ..Default::default()
        };
        self.find_unique(&by_name, "name").await
    }

    async fn find_unique(&self, query: &LoadBalancerQuery, by: &str) -> Result<Option<String>, ControllerError> {
        let found = self
            .cloud
            .describe_load_balancers(query)
            .await
            .map_err(|e| ControllerError::cloud(format!("find load balancer by {}", by), e))?;
        match found.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.load_balancer_id.clone())),
            many => Err(ControllerError::Ambiguous(format!(
                "{} load balancers match by {}: {}",
                many.len(),
                by,
                many.iter()
                    .map(|lb| lb.load_balancer_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

fn attributes_from_cloud(attribute: &LoadBalancerAttribute) -> LoadBalancerAttributes {
    LoadBalancerAttributes {
        load_balancer_id: Some(attribute.load_balancer_id.clone()),
        name: non_empty(&attribute.load_balancer_name),
        address: non_empty(&attribute.address),
        status: non_empty(&attribute.load_balancer_status),
        address_type: non_empty(&attribute.address_type),
        ip_version: non_empty(&attribute.address_ip_version),
        internet_charge_type: non_empty(&attribute.internet_charge_type),
        bandwidth: attribute.bandwidth,
        instance_charge_type: attribute.instance_charge_type.clone(),
        spec: attribute.load_balancer_spec.clone(),
        resource_group_id: non_empty(&attribute.resource_group_id),
        master_zone_id: non_empty(&attribute.master_zone_id),
        slave_zone_id: non_empty(&attribute.slave_zone_id),
        vswitch_id: non_empty(&attribute.vswitch_id),
        delete_protection: non_empty(&attribute.delete_protection),
        modification_protection: non_empty(&attribute.modification_protection_status),
        modification_protection_reason: non_empty(&attribute.modification_protection_reason),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendKind;
    use crate::test_utils::*;
    use slb_client::{BackendServer, ListenerAttribute, ListenerSettings, MockCloudProvider, VServerGroup};

    fn local() -> LoadBalancer {
        LoadBalancer::new(identity())
    }

    #[tokio::test]
    async fn test_not_found_is_empty_model() {
        let mock = MockCloudProvider::default();
        let remote = RemoteModelBuilder::new(&mock).build(&local()).await.unwrap();
        assert!(!remote.exists());
        // tag lookup, then name lookup
        assert_eq!(mock.call_count("DescribeLoadBalancers"), 2);
    }

    #[tokio::test]
    async fn test_found_by_creation_tag() {
        let mock = MockCloudProvider::default();
        let name = identity().default_load_balancer_name();
        mock.add_load_balancer(
            cloud_load_balancer("lb-1", "renamed-by-user"),
            vec![Tag::new(naming::TAG_CREATED_BY_CONTROLLER, &name)],
        );
        mock.add_vserver_group(
            "lb-1",
            VServerGroup {
                vserver_group_id: "rsp-1".to_string(),
                vserver_group_name: "k8s/80/web/default/c1".to_string(),
                backend_servers: vec![BackendServer {
                    server_id: "i-1".to_string(),
                    server_ip: None,
                    port: 30080,
                    weight: 100,
                    server_type: "ecs".to_string(),
                    description: "k8s/80/web/default/c1".to_string(),
                }],
            },
        );
        mock.add_listener(
            "lb-1",
            ListenerAttribute {
                listener_port: 80,
                listener_protocol: "tcp".to_string(),
                status: "running".to_string(),
                settings: ListenerSettings {
                    description: Some("k8s/80/web/default/c1".to_string()),
                    vserver_group_id: Some("rsp-1".to_string()),
                    scheduler: Some("wrr".to_string()),
                    ..Default::default()
                },
            },
        );

        let remote = RemoteModelBuilder::new(&mock).build(&local()).await.unwrap();
        assert_eq!(remote.id(), Some("lb-1"));
        assert_eq!(remote.attributes.address.as_deref(), Some("47.100.0.1"));
        assert_eq!(remote.attributes.tags.get(naming::TAG_CREATED_BY_CONTROLLER), Some(&name));
        assert_eq!(remote.vgroups.len(), 1);
        assert_eq!(remote.vgroups[0].service_port, 80);
        assert_eq!(remote.vgroups[0].backends[0].kind, BackendKind::Ecs);
        assert_eq!(remote.listeners.len(), 1);
        assert_eq!(remote.listeners[0].vgroup_name.as_deref(), Some("k8s/80/web/default/c1"));
        assert_eq!(remote.listeners[0].protocol(), Protocol::Tcp);
        assert_eq!(remote.listeners[0].config.common().scheduler.as_deref(), Some("wrr"));
    }

    #[tokio::test]
    async fn test_found_by_default_name() {
        let mock = MockCloudProvider::default();
        mock.add_load_balancer(cloud_load_balancer("lb-2", &identity().default_load_balancer_name()), vec![]);
        let remote = RemoteModelBuilder::new(&mock).build(&local()).await.unwrap();
        assert_eq!(remote.id(), Some("lb-2"));
    }

    #[tokio::test]
    async fn test_ambiguous_name_is_an_error() {
        let mock = MockCloudProvider::default();
        let name = identity().default_load_balancer_name();
        mock.add_load_balancer(cloud_load_balancer("lb-1", &name), vec![]);
        mock.add_load_balancer(cloud_load_balancer("lb-2", &name), vec![]);

        let err = RemoteModelBuilder::new(&mock).build(&local()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Ambiguous(_)));
    }

    #[tokio::test]
    async fn test_missing_explicit_id() {
        let mock = MockCloudProvider::default();
        let mut local = local();
        local.attributes.load_balancer_id = Some("lb-gone".to_string());
        local.attributes.is_user_managed = true;

        let err = RemoteModelBuilder::new(&mock).build(&local).await.unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));

        local.tear_down = true;
        let remote = RemoteModelBuilder::new(&mock).build(&local).await.unwrap();
        assert!(!remote.exists());
    }
}
