//! Executes a plan against the cloud.
//!
//! Order within a pass: load balancer, VServer groups (create, then backend
//! add/update/remove), listeners (delete, create, update), then deletion of
//! groups nothing references any more. The first failing call aborts the
//! pass; completed actions are kept and the next pass picks up from there.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::model::{BackendTarget, LoadBalancer, Listener, Protocol, naming};
use crate::reconciler::planner::{
    BackendPlan, ListenerPlan, LoadBalancerAction, LoadBalancerPlan, Plan, VGroupPlan, batches, plan_listeners,
    plan_vgroups,
};
use crate::reconciler::remote::RemoteModelBuilder;
use crate::reconciler::wait::{PollConfig, wait_listener_running, wait_load_balancer_active};
use slb_client::{BackendServer, CloudError, CloudProvider, ListenerSettings};
use std::collections::HashMap;
use tracing::{debug, info};

const FLAG_OFF: &str = "off";

fn servers(targets: &[BackendTarget]) -> Vec<BackendServer> {
    targets.iter().map(BackendTarget::to_backend_server).collect()
}

pub struct ModelApplier<'a> {
    cloud: &'a dyn CloudProvider,
    metrics: Option<&'a Metrics>,
    poll: PollConfig,
    vpc_id: Option<&'a str>,
}

impl<'a> ModelApplier<'a> {
    pub fn new(cloud: &'a dyn CloudProvider, poll: PollConfig) -> Self {
        Self {
            cloud,
            metrics: None,
            poll,
            vpc_id: None,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_vpc(mut self, vpc_id: Option<&'a str>) -> Self {
        self.vpc_id = vpc_id;
        self
    }

    fn mutated(&self, action: &str, target: &str) {
        debug!("{} {}", action, target);
        if let Some(metrics) = self.metrics {
            metrics.count_mutation(action);
        }
    }

    /// Converge `remote` to `local`, returning the resulting actual state
    pub async fn apply(&self, local: &LoadBalancer, remote: &LoadBalancer) -> Result<LoadBalancer, ControllerError> {
        if local.tear_down {
            return self.tear_down(local, remote).await;
        }

        let plan = Plan::build(local, remote, self.vpc_id)?;
        if plan.is_empty() {
            debug!("Load balancer of {} is up to date", local.service.key());
            return Ok(remote.clone());
        }

        let lb_id = self.apply_load_balancer(&plan.load_balancer, remote).await?;
        let vgroup_ids = self.apply_vgroups(&lb_id, &plan.vgroups, remote).await?;
        self.apply_listeners(&lb_id, &plan.listeners, &vgroup_ids).await?;
        self.delete_vgroups(&plan.vgroups).await?;

        let mut lookup = local.clone();
        lookup.attributes.load_balancer_id = Some(lb_id);
        RemoteModelBuilder::new(self.cloud).build(&lookup).await
    }

    async fn apply_load_balancer(&self, plan: &LoadBalancerPlan, remote: &LoadBalancer) -> Result<String, ControllerError> {
        match plan {
            LoadBalancerPlan::Create(request) => {
                let created = self
                    .cloud
                    .create_load_balancer(request)
                    .await
                    .map_err(|e| ControllerError::cloud(format!("create load balancer {}", request.load_balancer_name), e))?;
                self.mutated("CreateLoadBalancer", &created.load_balancer_id);
                info!(
                    "Created load balancer {} ({}) at {}",
                    created.load_balancer_id, request.load_balancer_name, created.address
                );
                wait_load_balancer_active(self.cloud, &created.load_balancer_id, self.poll).await?;
                Ok(created.load_balancer_id)
            }
            LoadBalancerPlan::Update(actions) => {
                let lb_id = remote
                    .id()
                    .ok_or_else(|| ControllerError::Validation("cannot update a load balancer without id".to_string()))?;
                for action in actions {
                    self.update_attribute(lb_id, action).await?;
                }
                Ok(lb_id.to_string())
            }
        }
    }

    async fn update_attribute(&self, lb_id: &str, action: &LoadBalancerAction) -> Result<(), ControllerError> {
        let result = match action {
            LoadBalancerAction::SetName(name) => self.cloud.set_load_balancer_name(lb_id, name).await,
            LoadBalancerAction::ModifyInternetSpec { charge_type, bandwidth } => {
                self.cloud
                    .modify_load_balancer_internet_spec(lb_id, charge_type, *bandwidth)
                    .await
            }
            LoadBalancerAction::ModifyInstanceChargeType { charge_type, spec } => {
                self.cloud
                    .modify_load_balancer_instance_charge_type(lb_id, charge_type, spec.as_deref())
                    .await
            }
            LoadBalancerAction::ModifyInstanceSpec(spec) => self.cloud.modify_load_balancer_instance_spec(lb_id, spec).await,
            LoadBalancerAction::SetDeleteProtection(flag) => self.cloud.set_load_balancer_delete_protection(lb_id, flag).await,
            LoadBalancerAction::SetModificationProtection { status, reason } => {
                self.cloud
                    .set_load_balancer_modification_protection(lb_id, status, reason.as_deref())
                    .await
            }
            LoadBalancerAction::AddTags(tags) => self.cloud.tag_resources(lb_id, tags).await,
        };
        result.map_err(|e| ControllerError::cloud(format!("{} on {}", action.name(), lb_id), e))?;
        self.mutated(action.name(), lb_id);
        info!("{} on {}", action.name(), lb_id);
        Ok(())
    }

    /// Returns VServer group ids by name, including the ones just created
    async fn apply_vgroups(
        &self,
        lb_id: &str,
        plan: &VGroupPlan,
        remote: &LoadBalancer,
    ) -> Result<HashMap<String, String>, ControllerError> {
        let mut ids: HashMap<String, String> = remote
            .vgroups
            .iter()
            .filter_map(|g| g.vgroup_id.clone().map(|id| (g.name.clone(), id)))
            .collect();

        for group in &plan.creates {
            let vgroup_id = self
                .cloud
                .create_vserver_group(lb_id, &group.name, &[])
                .await
                .map_err(|e| ControllerError::cloud(format!("create VServer group {} on {}", group.name, lb_id), e))?;
            self.mutated("CreateVServerGroup", &vgroup_id);
            info!("Created VServer group {} ({}) on {}", vgroup_id, group.name, lb_id);

            let backends = BackendPlan {
                adds: group.backends.clone(),
                ..Default::default()
            };
            self.apply_backends(&vgroup_id, &backends).await?;
            ids.insert(group.name.clone(), vgroup_id);
        }

        for (group, backends) in &plan.updates {
            let Some(vgroup_id) = group.vgroup_id.as_deref() else {
                continue;
            };
            self.apply_backends(vgroup_id, backends).await?;
        }
        Ok(ids)
    }

    async fn apply_backends(&self, vgroup_id: &str, plan: &BackendPlan) -> Result<(), ControllerError> {
        for batch in batches(&plan.adds) {
            self.cloud
                .add_vserver_group_backend_servers(vgroup_id, &servers(batch))
                .await
                .map_err(|e| ControllerError::cloud(format!("add {} backends to {}", batch.len(), vgroup_id), e))?;
            self.mutated("AddVServerGroupBackendServers", vgroup_id);
        }
        for batch in batches(&plan.updates) {
            self.cloud
                .set_vserver_group_backend_servers(vgroup_id, &servers(batch))
                .await
                .map_err(|e| ControllerError::cloud(format!("update {} backends of {}", batch.len(), vgroup_id), e))?;
            self.mutated("SetVServerGroupAttribute", vgroup_id);
        }
        for batch in batches(&plan.removes) {
            self.cloud
                .remove_vserver_group_backend_servers(vgroup_id, &servers(batch))
                .await
                .map_err(|e| ControllerError::cloud(format!("remove {} backends from {}", batch.len(), vgroup_id), e))?;
            self.mutated("RemoveVServerGroupBackendServers", vgroup_id);
        }
        if !plan.is_empty() {
            info!(
                "VServer group {}: {} added, {} updated, {} removed",
                vgroup_id,
                plan.adds.len(),
                plan.updates.len(),
                plan.removes.len()
            );
        }
        Ok(())
    }

    fn resolve_vgroup(&self, listener: &Listener, ids: &HashMap<String, String>) -> Result<Option<String>, ControllerError> {
        if let Some(id) = &listener.vgroup_id {
            return Ok(Some(id.clone()));
        }
        match &listener.vgroup_name {
            None => Ok(None),
            Some(name) => ids.get(name).cloned().map(Some).ok_or_else(|| {
                ControllerError::Validation(format!("VServer group {} of listener {} is missing", name, listener.identity()))
            }),
        }
    }

    async fn apply_listeners(
        &self,
        lb_id: &str,
        plan: &ListenerPlan,
        vgroup_ids: &HashMap<String, String>,
    ) -> Result<(), ControllerError> {
        for listener in &plan.deletes {
            self.delete_listener(lb_id, listener).await?;
        }

        for listener in &plan.creates {
            let mut settings = listener.settings();
            settings.vserver_group_id = self.resolve_vgroup(listener, vgroup_ids)?;
            self.create_listener(lb_id, listener, &settings)
                .await
                .map_err(|e| ControllerError::cloud(format!("create listener {} on {}", listener.identity(), lb_id), e))?;
            self.mutated("CreateListener", &listener.identity());
            info!("Created listener {} on {}", listener.identity(), lb_id);
            self.start_listener(lb_id, listener).await?;
        }

        for update in &plan.updates {
            let listener = &update.listener;
            if update.restart {
                self.start_listener(lb_id, listener).await?;
            }
            if update.needs_attribute_change() {
                let mut changes = update.changes.clone();
                if update.vgroup_changed {
                    changes.vserver_group_id = self.resolve_vgroup(listener, vgroup_ids)?;
                }
                self.set_listener_attribute(lb_id, listener, &changes)
                    .await
                    .map_err(|e| ControllerError::cloud(format!("update listener {} on {}", listener.identity(), lb_id), e))?;
                self.mutated("SetListenerAttribute", &listener.identity());
                info!("Updated listener {} on {}", listener.identity(), lb_id);
            }
        }
        Ok(())
    }

    async fn start_listener(&self, lb_id: &str, listener: &Listener) -> Result<(), ControllerError> {
        let protocol = listener.protocol().as_str();
        self.cloud
            .start_listener(lb_id, listener.port, protocol)
            .await
            .map_err(|e| ControllerError::cloud(format!("start listener {} on {}", listener.identity(), lb_id), e))?;
        self.mutated("StartListener", &listener.identity());
        wait_listener_running(self.cloud, lb_id, listener.port, protocol, self.poll).await
    }

    async fn delete_listener(&self, lb_id: &str, listener: &Listener) -> Result<(), ControllerError> {
        self.cloud
            .delete_listener(lb_id, listener.port, listener.protocol().as_str())
            .await
            .map_err(|e| ControllerError::cloud(format!("delete listener {} on {}", listener.identity(), lb_id), e))?;
        self.mutated("DeleteListener", &listener.identity());
        info!("Deleted listener {} on {}", listener.identity(), lb_id);
        Ok(())
    }

    async fn create_listener(&self, lb_id: &str, listener: &Listener, settings: &ListenerSettings) -> Result<(), CloudError> {
        match listener.protocol() {
            Protocol::Tcp => self.cloud.create_tcp_listener(lb_id, listener.port, settings).await,
            Protocol::Udp => self.cloud.create_udp_listener(lb_id, listener.port, settings).await,
            Protocol::Http => self.cloud.create_http_listener(lb_id, listener.port, settings).await,
            Protocol::Https => self.cloud.create_https_listener(lb_id, listener.port, settings).await,
        }
    }

    async fn set_listener_attribute(
        &self,
        lb_id: &str,
        listener: &Listener,
        settings: &ListenerSettings,
    ) -> Result<(), CloudError> {
        match listener.protocol() {
            Protocol::Tcp => self.cloud.set_tcp_listener_attribute(lb_id, listener.port, settings).await,
            Protocol::Udp => self.cloud.set_udp_listener_attribute(lb_id, listener.port, settings).await,
            Protocol::Http => self.cloud.set_http_listener_attribute(lb_id, listener.port, settings).await,
            Protocol::Https => self.cloud.set_https_listener_attribute(lb_id, listener.port, settings).await,
        }
    }

    async fn delete_vgroups(&self, plan: &VGroupPlan) -> Result<(), ControllerError> {
        for group in &plan.deletes {
            let Some(vgroup_id) = group.vgroup_id.as_deref() else {
                continue;
            };
            self.cloud
                .delete_vserver_group(vgroup_id)
                .await
                .map_err(|e| ControllerError::cloud(format!("delete VServer group {}", vgroup_id), e))?;
            self.mutated("DeleteVServerGroup", vgroup_id);
            info!("Deleted VServer group {} ({})", vgroup_id, group.name);
        }
        Ok(())
    }

    /// Remove what the Service owns. A load balancer the controller created is
    /// deleted as a whole unless it is preserved.
    async fn tear_down(&self, local: &LoadBalancer, remote: &LoadBalancer) -> Result<LoadBalancer, ControllerError> {
        let mut gone = LoadBalancer::new(local.service.clone());
        gone.tear_down = true;

        let Some(lb_id) = remote.id() else {
            return Ok(gone);
        };
        let attributes = &remote.attributes;

        if !attributes.is_user_managed && !attributes.preserve_on_delete {
            if attributes.delete_protection.as_deref() != Some(FLAG_OFF) {
                self.update_attribute(lb_id, &LoadBalancerAction::SetDeleteProtection(FLAG_OFF.to_string()))
                    .await?;
            }
            self.cloud
                .delete_load_balancer(lb_id)
                .await
                .map_err(|e| ControllerError::cloud(format!("delete load balancer {}", lb_id), e))?;
            self.mutated("DeleteLoadBalancer", lb_id);
            info!("Deleted load balancer {} of {}", lb_id, local.service.key());
            return Ok(gone);
        }

        // Shared or preserved: only this Service's listeners, groups and backends go
        let listeners = plan_listeners(local, remote)?;
        let vgroups = plan_vgroups(local, remote)?;
        for listener in &listeners.deletes {
            self.delete_listener(lb_id, listener).await?;
        }
        for (group, backends) in &vgroups.updates {
            if let Some(vgroup_id) = group.vgroup_id.as_deref() {
                self.apply_backends(vgroup_id, backends).await?;
            }
        }
        self.delete_vgroups(&vgroups).await?;

        if attributes.tags.get(naming::TAG_REUSED_BY) == Some(&local.service.reuse_tag_value()) {
            let keys = [naming::TAG_REUSED_BY.to_string()];
            self.cloud
                .untag_resources(lb_id, &keys)
                .await
                .map_err(|e| ControllerError::cloud(format!("untag {}", lb_id), e))?;
            self.mutated("UntagResources", lb_id);
        }
        info!("Released load balancer {} from {}", lb_id, local.service.key());
        Ok(gone)
    }
}
