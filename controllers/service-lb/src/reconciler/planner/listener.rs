//! Listener planning.
//!
//! Listeners are matched by port within a transport (TCP, HTTP and HTTPS
//! share one port space). Listeners described with another owner's named key
//! are left alone unless the Service reuses the load balancer with
//! `force-override-listeners`.

use crate::error::ControllerError;
use crate::model::{LoadBalancer, Listener, ServiceIdentity, naming};
use slb_client::{LISTENER_STATUS_STOPPED, ListenerSettings};

/// Changes to an existing listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerUpdate {
    /// Desired listener
    pub listener: Listener,
    /// Settings that differ from the remote ones
    pub changes: ListenerSettings,
    /// The listener must point at another VServer group
    pub vgroup_changed: bool,
    /// The listener is stopped and must be started
    pub restart: bool,
}

impl ListenerUpdate {
    pub fn needs_attribute_change(&self) -> bool {
        !self.changes.is_empty() || self.vgroup_changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerPlan {
    pub deletes: Vec<Listener>,
    pub creates: Vec<Listener>,
    pub updates: Vec<ListenerUpdate>,
}

impl ListenerPlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.creates.is_empty() && self.updates.is_empty()
    }
}

fn same_port(a: &Listener, b: &Listener) -> bool {
    a.port == b.port && a.protocol().transport() == b.protocol().transport()
}

fn owned(listener: &Listener, service: &ServiceIdentity) -> bool {
    naming::is_owned_by(&listener.description, service)
}

pub fn plan_listeners(local: &LoadBalancer, remote: &LoadBalancer) -> Result<ListenerPlan, ControllerError> {
    let service = &local.service;
    let may_override = local.attributes.is_user_managed && local.attributes.force_override_listeners;
    let mut plan = ListenerPlan::default();

    for current in &remote.listeners {
        let Some(wanted) = local.listeners.iter().find(|l| same_port(l, current)) else {
            if owned(current, service) || may_override {
                plan.deletes.push(current.clone());
            }
            continue;
        };

        if !owned(current, service) && !may_override {
            return Err(ControllerError::Conflict(format!(
                "port {} of load balancer {} is used by listener \"{}\" not managed by {}; \
                 set force-override-listeners to take it over",
                current.port,
                remote.id().unwrap_or_default(),
                current.description,
                service.key()
            )));
        }

        if wanted.protocol() != current.protocol() || wanted.config.is_forwarding() != current.config.is_forwarding() {
            plan.deletes.push(current.clone());
            plan.creates.push(wanted.clone());
            continue;
        }

        let update = ListenerUpdate {
            listener: wanted.clone(),
            changes: wanted.settings().changes_from(&current.settings()),
            vgroup_changed: wanted.vgroup_id.is_none()
                && wanted.vgroup_name.is_some()
                && wanted.vgroup_name != current.vgroup_name,
            restart: current.status.as_deref() == Some(LISTENER_STATUS_STOPPED),
        };
        if update.needs_attribute_change() || update.restart {
            plan.updates.push(update);
        }
    }

    for wanted in &local.listeners {
        if !remote.listeners.iter().any(|r| same_port(wanted, r)) {
            plan.creates.push(wanted.clone());
        }
    }

    Ok(plan)
}
