//! Diff desired against actual state.
//!
//! Planning never touches the cloud. Everything the applier will do for one
//! pass is decided here first, so a conflict aborts the pass before any
//! mutation.

pub mod listener;
pub mod load_balancer;
pub mod vgroup;

pub use listener::{ListenerPlan, ListenerUpdate, plan_listeners};
pub use load_balancer::{LoadBalancerAction, LoadBalancerPlan, plan_load_balancer};
pub use vgroup::{BackendPlan, VGroupPlan, batches, plan_backends, plan_vgroups};

use crate::error::ControllerError;
use crate::model::LoadBalancer;

/// Everything one reconciliation pass changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub load_balancer: LoadBalancerPlan,
    pub vgroups: VGroupPlan,
    pub listeners: ListenerPlan,
}

impl Plan {
    /// Plan a pass that converges `remote` to `local`
    pub fn build(local: &LoadBalancer, remote: &LoadBalancer, vpc_id: Option<&str>) -> Result<Self, ControllerError> {
        Ok(Self {
            load_balancer: plan_load_balancer(local, remote, vpc_id)?,
            vgroups: plan_vgroups(local, remote)?,
            listeners: plan_listeners(local, remote)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.load_balancer, LoadBalancerPlan::Update(actions) if actions.is_empty())
            && self.vgroups.is_empty()
            && self.listeners.is_empty()
    }
}
