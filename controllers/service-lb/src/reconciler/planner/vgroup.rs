//! VServer group and backend planning.
//!
//! Backends are matched by server id and port (plus IP for ENIs). A backend
//! is only ever removed from a group the Service owns, or when its
//! description names the Service.

use crate::error::ControllerError;
use crate::model::{BackendGroup, BackendKey, BackendTarget, LoadBalancer, ServiceIdentity, naming};
use slb_client::MAX_BACKENDS_PER_CALL;
use std::collections::HashMap;

/// Backend changes for one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendPlan {
    pub adds: Vec<BackendTarget>,
    pub removes: Vec<BackendTarget>,
    pub updates: Vec<BackendTarget>,
}

impl BackendPlan {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty() && self.updates.is_empty()
    }
}

/// Split targets into API-sized batches
pub fn batches(targets: &[BackendTarget]) -> impl Iterator<Item = &[BackendTarget]> {
    targets.chunks(MAX_BACKENDS_PER_CALL)
}

fn may_remove(remote_group: &BackendGroup, target: &BackendTarget, owner: &ServiceIdentity) -> bool {
    let group_owned = remote_group
        .named_key
        .as_ref()
        .is_some_and(|key| key.belongs_to(owner));
    (group_owned && !remote_group.is_user_managed) || naming::is_owned_by(&target.description, owner)
}

/// Diff the backends of a group
pub fn plan_backends(local: &BackendGroup, remote: &BackendGroup, owner: &ServiceIdentity) -> BackendPlan {
    let wanted: HashMap<BackendKey, &BackendTarget> = local.backends.iter().map(|b| (b.key(), b)).collect();
    let current: HashMap<BackendKey, &BackendTarget> = remote.backends.iter().map(|b| (b.key(), b)).collect();

    let mut plan = BackendPlan::default();
    for target in &local.backends {
        match current.get(&target.key()) {
            None => plan.adds.push(target.clone()),
            Some(existing) if !may_remove(remote, existing, owner) => {}
            Some(existing) => {
                if existing.weight != target.weight || existing.description != target.description {
                    plan.updates.push(target.clone());
                }
            }
        }
    }
    for target in &remote.backends {
        if !wanted.contains_key(&target.key()) && may_remove(remote, target, owner) {
            plan.removes.push(target.clone());
        }
    }
    plan
}

/// VServer group changes for one load balancer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VGroupPlan {
    /// Groups to create, then fill
    pub creates: Vec<BackendGroup>,
    /// Existing groups (remote id set) with their backend changes
    pub updates: Vec<(BackendGroup, BackendPlan)>,
    /// Owned groups no longer declared; deleted after listeners let go of them
    pub deletes: Vec<BackendGroup>,
}

impl VGroupPlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.deletes.is_empty() && self.updates.iter().all(|(_, p)| p.is_empty())
    }
}

fn matches(local: &BackendGroup, remote: &BackendGroup) -> bool {
    if local.is_user_managed {
        local.vgroup_id.is_some() && local.vgroup_id == remote.vgroup_id
    } else {
        local.name == remote.name
    }
}

/// Plan every VServer group of a load balancer
pub fn plan_vgroups(local: &LoadBalancer, remote: &LoadBalancer) -> Result<VGroupPlan, ControllerError> {
    let owner = &local.service;
    let mut plan = VGroupPlan::default();
    let mut matched = vec![false; remote.vgroups.len()];

    for group in &local.vgroups {
        match remote.vgroups.iter().position(|r| matches(group, r)) {
            Some(index) => {
                matched[index] = true;
                let existing = &remote.vgroups[index];
                let backends = plan_backends(group, existing, owner);
                if !backends.is_empty() {
                    plan.updates.push((existing.clone(), backends));
                }
            }
            None if group.is_user_managed => {
                return Err(ControllerError::Validation(format!(
                    "VServer group {} does not exist on load balancer {}",
                    group.vgroup_id.as_deref().unwrap_or_default(),
                    remote.id().unwrap_or("(new)")
                )));
            }
            None => plan.creates.push(group.clone()),
        }
    }

    for (index, group) in remote.vgroups.iter().enumerate() {
        if matched[index] {
            continue;
        }
        let owned = group.named_key.as_ref().is_some_and(|key| key.belongs_to(owner));
        if owned && !group.is_user_managed {
            plan.deletes.push(group.clone());
            continue;
        }
        // Foreign group: take back what this Service added to it
        let ours: Vec<BackendTarget> = group
            .backends
            .iter()
            .filter(|b| naming::is_owned_by(&b.description, owner))
            .cloned()
            .collect();
        if !ours.is_empty() {
            plan.updates.push((
                group.clone(),
                BackendPlan {
                    removes: ours,
                    ..Default::default()
                },
            ));
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackendKind, NamedKey};
    use crate::test_utils::*;

    fn target(id: &str, weight: i32, description: &str) -> BackendTarget {
        BackendTarget {
            server_id: id.to_string(),
            server_ip: None,
            port: 30080,
            weight,
            kind: BackendKind::Ecs,
            description: description.to_string(),
        }
    }

    fn group(name: &str, backends: Vec<BackendTarget>) -> BackendGroup {
        BackendGroup {
            named_key: NamedKey::parse(name),
            name: name.to_string(),
            vgroup_id: Some(format!("rsp-{}", name.len())),
            is_user_managed: false,
            service_port: 80,
            backends,
        }
    }

    const OURS: &str = "k8s/80/web/default/c1";
    const THEIRS: &str = "k8s/80/api/default/c1";

    #[test]
    fn test_backend_diff_three_sets() {
        let local = group(OURS, vec![target("i-1", 100, OURS), target("i-2", 50, OURS), target("i-4", 100, OURS)]);
        let remote = group(OURS, vec![target("i-1", 100, OURS), target("i-2", 100, OURS), target("i-3", 100, OURS)]);

        let plan = plan_backends(&local, &remote, &identity());
        assert_eq!(plan.adds.iter().map(|b| b.server_id.as_str()).collect::<Vec<_>>(), vec!["i-4"]);
        assert_eq!(plan.updates.iter().map(|b| b.server_id.as_str()).collect::<Vec<_>>(), vec!["i-2"]);
        assert_eq!(plan.removes.iter().map(|b| b.server_id.as_str()).collect::<Vec<_>>(), vec!["i-3"]);

        let converged = plan_backends(&local, &local, &identity());
        assert!(converged.is_empty());
    }

    #[test]
    fn test_foreign_backends_in_user_group_are_untouched() {
        let mut local = group(OURS, vec![target("i-1", 100, OURS)]);
        local.is_user_managed = true;
        local.vgroup_id = Some("rsp-user".to_string());
        let mut remote = BackendGroup {
            named_key: None,
            name: "shared".to_string(),
            vgroup_id: Some("rsp-user".to_string()),
            is_user_managed: true,
            service_port: 0,
            backends: vec![target("i-9", 10, "manual"), target("i-1", 5, "manual"), target("i-2", 100, OURS)],
        };

        let plan = plan_backends(&local, &remote, &identity());
        assert!(plan.adds.is_empty());
        // i-1 belongs to someone else; only our stale i-2 goes
        assert!(plan.updates.is_empty());
        assert_eq!(plan.removes.len(), 1);
        assert_eq!(plan.removes[0].server_id, "i-2");

        remote.backends.retain(|b| b.server_id != "i-2");
        assert!(plan_backends(&local, &remote, &identity()).is_empty());
    }

    #[test]
    fn test_vgroup_plan_ownership() {
        let mut local = LoadBalancer::new(identity());
        local.vgroups = vec![group(OURS, vec![target("i-1", 100, OURS)])];
        let mut remote = LoadBalancer::new(identity());
        remote.attributes.load_balancer_id = Some("lb-1".to_string());
        remote.vgroups = vec![
            group("k8s/8080/web/default/c1", vec![target("i-1", 100, "k8s/8080/web/default/c1")]),
            group(THEIRS, vec![target("i-1", 100, THEIRS), target("i-5", 100, OURS)]),
            group("hand-made", vec![target("i-7", 100, "")]),
        ];

        let plan = plan_vgroups(&local, &remote).unwrap();
        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].name, OURS);
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].name, "k8s/8080/web/default/c1");
        // only our stray backend leaves the other Service's group
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0.name, THEIRS);
        assert_eq!(plan.updates[0].1.removes.len(), 1);
        assert_eq!(plan.updates[0].1.removes[0].server_id, "i-5");
    }

    #[test]
    fn test_missing_user_group_is_error() {
        let mut local = LoadBalancer::new(identity());
        let mut user = group(OURS, vec![]);
        user.is_user_managed = true;
        user.vgroup_id = Some("rsp-missing".to_string());
        local.vgroups = vec![user];

        let err = plan_vgroups(&local, &LoadBalancer::new(identity())).unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
    }

    #[test]
    fn test_batches_respect_limit() {
        let targets: Vec<BackendTarget> = (0..100).map(|i| target(&format!("i-{}", i), 100, OURS)).collect();
        let sizes: Vec<usize> = batches(&targets).map(<[BackendTarget]>::len).collect();
        assert_eq!(sizes, vec![39, 39, 22]);
    }
}
