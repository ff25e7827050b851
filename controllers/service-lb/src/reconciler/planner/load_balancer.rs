//! Load balancer attribute planning.

use crate::annotation::{self as keys, AnnotationRequest};
use crate::error::ControllerError;
use crate::model::{LoadBalancer, naming};
use slb_client::{CreateLoadBalancerRequest, Tag};

/// Reason recorded with the modification protection of created load balancers
pub const MODIFICATION_PROTECTION_REASON: &str = "managed.by.kubernetes";

/// One attribute family update, applied in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerAction {
    SetName(String),
    ModifyInternetSpec { charge_type: String, bandwidth: Option<i32> },
    ModifyInstanceChargeType { charge_type: String, spec: Option<String> },
    ModifyInstanceSpec(String),
    SetDeleteProtection(String),
    SetModificationProtection { status: String, reason: Option<String> },
    AddTags(Vec<Tag>),
}

impl LoadBalancerAction {
    /// Cloud action name, used for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetName(_) => "SetLoadBalancerName",
            Self::ModifyInternetSpec { .. } => "ModifyLoadBalancerInternetSpec",
            Self::ModifyInstanceChargeType { .. } => "ModifyLoadBalancerInstanceChargeType",
            Self::ModifyInstanceSpec(_) => "ModifyLoadBalancerInstanceSpec",
            Self::SetDeleteProtection(_) => "SetLoadBalancerDeleteProtection",
            Self::SetModificationProtection { .. } => "SetLoadBalancerModificationProtection",
            Self::AddTags(_) => "TagResources",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerPlan {
    Create(CreateLoadBalancerRequest),
    Update(Vec<LoadBalancerAction>),
}

/// Plan the load balancer itself.
///
/// An existing load balancer whose immutable attributes differ from the
/// declared ones is a conflict; nothing is planned for it.
pub fn plan_load_balancer(
    local: &LoadBalancer,
    remote: &LoadBalancer,
    vpc_id: Option<&str>,
) -> Result<LoadBalancerPlan, ControllerError> {
    if !remote.exists() {
        if local.attributes.is_user_managed {
            return Err(ControllerError::Validation(format!(
                "load balancer {} does not exist",
                local.id().unwrap_or_default()
            )));
        }
        return Ok(LoadBalancerPlan::Create(create_request(local, vpc_id)));
    }

    check_immutable(local, remote)?;
    check_reuse(local, remote)?;
    Ok(LoadBalancerPlan::Update(attribute_actions(local, remote)))
}

fn create_request(local: &LoadBalancer, vpc_id: Option<&str>) -> CreateLoadBalancerRequest {
    let attributes = &local.attributes;
    let default = |key: &str| AnnotationRequest::get_default(key).map(str::to_string);
    let default_name = local.service.default_load_balancer_name();

    let mut tags = vec![
        Tag::new(naming::TAG_CREATED_BY_CONTROLLER, &default_name),
        Tag::new(naming::TAG_CLUSTER_ID, &local.service.cluster_id),
    ];
    tags.extend(attributes.tag_list());

    let address_type = attributes.address_type.clone().or_else(|| default(keys::ADDRESS_TYPE)).unwrap_or_default();
    let per_capacity = attributes.instance_charge_type.as_deref() == Some("PayByCLCU");
    let modification_protection = attributes
        .modification_protection
        .clone()
        .or_else(|| default(keys::MODIFICATION_PROTECTION));
    let modification_protection_reason = (modification_protection.as_deref() == Some("ConsoleProtection"))
        .then(|| MODIFICATION_PROTECTION_REASON.to_string());

    CreateLoadBalancerRequest {
        load_balancer_name: attributes.name.clone().unwrap_or(default_name),
        vpc_id: (address_type == "intranet").then(|| vpc_id.map(str::to_string)).flatten(),
        address_type,
        address_ip_version: attributes.ip_version.clone().or_else(|| default(keys::IP_VERSION)),
        internet_charge_type: attributes.internet_charge_type.clone().or_else(|| default(keys::CHARGE_TYPE)),
        bandwidth: attributes.bandwidth,
        load_balancer_spec: if per_capacity {
            None
        } else {
            attributes.spec.clone().or_else(|| default(keys::SPEC))
        },
        instance_charge_type: attributes.instance_charge_type.clone(),
        resource_group_id: attributes.resource_group_id.clone(),
        master_zone_id: attributes.master_zone_id.clone(),
        slave_zone_id: attributes.slave_zone_id.clone(),
        vswitch_id: attributes.vswitch_id.clone(),
        delete_protection: attributes.delete_protection.clone().or_else(|| default(keys::DELETE_PROTECTION)),
        modification_protection_status: modification_protection,
        modification_protection_reason,
        tags,
        client_token: uuid::Uuid::new_v4().to_string(),
    }
}

fn check_immutable(local: &LoadBalancer, remote: &LoadBalancer) -> Result<(), ControllerError> {
    let (l, r) = (&local.attributes, &remote.attributes);
    let fields = [
        ("address type", &l.address_type, &r.address_type),
        ("ip version", &l.ip_version, &r.ip_version),
        ("resource group id", &l.resource_group_id, &r.resource_group_id),
        ("master zone id", &l.master_zone_id, &r.master_zone_id),
        ("slave zone id", &l.slave_zone_id, &r.slave_zone_id),
    ];
    for (name, wanted, current) in fields {
        if let Some(wanted) = wanted {
            if current.as_ref() != Some(wanted) {
                return Err(ControllerError::Conflict(format!(
                    "{} of load balancer {} is {} and cannot be changed to {}",
                    name,
                    remote.id().unwrap_or_default(),
                    current.as_deref().unwrap_or("unset"),
                    wanted
                )));
            }
        }
    }
    Ok(())
}

/// A load balancer created for one Service cannot be borrowed by another
fn check_reuse(local: &LoadBalancer, remote: &LoadBalancer) -> Result<(), ControllerError> {
    if !local.attributes.is_user_managed {
        return Ok(());
    }
    match remote.attributes.tags.get(naming::TAG_CREATED_BY_CONTROLLER) {
        Some(owner) if *owner != local.service.default_load_balancer_name() => Err(ControllerError::Conflict(format!(
            "load balancer {} was created for another Service and cannot be reused",
            remote.id().unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

fn differs<T: PartialEq>(wanted: &Option<T>, current: &Option<T>) -> bool {
    wanted.is_some() && wanted != current
}

fn attribute_actions(local: &LoadBalancer, remote: &LoadBalancer) -> Vec<LoadBalancerAction> {
    let (l, r) = (&local.attributes, &remote.attributes);
    let mut actions = Vec::new();

    if let Some(name) = &l.name {
        if r.name.as_ref() != Some(name) {
            actions.push(LoadBalancerAction::SetName(name.clone()));
        }
    }

    if differs(&l.internet_charge_type, &r.internet_charge_type) || differs(&l.bandwidth, &r.bandwidth) {
        let charge_type = l
            .internet_charge_type
            .clone()
            .or_else(|| r.internet_charge_type.clone())
            .unwrap_or_default();
        actions.push(LoadBalancerAction::ModifyInternetSpec {
            charge_type,
            bandwidth: l.bandwidth,
        });
    }

    let charge_type_changes = differs(&l.instance_charge_type, &r.instance_charge_type);
    if let (true, Some(charge_type)) = (charge_type_changes, &l.instance_charge_type) {
        actions.push(LoadBalancerAction::ModifyInstanceChargeType {
            charge_type: charge_type.clone(),
            spec: if charge_type == "PayBySpec" { l.spec.clone() } else { None },
        });
    }
    let effective_charge = l.instance_charge_type.as_ref().or(r.instance_charge_type.as_ref());
    if !charge_type_changes && effective_charge.map(String::as_str) != Some("PayByCLCU") {
        if let Some(spec) = &l.spec {
            if r.spec.as_ref() != Some(spec) {
                actions.push(LoadBalancerAction::ModifyInstanceSpec(spec.clone()));
            }
        }
    }

    if let Some(flag) = &l.delete_protection {
        if r.delete_protection.as_ref() != Some(flag) {
            actions.push(LoadBalancerAction::SetDeleteProtection(flag.clone()));
        }
    }

    if let Some(status) = &l.modification_protection {
        if r.modification_protection.as_ref() != Some(status) {
            actions.push(LoadBalancerAction::SetModificationProtection {
                status: status.clone(),
                reason: (status == "ConsoleProtection").then(|| MODIFICATION_PROTECTION_REASON.to_string()),
            });
        }
    }

    let mut missing: Vec<Tag> = l
        .tags
        .iter()
        .filter(|(k, v)| r.tags.get(*k) != Some(*v))
        .map(|(k, v)| Tag::new(k, v))
        .collect();
    if l.is_user_managed && !r.tags.contains_key(naming::TAG_REUSED_BY) {
        missing.push(Tag::new(naming::TAG_REUSED_BY, local.service.reuse_tag_value()));
    }
    if !missing.is_empty() {
        actions.push(LoadBalancerAction::AddTags(missing));
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn remote() -> LoadBalancer {
        let mut remote = LoadBalancer::new(identity());
        remote.attributes.load_balancer_id = Some("lb-1".to_string());
        remote.attributes.name = Some("existing".to_string());
        remote.attributes.address_type = Some("internet".to_string());
        remote.attributes.ip_version = Some("ipv4".to_string());
        remote.attributes.internet_charge_type = Some("paybytraffic".to_string());
        remote.attributes.spec = Some("slb.s1.small".to_string());
        remote.attributes.master_zone_id = Some("cn-hangzhou-k".to_string());
        remote.attributes.delete_protection = Some("on".to_string());
        remote
    }

    #[test]
    fn test_create_injects_defaults() {
        let local = LoadBalancer::new(identity());
        let LoadBalancerPlan::Create(request) = plan_load_balancer(&local, &LoadBalancer::new(identity()), Some("vpc-1")).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(request.load_balancer_name, identity().default_load_balancer_name());
        assert_eq!(request.address_type, "internet");
        assert_eq!(request.load_balancer_spec.as_deref(), Some("slb.s1.small"));
        assert_eq!(request.delete_protection.as_deref(), Some("on"));
        assert_eq!(request.modification_protection_status.as_deref(), Some("ConsoleProtection"));
        assert!(request.vpc_id.is_none());
        assert!(request.tags.contains(&Tag::new(naming::TAG_CREATED_BY_CONTROLLER, identity().default_load_balancer_name())));
        assert!(!request.client_token.is_empty());
    }

    #[test]
    fn test_intranet_create_uses_vpc() {
        let mut local = LoadBalancer::new(identity());
        local.attributes.address_type = Some("intranet".to_string());
        local.attributes.instance_charge_type = Some("PayByCLCU".to_string());
        let LoadBalancerPlan::Create(request) = plan_load_balancer(&local, &LoadBalancer::new(identity()), Some("vpc-1")).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(request.vpc_id.as_deref(), Some("vpc-1"));
        assert_eq!(request.load_balancer_spec, None);
    }

    #[test]
    fn test_unset_attributes_plan_nothing() {
        let local = LoadBalancer::new(identity());
        assert_eq!(
            plan_load_balancer(&local, &remote(), None).unwrap(),
            LoadBalancerPlan::Update(vec![])
        );
    }

    #[test]
    fn test_mutable_attributes_in_fixed_order() {
        let mut local = LoadBalancer::new(identity());
        local.attributes.delete_protection = Some("off".to_string());
        local.attributes.spec = Some("slb.s2.medium".to_string());
        local.attributes.internet_charge_type = Some("paybybandwidth".to_string());
        local.attributes.bandwidth = Some(20);
        local.attributes.name = Some("renamed".to_string());
        local.attributes.tags.insert("team".to_string(), "web".to_string());

        let LoadBalancerPlan::Update(actions) = plan_load_balancer(&local, &remote(), None).unwrap() else {
            panic!("expected update");
        };
        let names: Vec<&str> = actions.iter().map(LoadBalancerAction::name).collect();
        assert_eq!(
            names,
            vec![
                "SetLoadBalancerName",
                "ModifyLoadBalancerInternetSpec",
                "ModifyLoadBalancerInstanceSpec",
                "SetLoadBalancerDeleteProtection",
                "TagResources"
            ]
        );
    }

    #[test]
    fn test_immutable_attribute_change_is_conflict() {
        let changes: Vec<fn(&mut LoadBalancer)> = vec![
            |l| l.attributes.address_type = Some("intranet".to_string()),
            |l| l.attributes.ip_version = Some("ipv6".to_string()),
            |l| l.attributes.resource_group_id = Some("rg-2".to_string()),
            |l| l.attributes.master_zone_id = Some("cn-hangzhou-b".to_string()),
            |l| l.attributes.slave_zone_id = Some("cn-hangzhou-c".to_string()),
        ];
        for change in changes {
            let mut local = LoadBalancer::new(identity());
            change(&mut local);
            let err = plan_load_balancer(&local, &remote(), None).unwrap_err();
            assert!(matches!(err, ControllerError::Conflict(_)), "{}", err);
        }

        let mut same = LoadBalancer::new(identity());
        same.attributes.master_zone_id = Some("cn-hangzhou-k".to_string());
        assert!(plan_load_balancer(&same, &remote(), None).is_ok());
    }

    #[test]
    fn test_reuse_guard() {
        let mut local = LoadBalancer::new(identity());
        local.attributes.load_balancer_id = Some("lb-1".to_string());
        local.attributes.is_user_managed = true;

        let mut created_elsewhere = remote();
        created_elsewhere
            .attributes
            .tags
            .insert(naming::TAG_CREATED_BY_CONTROLLER.to_string(), "aotherservice".to_string());
        assert!(matches!(
            plan_load_balancer(&local, &created_elsewhere, None),
            Err(ControllerError::Conflict(_))
        ));

        let LoadBalancerPlan::Update(actions) = plan_load_balancer(&local, &remote(), None).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(
            actions,
            vec![LoadBalancerAction::AddTags(vec![Tag::new(naming::TAG_REUSED_BY, "c1/default/web")])]
        );
    }
}
