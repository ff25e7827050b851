//! Load balancer, tag and network interface operations for MockCloudProvider

use super::MockCloudProvider;
use crate::error::CloudError;
use crate::models::*;

fn not_found(lb_id: &str) -> CloudError {
    CloudError::NotFound(format!("InvalidLoadBalancerId.NotFound: {}", lb_id))
}

pub async fn describe_load_balancers(client: &MockCloudProvider, query: &LoadBalancerQuery) -> Result<Vec<LoadBalancerSummary>, CloudError> {
    client.record("DescribeLoadBalancers", "")?;

    let lbs = client.load_balancers.lock().unwrap();
    let tags = client.tags.lock().unwrap();
    let mut found: Vec<LoadBalancerSummary> = lbs
        .values()
        .filter(|lb| {
            query
                .load_balancer_id
                .as_ref()
                .is_none_or(|id| *id == lb.load_balancer_id)
        })
        .filter(|lb| {
            query
                .load_balancer_name
                .as_ref()
                .is_none_or(|name| *name == lb.load_balancer_name)
        })
        .filter(|lb| {
            let lb_tags = tags.get(&lb.load_balancer_id);
            query
                .tags
                .iter()
                .all(|t| lb_tags.is_some_and(|have| have.contains(t)))
        })
        .map(|lb| LoadBalancerSummary {
            load_balancer_id: lb.load_balancer_id.clone(),
            load_balancer_name: lb.load_balancer_name.clone(),
            load_balancer_status: lb.load_balancer_status.clone(),
            address: lb.address.clone(),
        })
        .collect();
    found.sort_by(|a, b| a.load_balancer_id.cmp(&b.load_balancer_id));
    Ok(found)
}

pub async fn describe_load_balancer_attribute(client: &MockCloudProvider, lb_id: &str) -> Result<LoadBalancerAttribute, CloudError> {
    client.record("DescribeLoadBalancerAttribute", lb_id)?;

    let mut lbs = client.load_balancers.lock().unwrap();
    let lb = lbs.get_mut(lb_id).ok_or_else(|| not_found(lb_id))?;

    let mut pending = client.pending_activation.lock().unwrap();
    if let Some(remaining) = pending.get_mut(lb_id) {
        if *remaining == 0 {
            pending.remove(lb_id);
            lb.load_balancer_status = LB_STATUS_ACTIVE.to_string();
        } else {
            *remaining -= 1;
        }
    }
    Ok(lb.clone())
}

pub async fn create_load_balancer(client: &MockCloudProvider, request: &CreateLoadBalancerRequest) -> Result<CreateLoadBalancerResponse, CloudError> {
    client.record("CreateLoadBalancer", &request.load_balancer_name)?;

    let id = client.next_id();
    let lb_id = format!("lb-mock{:06}", id);
    let address = if request.address_type == "intranet" {
        format!("192.168.0.{}", id % 250 + 1)
    } else {
        format!("47.100.0.{}", id % 250 + 1)
    };

    let polls = *client.activation_polls.lock().unwrap();
    let status = if polls == 0 {
        LB_STATUS_ACTIVE.to_string()
    } else {
        client.pending_activation.lock().unwrap().insert(lb_id.clone(), polls);
        "inactive".to_string()
    };

    let lb = LoadBalancerAttribute {
        load_balancer_id: lb_id.clone(),
        load_balancer_name: request.load_balancer_name.clone(),
        load_balancer_status: status,
        address: address.clone(),
        address_type: request.address_type.clone(),
        address_ip_version: request.address_ip_version.clone().unwrap_or_else(|| "ipv4".to_string()),
        internet_charge_type: request.internet_charge_type.clone().unwrap_or_else(|| "paybytraffic".to_string()),
        bandwidth: request.bandwidth,
        load_balancer_spec: request.load_balancer_spec.clone(),
        instance_charge_type: request.instance_charge_type.clone(),
        resource_group_id: request.resource_group_id.clone().unwrap_or_default(),
        master_zone_id: request.master_zone_id.clone().unwrap_or_else(|| "cn-hangzhou-k".to_string()),
        slave_zone_id: request.slave_zone_id.clone().unwrap_or_else(|| "cn-hangzhou-j".to_string()),
        vswitch_id: request.vswitch_id.clone().unwrap_or_default(),
        vpc_id: request.vpc_id.clone().unwrap_or_default(),
        delete_protection: request.delete_protection.clone().unwrap_or_else(|| "off".to_string()),
        modification_protection_status: request.modification_protection_status.clone().unwrap_or_else(|| "NonProtection".to_string()),
        modification_protection_reason: request.modification_protection_reason.clone().unwrap_or_default(),
    };

    client.load_balancers.lock().unwrap().insert(lb_id.clone(), lb);
    client.tags.lock().unwrap().insert(lb_id.clone(), request.tags.clone());
    client.listeners.lock().unwrap().insert(lb_id.clone(), Vec::new());

    Ok(CreateLoadBalancerResponse {
        load_balancer_id: lb_id,
        address,
    })
}

pub async fn delete_load_balancer(client: &MockCloudProvider, lb_id: &str) -> Result<(), CloudError> {
    client.record("DeleteLoadBalancer", lb_id)?;

    let mut lbs = client.load_balancers.lock().unwrap();
    let lb = lbs.get(lb_id).ok_or_else(|| not_found(lb_id))?;
    if lb.delete_protection == "on" {
        return Err(CloudError::api(
            "OperationDenied.DeleteProtection",
            format!("load balancer {} has delete protection enabled", lb_id),
        ));
    }
    lbs.remove(lb_id);
    client.tags.lock().unwrap().remove(lb_id);
    client.listeners.lock().unwrap().remove(lb_id);
    client.vserver_groups.lock().unwrap().retain(|_, g| g.lb_id != lb_id);
    Ok(())
}

/// Apply an attribute mutation to a stored load balancer
pub async fn modify<F>(client: &MockCloudProvider, action: &str, lb_id: &str, f: F) -> Result<(), CloudError>
where
    F: FnOnce(&mut LoadBalancerAttribute) + Send,
{
    client.record(action, lb_id)?;

    let mut lbs = client.load_balancers.lock().unwrap();
    let lb = lbs.get_mut(lb_id).ok_or_else(|| not_found(lb_id))?;
    f(lb);
    Ok(())
}

pub async fn tag_resources(client: &MockCloudProvider, lb_id: &str, new_tags: &[Tag]) -> Result<(), CloudError> {
    client.record("TagResources", lb_id)?;

    if !client.load_balancers.lock().unwrap().contains_key(lb_id) {
        return Err(not_found(lb_id));
    }
    let mut tags = client.tags.lock().unwrap();
    let entry = tags.entry(lb_id.to_string()).or_default();
    for tag in new_tags {
        entry.retain(|t| t.tag_key != tag.tag_key);
        entry.push(tag.clone());
    }
    Ok(())
}

pub async fn untag_resources(client: &MockCloudProvider, lb_id: &str, keys: &[String]) -> Result<(), CloudError> {
    client.record("UntagResources", lb_id)?;

    if !client.load_balancers.lock().unwrap().contains_key(lb_id) {
        return Err(not_found(lb_id));
    }
    if let Some(entry) = client.tags.lock().unwrap().get_mut(lb_id) {
        entry.retain(|t| !keys.contains(&t.tag_key));
    }
    Ok(())
}

pub async fn list_tag_resources(client: &MockCloudProvider, lb_id: &str) -> Result<Vec<Tag>, CloudError> {
    client.record("ListTagResources", lb_id)?;

    if !client.load_balancers.lock().unwrap().contains_key(lb_id) {
        return Err(not_found(lb_id));
    }
    Ok(client.tags.lock().unwrap().get(lb_id).cloned().unwrap_or_default())
}

pub async fn describe_network_interfaces(client: &MockCloudProvider, vpc_id: &str, private_ips: &[String]) -> Result<Vec<NetworkInterface>, CloudError> {
    client.record("DescribeNetworkInterfaces", vpc_id)?;

    Ok(client
        .network_interfaces
        .lock()
        .unwrap()
        .iter()
        .filter(|eni| vpc_id.is_empty() || eni.vpc_id == vpc_id)
        .filter(|eni| private_ips.contains(&eni.private_ip_address))
        .cloned()
        .collect())
}
