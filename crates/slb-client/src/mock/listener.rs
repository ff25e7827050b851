//! Listener operations for MockCloudProvider
//!
//! TCP, HTTP and HTTPS listeners share one port space; UDP has its own.

use super::MockCloudProvider;
use crate::error::CloudError;
use crate::models::*;

fn transport(protocol: &str) -> &'static str {
    if protocol == "udp" { "udp" } else { "tcp" }
}

fn listener_not_found(lb_id: &str, port: i32, protocol: &str) -> CloudError {
    CloudError::NotFound(format!("Listener {}/{} not found on {}", protocol, port, lb_id))
}

fn ensure_vgroup(client: &MockCloudProvider, lb_id: &str, settings: &ListenerSettings) -> Result<(), CloudError> {
    if let Some(vgroup_id) = &settings.vserver_group_id {
        let groups = client.vserver_groups.lock().unwrap();
        match groups.get(vgroup_id) {
            Some(stored) if stored.lb_id == lb_id => {}
            _ => {
                return Err(CloudError::NotFound(format!(
                    "VServerGroupId {} does not exist on {}",
                    vgroup_id, lb_id
                )));
            }
        }
    }
    Ok(())
}

pub async fn describe_listeners(client: &MockCloudProvider, lb_id: &str) -> Result<Vec<ListenerAttribute>, CloudError> {
    client.record("DescribeLoadBalancerListeners", lb_id)?;

    let listeners = client.listeners.lock().unwrap();
    let mut found = listeners
        .get(lb_id)
        .cloned()
        .ok_or_else(|| CloudError::NotFound(format!("load balancer {} not found", lb_id)))?;
    found.sort_by_key(|l| l.listener_port);
    Ok(found)
}

pub async fn create_listener(
    client: &MockCloudProvider,
    lb_id: &str,
    port: i32,
    protocol: &str,
    settings: &ListenerSettings,
) -> Result<(), CloudError> {
    let action = format!("CreateLoadBalancer{}Listener", protocol.to_uppercase());
    client.record(&action, &format!("{}/{}", protocol, port))?;

    ensure_vgroup(client, lb_id, settings)?;

    let mut listeners = client.listeners.lock().unwrap();
    let entry = listeners
        .get_mut(lb_id)
        .ok_or_else(|| CloudError::NotFound(format!("load balancer {} not found", lb_id)))?;

    if entry
        .iter()
        .any(|l| l.listener_port == port && transport(&l.listener_protocol) == transport(protocol))
    {
        return Err(CloudError::api(
            "ListenerAlreadyExists",
            format!("port {} is already used by another listener", port),
        ));
    }

    entry.push(ListenerAttribute {
        listener_port: port,
        listener_protocol: protocol.to_string(),
        status: LISTENER_STATUS_STOPPED.to_string(),
        settings: settings.clone(),
    });
    Ok(())
}

pub async fn set_listener_attribute(
    client: &MockCloudProvider,
    lb_id: &str,
    port: i32,
    protocol: &str,
    settings: &ListenerSettings,
) -> Result<(), CloudError> {
    let action = format!("SetLoadBalancer{}ListenerAttribute", protocol.to_uppercase());
    client.record(&action, &format!("{}/{}", protocol, port))?;

    ensure_vgroup(client, lb_id, settings)?;

    let mut listeners = client.listeners.lock().unwrap();
    let listener = listeners
        .get_mut(lb_id)
        .and_then(|ls| {
            ls.iter_mut()
                .find(|l| l.listener_port == port && l.listener_protocol == protocol)
        })
        .ok_or_else(|| listener_not_found(lb_id, port, protocol))?;

    if listener.status == LISTENER_STATUS_STOPPED {
        return Err(CloudError::api(
            "OperationFailed.ListenerStatusNotSupport",
            format!("listener {}/{} is stopped", protocol, port),
        ));
    }
    listener.settings.merge(settings);
    Ok(())
}

pub async fn set_status(
    client: &MockCloudProvider,
    action: &str,
    lb_id: &str,
    port: i32,
    protocol: &str,
    status: &str,
) -> Result<(), CloudError> {
    client.record(action, &format!("{}/{}", protocol, port))?;

    let mut listeners = client.listeners.lock().unwrap();
    let listener = listeners
        .get_mut(lb_id)
        .and_then(|ls| {
            ls.iter_mut()
                .find(|l| l.listener_port == port && l.listener_protocol == protocol)
        })
        .ok_or_else(|| listener_not_found(lb_id, port, protocol))?;
    listener.status = status.to_string();
    Ok(())
}

pub async fn delete_listener(client: &MockCloudProvider, lb_id: &str, port: i32, protocol: &str) -> Result<(), CloudError> {
    client.record("DeleteLoadBalancerListener", &format!("{}/{}", protocol, port))?;

    let mut listeners = client.listeners.lock().unwrap();
    let entry = listeners
        .get_mut(lb_id)
        .ok_or_else(|| listener_not_found(lb_id, port, protocol))?;
    let before = entry.len();
    entry.retain(|l| !(l.listener_port == port && l.listener_protocol == protocol));
    if entry.len() == before {
        return Err(listener_not_found(lb_id, port, protocol));
    }
    Ok(())
}
