//! VServer group operations for MockCloudProvider

use super::{MockCloudProvider, StoredVServerGroup};
use crate::error::CloudError;
use crate::models::*;

fn vgroup_not_found(vgroup_id: &str) -> CloudError {
    CloudError::NotFound(format!("VServerGroupId {} not found", vgroup_id))
}

/// Backends are identified by server id and port, plus IP for ENIs
fn same_backend(a: &BackendServer, b: &BackendServer) -> bool {
    a.server_id == b.server_id
        && a.port == b.port
        && (a.server_type != BACKEND_TYPE_ENI || a.server_ip == b.server_ip)
}

fn check_batch(action: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
    if backends.len() > API_MAX_BACKENDS_PER_CALL {
        return Err(CloudError::InvalidRequest(format!(
            "{} accepts at most {} backend servers, got {}",
            action,
            API_MAX_BACKENDS_PER_CALL,
            backends.len()
        )));
    }
    Ok(())
}

pub async fn describe_vserver_groups(client: &MockCloudProvider, lb_id: &str) -> Result<Vec<VServerGroup>, CloudError> {
    client.record("DescribeVServerGroups", lb_id)?;

    if !client.load_balancers.lock().unwrap().contains_key(lb_id) {
        return Err(CloudError::NotFound(format!("load balancer {} not found", lb_id)));
    }
    Ok(client.vserver_groups_of(lb_id))
}

pub async fn create_vserver_group(
    client: &MockCloudProvider,
    lb_id: &str,
    name: &str,
    backends: &[BackendServer],
) -> Result<String, CloudError> {
    client.record("CreateVServerGroup", name)?;
    check_batch("CreateVServerGroup", backends)?;

    if !client.load_balancers.lock().unwrap().contains_key(lb_id) {
        return Err(CloudError::NotFound(format!("load balancer {} not found", lb_id)));
    }

    let vgroup_id = format!("rsp-mock{:06}", client.next_id());
    client.vserver_groups.lock().unwrap().insert(
        vgroup_id.clone(),
        StoredVServerGroup {
            lb_id: lb_id.to_string(),
            group: VServerGroup {
                vserver_group_id: vgroup_id.clone(),
                vserver_group_name: name.to_string(),
                backend_servers: backends.to_vec(),
            },
        },
    );
    Ok(vgroup_id)
}

pub async fn delete_vserver_group(client: &MockCloudProvider, vgroup_id: &str) -> Result<(), CloudError> {
    client.record("DeleteVServerGroup", vgroup_id)?;

    let in_use = client
        .listeners
        .lock()
        .unwrap()
        .values()
        .flatten()
        .any(|l| l.settings.vserver_group_id.as_deref() == Some(vgroup_id));
    if in_use {
        return Err(CloudError::api(
            "ResourceInUse.VServerGroup",
            format!("VServer group {} is used by a listener", vgroup_id),
        ));
    }

    client
        .vserver_groups
        .lock()
        .unwrap()
        .remove(vgroup_id)
        .map(|_| ())
        .ok_or_else(|| vgroup_not_found(vgroup_id))
}

pub async fn add_backend_servers(client: &MockCloudProvider, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
    client.record("AddVServerGroupBackendServers", vgroup_id)?;
    check_batch("AddVServerGroupBackendServers", backends)?;

    let mut groups = client.vserver_groups.lock().unwrap();
    let stored = groups.get_mut(vgroup_id).ok_or_else(|| vgroup_not_found(vgroup_id))?;
    for backend in backends {
        if stored.group.backend_servers.iter().any(|b| same_backend(b, backend)) {
            return Err(CloudError::api(
                "BackendServer.AlreadyExist",
                format!("backend {}:{} already in {}", backend.server_id, backend.port, vgroup_id),
            ));
        }
    }
    stored.group.backend_servers.extend(backends.iter().cloned());
    Ok(())
}

pub async fn remove_backend_servers(client: &MockCloudProvider, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
    client.record("RemoveVServerGroupBackendServers", vgroup_id)?;
    check_batch("RemoveVServerGroupBackendServers", backends)?;

    let mut groups = client.vserver_groups.lock().unwrap();
    let stored = groups.get_mut(vgroup_id).ok_or_else(|| vgroup_not_found(vgroup_id))?;
    stored
        .group
        .backend_servers
        .retain(|b| !backends.iter().any(|r| same_backend(b, r)));
    Ok(())
}

pub async fn set_backend_servers(client: &MockCloudProvider, vgroup_id: &str, backends: &[BackendServer]) -> Result<(), CloudError> {
    client.record("SetVServerGroupAttribute", vgroup_id)?;
    check_batch("SetVServerGroupAttribute", backends)?;

    let mut groups = client.vserver_groups.lock().unwrap();
    let stored = groups.get_mut(vgroup_id).ok_or_else(|| vgroup_not_found(vgroup_id))?;
    for backend in backends {
        match stored
            .group
            .backend_servers
            .iter_mut()
            .find(|b| same_backend(b, backend))
        {
            Some(existing) => {
                existing.weight = backend.weight;
                existing.description = backend.description.clone();
            }
            None => {
                return Err(CloudError::api(
                    "BackendServer.NotExist",
                    format!("backend {}:{} not in {}", backend.server_id, backend.port, vgroup_id),
                ));
            }
        }
    }
    Ok(())
}
