//! Ownership markers.
//!
//! Cloud resources created for a Service are labelled with a named key:
//!
//! ```text
//! k8s/{port}/{service}/{namespace}/{cluster}
//! ```
//!
//! The key is used as VServer group name, listener description and backend
//! description. Namespace and Service names cannot contain `/`; the cluster
//! id takes the remainder of the string. A label that does not decode is
//! foreign and is never mutated.

use crate::model::ServiceIdentity;
use std::fmt;

pub const NAMED_KEY_PREFIX: &str = "k8s";

/// Tag set on controller-created load balancers, value is the default name
pub const TAG_CREATED_BY_CONTROLLER: &str = "kubernetes.do.not.delete";
/// Tag carrying the cluster id
pub const TAG_CLUSTER_ID: &str = "ack.aliyun.com";
/// Tag set on reused load balancers, value is `{cluster}/{namespace}/{name}`
pub const TAG_REUSED_BY: &str = "kubernetes.reused.by.service";

/// Decoded ownership marker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedKey {
    pub port: i32,
    pub service: String,
    pub namespace: String,
    pub cluster_id: String,
}

impl NamedKey {
    pub fn new(service: &ServiceIdentity, port: i32) -> Self {
        Self {
            port,
            service: service.name.clone(),
            namespace: service.namespace.clone(),
            cluster_id: service.cluster_id.clone(),
        }
    }

    /// Decode a cloud-side label, `None` when it is not one of ours
    pub fn parse(label: &str) -> Option<Self> {
        let mut parts = label.splitn(5, '/');
        if parts.next()? != NAMED_KEY_PREFIX {
            return None;
        }
        let port = parts.next()?.parse::<i32>().ok()?;
        let service = parts.next()?;
        let namespace = parts.next()?;
        let cluster_id = parts.next()?;
        if service.is_empty() || namespace.is_empty() || cluster_id.is_empty() {
            return None;
        }
        Some(Self {
            port,
            service: service.to_string(),
            namespace: namespace.to_string(),
            cluster_id: cluster_id.to_string(),
        })
    }

    /// True when the key names the given Service, whatever the port
    pub fn belongs_to(&self, service: &ServiceIdentity) -> bool {
        self.service == service.name
            && self.namespace == service.namespace
            && self.cluster_id == service.cluster_id
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            NAMED_KEY_PREFIX, self.port, self.service, self.namespace, self.cluster_id
        )
    }
}

/// True when `label` decodes to a key owned by `service`
pub fn is_owned_by(label: &str, service: &ServiceIdentity) -> bool {
    NamedKey::parse(label).is_some_and(|key| key.belongs_to(service))
}

/// Name given to load balancers created for a Service: `a` + uid without dashes, at most 32 chars
pub fn default_load_balancer_name(uid: &str) -> String {
    let mut name = format!("a{}", uid.replace('-', ""));
    name.truncate(32);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceIdentity {
        ServiceIdentity {
            namespace: "default".to_string(),
            name: "web".to_string(),
            uid: "6f0b2c39-2d0e-4c6e-9a53-1f6d1c1e7f42".to_string(),
            cluster_id: "c1".to_string(),
        }
    }

    #[test]
    fn test_named_key_round_trip() {
        let key = NamedKey::new(&service(), 80);
        let label = key.to_string();
        assert_eq!(label, "k8s/80/web/default/c1");
        assert_eq!(NamedKey::parse(&label), Some(key));
    }

    #[test]
    fn test_cluster_id_keeps_remainder() {
        let key = NamedKey::parse("k8s/443/api/prod/region/c-42").unwrap();
        assert_eq!(key.namespace, "prod");
        assert_eq!(key.cluster_id, "region/c-42");
    }

    #[test]
    fn test_foreign_labels_do_not_decode() {
        for label in [
            "",
            "my-vgroup",
            "k8s/80/web/default",
            "k8s/http/web/default/c1",
            "k8s/80//default/c1",
            "ingress/80/web/default/c1",
        ] {
            assert_eq!(NamedKey::parse(label), None, "{}", label);
        }
    }

    #[test]
    fn test_ownership() {
        let svc = service();
        assert!(is_owned_by("k8s/8080/web/default/c1", &svc));
        assert!(!is_owned_by("k8s/80/web/other/c1", &svc));
        assert!(!is_owned_by("k8s/80/web/default/c2", &svc));
        assert!(!is_owned_by("rsp-user-group", &svc));
    }

    #[test]
    fn test_default_name() {
        let name = default_load_balancer_name("6f0b2c39-2d0e-4c6e-9a53-1f6d1c1e7f42");
        assert_eq!(name, "a6f0b2c392d0e4c6e9a531f6d1c1e7f4");
        assert_eq!(name.len(), 32);
        assert_eq!(default_load_balancer_name("abc"), "aabc");
    }
}
