//! Typed access to the Service's load-balancer annotations.
//!
//! Keys are given without prefix (`address-type`, `health-check-uri`, ...)
//! and resolved against the current prefix first, then the legacy one, then
//! any per-key aliases under both prefixes. Lookups never fail; the parse
//! helpers turn malformed values into validation errors for the caller.

use crate::error::ControllerError;
use std::collections::BTreeMap;

pub const ANNOTATION_PREFIX: &str = "service.beta.kubernetes.io/alibaba-cloud-loadbalancer-";
pub const LEGACY_ANNOTATION_PREFIX: &str = "service.beta.kubernetes.io/alicloud-loadbalancer-";

// Annotation keys
pub const ADDRESS_TYPE: &str = "address-type";
pub const CHARGE_TYPE: &str = "charge-type";
pub const BANDWIDTH: &str = "bandwidth";
pub const SPEC: &str = "spec";
pub const INSTANCE_CHARGE_TYPE: &str = "instance-charge-type";
pub const LOAD_BALANCER_ID: &str = "load-balancer-id";
pub const FORCE_OVERRIDE_LISTENERS: &str = "force-override-listeners";
pub const LOAD_BALANCER_NAME: &str = "name";
pub const MASTER_ZONE_ID: &str = "master-zoneid";
pub const SLAVE_ZONE_ID: &str = "slave-zoneid";
pub const VSWITCH_ID: &str = "vswitch-id";
pub const RESOURCE_GROUP_ID: &str = "resource-group-id";
pub const IP_VERSION: &str = "ip-version";
pub const DELETE_PROTECTION: &str = "delete-protection";
pub const MODIFICATION_PROTECTION: &str = "modification-protection";
pub const ADDITIONAL_TAGS: &str = "additional-resource-tags";
pub const PRESERVE_ON_DELETE: &str = "preserve-lb-on-delete";
pub const PROTOCOL_PORT: &str = "protocol-port";
pub const FORWARD_PORT: &str = "forward-port";
pub const CERT_ID: &str = "cert-id";
pub const TLS_CIPHER_POLICY: &str = "tls-cipher-policy";
pub const HTTP2_ENABLED: &str = "http2-enabled";
pub const SCHEDULER: &str = "scheduler";
pub const PERSISTENCE_TIMEOUT: &str = "persistence-timeout";
pub const ESTABLISHED_TIMEOUT: &str = "established-timeout";
pub const HEALTH_CHECK_FLAG: &str = "health-check-flag";
pub const HEALTH_CHECK_TYPE: &str = "health-check-type";
pub const HEALTH_CHECK_CONNECT_PORT: &str = "health-check-connect-port";
pub const HEALTH_CHECK_CONNECT_TIMEOUT: &str = "health-check-connect-timeout";
pub const HEALTH_CHECK_INTERVAL: &str = "health-check-interval";
pub const HEALTHY_THRESHOLD: &str = "healthy-threshold";
pub const UNHEALTHY_THRESHOLD: &str = "unhealthy-threshold";
pub const HEALTH_CHECK_TIMEOUT: &str = "health-check-timeout";
pub const HEALTH_CHECK_URI: &str = "health-check-uri";
pub const HEALTH_CHECK_DOMAIN: &str = "health-check-domain";
pub const HEALTH_CHECK_HTTP_CODE: &str = "health-check-httpcode";
pub const STICKY_SESSION: &str = "sticky-session";
pub const STICKY_SESSION_TYPE: &str = "sticky-session-type";
pub const COOKIE: &str = "cookie";
pub const COOKIE_TIMEOUT: &str = "cookie-timeout";
pub const ACL_STATUS: &str = "acl-status";
pub const ACL_ID: &str = "acl-id";
pub const ACL_TYPE: &str = "acl-type";
pub const CONNECTION_DRAIN: &str = "connection-drain";
pub const CONNECTION_DRAIN_TIMEOUT: &str = "connection-drain-timeout";
pub const IDLE_TIMEOUT: &str = "idle-timeout";
pub const REQUEST_TIMEOUT: &str = "request-timeout";
pub const X_FORWARDED_FOR_PROTO: &str = "xforwardedfor-proto";
pub const BACKEND_TYPE: &str = "backend-type";
pub const BACKEND_LABEL: &str = "backend-label";
pub const REMOVE_UNSCHEDULED: &str = "remove-unscheduled-backend";
pub const VGROUP_PORT: &str = "vgroup-port";
pub const WEIGHT: &str = "weight";

/// Older spellings still honoured for some keys
fn aliases(key: &str) -> &'static [&'static str] {
    match key {
        LOAD_BALANCER_ID => &["id"],
        FORCE_OVERRIDE_LISTENERS => &["override-listeners"],
        HEALTH_CHECK_FLAG => &["health-check"],
        CERT_ID => &["certificate-id"],
        _ => &[],
    }
}

/// Read-only view over a Service's annotation map
#[derive(Debug, Clone, Copy)]
pub struct AnnotationRequest<'a> {
    annotations: Option<&'a BTreeMap<String, String>>,
}

impl<'a> AnnotationRequest<'a> {
    pub fn new(annotations: Option<&'a BTreeMap<String, String>>) -> Self {
        Self { annotations }
    }

    /// Value of `key`, or `None` when absent or blank under every spelling
    pub fn get(&self, key: &str) -> Option<&'a str> {
        let annotations = self.annotations?;
        std::iter::once(key)
            .chain(aliases(key).iter().copied())
            .flat_map(|k| [format!("{}{}", ANNOTATION_PREFIX, k), format!("{}{}", LEGACY_ANNOTATION_PREFIX, k)])
            .find_map(|full| {
                annotations
                    .get(&full)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
            })
    }

    /// Value of `key`, falling back to its static default
    pub fn get_or_default(&self, key: &str) -> Option<&'a str> {
        self.get(key).or_else(|| Self::get_default(key))
    }

    /// Static default for `key`, independent of any Service
    pub fn get_default(key: &str) -> Option<&'static str> {
        match key {
            ADDRESS_TYPE => Some("internet"),
            CHARGE_TYPE => Some("paybytraffic"),
            SPEC => Some("slb.s1.small"),
            IP_VERSION => Some("ipv4"),
            DELETE_PROTECTION => Some("on"),
            MODIFICATION_PROTECTION => Some("ConsoleProtection"),
            _ => None,
        }
    }

    pub fn parse_i32(&self, key: &str) -> Result<Option<i32>, ControllerError> {
        self.get(key)
            .map(|v| {
                v.parse::<i32>()
                    .map_err(|_| invalid(key, v, "an integer"))
            })
            .transpose()
    }

    /// `true`/`false`
    pub fn parse_bool(&self, key: &str) -> Result<Option<bool>, ControllerError> {
        self.get(key)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(key, v, "true or false")),
            })
            .transpose()
    }

    /// `on`/`off`, normalised to lower case
    pub fn parse_flag(&self, key: &str) -> Result<Option<String>, ControllerError> {
        self.parse_one_of(key, &["on", "off"])
    }

    /// One of `allowed`, matched case-insensitively and returned in its canonical spelling
    pub fn parse_one_of(&self, key: &str, allowed: &[&str]) -> Result<Option<String>, ControllerError> {
        self.get(key)
            .map(|v| {
                allowed
                    .iter()
                    .find(|a| a.eq_ignore_ascii_case(v))
                    .map(|a| a.to_string())
                    .ok_or_else(|| invalid(key, v, &format!("one of {}", allowed.join(", "))))
            })
            .transpose()
    }

    /// Comma separated `left<sep>right` pairs, both sides trimmed and non-empty
    pub fn parse_pairs(&self, key: &str, sep: char) -> Result<Vec<(String, String)>, ControllerError> {
        let Some(value) = self.get(key) else {
            return Ok(Vec::new());
        };
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (left, right) = item
                    .split_once(sep)
                    .ok_or_else(|| invalid(key, item, &format!("a '{}' separated pair", sep)))?;
                let (left, right) = (left.trim(), right.trim());
                if left.is_empty() || right.is_empty() {
                    return Err(invalid(key, item, &format!("a '{}' separated pair", sep)));
                }
                Ok((left.to_string(), right.to_string()))
            })
            .collect()
    }

    /// `k=v,k2=v2` map (additional tags, backend label selector)
    pub fn parse_labels(&self, key: &str) -> Result<BTreeMap<String, String>, ControllerError> {
        Ok(self.parse_pairs(key, '=')?.into_iter().collect())
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> ControllerError {
    ControllerError::Validation(format!(
        "annotation {}{}: '{}' is not {}",
        ANNOTATION_PREFIX, key, value, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_current_prefix_wins_over_legacy() {
        let map = annotations(&[
            ("service.beta.kubernetes.io/alicloud-loadbalancer-address-type", "intranet"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-address-type", "internet"),
            ("service.beta.kubernetes.io/alicloud-loadbalancer-spec", "slb.s2.small"),
        ]);
        let request = AnnotationRequest::new(Some(&map));

        assert_eq!(request.get(ADDRESS_TYPE), Some("internet"));
        assert_eq!(request.get(SPEC), Some("slb.s2.small"));
        assert_eq!(request.get(SCHEDULER), None);
    }

    #[test]
    fn test_alias_and_blank_values() {
        let map = annotations(&[
            ("service.beta.kubernetes.io/alicloud-loadbalancer-id", "lb-123"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-scheduler", "  "),
        ]);
        let request = AnnotationRequest::new(Some(&map));

        assert_eq!(request.get(LOAD_BALANCER_ID), Some("lb-123"));
        assert_eq!(request.get(SCHEDULER), None);
        assert_eq!(AnnotationRequest::new(None).get(LOAD_BALANCER_ID), None);
    }

    #[test]
    fn test_defaults_are_static() {
        let request = AnnotationRequest::new(None);
        assert_eq!(request.get_or_default(ADDRESS_TYPE), Some("internet"));
        assert_eq!(AnnotationRequest::get_default(SPEC), Some("slb.s1.small"));
        assert_eq!(AnnotationRequest::get_default(BANDWIDTH), None);
    }

    #[test]
    fn test_typed_parsers() {
        let map = annotations(&[
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-bandwidth", "50"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-weight", "ten"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-delete-protection", "OFF"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-preserve-lb-on-delete", "True"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-connection-drain", "maybe"),
        ]);
        let request = AnnotationRequest::new(Some(&map));

        assert_eq!(request.parse_i32(BANDWIDTH).unwrap(), Some(50));
        assert!(request.parse_i32(WEIGHT).is_err());
        assert_eq!(request.parse_i32(COOKIE_TIMEOUT).unwrap(), None);
        assert_eq!(request.parse_flag(DELETE_PROTECTION).unwrap().as_deref(), Some("off"));
        assert_eq!(request.parse_bool(PRESERVE_ON_DELETE).unwrap(), Some(true));
        assert!(request.parse_flag(CONNECTION_DRAIN).is_err());
    }

    #[test]
    fn test_pair_lists() {
        let map = annotations(&[
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-protocol-port", "https:443, http:80"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-forward-port", "80"),
            ("service.beta.kubernetes.io/alibaba-cloud-loadbalancer-additional-resource-tags", "team=web,env=prod"),
        ]);
        let request = AnnotationRequest::new(Some(&map));

        assert_eq!(
            request.parse_pairs(PROTOCOL_PORT, ':').unwrap(),
            vec![
                ("https".to_string(), "443".to_string()),
                ("http".to_string(), "80".to_string())
            ]
        );
        let err = request.parse_pairs(FORWARD_PORT, ':').unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        let tags = request.parse_labels(ADDITIONAL_TAGS).unwrap();
        assert_eq!(tags.get("team").map(String::as_str), Some("web"));
        assert_eq!(tags.len(), 2);
    }
}
