//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_CLOUD_ENDPOINT: &str = "http://slb-gateway.kube-system:8080";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_CONCURRENCY: u16 = 3;
pub const DEFAULT_RESYNC_SECS: u64 = 600;
pub const DEFAULT_CLOUD_TIMEOUT_SECS: u64 = 30;

/// Settings the controller is started with
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub cluster_id: String,
    pub region_id: String,
    pub cloud_endpoint: String,
    pub cloud_token: String,
    /// VPC new load balancers are placed in (intranet) and ENIs are resolved in
    pub vpc_id: Option<String>,
    pub namespace: Option<String>,
    pub metrics_addr: SocketAddr,
    pub concurrency: u16,
    pub resync_interval: Duration,
    pub cloud_timeout: Duration,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} environment variable is required", key))
            })
        };

        let metrics_addr = get("METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = metrics_addr.parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!("METRICS_ADDR '{}': {}", metrics_addr, e))
        })?;

        let concurrency = parse_number(get("RECONCILE_CONCURRENCY"), "RECONCILE_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            cluster_id: required("CLUSTER_ID")?,
            region_id: required("REGION_ID")?,
            cloud_endpoint: get("CLOUD_ENDPOINT").unwrap_or_else(|| DEFAULT_CLOUD_ENDPOINT.to_string()),
            cloud_token: required("CLOUD_TOKEN")?,
            vpc_id: get("VPC_ID"),
            namespace: get("WATCH_NAMESPACE"),
            metrics_addr,
            concurrency,
            resync_interval: Duration::from_secs(parse_number(
                get("RESYNC_INTERVAL_SECS"),
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_SECS,
            )?),
            cloud_timeout: Duration::from_secs(parse_number(
                get("CLOUD_API_TIMEOUT_SECS"),
                "CLOUD_API_TIMEOUT_SECS",
                DEFAULT_CLOUD_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ControllerError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ControllerError::InvalidConfig(format!("{} must be a positive integer, got '{}'", key, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("CLUSTER_ID", "c1"),
            ("REGION_ID", "cn-hangzhou"),
            ("CLOUD_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.cloud_endpoint, DEFAULT_CLOUD_ENDPOINT);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.resync_interval, Duration::from_secs(600));
        assert_eq!(config.cloud_timeout, Duration::from_secs(30));
        assert_eq!(config.metrics_addr.port(), 8080);
        assert!(config.namespace.is_none());
        assert!(config.vpc_id.is_none());
    }

    #[test]
    fn test_missing_required_variable() {
        let err = ControllerConfig::from_lookup(lookup(&[("REGION_ID", "cn-hangzhou"), ("CLOUD_TOKEN", "x")]))
            .unwrap_err();
        assert!(err.to_string().contains("CLUSTER_ID"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let base = [("CLUSTER_ID", "c1"), ("REGION_ID", "r"), ("CLOUD_TOKEN", "t")];

        let mut vars = base.to_vec();
        vars.push(("RECONCILE_CONCURRENCY", "many"));
        assert!(ControllerConfig::from_lookup(lookup(&vars)).is_err());

        let mut vars = base.to_vec();
        vars.push(("RECONCILE_CONCURRENCY", "0"));
        assert!(ControllerConfig::from_lookup(lookup(&vars)).is_err());

        let mut vars = base.to_vec();
        vars.push(("METRICS_ADDR", "not-an-addr"));
        assert!(ControllerConfig::from_lookup(lookup(&vars)).is_err());
    }
}
