//! Per-protocol listener configuration.
//!
//! `ListenerConfig` is a tagged union with one struct per protocol. Fields
//! every protocol accepts live in `CommonConfig` and are applied through
//! `apply_common`; the rest are set on the protocol struct itself. Only
//! annotated fields are populated, so an unset field never overrides what
//! the cloud currently holds.

use crate::annotation::{self as keys, AnnotationRequest};
use crate::error::ControllerError;
use crate::model::Protocol;
use slb_client::ListenerSettings;

const FLAG_ON: &str = "on";

/// Fields accepted by every protocol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonConfig {
    pub scheduler: Option<String>,
    pub acl_status: Option<String>,
    pub acl_type: Option<String>,
    pub acl_id: Option<String>,
    pub health_check_connect_port: Option<i32>,
    pub health_check_interval: Option<i32>,
    pub healthy_threshold: Option<i32>,
    pub unhealthy_threshold: Option<i32>,
}

impl CommonConfig {
    pub fn from_annotations(request: &AnnotationRequest<'_>) -> Result<Self, ControllerError> {
        Ok(Self {
            scheduler: request.get(keys::SCHEDULER).map(str::to_string),
            acl_status: request.parse_flag(keys::ACL_STATUS)?,
            acl_type: request.parse_one_of(keys::ACL_TYPE, &["white", "black"])?,
            acl_id: request.get(keys::ACL_ID).map(str::to_string),
            health_check_connect_port: request.parse_i32(keys::HEALTH_CHECK_CONNECT_PORT)?,
            health_check_interval: request.parse_i32(keys::HEALTH_CHECK_INTERVAL)?,
            healthy_threshold: request.parse_i32(keys::HEALTHY_THRESHOLD)?,
            unhealthy_threshold: request.parse_i32(keys::UNHEALTHY_THRESHOLD)?,
        })
    }

    fn write(&self, settings: &mut ListenerSettings) {
        settings.scheduler = self.scheduler.clone();
        settings.acl_status = self.acl_status.clone();
        settings.acl_type = self.acl_type.clone();
        settings.acl_id = self.acl_id.clone();
        settings.health_check_connect_port = self.health_check_connect_port;
        settings.health_check_interval = self.health_check_interval;
        settings.healthy_threshold = self.healthy_threshold;
        settings.unhealthy_threshold = self.unhealthy_threshold;
    }

    fn read(settings: &ListenerSettings) -> Self {
        Self {
            scheduler: settings.scheduler.clone(),
            acl_status: settings.acl_status.clone(),
            acl_type: settings.acl_type.clone(),
            acl_id: settings.acl_id.clone(),
            health_check_connect_port: settings.health_check_connect_port,
            health_check_interval: settings.health_check_interval,
            healthy_threshold: settings.healthy_threshold,
            unhealthy_threshold: settings.unhealthy_threshold,
        }
    }
}

/// TCP listener
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpConfig {
    pub common: CommonConfig,
    pub persistence_timeout: Option<i32>,
    pub established_timeout: Option<i32>,
    /// `tcp` or `http`
    pub health_check_type: Option<String>,
    pub health_check_connect_timeout: Option<i32>,
    pub health_check_uri: Option<String>,
    pub health_check_domain: Option<String>,
    pub health_check_http_code: Option<String>,
    pub connection_drain: Option<String>,
    pub connection_drain_timeout: Option<i32>,
}

/// UDP listener
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpConfig {
    pub common: CommonConfig,
    pub persistence_timeout: Option<i32>,
    pub health_check_connect_timeout: Option<i32>,
    pub connection_drain: Option<String>,
    pub connection_drain_timeout: Option<i32>,
}

/// Fields shared by HTTP and HTTPS listeners
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpOptions {
    /// Health check switch, `on` or `off`
    pub health_check: Option<String>,
    pub health_check_timeout: Option<i32>,
    pub health_check_uri: Option<String>,
    pub health_check_domain: Option<String>,
    pub health_check_http_code: Option<String>,
    pub sticky_session: Option<String>,
    /// `insert` or `server`
    pub sticky_session_type: Option<String>,
    pub cookie: Option<String>,
    pub cookie_timeout: Option<i32>,
    pub idle_timeout: Option<i32>,
    pub request_timeout: Option<i32>,
    pub x_forwarded_for_proto: Option<String>,
}

impl HttpOptions {
    fn from_annotations(request: &AnnotationRequest<'_>) -> Result<Self, ControllerError> {
        Ok(Self {
            health_check: request.parse_flag(keys::HEALTH_CHECK_FLAG)?,
            health_check_timeout: request.parse_i32(keys::HEALTH_CHECK_TIMEOUT)?,
            health_check_uri: request.get(keys::HEALTH_CHECK_URI).map(str::to_string),
            health_check_domain: request.get(keys::HEALTH_CHECK_DOMAIN).map(str::to_string),
            health_check_http_code: request.get(keys::HEALTH_CHECK_HTTP_CODE).map(str::to_string),
            sticky_session: request.parse_flag(keys::STICKY_SESSION)?,
            sticky_session_type: request.parse_one_of(keys::STICKY_SESSION_TYPE, &["insert", "server"])?,
            cookie: request.get(keys::COOKIE).map(str::to_string),
            cookie_timeout: request.parse_i32(keys::COOKIE_TIMEOUT)?,
            idle_timeout: request.parse_i32(keys::IDLE_TIMEOUT)?,
            request_timeout: request.parse_i32(keys::REQUEST_TIMEOUT)?,
            x_forwarded_for_proto: request.parse_flag(keys::X_FORWARDED_FOR_PROTO)?,
        })
    }

    fn write(&self, settings: &mut ListenerSettings) {
        settings.health_check = self.health_check.clone();
        settings.health_check_timeout = self.health_check_timeout;
        settings.health_check_uri = self.health_check_uri.clone();
        settings.health_check_domain = self.health_check_domain.clone();
        settings.health_check_http_code = self.health_check_http_code.clone();
        settings.sticky_session = self.sticky_session.clone();
        settings.sticky_session_type = self.sticky_session_type.clone();
        settings.cookie = self.cookie.clone();
        settings.cookie_timeout = self.cookie_timeout;
        settings.idle_timeout = self.idle_timeout;
        settings.request_timeout = self.request_timeout;
        settings.x_forwarded_for_proto = self.x_forwarded_for_proto.clone();
    }

    fn read(settings: &ListenerSettings) -> Self {
        Self {
            health_check: settings.health_check.clone(),
            health_check_timeout: settings.health_check_timeout,
            health_check_uri: settings.health_check_uri.clone(),
            health_check_domain: settings.health_check_domain.clone(),
            health_check_http_code: settings.health_check_http_code.clone(),
            sticky_session: settings.sticky_session.clone(),
            sticky_session_type: settings.sticky_session_type.clone(),
            cookie: settings.cookie.clone(),
            cookie_timeout: settings.cookie_timeout,
            idle_timeout: settings.idle_timeout,
            request_timeout: settings.request_timeout,
            x_forwarded_for_proto: settings.x_forwarded_for_proto.clone(),
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpConfig {
    pub common: CommonConfig,
    pub http: HttpOptions,
    /// Redirect every request to this HTTPS listener port
    pub forward_port: Option<i32>,
}

/// HTTPS listener
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpsConfig {
    pub common: CommonConfig,
    pub http: HttpOptions,
    pub server_certificate_id: Option<String>,
    pub enable_http2: Option<String>,
    pub tls_cipher_policy: Option<String>,
}

/// Listener configuration, one variant per protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerConfig {
    Tcp(TcpConfig),
    Udp(UdpConfig),
    Http(HttpConfig),
    Https(HttpsConfig),
}

impl ListenerConfig {
    /// Empty configuration for a protocol
    pub fn new(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => Self::Tcp(TcpConfig::default()),
            Protocol::Udp => Self::Udp(UdpConfig::default()),
            Protocol::Http => Self::Http(HttpConfig::default()),
            Protocol::Https => Self::Https(HttpsConfig::default()),
        }
    }

    /// Build from the Service annotations. Annotations a protocol does not
    /// accept are ignored for that protocol.
    pub fn from_annotations(protocol: Protocol, request: &AnnotationRequest<'_>) -> Result<Self, ControllerError> {
        let mut config = match protocol {
            Protocol::Tcp => Self::Tcp(TcpConfig {
                persistence_timeout: request.parse_i32(keys::PERSISTENCE_TIMEOUT)?,
                established_timeout: request.parse_i32(keys::ESTABLISHED_TIMEOUT)?,
                health_check_type: request.parse_one_of(keys::HEALTH_CHECK_TYPE, &["tcp", "http"])?,
                health_check_connect_timeout: request.parse_i32(keys::HEALTH_CHECK_CONNECT_TIMEOUT)?,
                health_check_uri: request.get(keys::HEALTH_CHECK_URI).map(str::to_string),
                health_check_domain: request.get(keys::HEALTH_CHECK_DOMAIN).map(str::to_string),
                health_check_http_code: request.get(keys::HEALTH_CHECK_HTTP_CODE).map(str::to_string),
                connection_drain: request.parse_flag(keys::CONNECTION_DRAIN)?,
                connection_drain_timeout: request.parse_i32(keys::CONNECTION_DRAIN_TIMEOUT)?,
                ..Default::default()
            }),
            Protocol::Udp => Self::Udp(UdpConfig {
                persistence_timeout: request.parse_i32(keys::PERSISTENCE_TIMEOUT)?,
                health_check_connect_timeout: request.parse_i32(keys::HEALTH_CHECK_CONNECT_TIMEOUT)?,
                connection_drain: request.parse_flag(keys::CONNECTION_DRAIN)?,
                connection_drain_timeout: request.parse_i32(keys::CONNECTION_DRAIN_TIMEOUT)?,
                ..Default::default()
            }),
            Protocol::Http => Self::Http(HttpConfig {
                http: HttpOptions::from_annotations(request)?,
                ..Default::default()
            }),
            Protocol::Https => {
                let server_certificate_id = request.get(keys::CERT_ID).map(str::to_string);
                if server_certificate_id.is_none() {
                    return Err(ControllerError::Validation(format!(
                        "https listeners need the {}{} annotation",
                        keys::ANNOTATION_PREFIX,
                        keys::CERT_ID
                    )));
                }
                Self::Https(HttpsConfig {
                    http: HttpOptions::from_annotations(request)?,
                    server_certificate_id,
                    enable_http2: request.parse_flag(keys::HTTP2_ENABLED)?,
                    tls_cipher_policy: request.get(keys::TLS_CIPHER_POLICY).map(str::to_string),
                    ..Default::default()
                })
            }
        };
        config.apply_common(CommonConfig::from_annotations(request)?);
        Ok(config)
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Tcp(_) => Protocol::Tcp,
            Self::Udp(_) => Protocol::Udp,
            Self::Http(_) => Protocol::Http,
            Self::Https(_) => Protocol::Https,
        }
    }

    pub fn common(&self) -> &CommonConfig {
        match self {
            Self::Tcp(c) => &c.common,
            Self::Udp(c) => &c.common,
            Self::Http(c) => &c.common,
            Self::Https(c) => &c.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonConfig {
        match self {
            Self::Tcp(c) => &mut c.common,
            Self::Udp(c) => &mut c.common,
            Self::Http(c) => &mut c.common,
            Self::Https(c) => &mut c.common,
        }
    }

    pub fn apply_common(&mut self, common: CommonConfig) {
        *self.common_mut() = common;
    }

    /// Port this listener redirects to, HTTP only
    pub fn forward_port(&self) -> Option<i32> {
        match self {
            Self::Http(c) => c.forward_port,
            _ => None,
        }
    }

    pub fn set_forward_port(&mut self, port: i32) {
        if let Self::Http(c) = self {
            c.forward_port = Some(port);
        }
    }

    /// A forwarding listener has no backends of its own
    pub fn is_forwarding(&self) -> bool {
        self.forward_port().is_some()
    }

    /// Settings for the cloud API, without description and VServer group
    pub fn to_settings(&self) -> ListenerSettings {
        let mut settings = ListenerSettings::default();
        self.common().write(&mut settings);
        match self {
            Self::Tcp(c) => {
                settings.persistence_timeout = c.persistence_timeout;
                settings.established_timeout = c.established_timeout;
                settings.health_check_type = c.health_check_type.clone();
                settings.health_check_connect_timeout = c.health_check_connect_timeout;
                settings.health_check_uri = c.health_check_uri.clone();
                settings.health_check_domain = c.health_check_domain.clone();
                settings.health_check_http_code = c.health_check_http_code.clone();
                settings.connection_drain = c.connection_drain.clone();
                settings.connection_drain_timeout = c.connection_drain_timeout;
            }
            Self::Udp(c) => {
                settings.persistence_timeout = c.persistence_timeout;
                settings.health_check_connect_timeout = c.health_check_connect_timeout;
                settings.connection_drain = c.connection_drain.clone();
                settings.connection_drain_timeout = c.connection_drain_timeout;
            }
            Self::Http(c) => {
                c.http.write(&mut settings);
                if let Some(port) = c.forward_port {
                    settings.listener_forward = Some(FLAG_ON.to_string());
                    settings.forward_port = Some(port);
                }
            }
            Self::Https(c) => {
                c.http.write(&mut settings);
                settings.server_certificate_id = c.server_certificate_id.clone();
                settings.enable_http2 = c.enable_http2.clone();
                settings.tls_cipher_policy = c.tls_cipher_policy.clone();
            }
        }
        settings
    }

    /// Rebuild a configuration from what the cloud reports
    pub fn from_remote(protocol: Protocol, settings: &ListenerSettings) -> Self {
        let common = CommonConfig::read(settings);
        match protocol {
            Protocol::Tcp => Self::Tcp(TcpConfig {
                common,
                persistence_timeout: settings.persistence_timeout,
                established_timeout: settings.established_timeout,
                health_check_type: settings.health_check_type.clone(),
                health_check_connect_timeout: settings.health_check_connect_timeout,
                health_check_uri: settings.health_check_uri.clone(),
                health_check_domain: settings.health_check_domain.clone(),
                health_check_http_code: settings.health_check_http_code.clone(),
                connection_drain: settings.connection_drain.clone(),
                connection_drain_timeout: settings.connection_drain_timeout,
            }),
            Protocol::Udp => Self::Udp(UdpConfig {
                common,
                persistence_timeout: settings.persistence_timeout,
                health_check_connect_timeout: settings.health_check_connect_timeout,
                connection_drain: settings.connection_drain.clone(),
                connection_drain_timeout: settings.connection_drain_timeout,
            }),
            Protocol::Http => Self::Http(HttpConfig {
                common,
                http: HttpOptions::read(settings),
                forward_port: if settings.listener_forward.as_deref() == Some(FLAG_ON) {
                    settings.forward_port
                } else {
                    None
                },
            }),
            Protocol::Https => Self::Https(HttpsConfig {
                common,
                http: HttpOptions::read(settings),
                server_certificate_id: settings.server_certificate_id.clone(),
                enable_http2: settings.enable_http2.clone(),
                tls_cipher_policy: settings.tls_cipher_policy.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (format!("{}{}", keys::ANNOTATION_PREFIX, k), v.to_string()))
            .collect()
    }

    #[test]
    fn test_only_annotated_fields_are_set() {
        let map = annotations(&[("scheduler", "wrr"), ("health-check-interval", "5")]);
        let config = ListenerConfig::from_annotations(Protocol::Tcp, &AnnotationRequest::new(Some(&map))).unwrap();

        let settings = config.to_settings();
        assert_eq!(settings.scheduler.as_deref(), Some("wrr"));
        assert_eq!(settings.health_check_interval, Some(5));
        assert_eq!(
            settings,
            ListenerSettings {
                scheduler: Some("wrr".to_string()),
                health_check_interval: Some(5),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_protocol_specific_fields_stay_with_their_protocol() {
        let map = annotations(&[("cookie-timeout", "1800"), ("persistence-timeout", "60")]);
        let request = AnnotationRequest::new(Some(&map));

        let udp = ListenerConfig::from_annotations(Protocol::Udp, &request).unwrap().to_settings();
        assert_eq!(udp.persistence_timeout, Some(60));
        assert_eq!(udp.cookie_timeout, None);

        let http = ListenerConfig::from_annotations(Protocol::Http, &request).unwrap().to_settings();
        assert_eq!(http.cookie_timeout, Some(1800));
        assert_eq!(http.persistence_timeout, None);
    }

    #[test]
    fn test_https_requires_certificate() {
        let request_map = annotations(&[]);
        let err = ListenerConfig::from_annotations(Protocol::Https, &AnnotationRequest::new(Some(&request_map)))
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));

        let map = annotations(&[("cert-id", "cert-1"), ("http2-enabled", "on")]);
        let settings = ListenerConfig::from_annotations(Protocol::Https, &AnnotationRequest::new(Some(&map)))
            .unwrap()
            .to_settings();
        assert_eq!(settings.server_certificate_id.as_deref(), Some("cert-1"));
        assert_eq!(settings.enable_http2.as_deref(), Some("on"));
    }

    #[test]
    fn test_forwarding_survives_remote_round_trip() {
        let mut config = ListenerConfig::new(Protocol::Http);
        config.set_forward_port(443);
        let settings = config.to_settings();
        assert_eq!(settings.listener_forward.as_deref(), Some("on"));

        let remote = ListenerConfig::from_remote(Protocol::Http, &settings);
        assert!(remote.is_forwarding());
        assert_eq!(remote, config);

        let plain = ListenerSettings {
            listener_forward: Some("off".to_string()),
            forward_port: Some(443),
            ..Default::default()
        };
        assert!(!ListenerConfig::from_remote(Protocol::Http, &plain).is_forwarding());
    }

    #[test]
    fn test_apply_common_replaces_shared_fields() {
        let mut config = ListenerConfig::new(Protocol::Udp);
        config.apply_common(CommonConfig {
            scheduler: Some("wlc".to_string()),
            ..Default::default()
        });
        assert_eq!(config.common().scheduler.as_deref(), Some("wlc"));
        assert_eq!(config.protocol(), Protocol::Udp);
    }
}
