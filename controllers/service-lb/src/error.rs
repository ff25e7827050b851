//! Controller-specific error types.
//!
//! Errors are classified into terminal ones (the Service must be corrected)
//! and retryable ones (the pass is requeued with backoff).

use kube::Error as KubeError;
use slb_client::CloudError;
use thiserror::Error;

/// Errors that can occur in the service load-balancer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cloud API call failed
    #[error("{action} failed: {source}")]
    Cloud {
        /// Action identity, e.g. `create listener tcp/80 on lb-xxx`
        action: String,
        /// Underlying cloud error
        #[source]
        source: CloudError,
    },

    /// Malformed annotation or inconsistent port declaration
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Immutable attribute change or ownership conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// More than one cloud resource matches a lookup
    #[error("Ambiguous lookup: {0}")]
    Ambiguous(String),

    /// Bounded wait ran out
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Wrap a cloud error with the identity of the action that failed.
    pub fn cloud(action: impl Into<String>, source: CloudError) -> Self {
        Self::Cloud {
            action: action.into(),
            source,
        }
    }

    /// Returns true when a later pass may succeed without the Service changing.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Timeout(_) | Self::Watch(_) => true,
            Self::Cloud { source, .. } => !matches!(source, CloudError::InvalidRequest(_)),
            Self::Validation(_)
            | Self::Conflict(_)
            | Self::Ambiguous(_)
            | Self::InvalidConfig(_)
            | Self::Metrics(_) => false,
        }
    }

    /// Short label used for events and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Kube(_) => "kube",
            Self::Cloud { .. } => "cloud",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Ambiguous(_) => "ambiguous",
            Self::Timeout(_) => "timeout",
            Self::InvalidConfig(_) => "config",
            Self::Metrics(_) => "metrics",
            Self::Watch(_) => "watch",
        }
    }
}
