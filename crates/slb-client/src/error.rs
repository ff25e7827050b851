//! SLB client errors

use thiserror::Error;

/// Errors that can occur when interacting with the load balancer API
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the request with an error code
    #[error("SLB API error {code}: {message}")]
    Api {
        /// Provider error code (e.g. `OperationFailed.ListenerStatusNotSupport`)
        code: String,
        /// Human readable message returned with the code
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request was throttled by the provider
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Invalid request (e.g., missing required fields, batch too large)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CloudError {
    /// Builds an API error from a provider code and message.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true when repeating the same call later may succeed.
    ///
    /// Throttling, transport failures and "resource busy" style codes are
    /// transient; everything else needs a change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Throttled(_) => true,
            Self::Api { code, .. } => {
                code.starts_with("Throttling")
                    || code.contains("IncorrectStatus")
                    || code.contains("ServiceUnavailable")
                    || code == "SystemBusy"
                    || code == "InternalError"
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        assert!(CloudError::Throttled("slow down".to_string()).is_retryable());
        assert!(CloudError::api("Throttling.User", "too fast").is_retryable());
        assert!(CloudError::api("IncorrectStatus.LoadBalancer", "configuring").is_retryable());
        assert!(!CloudError::api("InvalidParameter", "bad port").is_retryable());
        assert!(!CloudError::NotFound("lb-1".to_string()).is_retryable());
        assert!(!CloudError::InvalidRequest("too many backends".to_string()).is_retryable());
    }
}
