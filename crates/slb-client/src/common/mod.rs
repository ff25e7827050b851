//! Common utilities for the SLB API client
//!
//! Every SLB action is a `POST {base}/?Action=<name>&RegionId=<region>` with a
//! JSON body of PascalCase parameters. Errors come back as a non-2xx status
//! with a `{ "Code", "Message", "RequestId" }` body.

pub mod query;

use crate::error::CloudError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Paged response wrapper for `Describe*` actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PagedResponse<T> {
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Error body returned by the API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: String,
}

/// HTTP client wrapper with authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
    region_id: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String, region_id: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            region_id,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the region every action is scoped to
    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// Build the URL for an action
    pub fn action_url(&self, action: &str) -> String {
        format!(
            "{}/?{}",
            self.base_url,
            self.build_query_string(&[("Action", action), ("RegionId", &self.region_id)])
        )
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Invoke an action and decode its JSON response
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<T, CloudError> {
        let url = self.action_url(action);
        debug!("POST {} with body: {}", url, params);

        let response = self.client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_error(action, status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            CloudError::api(
                "DecodeError",
                format!(
                    "error decoding {} response: {} - Response (first 500 chars): {}",
                    action,
                    e,
                    body.chars().take(500).collect::<String>()
                ),
            )
        })
    }

    /// Invoke an action whose response carries nothing but a request id
    pub async fn call_unit(&self, action: &str, params: &serde_json::Value) -> Result<(), CloudError> {
        let _: serde_json::Value = self.call(action, params).await?;
        Ok(())
    }

    /// Build query string from key/value pairs
    pub fn build_query_string(&self, params: &[(&str, &str)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Map a failed response to a `CloudError`
pub fn map_error(action: &str, status: StatusCode, body: &str) -> CloudError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = if parsed.code.is_empty() {
        status.as_u16().to_string()
    } else {
        parsed.code
    };
    let message = if parsed.message.is_empty() {
        body.chars().take(500).collect()
    } else {
        parsed.message
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CloudError::Authentication(format!("{}: {} - {}", action, code, message));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || code.starts_with("Throttling") {
        return CloudError::Throttled(format!("{}: {} - {}", action, code, message));
    }
    if status == StatusCode::NOT_FOUND || code.contains("NotExist") || code.contains("NotFound") {
        return CloudError::NotFound(format!("{}: {} - {}", action, code, message));
    }
    CloudError::Api { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error_classification() {
        let body = r#"{"Code":"InvalidLoadBalancerId.NotFound","Message":"gone","RequestId":"r1"}"#;
        assert!(matches!(
            map_error("DescribeLoadBalancerAttribute", StatusCode::BAD_REQUEST, body),
            CloudError::NotFound(_)
        ));

        let body = r#"{"Code":"Throttling.User","Message":"slow down"}"#;
        assert!(matches!(
            map_error("CreateLoadBalancer", StatusCode::BAD_REQUEST, body),
            CloudError::Throttled(_)
        ));

        assert!(matches!(
            map_error("CreateLoadBalancer", StatusCode::FORBIDDEN, "denied"),
            CloudError::Authentication(_)
        ));

        match map_error("SetLoadBalancerName", StatusCode::BAD_REQUEST, r#"{"Code":"InvalidParameter","Message":"bad"}"#) {
            CloudError::Api { code, message } => {
                assert_eq!(code, "InvalidParameter");
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_action_url_is_encoded() {
        let http = HttpClient::new(
            Client::new(),
            "http://gateway:8080/".to_string(),
            "token".to_string(),
            "cn hangzhou".to_string(),
        );
        assert_eq!(
            http.action_url("DescribeLoadBalancers"),
            "http://gateway:8080/?Action=DescribeLoadBalancers&RegionId=cn%20hangzhou"
        );
    }
}
