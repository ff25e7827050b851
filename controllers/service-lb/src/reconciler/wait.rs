//! Bounded polling for asynchronous cloud state changes.

use crate::error::ControllerError;
use slb_client::{CloudProvider, LB_STATUS_ACTIVE, LISTENER_STATUS_RUNNING, LoadBalancerAttribute};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Poll interval and overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Poll `probe` until it yields a value. Errors from the probe end the wait.
pub async fn wait_for<T, F, Fut>(what: &str, poll: PollConfig, mut probe: F) -> Result<T, ControllerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ControllerError>>,
{
    let deadline = Instant::now() + poll.timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(ControllerError::Timeout(format!(
                "{} did not complete within {:?}",
                what, poll.timeout
            )));
        }
        debug!("Waiting for {}", what);
        sleep(poll.interval).await;
    }
}

pub async fn wait_load_balancer_active(
    cloud: &dyn CloudProvider,
    lb_id: &str,
    poll: PollConfig,
) -> Result<LoadBalancerAttribute, ControllerError> {
    wait_for(&format!("load balancer {} to become active", lb_id), poll, || async {
        let attribute = cloud
            .describe_load_balancer_attribute(lb_id)
            .await
            .map_err(|e| ControllerError::cloud(format!("describe load balancer {}", lb_id), e))?;
        Ok((attribute.load_balancer_status == LB_STATUS_ACTIVE).then_some(attribute))
    })
    .await
}

pub async fn wait_listener_running(
    cloud: &dyn CloudProvider,
    lb_id: &str,
    port: i32,
    protocol: &str,
    poll: PollConfig,
) -> Result<(), ControllerError> {
    wait_for(&format!("listener {}/{} on {} to run", protocol, port, lb_id), poll, || async {
        let listeners = cloud
            .describe_listeners(lb_id)
            .await
            .map_err(|e| ControllerError::cloud(format!("describe listeners of {}", lb_id), e))?;
        let running = listeners.iter().any(|l| {
            l.listener_port == port && l.listener_protocol == protocol && l.status == LISTENER_STATUS_RUNNING
        });
        Ok(running.then_some(()))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use slb_client::{CreateLoadBalancerRequest, MockCloudProvider};

    fn fast() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_waits_for_activation() {
        let mock = MockCloudProvider::default();
        mock.set_activation_polls(2);
        let created = mock
            .create_load_balancer(&CreateLoadBalancerRequest {
                load_balancer_name: "a1".to_string(),
                address_type: "internet".to_string(),
                client_token: "t".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let attribute = wait_load_balancer_active(&mock, &created.load_balancer_id, fast()).await.unwrap();
        assert_eq!(attribute.load_balancer_status, LB_STATUS_ACTIVE);
        assert_eq!(mock.call_count("DescribeLoadBalancerAttribute"), 3);
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock = MockCloudProvider::default();
        let mut lb = cloud_load_balancer("lb-1", "stuck");
        lb.load_balancer_status = "inactive".to_string();
        mock.add_load_balancer(lb, vec![]);

        let poll = PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };
        let err = wait_load_balancer_active(&mock, "lb-1", poll).await.unwrap_err();
        assert!(matches!(err, ControllerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_probe_error_ends_wait() {
        let mock = MockCloudProvider::default();
        let err = wait_load_balancer_active(&mock, "lb-missing", fast()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Cloud { .. }));
    }
}
