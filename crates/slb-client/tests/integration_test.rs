//! Integration tests for the SLB client
//!
//! These tests require a reachable SLB gateway.
//! Set SLB_ENDPOINT, SLB_TOKEN and SLB_REGION environment variables to run.

use slb_client::{CloudProvider, LoadBalancerQuery, SlbClient};

fn client() -> SlbClient {
    let url = std::env::var("SLB_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let token = std::env::var("SLB_TOKEN")
        .expect("SLB_TOKEN environment variable must be set");
    let region = std::env::var("SLB_REGION")
        .unwrap_or_else(|_| "cn-hangzhou".to_string());

    SlbClient::new(url, token, region).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires a reachable SLB gateway
async fn test_describe_load_balancers() {
    let client = client();

    let lbs = client
        .describe_load_balancers(&LoadBalancerQuery::default())
        .await
        .expect("Failed to describe load balancers");

    println!("Found {} load balancers", lbs.len());
}

#[tokio::test]
#[ignore]
async fn test_describe_listeners_and_vgroups() {
    let client = client();

    let lbs = client
        .describe_load_balancers(&LoadBalancerQuery::default())
        .await
        .expect("Failed to describe load balancers");

    if let Some(lb) = lbs.first() {
        let listeners = client
            .describe_listeners(&lb.load_balancer_id)
            .await
            .expect("Failed to describe listeners");
        let groups = client
            .describe_vserver_groups(&lb.load_balancer_id)
            .await
            .expect("Failed to describe VServer groups");
        println!(
            "{}: {} listeners, {} VServer groups",
            lb.load_balancer_id,
            listeners.len(),
            groups.len()
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_missing_load_balancer_is_not_found() {
    let client = client();

    let result = client.describe_load_balancer_attribute("lb-does-not-exist").await;
    assert!(matches!(result, Err(slb_client::CloudError::NotFound(_))));
}
