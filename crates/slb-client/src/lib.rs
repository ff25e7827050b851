//! Server Load Balancer API Client
//!
//! A Rust client library for the cloud Server Load Balancer (SLB) API used by
//! the service load-balancer controller. Provides typed models for load
//! balancers, listeners, VServer groups and network interfaces, a
//! [`CloudProvider`] trait and an HTTP implementation of it.
//!
//! # Example
//!
//! ```no_run
//! use slb_client::{CloudProvider, LoadBalancerQuery, SlbClient, Tag};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SlbClient::new(
//!     "http://slb-gateway:8080".to_string(),
//!     "your-api-token".to_string(),
//!     "cn-hangzhou".to_string(),
//! )?;
//!
//! // Find load balancers created for a Service
//! let query = LoadBalancerQuery {
//!     tags: vec![Tag::new("kubernetes.do.not.delete", "a1b2c3")],
//!     ..Default::default()
//! };
//! let found = client.describe_load_balancers(&query).await?;
//!
//! for lb in found {
//!     let listeners = client.describe_listeners(&lb.load_balancer_id).await?;
//!     println!("{} has {} listeners", lb.load_balancer_id, listeners.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Load balancers**: describe, create, delete and attribute setters
//! - **Listeners**: per-protocol create/set-attribute plus start/stop/delete
//! - **VServer groups**: backend add/remove/set in bounded batches
//! - **Pagination**: describe calls fetch every page
//! - **test-util**: in-memory [`MockCloudProvider`]

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provider_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::SlbClient;
pub use common::{HttpClient, PagedResponse};
pub use error::CloudError;
pub use models::*;
pub use provider_trait::CloudProvider;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockCloudProvider;

/// Batch size the controller uses for backend add/remove/set calls.
///
/// One below the API limit of [`API_MAX_BACKENDS_PER_CALL`].
pub const MAX_BACKENDS_PER_CALL: usize = 39;
