//! Pagination helpers for `Describe*` actions

use crate::common::{HttpClient, PagedResponse};
use crate::error::CloudError;
use serde::Deserialize;
use tracing::debug;

/// Page size requested from paged actions
pub const PAGE_SIZE: u32 = 50;

/// Fetch every page of a paged action
///
/// # Arguments
/// * `http` - HTTP client wrapper
/// * `action` - Action name (e.g. `DescribeLoadBalancers`)
/// * `params` - Filter parameters; `PageNumber`/`PageSize` are added per page
pub async fn describe_all<T: for<'de> Deserialize<'de>>(
    http: &HttpClient,
    action: &str,
    params: serde_json::Value,
) -> Result<Vec<T>, CloudError> {
    let mut all_results = Vec::new();
    let mut page_number: u32 = 1;

    loop {
        let mut body = params.clone();
        if let Some(map) = body.as_object_mut() {
            map.insert("PageNumber".to_string(), page_number.into());
            map.insert("PageSize".to_string(), PAGE_SIZE.into());
        }
        debug!("Fetching {} page {}", action, page_number);

        let page: PagedResponse<T> = http.call(action, &body).await?;
        let fetched = page.items.len();
        all_results.extend(page.items);

        if fetched == 0 || all_results.len() as u64 >= page.total_count {
            break;
        }
        page_number += 1;
    }

    Ok(all_results)
}
