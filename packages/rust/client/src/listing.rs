//! Paged fetching of the primary listing API.
//!
//! Requests successive pages of one endpoint until the server's reported
//! page total is reached or a page comes back empty, concatenating the item
//! lists in order. Any non-success response or malformed body is fatal for
//! the run; there is no silent truncation.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use grantsync_shared::{GrantSyncError, ListingApiConfig, Result};

/// User-Agent string for outbound requests.
pub const USER_AGENT: &str = concat!("grantsync/", env!("CARGO_PKG_VERSION"));

/// One raw listing item, exactly as returned by the API.
pub type RawRecord = serde_json::Map<String, Value>;

/// Client for the paginated listing endpoint.
pub struct ListingClient {
    client: Client,
    config: ListingApiConfig,
}

impl ListingClient {
    /// Build a listing client from config. Timeouts are bounded here; a page
    /// request can never suspend indefinitely.
    pub fn new(config: ListingApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GrantSyncError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Fetch every page of `endpoint` into one ordered record list.
    ///
    /// Termination: the reported `meta.pages` total when present, otherwise
    /// the first empty item list. Cancellation is observed at page
    /// boundaries.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn fetch_all_pages(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRecord>> {
        let url = format!(
            "{}/{endpoint}",
            self.config.root_url.trim_end_matches('/')
        );

        let mut records: Vec<RawRecord> = Vec::new();
        let mut page: u64 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(GrantSyncError::validation("run cancelled"));
            }

            let body = self.fetch_page(&url, page).await?;
            let (items, total_pages) = parse_page(&body, endpoint)?;

            debug!(page, items = items.len(), ?total_pages, "page fetched");

            if items.is_empty() {
                break;
            }
            records.extend(items);

            match total_pages {
                Some(total) if page >= total => break,
                // No page-count metadata: keep going until an empty page.
                _ => page += 1,
            }
        }

        info!(pages = page, records = records.len(), "listing fetch complete");
        Ok(records)
    }

    /// Fetch a single page body.
    async fn fetch_page(&self, url: &str, page: u64) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("sort_by", self.config.sort_by.as_str()),
                ("sort_order", self.config.sort_order.as_str()),
            ])
            .query(&[("per_page", self.config.per_page as u64), ("page", page)])
            .send()
            .await
            .map_err(|e| GrantSyncError::Fetch(format!("{url}?page={page}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantSyncError::Fetch(format!(
                "{url}?page={page}: HTTP {status}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GrantSyncError::Decode(format!("{url}?page={page}: {e}")))
    }
}

/// Extract the item list and the optional reported page total from a page
/// body. The item list lives under `result.<endpoint>`, pagination metadata
/// under `meta.pages`.
fn parse_page(body: &Value, endpoint: &str) -> Result<(Vec<RawRecord>, Option<u64>)> {
    let items = body
        .get("result")
        .and_then(|r| r.get(endpoint))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GrantSyncError::Decode(format!("response missing result.{endpoint} item list"))
        })?;

    let records = items
        .iter()
        .map(|item| {
            item.as_object().cloned().ok_or_else(|| {
                GrantSyncError::Decode(format!("non-object item in result.{endpoint}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_pages = body.get("meta").and_then(|m| m.get("pages")).and_then(Value::as_u64);

    Ok((records, total_pages))
}
