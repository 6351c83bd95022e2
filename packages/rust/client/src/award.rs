//! Keyed lookup against the secondary award API.
//!
//! One GET per award id, issued through the shared [`RateLimiter`]. The
//! response object is flattened (`_`-joined nested keys) into string fields
//! namespaced under the `usas_` prefix so they can never collide with
//! listing columns. A transient transport error is retried once; everything
//! else surfaces as a per-record enrichment error for the caller to contain.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use grantsync_shared::{AWARD_PREFIX, AwardApiConfig, GrantSyncError, Result};

use crate::limiter::RateLimiter;
use crate::listing::USER_AGENT;

/// Client for the award-lookup API.
pub struct AwardClient {
    client: Client,
    root_url: String,
    limiter: Arc<RateLimiter>,
}

impl AwardClient {
    /// Build an award client sharing `limiter` with any concurrent callers.
    pub fn new(config: &AwardApiConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                GrantSyncError::Enrichment(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            root_url: config.root_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    /// The request URL for an award id. Exposed so failures can be logged
    /// with the exact URL attempted.
    pub fn lookup_url(&self, award_id: &str) -> String {
        format!("{}/{award_id}", self.root_url)
    }

    /// Resolve one award id to its flattened, `usas_`-prefixed field map.
    pub async fn lookup(&self, award_id: &str) -> Result<BTreeMap<String, String>> {
        let url = self.lookup_url(award_id);

        let mut retried = false;
        loop {
            self.limiter.acquire().await;

            match self.try_lookup(&url).await {
                Ok(fields) => return Ok(fields),
                Err((err, transient)) if transient && !retried => {
                    warn!(%url, error = %err, "transient award lookup failure, retrying once");
                    retried = true;
                }
                Err((err, _)) => return Err(err),
            }
        }
    }

    /// One lookup attempt. The bool marks transport errors worth one retry.
    async fn try_lookup(&self, url: &str) -> std::result::Result<BTreeMap<String, String>, (GrantSyncError, bool)> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let transient = e.is_timeout() || e.is_connect();
            (GrantSyncError::Enrichment(format!("{url}: {e}")), transient)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err((
                GrantSyncError::Enrichment(format!("{url}: HTTP {status}")),
                false,
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            (
                GrantSyncError::Enrichment(format!("{url}: decode failed: {e}")),
                false,
            )
        })?;

        let fields = flatten_award(&body);
        debug!(%url, fields = fields.len(), "award resolved");
        Ok(fields)
    }
}

/// Flatten an award response into `usas_`-prefixed string fields. Nested
/// object keys are joined with `_`; arrays are kept as JSON text; nulls are
/// dropped (they round-trip as empty CSV cells anyway).
pub fn flatten_award(body: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    flatten_into(body, AWARD_PREFIX.trim_end_matches('_'), &mut fields);
    fields
}

fn flatten_into(value: &Value, key: &str, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(v, &format!("{key}_{k}"), out);
            }
        }
        Value::Null => {}
        Value::Array(_) => {
            out.insert(key.to_string(), value.to_string());
        }
        Value::String(s) => {
            out.insert(key.to_string(), s.clone());
        }
        other => {
            out.insert(key.to_string(), other.to_string());
        }
    }
}
