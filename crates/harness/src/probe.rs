//! Plain HTTP availability probes, independent of the browser

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Status codes treated as "unavailable" by default: every client and server
/// error. Kept in one place because the boundary is a product decision.
pub const UNAVAILABLE_STATUS_FROM: u16 = 400;
pub const UNAVAILABLE_STATUS_TO: u16 = 599;

/// Body marker the monitored sites render on their soft-404 pages.
pub const NOT_FOUND_MARKER: &str = "page not found";

/// Status code and body of a GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get(&self, url: &str) -> HarnessResult<ProbeResponse>;
}

/// When a probe response counts as an available page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPolicy {
    /// First status code considered unavailable
    #[serde(default = "default_status_from")]
    pub unavailable_from: u16,

    /// Last status code considered unavailable (inclusive)
    #[serde(default = "default_status_to")]
    pub unavailable_to: u16,

    /// Case-insensitive body marker of a "not found" page
    #[serde(default = "default_marker")]
    pub not_found_marker: String,
}

fn default_status_from() -> u16 {
    UNAVAILABLE_STATUS_FROM
}

fn default_status_to() -> u16 {
    UNAVAILABLE_STATUS_TO
}

fn default_marker() -> String {
    NOT_FOUND_MARKER.to_string()
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            unavailable_from: UNAVAILABLE_STATUS_FROM,
            unavailable_to: UNAVAILABLE_STATUS_TO,
            not_found_marker: NOT_FOUND_MARKER.to_string(),
        }
    }
}

impl AvailabilityPolicy {
    pub fn status_unavailable(&self, status: u16) -> bool {
        (self.unavailable_from..=self.unavailable_to).contains(&status)
    }

    pub fn body_is_not_found(&self, body: &str) -> bool {
        !self.not_found_marker.is_empty()
            && body
                .to_lowercase()
                .contains(&self.not_found_marker.to_lowercase())
    }

    /// Status outside the unavailable range and no "not found" marker.
    pub fn admits(&self, response: &ProbeResponse) -> bool {
        !self.status_unavailable(response.status) && !self.body_is_not_found(&response.body)
    }
}

/// [`HttpProbe`] over a shared reqwest client. Redirects are followed.
#[derive(Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarnessError::Probe {
                url: String::new(),
                reason: format!("could not build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str) -> HarnessResult<ProbeResponse> {
        let probe_err = |e: reqwest::Error| HarnessError::Probe {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self.client.get(url).send().await.map_err(probe_err)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(probe_err)?;
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        Ok(ProbeResponse { status, body })
    }
}
