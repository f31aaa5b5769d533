//! Page model: semantic questions about one URL
//!
//! A [`PageHandle`] pairs the shared driver capability with a target URL. It
//! is cheap, created per check and never persisted. The predicates are split
//! by the kind of page they apply to:
//!
//! - this module: availability, element presence, link harvesting
//! - [`search`]: collection listings and facets
//! - [`collection`]: viewers, transcripts, permalinks
//! - [`oai`]: the REST OAI-PMH endpoint
//!
//! Element absence is never an error here. It becomes `false` or `None`.
//! Navigation failures and protocol errors propagate.

pub mod collection;
pub mod oai;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::{absent_as_none, find_with_wait, ElementRef, Locator, PageDriver};
use crate::error::HarnessResult;
use crate::links::{is_absolute_http, LinkSet};
use crate::probe::{AvailabilityPolicy, HttpProbe, ProbeResponse};

pub use collection::TranscriptStatus;

/// How long element lookups may wait for content to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Budget for ordinary lookups
    pub element: Duration,
    /// Budget for the Mirador viewer, which initializes asynchronously
    pub mirador: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(20),
            mirador: Duration::from_secs(40),
        }
    }
}

/// Capabilities and policies shared by every page check of a run.
#[derive(Clone)]
pub struct PageContext {
    pub driver: Arc<dyn PageDriver>,
    pub probe: Arc<dyn HttpProbe>,
    pub waits: WaitPolicy,
    pub availability: AvailabilityPolicy,
}

impl PageContext {
    pub fn page(&self, url: impl Into<String>) -> PageHandle<'_> {
        PageHandle {
            ctx: self,
            url: url.into(),
        }
    }
}

pub struct PageHandle<'a> {
    ctx: &'a PageContext,
    url: String,
}

impl<'a> PageHandle<'a> {
    pub fn url(&self) -> &str {
        &self.url
    }

    fn driver(&self) -> &dyn PageDriver {
        self.ctx.driver.as_ref()
    }

    /// Load the page in the browser
    pub async fn load(&self) -> HarnessResult<()> {
        debug!("Loading {}", self.url);
        self.driver().navigate(&self.url).await?;
        Ok(())
    }

    /// Single lookup under a wait budget; `None` when the element is absent.
    async fn lookup(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
        budget: Duration,
    ) -> HarnessResult<Option<ElementRef>> {
        let found = absent_as_none(find_with_wait(self.driver(), scope, locator, budget).await)?;
        Ok(found)
    }

    /// HTTP status and body check first, then a browser load.
    ///
    /// A page that passes the HTTP check but fails to load in the browser is
    /// unavailable. Transport failures of the HTTP check itself propagate.
    pub async fn is_available(&self) -> HarnessResult<bool> {
        let response = self.ctx.probe.get(&self.url).await?;
        self.available_given(&response).await
    }

    pub(crate) async fn available_given(&self, response: &ProbeResponse) -> HarnessResult<bool> {
        let policy = &self.ctx.availability;
        if policy.status_unavailable(response.status) {
            debug!("{} answered {}", self.url, response.status);
            return Ok(false);
        }
        if policy.body_is_not_found(&response.body) {
            debug!("{} renders the not-found marker", self.url);
            return Ok(false);
        }

        match self.driver().navigate(&self.url).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("{} passed the HTTP probe but failed to load: {}", self.url, e);
                Ok(false)
            }
        }
    }

    /// Presence check for a `method|selector` pair from an input row.
    pub async fn contains_element(&self, method: &str, selector: &str) -> HarnessResult<bool> {
        let locator = Locator::from_method(method, selector)?;
        self.has_element(&locator).await
    }

    pub async fn has_element(&self, locator: &Locator) -> HarnessResult<bool> {
        self.load().await?;
        let found = self.lookup(None, locator, self.ctx.waits.element).await?;
        Ok(found.is_some())
    }

    /// Every absolute http(s) anchor target on the page, first-seen order.
    pub async fn harvest_links(&self) -> HarnessResult<LinkSet> {
        self.load().await?;
        let anchors = self
            .driver()
            .find_elements(None, &Locator::TagName("a".to_string()))
            .await?;

        let mut links = LinkSet::new();
        for anchor in &anchors {
            if let Some(href) = self.driver().attribute(anchor, "href").await? {
                if is_absolute_http(&href) {
                    links.insert(href.trim().to_string());
                }
            }
        }
        debug!(
            "Harvested {} link(s) from {} anchor(s) on {}",
            links.len(),
            anchors.len(),
            self.url
        );
        Ok(links)
    }
}
