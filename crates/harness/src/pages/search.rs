//! Collection listing and advanced search pages

use tracing::debug;

use super::PageHandle;
use crate::catalog::Facet;
use crate::driver::Locator;
use crate::error::{HarnessError, HarnessResult};

/// Class of the "x - y of z" summary above paginated listings
pub const PAGER_SUMMARY_CLASS: &str = "pager__summary";

impl PageHandle<'_> {
    /// Total from the pager summary, `None` if the page has no pager.
    pub async fn collection_count(&self) -> HarnessResult<Option<u64>> {
        self.load().await?;
        let locator = Locator::Class(PAGER_SUMMARY_CLASS.to_string());
        let Some(summary) = self.lookup(None, &locator, self.ctx.waits.element).await? else {
            debug!("No pager summary on {}", self.url);
            return Ok(None);
        };

        let text = self.driver().text(&summary).await?;
        parse_pager_total(&text).map(Some).ok_or_else(|| HarnessError::UnexpectedContent {
            url: self.url.clone(),
            reason: format!("pager summary '{}' does not end in a count", text.trim()),
        })
    }

    pub async fn facet_present(&self, facet: Facet) -> HarnessResult<bool> {
        self.has_element(&Locator::Id(facet.element_id().to_string()))
            .await
    }
}

/// Last whitespace-delimited token of a pager summary, as a count.
fn parse_pager_total(text: &str) -> Option<u64> {
    text.split_whitespace()
        .last()
        .map(|token| token.replace(',', ""))
        .and_then(|token| token.parse().ok())
}
