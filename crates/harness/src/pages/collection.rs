//! Collection item pages: embedded viewers, transcripts and permalinks

use std::sync::OnceLock;

use regex::Regex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::PageHandle;
use crate::catalog::Viewer;
use crate::driver::{Locator, POLL_INTERVAL};
use crate::error::HarnessResult;

/// Text nodes that look like Mirador's "1 of N" page indicator
pub const MIRADOR_PAGER_XPATH: &str =
    "//*[contains(text(), '1 of ') and not(contains(text(), '1 of 0'))]";

pub const TRANSCRIPT_CLASS: &str = "able-transcript";

/// Structural path of the ARK permalink anchor on an item page
pub const PERMALINK_XPATH: &str = "/html/body/div/div[2]/div/div[2]/div/div/div/div/div/div[2]/main/section/section/div[5]/div/div/div/div/div/div/span/div/div[3]/a";

fn mirador_pager_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b1 of (\d+)\b").expect("mirador pager pattern is valid"))
}

/// What an AblePlayer transcript check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptStatus {
    PlayerMissing,
    TranscriptMissing,
    Loaded,
}

impl PageHandle<'_> {
    /// The viewer's container rendered, with its canvas where it has one.
    pub async fn viewer_loaded(&self, viewer: Viewer) -> HarnessResult<bool> {
        self.load().await?;
        self.viewer_rendered(viewer).await
    }

    /// Viewer check against the already loaded document.
    async fn viewer_rendered(&self, viewer: Viewer) -> HarnessResult<bool> {
        let budget = match viewer {
            Viewer::Mirador => self.ctx.waits.mirador,
            _ => self.ctx.waits.element,
        };

        let container = Locator::Class(viewer.container_class().to_string());
        let Some(container) = self.lookup(None, &container, budget).await? else {
            debug!("{} container absent on {}", viewer.name(), self.url);
            return Ok(false);
        };

        match viewer.rendered_tag() {
            Some(tag) => {
                let nested = self
                    .lookup(Some(&container), &Locator::TagName(tag.to_string()), budget)
                    .await?;
                Ok(nested.is_some())
            }
            None => Ok(true),
        }
    }

    /// Page total from Mirador's "1 of N" indicator.
    ///
    /// `None` when the viewer does not load or no indicator appears within
    /// the Mirador wait budget.
    pub async fn mirador_page_count(&self) -> HarnessResult<Option<u64>> {
        if !self.viewer_loaded(Viewer::Mirador).await? {
            return Ok(None);
        }

        let budget = self.ctx.waits.mirador;
        let deadline = Instant::now() + budget;
        let locator = Locator::XPath(MIRADOR_PAGER_XPATH.to_string());
        loop {
            for node in self.driver().find_elements(None, &locator).await? {
                let text = self.driver().text(&node).await?;
                if let Some(count) = parse_mirador_total(&text) {
                    return Ok(Some(count));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("No Mirador page indicator on {} within {:?}", self.url, budget);
                return Ok(None);
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    pub async fn ableplayer_transcript_status(&self) -> HarnessResult<TranscriptStatus> {
        self.load().await?;
        if !self.viewer_rendered(Viewer::AblePlayer).await? {
            return Ok(TranscriptStatus::PlayerMissing);
        }

        let transcript = Locator::Class(TRANSCRIPT_CLASS.to_string());
        Ok(match self.lookup(None, &transcript, self.ctx.waits.element).await? {
            Some(_) => TranscriptStatus::Loaded,
            None => TranscriptStatus::TranscriptMissing,
        })
    }

    pub async fn ableplayer_transcript_loaded(&self) -> HarnessResult<bool> {
        Ok(self.ableplayer_transcript_status().await? == TranscriptStatus::Loaded)
    }

    /// Follow the page's permalink anchor and return where it lands.
    pub async fn permalink_redirect_target(&self) -> HarnessResult<Option<String>> {
        self.load().await?;
        self.follow_permalink().await
    }

    async fn follow_permalink(&self) -> HarnessResult<Option<String>> {
        let locator = Locator::XPath(PERMALINK_XPATH.to_string());
        let Some(anchor) = self.lookup(None, &locator, self.ctx.waits.element).await? else {
            return Ok(None);
        };
        let Some(href) = self.driver().property(&anchor, "href").await? else {
            return Ok(None);
        };

        debug!("Following permalink {} from {}", href, self.url);
        self.driver().navigate(&href).await?;
        Ok(Some(self.driver().current_url().await?))
    }

    /// Where loading this URL ends up: through the permalink anchor when the
    /// page has one, otherwise wherever the browser was redirected.
    pub async fn redirect_target(&self) -> HarnessResult<String> {
        self.load().await?;
        match self.follow_permalink().await? {
            Some(target) => Ok(target),
            None => Ok(self.driver().current_url().await?),
        }
    }
}

fn parse_mirador_total(text: &str) -> Option<u64> {
    mirador_pager_pattern()
        .captures(text)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .filter(|&n| n > 0)
}
