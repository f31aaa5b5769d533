//! Row dispatcher: one row in, exactly one outcome out
//!
//! Each row moves PENDING → RUNNING → {PASSED, FAILED, ERRORED}. Resolving
//! the row into a typed [`Check`] and a page handle is the PENDING → RUNNING
//! step. A predicate that returns and an assertion that holds (or not) gives
//! PASSED or FAILED. Anything the predicate raises gives ERRORED, and so does
//! a check that outlives its timeout.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::catalog::Viewer;
use crate::driver::{Locator, PageDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::links::{default_concurrency, LinkChecker};
use crate::pages::{PageContext, PageHandle, TranscriptStatus, WaitPolicy};
use crate::probe::{AvailabilityPolicy, HttpProbe};
use crate::report::ReportSink;
use crate::validate::{Check, RawRow, TestRow};

/// Terminal state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    /// The page answered and the assertion did not hold
    Failed,
    /// The check could not be carried out
    Errored,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => f.write_str("Passed"),
            Verdict::Failed => f.write_str("Failed"),
            Verdict::Errored => f.write_str("Error"),
        }
    }
}

/// Structured result of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub row_index: usize,
    /// `test_type` as written in the sheet
    pub test_type: String,
    pub url: String,
    pub verdict: Verdict,
    pub message: String,
    pub elapsed: Duration,
}

impl Outcome {
    /// `Some(true/false)` for a verdict, `None` when the row errored.
    pub fn passed(&self) -> Option<bool> {
        match self.verdict {
            Verdict::Passed => Some(true),
            Verdict::Failed => Some(false),
            Verdict::Errored => None,
        }
    }

    /// Value of the `test result` output column
    pub fn result_label(&self) -> String {
        match self.verdict {
            Verdict::Errored => format!("Error: {}", self.message),
            verdict => verdict.to_string(),
        }
    }
}

/// Knobs for a dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub waits: WaitPolicy,
    pub availability: AvailabilityPolicy,
    /// Upper bound on one row, waits and link probes included
    pub check_timeout: Duration,
    pub link_concurrency: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            waits: WaitPolicy::default(),
            availability: AvailabilityPolicy::default(),
            check_timeout: Duration::from_secs(300),
            link_concurrency: default_concurrency(),
        }
    }
}

/// Result of a predicate checked against its expectation
#[derive(Debug)]
struct Assertion {
    passed: bool,
    message: String,
}

impl Assertion {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    fn holds(condition: bool, on_pass: impl Into<String>, on_fail: impl Into<String>) -> Self {
        if condition {
            Self::pass(on_pass)
        } else {
            Self::fail(on_fail)
        }
    }

    /// Compare a count read off the page; `None` means nothing was there to read.
    fn count(what: &str, expected: u64, actual: Option<u64>) -> Self {
        match actual {
            Some(actual) if actual == expected => Self::pass(format!("{} is {}.", what, actual)),
            Some(actual) => Self::fail(format!("Expected {}, but got {}.", expected, actual)),
            None => Self::fail(format!("Expected {}, but no {} was found.", expected, what)),
        }
    }
}

/// Routes validated rows to page predicates.
pub struct Dispatcher {
    ctx: PageContext,
    links: LinkChecker,
    check_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        probe: Arc<dyn HttpProbe>,
        settings: DispatchSettings,
    ) -> Self {
        let links = LinkChecker::new(
            probe.clone(),
            settings.availability.clone(),
            settings.link_concurrency,
        );
        Self {
            ctx: PageContext {
                driver,
                probe,
                waits: settings.waits,
                availability: settings.availability,
            },
            links,
            check_timeout: settings.check_timeout,
        }
    }

    /// Run rows strictly one after another, in input order.
    pub async fn run_rows(&self, rows: &[RawRow], sink: &mut dyn ReportSink) {
        info!("Running {} row(s)...", rows.len());
        for row in rows {
            let outcome = self.dispatch(row).await;
            sink.record(outcome);
        }
    }

    /// Execute one row. Never fails: every error becomes an ERRORED outcome.
    pub async fn dispatch(&self, raw: &RawRow) -> Outcome {
        let start = Instant::now();
        let result = match timeout(self.check_timeout, self.execute(raw)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout(self.check_timeout)),
        };
        let elapsed = start.elapsed();

        let (verdict, message) = match result {
            Ok(Assertion { passed: true, message }) => (Verdict::Passed, message),
            Ok(Assertion { passed: false, message }) => (Verdict::Failed, message),
            Err(e) => {
                error!(
                    "Row {} ({}) errored on {}: {}",
                    raw.number(),
                    raw.test_type,
                    raw.url,
                    e
                );
                (Verdict::Errored, e.to_string())
            }
        };

        match verdict {
            Verdict::Passed => info!(
                "✓ row {} {} ({} ms)",
                raw.number(),
                raw.test_type,
                elapsed.as_millis()
            ),
            Verdict::Failed => info!("✗ row {} {} - {}", raw.number(), raw.test_type, message),
            Verdict::Errored => {}
        }

        Outcome {
            row_index: raw.index,
            test_type: raw.test_type.clone(),
            url: raw.url.clone(),
            verdict,
            message,
            elapsed,
        }
    }

    /// Release the browser session
    pub async fn close(&self) -> HarnessResult<()> {
        self.ctx.driver.close().await?;
        Ok(())
    }

    async fn execute(&self, raw: &RawRow) -> HarnessResult<Assertion> {
        let row = TestRow::try_from(raw)?;
        let check = Check::from_row(&row)?;
        debug!(
            "Row {} pending -> running: {} on {}",
            raw.number(),
            row.test_type.label(),
            row.url
        );
        self.run_check(&self.ctx.page(row.url.as_str()), check).await
    }

    async fn run_check(&self, page: &PageHandle<'_>, check: Check) -> HarnessResult<Assertion> {
        match check {
            Check::SiteAvailability => self.site_availability(page).await,
            Check::FacetLoad(facet) => {
                let present = page.facet_present(facet).await?;
                Ok(Assertion::holds(
                    present,
                    format!("Facet '{}' is present.", facet),
                    format!("Facet '{}' was not found.", facet),
                ))
            }
            Check::CollectionCount(expected) => {
                let actual = page.collection_count().await?;
                Ok(Assertion::count("collection count", expected, actual))
            }
            Check::ViewerLoad(viewer) => self.viewer_load(page, viewer).await,
            Check::MiradorPageCount(expected) => {
                let actual = page.mirador_page_count().await?;
                Ok(Assertion::count("Mirador page count", expected, actual))
            }
            Check::AbleplayerTranscriptLoad => self.transcript_load(page).await,
            Check::ElementPresent(locator) => self.element_present(page, &locator).await,
            Check::InvalidLinks => self.invalid_links(page).await,
            Check::PermalinkRedirect(expected) => {
                self.permalink_redirect(page, expected.as_str()).await
            }
            Check::RestOaiPmhXmlValidity => {
                let valid = page.is_valid_oai_pmh_xml().await?;
                Ok(Assertion::holds(
                    valid,
                    "OAI-PMH response is valid.",
                    "OAI-PMH response is unavailable or reports an error.",
                ))
            }
        }
    }

    async fn site_availability(&self, page: &PageHandle<'_>) -> HarnessResult<Assertion> {
        let available = page.is_available().await?;
        Ok(Assertion::holds(
            available,
            "Site is available.",
            format!("Site {} is unavailable.", page.url()),
        ))
    }

    async fn viewer_load(&self, page: &PageHandle<'_>, viewer: Viewer) -> HarnessResult<Assertion> {
        let loaded = page.viewer_loaded(viewer).await?;
        Ok(Assertion::holds(
            loaded,
            format!("{} viewer loaded.", viewer.name()),
            format!("{} viewer did not load.", viewer.name()),
        ))
    }

    async fn transcript_load(&self, page: &PageHandle<'_>) -> HarnessResult<Assertion> {
        Ok(match page.ableplayer_transcript_status().await? {
            TranscriptStatus::Loaded => Assertion::pass("AblePlayer transcript loaded."),
            TranscriptStatus::TranscriptMissing => {
                Assertion::fail("AblePlayer loaded, but its transcript did not.")
            }
            TranscriptStatus::PlayerMissing => {
                Assertion::fail("AblePlayer did not load, so no transcript could be checked.")
            }
        })
    }

    async fn element_present(
        &self,
        page: &PageHandle<'_>,
        locator: &Locator,
    ) -> HarnessResult<Assertion> {
        let present = page.has_element(locator).await?;
        Ok(Assertion::holds(
            present,
            format!("Element {} is present.", locator),
            format!("Element {} was not found.", locator),
        ))
    }

    async fn invalid_links(&self, page: &PageHandle<'_>) -> HarnessResult<Assertion> {
        let links = page.harvest_links().await?;
        let total = links.len();
        let broken = self.links.check(links).await;

        Ok(if broken.is_empty() {
            Assertion::pass(format!("All {} link(s) are available.", total))
        } else {
            Assertion::fail(format!(
                "{} of {} link(s) are unavailable: {}",
                broken.len(),
                total,
                broken.join(", ")
            ))
        })
    }

    async fn permalink_redirect(
        &self,
        page: &PageHandle<'_>,
        expected: &str,
    ) -> HarnessResult<Assertion> {
        let target = page.redirect_target().await?;
        if !self.ctx.page(target.as_str()).is_available().await? {
            return Ok(Assertion::fail(format!(
                "Redirect target {} is unavailable.",
                target
            )));
        }

        Ok(Assertion::holds(
            same_location(&target, expected),
            format!("Redirected to {}.", target),
            format!("Expected redirect to {}, but landed on {}.", expected, target),
        ))
    }
}

/// URL equality ignoring trailing slashes.
fn same_location(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("https://example.org/a/", "https://example.org/a" => true; "trailing slash")]
    #[test_case("https://example.org/a", "https://example.org/a//" => true; "double slash")]
    #[test_case("https://example.org/a", "https://example.org/b" => false; "different path")]
    #[test_case("http://example.org/a", "https://example.org/a" => false; "scheme matters")]
    fn test_same_location(a: &str, b: &str) -> bool {
        same_location(a, b)
    }

    #[test]
    fn test_count_assertion_messages() {
        let ok = Assertion::count("collection count", 42, Some(42));
        assert!(ok.passed);

        let wrong = Assertion::count("collection count", 43, Some(42));
        assert!(!wrong.passed);
        assert_eq!(wrong.message, "Expected 43, but got 42.");

        let missing = Assertion::count("collection count", 43, None);
        assert!(!missing.passed);
        assert!(missing.message.contains("no collection count"));
    }

    #[test]
    fn test_result_label() {
        let mut outcome = Outcome {
            row_index: 0,
            test_type: "site_availability_test".into(),
            url: "https://example.org".into(),
            verdict: Verdict::Passed,
            message: "Site is available.".into(),
            elapsed: Duration::from_millis(5),
        };
        assert_eq!(outcome.result_label(), "Passed");
        assert_eq!(outcome.passed(), Some(true));

        outcome.verdict = Verdict::Errored;
        outcome.message = "Check timed out after 1s".into();
        assert_eq!(outcome.result_label(), "Error: Check timed out after 1s");
        assert_eq!(outcome.passed(), None);
    }
}
