//! Outbound link validation
//!
//! Links are probed over plain HTTP only, never through the browser: the
//! browser session is a single non-reentrant resource, while HTTP probes
//! against independent URLs are idempotent and share nothing. This is what
//! lets the checker fan out.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::probe::{AvailabilityPolicy, HttpProbe};

/// Deduplicated, insertion-ordered absolute URLs harvested from one page.
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    links: Vec<String>,
    seen: HashSet<String>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link; returns false if it was already present.
    pub fn insert(&mut self, link: impl Into<String>) -> bool {
        let link = link.into();
        if self.seen.contains(&link) {
            return false;
        }
        self.seen.insert(link.clone());
        self.links.push(link);
        true
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.links
    }
}

impl<S: Into<String>> FromIterator<S> for LinkSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for link in iter {
            set.insert(link);
        }
        set
    }
}

/// Absolute http(s) link filter applied while harvesting anchors.
pub fn is_absolute_http(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Default fan-out: one probe per available core.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Probes a page's links with bounded parallelism.
pub struct LinkChecker {
    probe: Arc<dyn HttpProbe>,
    policy: AvailabilityPolicy,
    concurrency: usize,
}

impl LinkChecker {
    pub fn new(probe: Arc<dyn HttpProbe>, policy: AvailabilityPolicy, concurrency: usize) -> Self {
        Self {
            probe,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Return every unavailable link, in the order they appear in `links`.
    ///
    /// All probes complete before this returns.
    pub async fn check(&self, links: LinkSet) -> Vec<String> {
        let total = links.len();
        let this = self;

        let mut probed: Vec<(usize, String, bool)> = stream::iter(
            links.into_vec().into_iter().enumerate(),
        )
        .map(move |(position, link)| async move {
            let available = this.link_available(&link).await;
            (position, link, available)
        })
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        probed.sort_by_key(|(position, _, _)| *position);
        let broken: Vec<String> = probed
            .into_iter()
            .filter(|(_, _, available)| !available)
            .map(|(_, link, _)| link)
            .collect();

        info!(
            "Checked {} link(s) with up to {} in flight: {} unavailable",
            total,
            self.concurrency,
            broken.len()
        );
        broken
    }

    async fn link_available(&self, link: &str) -> bool {
        match self.probe.get(link).await {
            Ok(resp) => {
                let ok = self.policy.admits(&resp);
                if !ok {
                    debug!("Link {} unavailable (status {})", link, resp.status);
                }
                ok
            }
            Err(e) => {
                // An unreachable host is a broken link, not a harness failure.
                debug!("Link {} unreachable: {}", link, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProbe;
    use std::time::Duration;
    use test_case::test_case;

    #[test_case("https://example.org" => true; "https")]
    #[test_case("HTTP://EXAMPLE.ORG/a" => true; "upper http")]
    #[test_case("mailto:someone@example.org" => false; "mailto")]
    #[test_case("/collections" => false; "relative")]
    #[test_case("#top" => false; "fragment")]
    #[test_case("javascript:void(0)" => false; "javascript")]
    fn test_is_absolute_http(href: &str) -> bool {
        is_absolute_http(href)
    }

    #[test]
    fn test_link_set_dedups_in_order() {
        let set: LinkSet = ["https://b", "https://a", "https://b", "https://c", "https://a"]
            .into_iter()
            .collect();
        assert_eq!(set.into_vec(), vec!["https://b", "https://a", "https://c"]);
    }

    #[tokio::test]
    async fn test_check_reports_every_broken_link() {
        let probe = FakeProbe::new()
            .with_page("https://ok.example/1", 200, "fine")
            .with_page("https://ok.example/2", 301, "moved")
            .with_page("https://gone.example/a", 404, "")
            .with_page("https://soft.example/b", 200, "<h1>Page not found</h1>")
            .with_page("https://down.example/c", 503, "");
        let links: LinkSet = [
            "https://gone.example/a",
            "https://ok.example/1",
            "https://unreachable.example/x",
            "https://soft.example/b",
            "https://ok.example/2",
            "https://down.example/c",
        ]
        .into_iter()
        .collect();

        let checker = LinkChecker::new(Arc::new(probe), AvailabilityPolicy::default(), 3);
        let broken = checker.check(links).await;

        assert_eq!(
            broken,
            vec![
                "https://gone.example/a",
                "https://unreachable.example/x",
                "https://soft.example/b",
                "https://down.example/c",
            ]
        );
    }

    #[tokio::test]
    async fn test_check_respects_concurrency_bound() {
        let mut probe = FakeProbe::new().with_delay(Duration::from_millis(20));
        let mut links = LinkSet::new();
        for i in 0..8 {
            let url = format!("https://example.org/{}", i);
            probe = probe.with_page(&url, 200, "ok");
            links.insert(url);
        }
        let probe = Arc::new(probe);

        let checker = LinkChecker::new(probe.clone(), AvailabilityPolicy::default(), 2);
        assert!(checker.check(links).await.is_empty());
        assert_eq!(probe.requests(), 8);
        assert!(probe.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_empty_set() {
        let checker =
            LinkChecker::new(Arc::new(FakeProbe::new()), AvailabilityPolicy::default(), 0);
        assert_eq!(checker.concurrency(), 1);
        assert!(checker.check(LinkSet::new()).await.is_empty());
    }
}
