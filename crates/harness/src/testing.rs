//! In-memory driver and probe
//!
//! Compiled for this crate's tests and behind the `testing` feature for
//! integration tests. Pages are described as small element trees; CSS and
//! XPath queries are answered from a per-page table of canned results instead
//! of being evaluated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{ElementRef, Locator, PageDriver};
use crate::error::{DriverError, DriverResult, HarnessError, HarnessResult};
use crate::probe::{HttpProbe, ProbeResponse};

/// One element of a fake page.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<FakeElement>,
    /// Time after navigation before the element (and its subtree) is found
    pub visible_after: Option<Duration>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    /// `<a href=...>`
    pub fn link(href: &str) -> Self {
        Self::new("a").with_attr("href", href)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    /// Rendered by script some time after the page loads
    pub fn appearing_after(mut self, delay: Duration) -> Self {
        self.visible_after = Some(delay);
        self
    }

    fn visible(&self, since_load: Duration) -> bool {
        self.visible_after.map_or(true, |delay| since_load >= delay)
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Id(id) => self.id.as_deref() == Some(id.as_str()),
            Locator::Class(class) => self.classes.iter().any(|c| c == class),
            Locator::TagName(tag) => tag == "*" || self.tag.eq_ignore_ascii_case(tag),
            Locator::Css(_) | Locator::XPath(_) => false,
        }
    }

    fn collect_matches<'a>(
        &'a self,
        locator: &Locator,
        since_load: Duration,
        out: &mut Vec<&'a FakeElement>,
    ) {
        for child in self.children.iter().filter(|c| c.visible(since_load)) {
            if child.matches(locator) {
                out.push(child);
            }
            child.collect_matches(locator, since_load, out);
        }
    }
}

/// A page the fake driver can load.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub elements: Vec<FakeElement>,
    /// Canned answers for CSS and XPath selectors, keyed by selector text
    pub queries: HashMap<String, Vec<FakeElement>>,
    /// URL the browser ends up on after loading this page
    pub redirect_to: Option<String>,
    pub fail_navigation: bool,
    /// Navigation never completes
    pub hang: bool,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_query(mut self, selector: &str, results: Vec<FakeElement>) -> Self {
        self.queries.insert(selector.to_string(), results);
        self
    }

    pub fn redirecting_to(mut self, url: &str) -> Self {
        self.redirect_to = Some(url.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[derive(Default)]
struct DriverState {
    current: Option<String>,
    loaded_at: Option<Instant>,
    handles: Vec<FakeElement>,
    navigations: Vec<String>,
}

/// [`PageDriver`] over a fixed set of [`FakePage`]s.
#[derive(Default)]
pub struct FakeDriver {
    pages: HashMap<String, FakePage>,
    state: Mutex<DriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Every URL navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    fn current_page(&self) -> DriverResult<&FakePage> {
        let state = self.state.lock();
        let url = state
            .current
            .as_ref()
            .ok_or_else(|| DriverError::Protocol("no page loaded".to_string()))?;
        self.pages
            .get(url)
            .ok_or_else(|| DriverError::Protocol(format!("no fake page for {}", url)))
    }

    fn since_load(&self) -> Duration {
        self.state
            .lock()
            .loaded_at
            .map_or(Duration::ZERO, |at| at.elapsed())
    }

    fn lookup(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<Vec<FakeElement>> {
        let page = self.current_page()?;
        let since_load = self.since_load();
        if let Locator::Css(selector) | Locator::XPath(selector) = locator {
            let results = page.queries.get(selector).map(Vec::as_slice).unwrap_or_default();
            return Ok(results
                .iter()
                .filter(|e| e.visible(since_load))
                .cloned()
                .collect());
        }

        match scope {
            Some(handle) => {
                let root = self.resolve(handle)?;
                let mut found = Vec::new();
                root.collect_matches(locator, since_load, &mut found);
                Ok(found.into_iter().cloned().collect())
            }
            None => {
                let mut found = Vec::new();
                for element in page.elements.iter().filter(|e| e.visible(since_load)) {
                    if element.matches(locator) {
                        found.push(element);
                    }
                    element.collect_matches(locator, since_load, &mut found);
                }
                Ok(found.into_iter().cloned().collect())
            }
        }
    }

    fn register(&self, element: FakeElement) -> ElementRef {
        let mut state = self.state.lock();
        state.handles.push(element);
        ElementRef(format!("fake-{}", state.handles.len() - 1))
    }

    fn resolve(&self, handle: &ElementRef) -> DriverResult<FakeElement> {
        let index = handle
            .0
            .strip_prefix("fake-")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| DriverError::Protocol(format!("stale element {}", handle.0)))?;
        self.state
            .lock()
            .handles
            .get(index)
            .cloned()
            .ok_or_else(|| DriverError::Protocol(format!("stale element {}", handle.0)))
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.state.lock().navigations.push(url.to_string());
        let page = self.pages.get(url).ok_or_else(|| DriverError::Navigation {
            url: url.to_string(),
            reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })?;
        if page.hang {
            std::future::pending::<()>().await;
        }
        if page.fail_navigation {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }

        let mut state = self.state.lock();
        state.current = Some(url.to_string());
        state.loaded_at = Some(Instant::now());
        state.handles.clear();
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.state.lock();
        let url = state
            .current
            .clone()
            .ok_or_else(|| DriverError::Protocol("no page loaded".to_string()))?;
        Ok(self
            .pages
            .get(&url)
            .and_then(|p| p.redirect_to.clone())
            .unwrap_or(url))
    }

    async fn find_element(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<ElementRef> {
        let first = self
            .lookup(scope, locator)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))?;
        Ok(self.register(first))
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementRef>> {
        let found = self.lookup(scope, locator)?;
        Ok(found.into_iter().map(|e| self.register(e)).collect())
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        Ok(self.resolve(element)?.attributes.get(name).cloned())
    }

    /// `href` and `src` resolve against the current URL like in a browser
    async fn property(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let Some(raw) = self.attribute(element, name).await? else {
            return Ok(None);
        };
        if !matches!(name, "href" | "src") {
            return Ok(Some(raw));
        }
        let base = self.current_url().await?;
        Ok(Some(
            url::Url::parse(&base)
                .and_then(|base| base.join(&raw))
                .map(String::from)
                .unwrap_or(raw),
        ))
    }

    async fn text(&self, element: &ElementRef) -> DriverResult<String> {
        Ok(self.resolve(element)?.text)
    }

    async fn close(&self) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.current = None;
        state.loaded_at = None;
        state.handles.clear();
        Ok(())
    }
}

/// [`HttpProbe`] answering from a table; unknown URLs fail like a refused
/// connection.
#[derive(Default)]
pub struct FakeProbe {
    responses: HashMap<String, ProbeResponse>,
    delay: Option<Duration>,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            ProbeResponse {
                status,
                body: body.to_string(),
            },
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpProbe for FakeProbe {
    async fn get(&self, url: &str) -> HarnessResult<ProbeResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| HarnessError::Probe {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}
