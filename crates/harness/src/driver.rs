//! Page driver capability
//!
//! The harness never talks to a browser directly. Everything goes through
//! [`PageDriver`], which [`crate::webdriver::WebDriverSession`] implements for
//! real browsers and [`crate::testing::FakeDriver`] implements in memory.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::error::{DriverError, DriverResult, HarnessError, HarnessResult};

/// Interval between lookups while a wait budget is being spent.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to find an element on a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Id(String),
    Class(String),
    Css(String),
    XPath(String),
    TagName(String),
}

impl Locator {
    /// Build a locator from the `method|selector` pair used by element checks.
    ///
    /// Only `id`, `class`, `css` and `xpath` are accepted; anything else is an
    /// input error, never a missing element.
    pub fn from_method(method: &str, selector: &str) -> HarnessResult<Self> {
        let selector = selector.to_string();
        match method.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Locator::Id(selector)),
            "class" => Ok(Locator::Class(selector)),
            "css" => Ok(Locator::Css(selector)),
            "xpath" => Ok(Locator::XPath(selector)),
            _ => Err(HarnessError::input(
                "test_input",
                method,
                "unsupported lookup method (expected one of id, class, css, xpath)",
            )),
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Locator::Id(s)
            | Locator::Class(s)
            | Locator::Css(s)
            | Locator::XPath(s)
            | Locator::TagName(s) => s,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Locator::Id(_) => "id",
            Locator::Class(_) => "class",
            Locator::Css(_) => "css",
            Locator::XPath(_) => "xpath",
            Locator::TagName(_) => "tag",
        };
        write!(f, "{}={}", kind, self.selector())
    }
}

/// Opaque handle to an element found by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Browser automation capability consumed by page checks.
///
/// Lookups are single attempts. Waiting is the caller's business, see
/// [`find_with_wait`].
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` in the browser
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// URL of the current document after redirects
    async fn current_url(&self) -> DriverResult<String>;

    /// Find one element, inside `scope` when given. Absence is
    /// [`DriverError::NoSuchElement`].
    async fn find_element(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<ElementRef>;

    /// Find every matching element. Absence is an empty vector.
    async fn find_elements(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementRef>>;

    /// Attribute value as written in the markup (`href="/a"` stays `/a`)
    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>>;

    /// DOM property, e.g. `href` resolved against the document URL
    async fn property(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>>;

    async fn text(&self, element: &ElementRef) -> DriverResult<String>;

    /// Release the browser
    async fn close(&self) -> DriverResult<()>;
}

/// Look an element up, retrying until it shows or `budget` is spent.
pub async fn find_with_wait(
    driver: &dyn PageDriver,
    scope: Option<&ElementRef>,
    locator: &Locator,
    budget: Duration,
) -> DriverResult<ElementRef> {
    let deadline = Instant::now() + budget;
    loop {
        match driver.find_element(scope, locator).await {
            Err(e) if e.is_no_such_element() => {
                let now = Instant::now();
                if now >= deadline {
                    trace!("{} not found within {:?}", locator, budget);
                    return Err(e);
                }
                sleep(POLL_INTERVAL.min(deadline - now)).await;
            }
            other => return other,
        }
    }
}

/// Turn expected absence into `None`, keep every other failure.
pub fn absent_as_none<T>(result: DriverResult<T>) -> DriverResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DriverError::NoSuchElement(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("id", "main" => Locator::Id("main".into()); "id")]
    #[test_case("class", "pager" => Locator::Class("pager".into()); "class")]
    #[test_case("CSS", "div > a" => Locator::Css("div > a".into()); "css upper")]
    #[test_case(" xpath ", "//a" => Locator::XPath("//a".into()); "xpath padded")]
    fn test_from_method_accepts(method: &str, selector: &str) -> Locator {
        Locator::from_method(method, selector).unwrap()
    }

    #[test]
    fn test_from_method_rejects_unknown() {
        let err = Locator::from_method("bogus", "sel").unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_absent_as_none() {
        let missing: DriverResult<u8> = Err(DriverError::NoSuchElement("x".into()));
        assert!(absent_as_none(missing).unwrap().is_none());

        let broken: DriverResult<u8> = Err(DriverError::Protocol("boom".into()));
        assert!(absent_as_none(broken).is_err());
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::Id("a".into()).to_string(), "id=a");
        assert_eq!(Locator::TagName("canvas".into()).to_string(), "tag=canvas");
    }
}
