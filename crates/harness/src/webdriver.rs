//! W3C WebDriver client
//!
//! Talks the JSON protocol spoken by chromedriver and geckodriver over
//! reqwest. One [`WebDriverSession`] is one browser; commands are sent one at
//! a time by the dispatcher.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::driver::{ElementRef, Locator, PageDriver};
use crate::driver_process::DriverProcess;
use crate::error::{DriverError, DriverResult};

/// Key under which W3C drivers return element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Slack on top of the page load timeout for the HTTP client itself
const COMMAND_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }

    fn capabilities(&self, headless: bool) -> Value {
        match self {
            Browser::Chrome => {
                let mut args = vec![
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--window-size=1920,1080",
                ];
                if headless {
                    args.push("--headless=new");
                }
                json!({ "browserName": "chrome", "goog:chromeOptions": { "args": args } })
            }
            Browser::Firefox => {
                let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
                json!({ "browserName": "firefox", "moz:firefoxOptions": { "args": args } })
            }
        }
    }
}

/// How to reach (or launch) the browser driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDriverConfig {
    /// Base URL of a running driver
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub browser: Browser,

    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default = "default_page_load_secs")]
    pub page_load_timeout_secs: u64,

    /// Driver executable to launch instead of connecting to `url`
    #[serde(default)]
    pub binary: Option<PathBuf>,
}

fn default_url() -> String {
    "http://127.0.0.1:9515".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_page_load_secs() -> u64 {
    60
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            browser: Browser::default(),
            headless: default_headless(),
            page_load_timeout_secs: default_page_load_secs(),
            binary: None,
        }
    }
}

impl WebDriverConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

/// A live browser session.
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
    // Held so a launched driver lives exactly as long as the session
    _process: Option<DriverProcess>,
}

impl WebDriverSession {
    /// Launch the driver if a binary is configured, then open a session.
    pub async fn start(config: &WebDriverConfig) -> DriverResult<Self> {
        let (base_url, process) = match &config.binary {
            Some(binary) => {
                let process = DriverProcess::spawn(binary, config.browser).await?;
                (process.base_url().to_string(), Some(process))
            }
            None => (config.url.trim_end_matches('/').to_string(), None),
        };

        let client = reqwest::Client::builder()
            .timeout(config.page_load_timeout() + COMMAND_SLACK)
            .build()?;

        let body = json!({
            "capabilities": { "alwaysMatch": config.browser.capabilities(config.headless) }
        });
        let resp = client
            .post(format!("{}/session", base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DriverError::Startup(format!("{} unreachable: {}", base_url, e)))?;
        let ok = resp.status().is_success();
        let value = unwrap_value(resp.json().await?);
        if !ok {
            return Err(DriverError::Startup(protocol_error(&value).to_string()));
        }

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DriverError::Startup("new session response has no sessionId".to_string())
            })?;
        info!("Started {} session {} via {}", config.browser.as_str(), session_id, base_url);

        let session = Self {
            client,
            session_url: format!("{}/session/{}", base_url, session_id),
            _process: process,
        };

        // Waiting is done per lookup by the caller, never by the driver.
        session
            .command(
                Method::POST,
                "/timeouts",
                Some(json!({
                    "implicit": 0,
                    "pageLoad": config.page_load_timeout().as_millis() as u64,
                })),
            )
            .await?;

        Ok(session)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> DriverResult<Value> {
        let url = format!("{}{}", self.session_url, path);
        debug!("WebDriver {} {}", method, path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await?;
        let ok = resp.status().is_success();
        let value = unwrap_value(resp.json().await?);
        if ok {
            Ok(value)
        } else {
            Err(protocol_error(&value))
        }
    }

    fn element_path(element: &ElementRef, suffix: &str) -> String {
        format!("/element/{}{}", element.0, suffix)
    }

    /// `GET /element/{id}/{kind}/{name}`, `null` mapped to `None`
    async fn element_value(
        &self,
        element: &ElementRef,
        kind: &str,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let path = Self::element_path(element, &format!("/{}/{}", kind, name));
        Ok(match self.command(Method::GET, &path, None).await? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    fn search_path(scope: Option<&ElementRef>, many: bool) -> String {
        let tail = if many { "/elements" } else { "/element" };
        match scope {
            Some(element) => Self::element_path(element, tail),
            None => tail.to_string(),
        }
    }
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| DriverError::Protocol("current URL is not a string".to_string()))
    }

    async fn find_element(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<ElementRef> {
        let value = self
            .command(Method::POST, &Self::search_path(scope, false), Some(strategy(locator)))
            .await?;
        element_ref(&value)
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementRef>> {
        let value = self
            .command(Method::POST, &Self::search_path(scope, true), Some(strategy(locator)))
            .await?;
        match value {
            Value::Array(items) => items.iter().map(element_ref).collect(),
            other => Err(DriverError::Protocol(format!("expected element list, got {}", other))),
        }
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        self.element_value(element, "attribute", name).await
    }

    async fn property(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        self.element_value(element, "property", name).await
    }

    async fn text(&self, element: &ElementRef) -> DriverResult<String> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> DriverResult<()> {
        if let Err(e) = self.command(Method::DELETE, "", None).await {
            warn!("Failed to end WebDriver session: {}", e);
            return Err(e);
        }
        info!("WebDriver session closed");
        Ok(())
    }
}

/// W3C location strategy for a locator. Id and class go through CSS.
fn strategy(locator: &Locator) -> Value {
    let (using, value) = match locator {
        Locator::Id(id) => ("css selector", format!("[id=\"{}\"]", css_string(id))),
        Locator::Class(class) => ("css selector", format!("[class~=\"{}\"]", css_string(class))),
        Locator::Css(css) => ("css selector", css.clone()),
        Locator::XPath(xpath) => ("xpath", xpath.clone()),
        Locator::TagName(tag) => ("tag name", tag.clone()),
    };
    json!({ "using": using, "value": value })
}

fn css_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unwrap_value(mut payload: Value) -> Value {
    payload.get_mut("value").map(Value::take).unwrap_or(Value::Null)
}

fn protocol_error(value: &Value) -> DriverError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
    match code {
        "no such element" => DriverError::NoSuchElement(message.to_string()),
        _ => DriverError::Protocol(format!("{}: {}", code, message)),
    }
}

fn element_ref(value: &Value) -> DriverResult<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| DriverError::Protocol(format!("not an element reference: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::pages::{PageContext, WaitPolicy};
    use crate::probe::AvailabilityPolicy;
    use crate::testing::FakeProbe;

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Local driver endpoint answering `"METHOD /path"` routes with canned
    /// values. Returns the session URL.
    async fn serve(routes: Vec<(&'static str, Value)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let head_end = loop {
                        let n = stream.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    while buf.len() < head_end + 4 + content_length(&head) {
                        let n = stream.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }

                    let mut request_line = head.lines().next().unwrap_or_default().split(' ');
                    let route = format!(
                        "{} {}",
                        request_line.next().unwrap_or_default(),
                        request_line.next().unwrap_or_default()
                    );
                    let (status, body) = match routes.iter().find(|(r, _)| *r == route) {
                        Some((_, value)) => ("200 OK", json!({ "value": value })),
                        None => (
                            "404 Not Found",
                            json!({ "value": { "error": "unknown command", "message": route } }),
                        ),
                    };
                    let body = body.to_string();
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    stream.write_all(response.as_bytes()).await.unwrap();
                });
            }
        });

        format!("http://{}/session/s1", addr)
    }

    fn session(session_url: String) -> WebDriverSession {
        WebDriverSession {
            client: reqwest::Client::new(),
            session_url,
            _process: None,
        }
    }

    fn element(id: &str) -> Value {
        let mut value = json!({});
        value[ELEMENT_KEY] = json!(id);
        value
    }

    #[tokio::test]
    async fn test_attribute_is_markup_value_and_property_is_resolved() {
        let driver = session(
            serve(vec![
                ("GET /session/s1/element/e1/attribute/href", json!("/relative/path")),
                (
                    "GET /session/s1/element/e1/property/href",
                    json!("https://example.org/relative/path"),
                ),
                ("GET /session/s1/element/e1/attribute/title", Value::Null),
            ])
            .await,
        );
        let anchor = ElementRef("e1".into());

        assert_eq!(
            driver.attribute(&anchor, "href").await.unwrap().as_deref(),
            Some("/relative/path")
        );
        assert_eq!(
            driver.property(&anchor, "href").await.unwrap().as_deref(),
            Some("https://example.org/relative/path")
        );
        assert_eq!(driver.attribute(&anchor, "title").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_harvest_skips_relative_hrefs_from_browser() {
        let driver = session(
            serve(vec![
                ("POST /session/s1/url", Value::Null),
                (
                    "POST /session/s1/elements",
                    json!([element("rel"), element("abs")]),
                ),
                ("GET /session/s1/element/rel/attribute/href", json!("/relative/path")),
                (
                    "GET /session/s1/element/rel/property/href",
                    json!("https://example.org/relative/path"),
                ),
                ("GET /session/s1/element/abs/attribute/href", json!("https://other.example/b")),
                ("GET /session/s1/element/abs/property/href", json!("https://other.example/b")),
            ])
            .await,
        );
        let ctx = PageContext {
            driver: Arc::new(driver),
            probe: Arc::new(FakeProbe::new()),
            waits: WaitPolicy::default(),
            availability: AvailabilityPolicy::default(),
        };

        let links = ctx.page("https://example.org/").harvest_links().await.unwrap();
        assert_eq!(links.into_vec(), vec!["https://other.example/b"]);
    }

    #[tokio::test]
    async fn test_unknown_command_is_protocol_error() {
        let driver = session(serve(vec![]).await);
        let err = driver
            .find_element(None, &Locator::Id("missing".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(ref m) if m.starts_with("unknown command")));
    }

    #[test]
    fn test_strategy_mapping() {
        assert_eq!(
            strategy(&Locator::Id("facet-genre".into())),
            json!({ "using": "css selector", "value": "[id=\"facet-genre\"]" })
        );
        assert_eq!(
            strategy(&Locator::Class("pager__summary".into())),
            json!({ "using": "css selector", "value": "[class~=\"pager__summary\"]" })
        );
        assert_eq!(strategy(&Locator::TagName("a".into()))["using"], "tag name");
        assert_eq!(strategy(&Locator::XPath("//a".into()))["using"], "xpath");
    }

    #[test]
    fn test_css_string_escapes_quotes() {
        assert_eq!(css_string(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[test]
    fn test_no_such_element_is_distinguished() {
        let err = protocol_error(&json!({ "error": "no such element", "message": "gone" }));
        assert!(err.is_no_such_element());

        let err = protocol_error(&json!({ "error": "invalid session id", "message": "" }));
        assert!(matches!(err, DriverError::Protocol(ref m) if m.starts_with("invalid session id")));
    }

    #[test]
    fn test_element_ref() {
        let mut value = json!({});
        value[ELEMENT_KEY] = json!("abc-123");
        assert_eq!(element_ref(&value).unwrap(), ElementRef("abc-123".into()));
        assert!(element_ref(&json!({ "foo": 1 })).is_err());
    }

    #[test]
    fn test_capabilities() {
        let chrome = Browser::Chrome.capabilities(true);
        let args = chrome["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));

        let firefox = Browser::Firefox.capabilities(false);
        assert!(firefox["moz:firefoxOptions"]["args"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config: WebDriverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.url, "http://127.0.0.1:9515");
        assert_eq!(config.browser, Browser::Chrome);
        assert!(config.headless);
        assert_eq!(config.page_load_timeout(), Duration::from_secs(60));
    }
}
