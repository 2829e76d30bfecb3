//! W3C WebDriver client.
//!
//! Speaks the WebDriver HTTP protocol directly (chromedriver, geckodriver or
//! a Selenium server), covering exactly the commands [`PageAccessor`] needs.
//! Responses wrap their payload in `{"value": ...}`; failures carry a W3C
//! error code that is mapped onto the crate's error kinds.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::DriverConfig;
use crate::error::{Result, ScrapeError};
use crate::page::{ElementRef, Locator, PageAccessor, ScrollSurface};
use crate::utils::truncate_for_log;

/// Key under which W3C endpoints return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// A live browsing session.
#[derive(Debug)]
pub struct WebDriverPage {
    http: Client,
    root: Url,
    session_id: String,
}

impl WebDriverPage {
    /// Start a new session on the WebDriver server named in `config`.
    #[instrument(level = "info", skip_all, fields(url = %config.webdriver_url, browser = %config.browser))]
    pub async fn connect(config: &DriverConfig) -> Result<Self> {
        let mut root = Url::parse(&config.webdriver_url)
            .map_err(|e| ScrapeError::Configuration(format!("invalid webdriver url: {e}")))?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }

        let http = Client::new();
        let url = join(&root, "session")?;
        let response = http
            .post(url)
            .json(&capabilities(config))
            .send()
            .await?;
        let value = unwrap_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::Driver("new session response has no sessionId".into()))?
            .to_string();

        info!(%session_id, "WebDriver session started");
        Ok(Self {
            http,
            root,
            session_id,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let path = if path.is_empty() {
            format!("session/{}", self.session_id)
        } else {
            format!("session/{}/{}", self.session_id, path)
        };
        let url = join(&self.root, &path)?;
        debug!(%method, %url, "WebDriver command");

        let mut request = self.http.request(method.clone(), url);
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }
        unwrap_value(request.send().await?).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn find(&self, path: &str, locator: &Locator) -> Result<Vec<ElementRef>> {
        let (using, value) = locator.strategy();
        let found = self
            .command(Method::POST, path, Some(json!({ "using": using, "value": value })))
            .await?;
        element_refs(&found)
    }
}

fn capabilities(config: &DriverConfig) -> Value {
    if config.browser.eq_ignore_ascii_case("firefox") {
        let args: Vec<&str> = if config.headless { vec!["-headless"] } else { vec![] };
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "firefox",
                    "moz:firefoxOptions": { "args": args }
                }
            }
        })
    } else {
        let mut args = vec!["--start-maximized"];
        if config.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": config.browser,
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

fn join(root: &Url, path: &str) -> Result<Url> {
    root.join(path)
        .map_err(|e| ScrapeError::Driver(format!("cannot build url for {path}: {e}")))
}

fn element_arg(element: &ElementRef) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

fn element_path(element: &ElementRef, rest: &str) -> String {
    format!("element/{}/{}", urlencoding::encode(&element.0), rest)
}

async fn unwrap_value(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if status.is_success() {
        Ok(value)
    } else {
        Err(map_error(&value))
    }
}

/// Translate a W3C error payload into a [`ScrapeError`].
fn map_error(value: &Value) -> ScrapeError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    // Driver messages carry full stack traces.
    let message = truncate_for_log(value.get("message").and_then(Value::as_str).unwrap_or(""), 300);
    warn!(%code, %message, "WebDriver command failed");
    match code {
        "no such element" | "stale element reference" | "no such frame" => {
            ScrapeError::not_found(format!("{code}: {message}"))
        }
        "timeout" | "script timeout" => ScrapeError::Timeout {
            awaited: format!("webdriver ({message})"),
            waited: Duration::ZERO,
        },
        _ => ScrapeError::Driver(format!("{code}: {message}")),
    }
}

fn element_refs(found: &Value) -> Result<Vec<ElementRef>> {
    let items = found
        .as_array()
        .ok_or_else(|| ScrapeError::Driver("element search did not return a list".into()))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| ScrapeError::Driver("element entry without reference".into()))
        })
        .collect()
}

impl ScrollSurface for WebDriverPage {
    async fn extent(&self, region: &ElementRef) -> Result<u64> {
        let value = self
            .execute("return arguments[0].scrollHeight;", vec![element_arg(region)])
            .await?;
        value
            .as_f64()
            .map(|h| h.max(0.0).round() as u64)
            .ok_or_else(|| ScrapeError::Driver(format!("scrollHeight was not a number: {value}")))
    }

    async fn drive_to(&self, region: &ElementRef, offset: u64) -> Result<()> {
        self.execute(
            "arguments[0].scrollTo(0, arguments[1]);",
            vec![element_arg(region), json!(offset)],
        )
        .await?;
        Ok(())
    }

    async fn capture_bitmap(&self, region: &ElementRef) -> Result<Vec<u8>> {
        let value = self
            .command(Method::GET, &element_path(region, "screenshot"), None)
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| ScrapeError::Driver("screenshot was not a string".into()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| ScrapeError::Driver(format!("screenshot is not base64: {e}")))
    }

    async fn device_pixel_ratio(&self) -> Result<f64> {
        let value = self.execute("return window.devicePixelRatio;", vec![]).await?;
        Ok(value.as_f64().unwrap_or(1.0))
    }
}

impl PageAccessor for WebDriverPage {
    #[instrument(level = "info", skip(self))]
    async fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn locate_all(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
        self.find("elements", locator).await
    }

    async fn children(&self, element: &ElementRef) -> Result<Vec<ElementRef>> {
        self.find(&element_path(element, "elements"), &Locator::xpath("*"))
            .await
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        let value = self
            .command(Method::GET, &element_path(element, "text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let path = element_path(element, &format!("attribute/{}", urlencoding::encode(name)));
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(Method::GET, &element_path(element, "displayed"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &element_path(element, "click"), None)
            .await?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &element_path(element, "value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn markup_snapshot(&self) -> Result<String> {
        let value = self.command(Method::GET, "source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    #[instrument(level = "info", skip(self), fields(session_id = %self.session_id))]
    async fn quit(&self) -> Result<()> {
        self.command(Method::DELETE, "", None).await?;
        info!("WebDriver session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn element_lists_are_unwrapped() {
        let found = json!([{ ELEMENT_KEY: "a-1" }, { ELEMENT_KEY: "b-2" }]);
        let refs = element_refs(&found).unwrap();
        assert_eq!(refs, vec![ElementRef("a-1".into()), ElementRef("b-2".into())]);
    }

    #[test]
    fn element_entries_without_a_reference_are_rejected() {
        let found = json!([{ "ELEMENT": "legacy" }]);
        assert!(element_refs(&found).is_err());
    }

    #[test]
    fn w3c_error_codes_map_to_error_kinds() {
        let missing = map_error(&json!({ "error": "no such element", "message": ".geAzIe" }));
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let slow = map_error(&json!({ "error": "script timeout", "message": "30s" }));
        assert_eq!(slow.kind(), ErrorKind::Timeout);

        let other = map_error(&json!({ "error": "invalid session id" }));
        assert_eq!(other.kind(), ErrorKind::External);
    }

    #[test]
    fn headless_chrome_capabilities_carry_the_flag() {
        let config = DriverConfig {
            headless: true,
            ..DriverConfig::default()
        };
        let caps = capabilities(&config);
        let args = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
        assert_eq!(args, &json!(["--start-maximized", "--headless=new"]));
    }

    #[test]
    fn element_paths_are_escaped() {
        let path = element_path(&ElementRef("f.1 2".into()), "text");
        assert_eq!(path, "element/f.1%202/text");
    }
}
