//! Minimal W3C WebDriver client (chromedriver) over reqwest.
//!
//! Only the endpoints the scraper needs are wrapped. Chrome-specific pieces
//! (stealth script, cookie seeding, cookie capture) go through chromedriver's
//! `goog/cdp/execute` passthrough.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::driver::{BrowserDriver, BrowserLauncher, DriverError, LaunchOptions, Locator, Result};
use crate::session::{Cookie, OriginStorage, StorageEntry, StorageState};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const ENTER_KEY: &str = "\u{E007}";

/// Hides the usual automation tells before any page script runs.
const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
const __query = window.navigator.permissions && window.navigator.permissions.query;
if (__query) {
  window.navigator.permissions.query = (p) =>
    p && p.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : __query(p);
}
"#;

/// Launches chromedriver sessions at `base_url` (e.g. `http://localhost:9515`).
pub struct WebDriverLauncher {
    client: reqwest::Client,
    base_url: String,
}

impl WebDriverLauncher {
    pub fn new(base_url: &str) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| DriverError::Protocol(format!("invalid webdriver url {:?}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(WebDriverLauncher {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Chrome flags for a session that does not advertise automation.
pub fn chrome_args(opts: &LaunchOptions) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-infobars".to_string(),
        "--window-position=0,0".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-accelerated-2d-canvas".to_string(),
        "--disable-gpu".to_string(),
        format!("--window-size={},{}", opts.viewport.0, opts.viewport.1),
        format!("--user-agent={}", opts.user_agent),
    ];
    if opts.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(proxy) = &opts.proxy {
        args.push(format!("--proxy-server={}", proxy));
    }
    args
}

pub fn capabilities(opts: &LaunchOptions) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": chrome_args(opts),
                    "excludeSwitches": ["enable-automation"],
                    "useAutomationExtension": false,
                }
            }
        }
    })
}

/// Script that restores `localStorage` for the origins in `state` on every
/// new document.
fn local_storage_script(origins: &[OriginStorage]) -> Option<String> {
    if origins.iter().all(|o| o.local_storage.is_empty()) {
        return None;
    }
    let data: Value = origins
        .iter()
        .map(|o| {
            let entries: serde_json::Map<String, Value> = o
                .local_storage
                .iter()
                .map(|e| (e.name.clone(), Value::String(e.value.clone())))
                .collect();
            (o.origin.clone(), Value::Object(entries))
        })
        .collect::<serde_json::Map<String, Value>>()
        .into();
    Some(format!(
        "(() => {{ const d = {}[location.origin]; if (!d) return; \
         for (const [k, v] of Object.entries(d)) {{ \
         if (localStorage.getItem(k) === null) localStorage.setItem(k, v); }} }})();",
        data
    ))
}

fn cdp_cookie(c: &Cookie) -> Value {
    let mut v = json!({
        "name": c.name,
        "value": c.value,
        "domain": c.domain,
        "path": c.path,
        "secure": c.secure,
        "httpOnly": c.http_only,
    });
    if let Some(exp) = c.expires.filter(|e| *e > 0.0) {
        v["expires"] = json!(exp);
    }
    if let Some(ss) = &c.same_site {
        v["sameSite"] = json!(ss);
    }
    v
}

fn cookie_from_cdp(v: &Value) -> Option<Cookie> {
    Some(Cookie {
        name: v.get("name")?.as_str()?.to_string(),
        value: v.get("value")?.as_str()?.to_string(),
        domain: v.get("domain").and_then(Value::as_str).unwrap_or("").to_string(),
        path: v.get("path").and_then(Value::as_str).unwrap_or("/").to_string(),
        expires: v.get("expires").and_then(Value::as_f64),
        http_only: v.get("httpOnly").and_then(Value::as_bool).unwrap_or(false),
        secure: v.get("secure").and_then(Value::as_bool).unwrap_or(false),
        same_site: v.get("sameSite").and_then(Value::as_str).map(str::to_string),
    })
}

/// Unwrap a W3C response body, turning `{"value": {"error": ..}}` into an error.
fn unwrap_value(body: Value) -> Result<Value> {
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(DriverError::WebDriver {
            error: error.to_string(),
            message,
        });
    }
    Ok(value)
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Box<dyn BrowserDriver>> {
        let body: Value = self
            .client
            .post(format!("{}/session", self.base_url))
            .json(&capabilities(opts))
            .send()
            .await?
            .json()
            .await?;
        let value = unwrap_value(body)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("missing sessionId".into()))?
            .to_string();
        info!(session = %session_id, proxy = ?opts.proxy, "webdriver session created");

        let mut session = WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.base_url, session_id),
            closed: false,
        };
        session
            .cdp("Page.addScriptToEvaluateOnNewDocument", json!({ "source": STEALTH_JS }))
            .await?;
        if let Some(state) = &opts.storage_state {
            session.seed(state).await?;
        }
        Ok(Box::new(session))
    }
}

pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
    closed: bool,
}

impl WebDriverSession {
    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let mut req = self.client.request(method, format!("{}{}", self.base, path));
        if let Some(b) = body {
            req = req.json(&b);
        }
        let body: Value = req.send().await?.json().await?;
        unwrap_value(body)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.call(reqwest::Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.call(reqwest::Method::GET, path, None).await
    }

    async fn cdp(&self, cmd: &str, params: Value) -> Result<Value> {
        self.post("/goog/cdp/execute", json!({ "cmd": cmd, "params": params }))
            .await
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn seed(&mut self, state: &StorageState) -> Result<()> {
        if !state.cookies.is_empty() {
            let cookies: Vec<Value> = state.cookies.iter().map(cdp_cookie).collect();
            self.cdp("Network.setCookies", json!({ "cookies": cookies }))
                .await?;
        }
        if let Some(script) = local_storage_script(&state.origins) {
            self.cdp("Page.addScriptToEvaluateOnNewDocument", json!({ "source": script }))
                .await?;
        }
        debug!(cookies = state.cookies.len(), "seeded storage state");
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<String>> {
        let (using, value) = locator.strategy();
        match self
            .post("/element", json!({ "using": using, "value": value }))
            .await
        {
            Ok(v) => Ok(v
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)),
            Err(DriverError::WebDriver { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn require(&self, locator: &Locator) -> Result<String> {
        self.find(locator)
            .await?
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))
    }

    /// Block until `document.readyState` is complete (bounded).
    async fn wait_ready(&self) -> Result<()> {
        for _ in 0..120 {
            let state = self.execute("return document.readyState", json!([])).await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        debug!("document did not reach readyState=complete");
        Ok(())
    }

    async fn actions(&self, actions: Value) -> Result<()> {
        self.post("/actions", json!({ "actions": actions })).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.post("/url", json!({ "url": url })).await?;
        self.wait_ready().await
    }

    async fn follow(&mut self, url: &str) -> Result<()> {
        self.execute("window.location.assign(arguments[0]);", json!([url]))
            .await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.wait_ready().await
    }

    async fn current_url(&mut self) -> Result<String> {
        let v = self.get("/url").await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("url is not a string".into()))
    }

    async fn content(&mut self) -> Result<String> {
        let v = self.get("/source").await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("source is not a string".into()))
    }

    async fn exists(&mut self, locator: &Locator) -> Result<bool> {
        Ok(self.find(locator).await?.is_some())
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        let id = self.require(locator).await?;
        self.post(&format!("/element/{}/click", id), json!({})).await?;
        self.wait_ready().await
    }

    async fn send_keys(&mut self, locator: &Locator, text: &str) -> Result<()> {
        let id = self.require(locator).await?;
        self.post(&format!("/element/{}/value", id), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn select_by_label(&mut self, locator: &Locator, label: &str) -> Result<()> {
        let select = self.require(locator).await?;
        let xpath = format!(".//option[normalize-space(.)={}]", xpath_literal(label));
        let option = self
            .post(
                &format!("/element/{}/element", select),
                json!({ "using": "xpath", "value": xpath }),
            )
            .await?;
        let option_id = option
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::NoSuchElement(format!("option {:?}", label)))?
            .to_string();
        self.post(&format!("/element/{}/click", option_id), json!({}))
            .await?;
        Ok(())
    }

    async fn press_enter(&mut self) -> Result<()> {
        self.actions(json!([{
            "type": "key",
            "id": "keyboard",
            "actions": [
                { "type": "keyDown", "value": ENTER_KEY },
                { "type": "keyUp", "value": ENTER_KEY },
            ]
        }]))
        .await?;
        self.wait_ready().await
    }

    async fn scroll_by(&mut self, delta_y: i64) -> Result<()> {
        self.actions(json!([{
            "type": "wheel",
            "id": "wheel",
            "actions": [{
                "type": "scroll", "x": 0, "y": 0,
                "deltaX": 0, "deltaY": delta_y, "origin": "viewport"
            }]
        }]))
        .await
    }

    async fn move_pointer(&mut self, x: i64, y: i64) -> Result<()> {
        self.actions(json!([{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [{
                "type": "pointerMove", "duration": 120,
                "x": x, "y": y, "origin": "viewport"
            }]
        }]))
        .await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let v = self.get("/screenshot").await?;
        let b64 = v
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| DriverError::Protocol(format!("screenshot decode: {}", e)))
    }

    async fn storage_state(&mut self) -> Result<StorageState> {
        let all = self.cdp("Network.getAllCookies", json!({})).await?;
        let cookies = all
            .get("cookies")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(cookie_from_cdp).collect())
            .unwrap_or_default();

        let local = self
            .execute(
                "return [location.origin, Object.entries(window.localStorage || {})];",
                json!([]),
            )
            .await?;
        let mut origins = Vec::new();
        if let (Some(origin), Some(entries)) = (
            local.get(0).and_then(Value::as_str),
            local.get(1).and_then(Value::as_array),
        ) {
            let local_storage: Vec<StorageEntry> = entries
                .iter()
                .filter_map(|pair| {
                    Some(StorageEntry {
                        name: pair.get(0)?.as_str()?.to_string(),
                        value: pair.get(1)?.as_str()?.to_string(),
                    })
                })
                .collect();
            if !local_storage.is_empty() {
                origins.push(OriginStorage {
                    origin: origin.to_string(),
                    local_storage,
                });
            }
        }
        Ok(StorageState { cookies, origins })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let res = self.call(reqwest::Method::DELETE, "", None).await;
        self.closed = true;
        res.map(|_| ())
    }
}

/// Quote `s` as an XPath 1.0 string literal.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
