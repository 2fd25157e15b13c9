//! Browser seam.
//!
//! The scraper only talks to a browser through [`BrowserDriver`]; production
//! uses the WebDriver client in [`super::webdriver`], tests script a fake.
//!
//! Page structure varies between site revisions, so every element lookup is
//! expressed as an ordered list of [`Locator`] strategies. The first one that
//! matches wins.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::session::StorageState;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("network error: {0}")]
    Network(String),

    #[error("webdriver error ({error}): {message}")]
    WebDriver { error: String, message: String },

    #[error("unexpected webdriver response: {0}")]
    Protocol(String),

    #[error("no element matches {0}")]
    NoSuchElement(String),

    #[error("browser session is closed")]
    Closed,
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        DriverError::Network(err.to_string())
    }
}

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    /// Anchor whose visible text equals the string.
    LinkText(String),
    /// Anchor whose visible text contains the string.
    PartialLinkText(String),
    XPath(String),
}

impl Locator {
    pub fn css(s: &str) -> Self {
        Locator::Css(s.to_string())
    }

    pub fn link_text(s: &str) -> Self {
        Locator::LinkText(s.to_string())
    }

    pub fn partial_link_text(s: &str) -> Self {
        Locator::PartialLinkText(s.to_string())
    }

    pub fn xpath(s: &str) -> Self {
        Locator::XPath(s.to_string())
    }

    /// W3C `using` strategy name and value.
    pub fn strategy(&self) -> (&'static str, &str) {
        match self {
            Locator::Css(v) => ("css selector", v),
            Locator::LinkText(v) => ("link text", v),
            Locator::PartialLinkText(v) => ("partial link text", v),
            Locator::XPath(v) => ("xpath", v),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (using, value) = self.strategy();
        write!(f, "{}={:?}", using, value)
    }
}

/// Everything needed to open one browser session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub viewport: (u32, u32),
    /// Cookies and local storage to seed before the first navigation.
    pub storage_state: Option<StorageState>,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

impl Default for LaunchOptions {
    fn default() -> Self {
        LaunchOptions {
            headless: true,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: (1366, 768),
            storage_state: None,
        }
    }
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Box<dyn BrowserDriver>>;
}

/// A live browser tab. Navigation methods return once the document has
/// finished loading.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Navigate as if a link on the current page had been followed, so the
    /// current page becomes the referrer.
    async fn follow(&mut self, url: &str) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Serialized DOM of the current page.
    async fn content(&mut self) -> Result<String>;

    async fn exists(&mut self, locator: &Locator) -> Result<bool>;

    async fn click(&mut self, locator: &Locator) -> Result<()>;

    async fn send_keys(&mut self, locator: &Locator, text: &str) -> Result<()>;

    /// Pick the `<option>` with the given visible label inside a `<select>`.
    async fn select_by_label(&mut self, locator: &Locator, label: &str) -> Result<()>;

    async fn press_enter(&mut self) -> Result<()>;

    async fn scroll_by(&mut self, delta_y: i64) -> Result<()>;

    async fn move_pointer(&mut self, x: i64, y: i64) -> Result<()>;

    /// PNG bytes of the viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    async fn storage_state(&mut self) -> Result<StorageState>;

    async fn close(&mut self) -> Result<()>;

    /// Poll for `locator` until it appears or `timeout` passes.
    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(locator).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// First strategy in `strategies` that matches on the current page.
pub async fn find_first(
    driver: &mut dyn BrowserDriver,
    strategies: &[Locator],
) -> Result<Option<Locator>> {
    for locator in strategies {
        if driver.exists(locator).await? {
            return Ok(Some(locator.clone()));
        }
    }
    Ok(None)
}

/// Like [`find_first`], polling until `timeout`.
pub async fn wait_for_any(
    driver: &mut dyn BrowserDriver,
    strategies: &[Locator],
    timeout: Duration,
) -> Result<Option<Locator>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(found) = find_first(driver, strategies).await? {
            return Ok(Some(found));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
