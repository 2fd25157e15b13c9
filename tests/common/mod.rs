//! Shared helpers for integration tests: a scripted listing site behind a
//! fake browser, a stub RDAP registry, and throwaway SQLite databases.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use dropscout::db::{Account, Database};
use dropscout::events::JobMessage;
use dropscout::pipeline::PipelineConfig;
use dropscout::scraper::driver::{
    self, BrowserDriver, BrowserLauncher, DriverError, LaunchOptions, Locator,
};
use dropscout::scraper::human::Pacing;
use dropscout::scraper::{ScrapeOptions, SiteConfig};
use dropscout::session::{Cookie, StorageState};

pub const SITE: &str = "http://listing.test";
pub const LISTING: &str = "/domains/expiredcom/";
pub const REFERENCE_YEAR: i32 = 2026;
/// Fetched through `fake_proxy` endpoints, which answer without forwarding.
pub const PROXY_PROBE: &str = "http://probe.test/";

pub const SESSION_BLOB: &str = r#"{"cookies":[{"name":"ed_session","value":"abc123","domain":".listing.test","path":"/","httpOnly":true,"secure":false}],"origins":[]}"#;

// ── Database ────────────────────────────────────────────────────

/// File-backed database in a temp dir that lives as long as the guard.
pub async fn temp_db() -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let db = Database::connect(&url).await.unwrap();
    (db, dir)
}

pub async fn seed_account(db: &Database, username: &str) -> Account {
    db.upsert_session(username, SESSION_BLOB).await.unwrap()
}

// ── Scripted listing site ───────────────────────────────────────

#[derive(Default)]
pub struct SiteLog {
    pub launches: Vec<LaunchOptions>,
    pub visited: Vec<String>,
    pub typed: HashMap<String, String>,
    pub selected: Vec<String>,
    pub closed: usize,
    pub screenshots: usize,
}

/// Static pages keyed by path and query. `{AUTH}` in a page renders as a
/// logout link for authenticated browsers and a login link otherwise.
pub struct FakeSite {
    pages: HashMap<String, String>,
    accept_sessions: bool,
    reject_first_proxy: bool,
    password: Option<String>,
    pub log: Mutex<SiteLog>,
}

pub type Row<'a> = (&'a str, u64, i32);

pub fn listing_page(rows: &[Row<'_>], next: Option<&str>) -> String {
    let mut html = String::from(
        "<html><body>{AUTH}\
         <a class=\"showfilter\">Show Filter</a>\
         <select id=\"fwhoisage\"><option>Any</option><option>2010 (16 Years)</option></select>\
         <input name=\"button_submit\" type=\"submit\" value=\"Apply\">\
         <table id=\"listing\"><tr><th>Domain</th>\
         <th class=\"field_bl\"><a href=\"/domains/expiredcom/\">BL</a></th><th>Birth</th></tr>",
    );
    for (name, bl, year) in rows {
        html.push_str(&format!(
            "<tr><td><a class=\"namelinks\" href=\"#\">{}</a></td>\
             <td class=\"field_bl\">{}</td><td class=\"field_abirth\">{}</td></tr>",
            name, bl, year
        ));
    }
    html.push_str("</table>");
    if let Some(href) = next {
        html.push_str(&format!("<a class=\"next\" href=\"{}\">Next</a>", href));
    }
    html.push_str("</body></html>");
    html
}

pub fn page_path(page: usize) -> String {
    if page <= 1 {
        LISTING.to_string()
    } else {
        format!("{}?start={}", LISTING, (page - 1) * 25)
    }
}

impl FakeSite {
    /// Home, login page and one listing page per entry of `pages`, chained by
    /// "next" links.
    pub fn with_listing(pages: Vec<Vec<Row<'_>>>) -> Self {
        let mut map = HashMap::new();
        map.insert(
            "/".to_string(),
            "<html><body>{AUTH}<a href=\"/domains/expiredcom/\">Deleted Domains</a></body></html>"
                .to_string(),
        );
        map.insert(
            "/login/".to_string(),
            "<html><body><form><input name=\"username\"><input name=\"password\" type=\"password\">\
             <button type=\"submit\" data-action=\"login\">Log in</button></form></body></html>"
                .to_string(),
        );
        let n = pages.len();
        for (i, rows) in pages.iter().enumerate() {
            let next = (i + 1 < n).then(|| page_path(i + 2));
            map.insert(page_path(i + 1), listing_page(rows, next.as_deref()));
        }
        FakeSite {
            pages: map,
            accept_sessions: true,
            reject_first_proxy: false,
            password: None,
            log: Mutex::new(SiteLog::default()),
        }
    }

    /// Replace one page, e.g. with a block page.
    pub fn with_page(mut self, path: &str, html: &str) -> Self {
        self.pages.insert(path.to_string(), html.to_string());
        self
    }

    /// Stored sessions no longer authenticate.
    pub fn rejecting_sessions(mut self) -> Self {
        self.accept_sessions = false;
        self
    }

    /// Stored sessions fail behind the proxy of the first launch and work
    /// behind any other.
    pub fn rejecting_first_proxy(mut self) -> Self {
        self.reject_first_proxy = true;
        self
    }

    /// Credential login succeeds with this password.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    fn render(&self, path: &str, authenticated: bool) -> String {
        let auth = if authenticated {
            "<a href=\"/logout/\">Logout</a>"
        } else {
            "<a href=\"/login/\">Login</a>"
        };
        match self.pages.get(path) {
            Some(html) => html.replace("{AUTH}", auth),
            None => "<html><body><h1>404 Not Found</h1></body></html>".to_string(),
        }
    }

    pub fn launches(&self) -> usize {
        self.log.lock().unwrap().launches.len()
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn visited(&self) -> Vec<String> {
        self.log.lock().unwrap().visited.clone()
    }
}

pub struct FakeLauncher {
    pub site: Arc<FakeSite>,
    pub fail: bool,
}

impl FakeLauncher {
    pub fn new(site: Arc<FakeSite>) -> Self {
        FakeLauncher { site, fail: false }
    }

    pub fn failing(site: Arc<FakeSite>) -> Self {
        FakeLauncher { site, fail: true }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, opts: &LaunchOptions) -> driver::Result<Box<dyn BrowserDriver>> {
        if self.fail {
            return Err(DriverError::Network("connection refused".into()));
        }
        let first_proxy = {
            let mut log = self.site.log.lock().unwrap();
            log.launches.push(opts.clone());
            log.launches[0].proxy.clone()
        };
        let seeded = opts.storage_state.as_ref().is_some_and(|s| !s.is_empty());
        let blocked = self.site.reject_first_proxy && opts.proxy == first_proxy;
        Ok(Box::new(FakeBrowser {
            site: self.site.clone(),
            url: "about:blank".to_string(),
            authenticated: self.site.accept_sessions && seeded && !blocked,
        }))
    }
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    url: String,
    authenticated: bool,
}

/// What a click on a matched element does.
struct Hit {
    href: Option<String>,
    action: Option<String>,
    options: Vec<String>,
}

fn find(html: &str, locator: &Locator) -> Option<Hit> {
    let doc = scraper::Html::parse_document(html);
    let hit = |el: scraper::ElementRef<'_>| Hit {
        href: el.value().attr("href").map(str::to_string),
        action: el.value().attr("data-action").map(str::to_string),
        options: el
            .select(&scraper::Selector::parse("option").unwrap())
            .map(|o| o.text().collect::<String>().trim().to_string())
            .collect(),
    };
    let anchors = scraper::Selector::parse("a").unwrap();
    match locator {
        Locator::Css(css) => {
            let sel = scraper::Selector::parse(css).ok()?;
            doc.select(&sel).next().map(hit)
        }
        Locator::LinkText(text) => doc
            .select(&anchors)
            .find(|a| a.text().collect::<String>().trim() == text)
            .map(hit),
        Locator::PartialLinkText(text) => doc
            .select(&anchors)
            .find(|a| a.text().collect::<String>().contains(text.as_str()))
            .map(hit),
        Locator::XPath(_) => None,
    }
}

impl FakeBrowser {
    fn path(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(u) => match u.query() {
                Some(q) => format!("{}?{}", u.path(), q),
                None => u.path().to_string(),
            },
            Err(_) => String::new(),
        }
    }

    fn html(&self) -> String {
        self.site.render(&self.path(), self.authenticated)
    }

    fn navigate(&mut self, target: &str) -> driver::Result<()> {
        let base = url::Url::parse(&self.url)
            .or_else(|_| url::Url::parse(SITE))
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        let next = base
            .join(target)
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        self.url = next.to_string();
        self.site.log.lock().unwrap().visited.push(self.path());
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn goto(&mut self, url: &str) -> driver::Result<()> {
        self.navigate(url)
    }

    async fn follow(&mut self, url: &str) -> driver::Result<()> {
        self.navigate(url)
    }

    async fn current_url(&mut self) -> driver::Result<String> {
        Ok(self.url.clone())
    }

    async fn content(&mut self) -> driver::Result<String> {
        Ok(self.html())
    }

    async fn exists(&mut self, locator: &Locator) -> driver::Result<bool> {
        Ok(find(&self.html(), locator).is_some())
    }

    async fn click(&mut self, locator: &Locator) -> driver::Result<()> {
        let hit = find(&self.html(), locator)
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))?;
        if hit.action.as_deref() == Some("login") {
            let typed = self
                .site
                .log
                .lock()
                .unwrap()
                .typed
                .get(&Locator::css("input[name='password']").to_string())
                .cloned();
            if self.site.password.is_some() && typed == self.site.password {
                self.authenticated = true;
            }
            return self.navigate("/");
        }
        match hit.href {
            Some(href) if href != "#" => self.navigate(&href),
            _ => Ok(()),
        }
    }

    async fn send_keys(&mut self, locator: &Locator, text: &str) -> driver::Result<()> {
        if find(&self.html(), locator).is_none() {
            return Err(DriverError::NoSuchElement(locator.to_string()));
        }
        self.site
            .log
            .lock()
            .unwrap()
            .typed
            .entry(locator.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn select_by_label(&mut self, locator: &Locator, label: &str) -> driver::Result<()> {
        let hit = find(&self.html(), locator)
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))?;
        if !hit.options.iter().any(|o| o == label) {
            return Err(DriverError::NoSuchElement(format!("option {:?}", label)));
        }
        self.site.log.lock().unwrap().selected.push(label.to_string());
        Ok(())
    }

    async fn press_enter(&mut self) -> driver::Result<()> {
        Ok(())
    }

    async fn scroll_by(&mut self, _delta_y: i64) -> driver::Result<()> {
        Ok(())
    }

    async fn move_pointer(&mut self, _x: i64, _y: i64) -> driver::Result<()> {
        Ok(())
    }

    async fn screenshot(&mut self) -> driver::Result<Vec<u8>> {
        self.site.log.lock().unwrap().screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn storage_state(&mut self) -> driver::Result<StorageState> {
        Ok(StorageState {
            cookies: vec![Cookie {
                name: "ed_session".into(),
                value: "live".into(),
                domain: ".listing.test".into(),
                path: "/".into(),
                expires: None,
                http_only: true,
                secure: false,
                same_site: None,
            }],
            origins: Vec::new(),
        })
    }

    async fn close(&mut self) -> driver::Result<()> {
        self.site.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ── Configuration ───────────────────────────────────────────────

/// No pacing, short timeouts, listing scraped from page 1.
pub fn scrape_options(max_pages: u32) -> ScrapeOptions {
    ScrapeOptions {
        headless: true,
        min_age_years: 5,
        reference_year: REFERENCE_YEAR,
        start_page: 1,
        max_pages,
        extra_terms: Vec::new(),
        diagnostics_dir: None,
        pacing: Pacing::instant(),
        listing_timeout: Duration::from_millis(300),
        link_timeout: Duration::from_millis(300),
    }
}

pub fn pipeline_config(rdap_url: &str, max_pages: u32) -> PipelineConfig {
    PipelineConfig {
        rdap_url: rdap_url.to_string(),
        rdap_timeout: Duration::from_secs(5),
        overfetch_multiplier: 3,
        verify_delay: Duration::ZERO,
        proxy_file: None,
        proxy_url: None,
        proxy_probe_url: PROXY_PROBE.to_string(),
        legacy_state_file: None,
        site: SiteConfig::new(SITE),
        scrape: scrape_options(max_pages),
    }
}

// ── RDAP stub ───────────────────────────────────────────────────

/// Registry answering 200 for `taken`, 503 for names starting with "flaky",
/// 404 for everything else.
pub async fn rdap_stub(taken: &[&str]) -> String {
    rdap_stub_with_delay(taken, Duration::ZERO).await
}

#[derive(Clone)]
struct Registry {
    taken: Arc<HashSet<String>>,
    delay: Duration,
}

/// Like [`rdap_stub`], answering each lookup after `delay`.
pub async fn rdap_stub_with_delay(taken: &[&str], delay: Duration) -> String {
    async fn lookup(State(reg): State<Registry>, Path(name): Path<String>) -> StatusCode {
        if !reg.delay.is_zero() {
            tokio::time::sleep(reg.delay).await;
        }
        if reg.taken.contains(&name) {
            StatusCode::OK
        } else if name.starts_with("flaky") {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::NOT_FOUND
        }
    }
    let registry = Registry {
        taken: Arc::new(taken.iter().map(|s| s.to_string()).collect()),
        delay,
    };
    let app = Router::new()
        .route("/domain/{name}", get(lookup))
        .with_state(registry);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// HTTP proxy that answers every request with `status`.
pub async fn fake_proxy(status: StatusCode) -> String {
    let app = Router::new().fallback(move || async move { status });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ── Job channel ─────────────────────────────────────────────────

pub fn errors(messages: &[JobMessage]) -> Vec<&str> {
    messages
        .iter()
        .filter_map(|m| match m {
            JobMessage::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

pub fn count<F: Fn(&JobMessage) -> bool>(messages: &[JobMessage], pred: F) -> usize {
    messages.iter().filter(|m| pred(m)).count()
}
