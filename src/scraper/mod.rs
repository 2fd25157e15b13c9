//! # Scraper — Stealth Browser Session for the Deleted-Domain Listing
//!
//! Drives one browser session for one pipeline run: account and proxy
//! resolution, session verification or credential login, ban detection,
//! proxy rotation, and paginated extraction of the listing.
//!
//! ## State machine
//!
//! ```text
//! Uninitialized → Started → (LoggedIn | Guest) → Scraping → Closed
//!                      ↘ Banned / Expired (from page inspection)
//! ```
//!
//! ## Extraction flow
//!
//! 1. Home page, then click through to the listing (direct navigation with
//!    the home page as referrer when no link matches)
//! 2. Open the filter panel, set the minimum age, submit
//! 3. Sort by backlinks
//! 4. Follow "next" links up to `start_page`
//! 5. Scrape up to `max_pages` pages or until `target` candidates
//!
//! Every page navigation is followed by ban detection. A hit ends the stream
//! with [`ScrapeError::Banned`] or [`ScrapeError::SessionExpired`].
//!
//! ## Submodules
//!
//! - [`driver`] — browser trait and locator strategies
//! - [`webdriver`] — chromedriver client
//! - [`human`] — pacing and interaction noise
//! - [`listing`] — row parsing and page classification

pub mod driver;
pub mod human;
pub mod listing;
pub mod webdriver;

use async_stream::try_stream;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::db::{Account, AccountStatus, Database};
use crate::domain::Candidate;
use crate::proxy::ProxyManager;
use crate::session::StorageState;
use driver::{
    find_first, wait_for_any, BrowserDriver, BrowserLauncher, DriverError, LaunchOptions, Locator,
};
use human::{Human, Pacing, WaitObserver};
use listing::{accept_row, classify_page, parse_listing, ListingRow, PageState};

pub const DEFAULT_SITE_URL: &str = "https://member.expireddomains.net";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("scraper has not been started")]
    NotStarted,

    #[error("access blocked by the listing site (ban detected)")]
    Banned,

    #[error("session expired: the listing site shows a login wall")]
    SessionExpired,

    #[error("store error: {0}")]
    Store(String),
}

impl ScrapeError {
    /// Ban and expiry signatures found by page inspection.
    pub fn is_detection(&self) -> bool {
        matches!(self, ScrapeError::Banned | ScrapeError::SessionExpired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperState {
    Uninitialized,
    Started,
    LoggedIn,
    Guest,
    Scraping,
    Banned,
    Expired,
    Closed,
}

/// Where the listing site lives and how it labels things.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_path: String,
    pub listing_path: String,
    /// Visible label picked in the `fwhoisage` dropdown.
    pub age_filter_label: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig::new(DEFAULT_SITE_URL)
    }
}

impl SiteConfig {
    pub fn new(base_url: &str) -> Self {
        SiteConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            login_path: "/login/".to_string(),
            listing_path: "/domains/expiredcom/".to_string(),
            age_filter_label: "2010 (16 Years)".to_string(),
        }
    }

    pub fn home_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, self.listing_path)
    }

    fn listing_links(&self) -> Vec<Locator> {
        vec![
            Locator::Css(format!("a[href='{}']", self.listing_path)),
            Locator::partial_link_text("Deleted Domains"),
            Locator::partial_link_text("Deleted .com"),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub headless: bool,
    pub min_age_years: u32,
    /// Year ages are computed against.
    pub reference_year: i32,
    pub start_page: u32,
    pub max_pages: u32,
    pub extra_terms: Vec<String>,
    /// Screenshots of soft failures land here when set.
    pub diagnostics_dir: Option<PathBuf>,
    pub pacing: Pacing,
    pub listing_timeout: Duration,
    pub link_timeout: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        use chrono::Datelike;
        ScrapeOptions {
            headless: true,
            min_age_years: 5,
            reference_year: chrono::Utc::now().year(),
            start_page: 2,
            max_pages: 2,
            extra_terms: Vec::new(),
            diagnostics_dir: None,
            pacing: Pacing::default(),
            listing_timeout: Duration::from_secs(10),
            link_timeout: Duration::from_secs(5),
        }
    }
}

/// Ways of setting the minimum-age filter, tried in order.
#[derive(Debug, Clone)]
enum AgeFilter {
    Dropdown(Locator),
    NumericInput(Locator),
}

impl AgeFilter {
    fn locator(&self) -> &Locator {
        match self {
            AgeFilter::Dropdown(l) | AgeFilter::NumericInput(l) => l,
        }
    }
}

fn age_filter_strategies() -> Vec<AgeFilter> {
    vec![
        AgeFilter::Dropdown(Locator::css("select#fwhoisage")),
        AgeFilter::Dropdown(Locator::css("select[name='fwhoisage']")),
        AgeFilter::NumericInput(Locator::css("input[name='fage']")),
        AgeFilter::NumericInput(Locator::css("input[name='f_aby']")),
        AgeFilter::NumericInput(Locator::css("input[name='f_aby_min']")),
    ]
}

fn show_filter_locators() -> Vec<Locator> {
    vec![
        Locator::css("a.showfilter"),
        Locator::link_text("Show Filter"),
        Locator::xpath("//button[contains(normalize-space(.), 'Filter')]"),
    ]
}

fn submit_filter_locators() -> Vec<Locator> {
    vec![
        Locator::css("input[name='button_submit']"),
        Locator::css("button[type='submit']"),
    ]
}

fn sort_locators() -> Vec<Locator> {
    vec![Locator::css("th.field_bl a"), Locator::css("a[href*='s=bl']")]
}

fn login_submit_locators() -> Vec<Locator> {
    vec![
        Locator::css("button[type='submit']"),
        Locator::css("input[type='submit']"),
    ]
}

fn logout_locator() -> Locator {
    Locator::css("a[href*='logout']")
}

fn next_locator() -> Locator {
    Locator::css("a.next")
}

fn listing_table_locator() -> Locator {
    Locator::css("table#listing")
}

/// Type `text` one character at a time with a human keystroke delay.
async fn type_like_human(
    driver: &mut dyn BrowserDriver,
    human: &Human,
    locator: &Locator,
    text: &str,
) -> driver::Result<()> {
    for ch in text.chars() {
        driver.send_keys(locator, ch.encode_utf8(&mut [0u8; 4])).await?;
        human.pacing.sleep(human.keystroke_delay()).await;
    }
    Ok(())
}

/// Best-effort PNG capture into the diagnostics directory.
async fn save_screenshot(driver: &mut dyn BrowserDriver, dir: Option<&Path>, name: &str) {
    let Some(dir) = dir else { return };
    let path = dir.join(format!("{}.png", name));
    let png = match driver.screenshot().await {
        Ok(png) => png,
        Err(e) => {
            warn!(error = %e, "screenshot failed");
            return;
        }
    };
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "cannot create diagnostics dir");
        return;
    }
    match tokio::fs::write(&path, png).await {
        Ok(()) => info!(path = %path.display(), "diagnostic screenshot saved"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write screenshot"),
    }
}

pub struct StealthScraper {
    launcher: Arc<dyn BrowserLauncher>,
    proxies: Arc<ProxyManager>,
    db: Option<Database>,
    site: SiteConfig,
    opts: ScrapeOptions,
    human: Human,
    credentials: Option<(String, String)>,
    account: Option<Account>,
    injected_state: Option<StorageState>,
    legacy_state_file: Option<PathBuf>,
    fixed_proxy: Option<String>,
    current_proxy: Option<String>,
    driver: Option<Box<dyn BrowserDriver>>,
    state: ScraperState,
}

impl StealthScraper {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        proxies: Arc<ProxyManager>,
        site: SiteConfig,
        opts: ScrapeOptions,
    ) -> Self {
        let human = Human::new(opts.pacing);
        StealthScraper {
            launcher,
            proxies,
            db: None,
            site,
            opts,
            human,
            credentials: None,
            account: None,
            injected_state: None,
            legacy_state_file: None,
            fixed_proxy: None,
            current_proxy: None,
            driver: None,
            state: ScraperState::Uninitialized,
        }
    }

    /// Account pool and session write-back.
    pub fn with_store(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Run under a throwaway account built from these credentials.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    /// Session state that takes priority over the account's stored one.
    pub fn with_storage_state(mut self, state: StorageState) -> Self {
        self.injected_state = Some(state);
        self
    }

    pub fn with_legacy_state_file(mut self, path: PathBuf) -> Self {
        self.legacy_state_file = Some(path);
        self
    }

    /// Always use this proxy instead of probing the pool.
    pub fn with_fixed_proxy(mut self, proxy: &str) -> Self {
        self.fixed_proxy = Some(proxy.to_string());
        self
    }

    pub fn with_observer(mut self, observer: WaitObserver) -> Self {
        self.human.set_observer(Some(observer));
        self
    }

    pub fn state(&self) -> ScraperState {
        self.state
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn current_proxy(&self) -> Option<&str> {
        self.current_proxy.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    fn account_label(&self) -> &str {
        self.account
            .as_ref()
            .map_or("guest", |a| a.username.as_str())
    }

    /// Resolve account, proxy and session state, then launch the browser.
    pub async fn start(&mut self) -> Result<(), ScrapeError> {
        if self.driver.is_some() {
            return Ok(());
        }
        self.resolve_account().await?;
        if self.account.is_none() {
            warn!("no active account and no credentials, starting in guest mode");
        }

        if self.current_proxy.is_none() {
            self.current_proxy = match &self.fixed_proxy {
                Some(p) => Some(p.clone()),
                None => self.proxies.get_healthy(1).await,
            };
        }

        let launch = LaunchOptions {
            headless: self.opts.headless,
            proxy: self.current_proxy.clone(),
            storage_state: self.resolve_storage_state(),
            ..LaunchOptions::default()
        };
        let driver = self.launcher.launch(&launch).await?;
        self.driver = Some(driver);
        self.state = ScraperState::Started;
        info!(
            account = self.account_label(),
            proxy = ?self.current_proxy,
            "browser started"
        );
        Ok(())
    }

    async fn resolve_account(&mut self) -> Result<(), ScrapeError> {
        if self.account.is_some() {
            return Ok(());
        }
        if let Some((username, password)) = &self.credentials {
            self.account = Some(Account::ephemeral(username, password));
            return Ok(());
        }
        if let Some(db) = &self.db {
            self.account = db
                .least_recently_used_account()
                .await
                .map_err(|e| ScrapeError::Store(e.to_string()))?;
            if let Some(acc) = &self.account {
                info!(account = %acc.username, "selected account from pool");
            }
        }
        Ok(())
    }

    /// Injected state, then the account's stored session, then the legacy
    /// session file.
    fn resolve_storage_state(&self) -> Option<StorageState> {
        if let Some(state) = &self.injected_state {
            info!("using injected session");
            return Some(state.clone());
        }
        if let Some(acc) = self.account.as_ref().filter(|a| a.has_session()) {
            match acc.session_state() {
                Ok(state) => {
                    info!(account = %acc.username, "using stored session");
                    return Some(state);
                }
                Err(e) => warn!(account = %acc.username, error = %e, "stored session is unreadable"),
            }
        }
        if let Some(path) = self.legacy_state_file.as_ref().filter(|p| p.exists()) {
            match StorageState::load_file(path) {
                Ok(state) => {
                    info!(path = %path.display(), "using legacy session file");
                    return Some(state);
                }
                Err(e) => warn!(error = %e, "legacy session file is unreadable"),
            }
        }
        None
    }

    /// Verify the session on the home page, falling back to one credential
    /// submission when a password is known. Persists the session on success.
    /// Guests always get `false`.
    pub async fn login(&mut self) -> Result<bool, ScrapeError> {
        if self.driver.is_none() {
            return Err(ScrapeError::NotStarted);
        }
        let Some(account) = self.account.clone() else {
            warn!("guest mode, no account to verify");
            self.state = ScraperState::Guest;
            return Ok(false);
        };
        let human = self.human.clone();
        let home = self.site.home_url();
        let driver = self.driver.as_deref_mut().ok_or(ScrapeError::NotStarted)?;

        info!(account = %account.username, "verifying session");
        match driver.goto(&home).await {
            Ok(()) => {
                human.jitter(driver).await;
                human.wait(1.0, 0.5, None).await;
            }
            Err(e) => warn!(error = %e, "navigation to home page failed"),
        }

        if driver.exists(&logout_locator()).await? {
            info!(account = %account.username, "session is live");
            self.persist_session().await;
            self.reactivate_account().await;
            self.state = ScraperState::LoggedIn;
            return Ok(true);
        }

        let Some(password) = account.password() else {
            return Ok(false);
        };
        info!(account = %account.username, "attempting credential login");
        match self.submit_credentials(&account.username, password).await {
            Ok(true) => {
                info!(account = %account.username, "login succeeded");
                self.persist_session().await;
                self.reactivate_account().await;
                self.state = ScraperState::LoggedIn;
                Ok(true)
            }
            Ok(false) => {
                warn!(account = %account.username, "login did not produce a session");
                Ok(false)
            }
            Err(e) => {
                error!(account = %account.username, error = %e, "login failed");
                Ok(false)
            }
        }
    }

    async fn submit_credentials(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<bool, DriverError> {
        let human = self.human.clone();
        let login_url = self.site.login_url();
        let driver = self.driver.as_deref_mut().ok_or(DriverError::Closed)?;

        driver.goto(&login_url).await?;
        human.wait(1.0, 0.5, None).await;

        let user_field = Locator::css("input[name='username']");
        driver.click(&user_field).await?;
        human.wait(0.2, 0.1, None).await;
        type_like_human(driver, &human, &user_field, username).await?;
        human.wait(0.5, 0.2, None).await;

        let pass_field = Locator::css("input[name='password']");
        driver.click(&pass_field).await?;
        human.wait(0.2, 0.1, None).await;
        type_like_human(driver, &human, &pass_field, password).await?;
        human.wait(1.5, 0.5, None).await;

        let submit = find_first(driver, &login_submit_locators())
            .await?
            .ok_or_else(|| DriverError::NoSuchElement("login submit button".into()))?;
        driver.click(&submit).await?;
        driver.exists(&logout_locator()).await
    }

    /// Write the live browser session back to the account row.
    async fn persist_session(&mut self) {
        let (Some(db), Some(acc)) = (self.db.clone(), self.account.as_ref()) else {
            return;
        };
        if !acc.is_persisted() {
            return;
        }
        let account_id = acc.id;
        let Some(driver) = self.driver.as_deref_mut() else {
            return;
        };
        let blob = match driver.storage_state().await {
            Ok(state) => state.to_json(),
            Err(e) => {
                error!(error = %e, "failed to capture session");
                return;
            }
        };
        match db.save_session(account_id, &blob).await {
            Ok(()) => {
                debug!(account_id, "session saved");
                if let Some(acc) = self.account.as_mut() {
                    acc.storage_state = blob;
                }
            }
            Err(e) => error!(account_id, error = %e, "failed to save session"),
        }
    }

    /// A verified session clears an earlier `needs_relogin` mark, e.g. one
    /// set before a proxy rotation.
    async fn reactivate_account(&mut self) {
        if self
            .account
            .as_ref()
            .is_some_and(|a| a.status == AccountStatus::NeedsRelogin)
        {
            self.mark_account(AccountStatus::Active).await;
        }
    }

    async fn mark_account(&mut self, status: AccountStatus) {
        let Some(acc) = self.account.as_mut() else {
            return;
        };
        acc.status = status;
        if !acc.is_persisted() {
            return;
        }
        if let Some(db) = &self.db {
            if let Err(e) = db.set_account_status(acc.id, status).await {
                error!(account = %acc.username, error = %e, "failed to update account status");
            }
        }
    }

    /// Inspect the current page for block pages and login walls, updating the
    /// account status on a hit.
    pub async fn check_ban(&mut self) -> Result<PageState, ScrapeError> {
        let driver = self.driver.as_deref_mut().ok_or(ScrapeError::NotStarted)?;
        let url = driver.current_url().await?;
        let html = driver.content().await?;
        let page = classify_page(&url, &html);
        match page {
            PageState::Banned => {
                warn!(account = self.account_label(), url = %url, "ban detected");
                self.mark_account(AccountStatus::Banned).await;
                self.state = ScraperState::Banned;
            }
            PageState::SessionExpired => {
                warn!(account = self.account_label(), url = %url, "session expired");
                self.mark_account(AccountStatus::NeedsRelogin).await;
                self.state = ScraperState::Expired;
            }
            PageState::Ok => {}
        }
        Ok(page)
    }

    async fn ensure_not_blocked(&mut self) -> Result<(), ScrapeError> {
        match self.check_ban().await? {
            PageState::Ok => Ok(()),
            PageState::Banned => Err(ScrapeError::Banned),
            PageState::SessionExpired => Err(ScrapeError::SessionExpired),
        }
    }

    /// Restart the browser behind a different healthy proxy. `false` when the
    /// pool has none to offer.
    pub async fn rotate_proxy(&mut self) -> Result<bool, ScrapeError> {
        let next = self
            .proxies
            .get_healthy_excluding(1, self.current_proxy.as_deref())
            .await;
        let Some(next) = next else {
            warn!("no other healthy proxy to rotate to");
            return Ok(false);
        };
        info!(proxy = %next, "rotating proxy");
        self.close().await;
        self.current_proxy = Some(next);
        self.start().await?;
        Ok(true)
    }

    /// Release the browser. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.close().await {
                warn!(error = %e, "browser did not close cleanly");
            }
            info!("browser closed");
        }
        self.state = ScraperState::Closed;
    }

    /// Lazily scrape up to `target` accepted candidates in page-then-row
    /// order.
    pub fn fetch_candidates(
        &mut self,
        target: usize,
    ) -> impl Stream<Item = Result<Candidate, ScrapeError>> + '_ {
        try_stream! {
            if self.driver.is_none() {
                Err::<(), ScrapeError>(ScrapeError::NotStarted)?;
            }
            self.state = ScraperState::Scraping;
            let start_page = self.opts.start_page.max(1);
            let max_pages = self.opts.max_pages;

            self.open_listing().await?;
            self.ensure_not_blocked().await?;
            if let Err(e) = self.apply_filters().await {
                warn!(error = %e, "filter step failed, continuing unfiltered");
            }
            if let Err(e) = self.sort_by_backlinks().await {
                warn!(error = %e, "sorting by backlinks failed");
            }

            let mut page_on_site = 1;
            while page_on_site < start_page {
                let label = format!("Going to page {}...", page_on_site + 1);
                if !self.next_page(&label, 2.0).await? {
                    warn!(page = page_on_site, "no next link before start page");
                    break;
                }
                page_on_site += 1;
                self.ensure_not_blocked().await?;
                let human = self.human.clone();
                if let Some(driver) = self.driver.as_deref_mut() {
                    human.read_page(driver).await;
                }
            }

            let mut found = 0usize;
            for page_num in start_page..start_page + max_pages {
                if found >= target {
                    break;
                }
                let offset = page_num - start_page;
                if offset > 0 && offset % 3 == 0 {
                    info!(page = page_num, "taking a long break");
                    self.human.wait(45.0, 10.0, Some("Taking a coffee break...")).await;
                }
                if page_num > start_page && !self.next_page("Going to next page...", 1.5).await? {
                    warn!(page = page_num, "no next link, stopping");
                    break;
                }
                self.ensure_not_blocked().await?;

                info!(page = page_num, "scraping page");
                let Some(rows) = self.read_listing(page_num).await? else {
                    continue;
                };
                for row in rows {
                    if found >= target {
                        break;
                    }
                    match accept_row(&row, self.opts.min_age_years, &self.opts.extra_terms) {
                        Ok(()) => {
                            found += 1;
                            info!(found, target, name = %row.name, bl = row.bl, age = row.age_years, "candidate");
                            yield row.into_candidate(page_num);
                        }
                        Err(reason) => debug!(name = %row.name, ?reason, "row rejected"),
                    }
                }
            }
            info!(found, "scraping complete");
        }
    }

    /// Home page, then click-through to the listing.
    async fn open_listing(&mut self) -> Result<(), ScrapeError> {
        let human = self.human.clone();
        let home = self.site.home_url();
        let listing_url = self.site.listing_url();
        let links = self.site.listing_links();
        let diagnostics = self.opts.diagnostics_dir.clone();
        let link_timeout = self.opts.link_timeout;
        let driver = self.driver.as_deref_mut().ok_or(ScrapeError::NotStarted)?;

        info!("visiting home page first");
        driver.goto(&home).await?;
        human.jitter(driver).await;
        human.wait(4.0, 1.5, Some("Reading homepage...")).await;

        match wait_for_any(driver, &links, link_timeout).await {
            Ok(Some(link)) => {
                info!(locator = %link, "clicking through to listing");
                driver.click(&link).await?;
            }
            Ok(None) | Err(_) => {
                warn!("listing link not found, navigating from home page");
                driver.follow(&listing_url).await?;
            }
        }
        human.read_page(driver).await;
        save_screenshot(driver, diagnostics.as_deref(), "before_filters").await;
        human.wait(3.0, 1.0, Some("Analyzing domain list...")).await;
        Ok(())
    }

    async fn apply_filters(&mut self) -> Result<(), DriverError> {
        let human = self.human.clone();
        let min_age = self.opts.min_age_years.to_string();
        let label = self.site.age_filter_label.clone();
        let driver = self.driver.as_deref_mut().ok_or(DriverError::Closed)?;

        if let Some(toggle) = find_first(driver, &show_filter_locators()).await? {
            info!("opening filter panel");
            driver.click(&toggle).await?;
            human.wait(1.5, 0.5, Some("Opening filters...")).await;
        }

        let mut age_set = false;
        for strategy in age_filter_strategies() {
            if !driver.exists(strategy.locator()).await? {
                continue;
            }
            info!(locator = %strategy.locator(), "setting age filter");
            match &strategy {
                AgeFilter::Dropdown(select) => driver.select_by_label(select, &label).await?,
                AgeFilter::NumericInput(input) => {
                    driver.click(input).await?;
                    human.wait(0.2, 0.1, None).await;
                    type_like_human(driver, &human, input, &min_age).await?;
                }
            }
            age_set = true;
            break;
        }

        if let Some(submit) = find_first(driver, &submit_filter_locators()).await? {
            info!("submitting filters");
            human.wait(1.0, 0.5, None).await;
            driver.click(&submit).await?;
            human.read_page(driver).await;
            human
                .wait(2.0, 0.8, Some("Waiting for filtered results..."))
                .await;
        } else if age_set {
            human.wait(0.5, 0.2, None).await;
            driver.press_enter().await?;
            human.wait(2.0, 0.8, None).await;
        }
        Ok(())
    }

    async fn sort_by_backlinks(&mut self) -> Result<(), DriverError> {
        let human = self.human.clone();
        let driver = self.driver.as_deref_mut().ok_or(DriverError::Closed)?;
        if let Some(sort) = find_first(driver, &sort_locators()).await? {
            info!("sorting by backlinks");
            human.wait(1.5, 0.5, Some("Sorting by BL...")).await;
            driver.click(&sort).await?;
            human.read_page(driver).await;
        }
        Ok(())
    }

    /// Click the "next" link. `false` when there is none.
    async fn next_page(&mut self, label: &str, mean: f64) -> Result<bool, DriverError> {
        let human = self.human.clone();
        let driver = self.driver.as_deref_mut().ok_or(DriverError::Closed)?;
        if !driver.exists(&next_locator()).await? {
            return Ok(false);
        }
        human.wait(mean, 0.5, Some(label)).await;
        driver.click(&next_locator()).await?;
        Ok(true)
    }

    /// Parsed rows of the current page, `None` when the listing table never
    /// rendered.
    async fn read_listing(&mut self, page: u32) -> Result<Option<Vec<ListingRow>>, DriverError> {
        let human = self.human.clone();
        let diagnostics = self.opts.diagnostics_dir.clone();
        let timeout = self.opts.listing_timeout;
        let reference_year = self.opts.reference_year;
        let driver = self.driver.as_deref_mut().ok_or(DriverError::Closed)?;

        human.read_page(driver).await;
        if !driver.wait_for(&listing_table_locator(), timeout).await? {
            warn!(page, "listing table did not render");
            save_screenshot(driver, diagnostics.as_deref(), &format!("search_fail_p{}", page)).await;
            return Ok(None);
        }
        let html = driver.content().await?;
        let rows = parse_listing(&html, reference_year);
        if rows.is_empty() {
            let snippet: String = html.chars().take(500).collect();
            warn!(page, "no rows found on listing page");
            debug!(page, snippet = %snippet.replace('\n', " "), "page content");
            save_screenshot(driver, diagnostics.as_deref(), &format!("search_fail_p{}", page)).await;
        }
        info!(page, rows = rows.len(), "parsed listing page");
        Ok(Some(rows))
    }
}
