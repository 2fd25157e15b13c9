//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs` so the entry
//! point stays a thin dispatcher.

use anyhow::Result;
use async_trait::async_trait;
use dropscout::db::Database;
use dropscout::domain::Candidate;
use dropscout::events::{self, JobMessage};
use dropscout::pipeline::{Pipeline, PipelineConfig, SearchRequest};
use dropscout::proxy::ProxyManager;
use dropscout::scraper::driver::BrowserLauncher;
use dropscout::scraper::webdriver::WebDriverLauncher;
use dropscout::scraper::{ScrapeOptions, SiteConfig, StealthScraper};
use dropscout::verify::{RdapClient, VerifyObserver};
use dropscout::{dashboard, filters};
use futures::{pin_mut, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{AccountAction, Cli, ProxyAction};

// ── Configuration ───────────────────────────────────────────────

fn scrape_options(cli: &Cli) -> ScrapeOptions {
    ScrapeOptions {
        headless: cli.headless,
        min_age_years: cli.min_age_years,
        start_page: cli.start_page,
        max_pages: cli.max_pages,
        extra_terms: cli.stop_terms.clone(),
        diagnostics_dir: cli.diagnostics_dir.clone(),
        ..ScrapeOptions::default()
    }
}

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    PipelineConfig {
        rdap_url: cli.rdap_url.clone(),
        overfetch_multiplier: cli.overfetch_multiplier,
        verify_delay: Duration::from_millis(cli.verify_delay_ms),
        proxy_file: Some(cli.proxy_file.clone()),
        proxy_url: cli.proxy_url.clone(),
        legacy_state_file: Some(cli.auth_state_file.clone()),
        site: SiteConfig::new(&cli.site_url),
        scrape: scrape_options(cli),
        ..PipelineConfig::default()
    }
}

fn launcher(cli: &Cli) -> Result<Arc<dyn BrowserLauncher>> {
    Ok(Arc::new(WebDriverLauncher::new(&cli.webdriver_url)?))
}

fn proxy_pool(cli: &Cli) -> ProxyManager {
    ProxyManager::load(Some(&cli.proxy_file), cli.proxy_url.as_deref())
}

// ── Subcommands ─────────────────────────────────────────────────

pub async fn run_serve(
    cli: &Cli,
    host: IpAddr,
    port: u16,
    static_dir: Option<&Path>,
) -> Result<()> {
    let db = Database::connect(&cli.database_url).await?;
    let state = dashboard::AppState::new(db, pipeline_config(cli), launcher(cli)?)?;
    dashboard::run(state, SocketAddr::new(host, port), static_dir).await
}

fn print_message(msg: &JobMessage) {
    match msg {
        JobMessage::Status {
            message, progress, ..
        } => match progress {
            Some(p) => println!("[{:>3}%] {}", p, message),
            None => println!("       {}", message),
        },
        JobMessage::Candidate {
            message, progress, ..
        } => println!("[{:>3}%] {}", progress, message),
        JobMessage::Result { domain, progress } => println!(
            "[{:>3}%] AVAILABLE {} (bl {}, age {})",
            progress, domain.name, domain.bl, domain.age_years
        ),
        JobMessage::Error { message } => eprintln!("error: {}", message),
        JobMessage::Done { message, .. } => println!("[100%] {}", message),
    }
}

pub async fn run_search(cli: &Cli, target: usize, username: &str) -> Result<()> {
    let db = Database::connect(&cli.database_url).await?;
    let pipeline = Pipeline::new(db, pipeline_config(cli), launcher(cli)?)?;

    let (reporter, mut rx) = events::channel();
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            print_message(&msg);
        }
    });

    let request = SearchRequest {
        target_count: target,
        username: username.to_string(),
    };
    let result = pipeline.run(request, &reporter).await;
    drop(reporter);
    if let Err(e) = printer.await {
        warn!(error = %e, "progress printer stopped");
    }

    let summary = result?;
    for c in &summary.available {
        println!("{}\t{}\t{}", c.name, c.bl, c.age_years);
    }
    Ok(())
}

/// Uses the `ED_USERNAME`/`ED_PASSWORD` pair when set, otherwise the
/// least-recently-used pooled account.
pub async fn run_scrape(cli: &Cli, target: usize) -> Result<()> {
    let db = Database::connect(&cli.database_url).await?;
    let mut scraper = StealthScraper::new(
        launcher(cli)?,
        Arc::new(proxy_pool(cli)),
        SiteConfig::new(&cli.site_url),
        scrape_options(cli),
    )
    .with_store(db)
    .with_legacy_state_file(cli.auth_state_file.clone());
    if let (Some(user), Some(pass)) = (&cli.ed_username, &cli.ed_password) {
        scraper = scraper.with_credentials(user, pass);
    }

    scraper.start().await?;
    if !scraper.login().await? {
        warn!("not logged in, the listing may be limited");
    }

    let mut collected = 0usize;
    let outcome = async {
        let stream = scraper.fetch_candidates(target);
        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let candidate = item?;
            collected += 1;
            println!("{}", serde_json::to_string(&candidate)?);
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    scraper.close().await;
    info!(collected, "scrape finished");
    outcome
}

struct PrintProgress;

#[async_trait]
impl VerifyObserver for PrintProgress {
    async fn on_progress(&self, c: &Candidate, current: usize, total: usize) -> Result<()> {
        println!("[{}/{}] {}\t{}", current, total, c.name, c.status);
        Ok(())
    }
}

pub async fn run_verify(cli: &Cli, names: &[String], file: Option<&Path>) -> Result<()> {
    let mut all: Vec<String> = names.to_vec();
    if let Some(path) = file {
        let content = tokio::fs::read_to_string(path).await?;
        all.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    let all: Vec<String> = all.into_iter().map(|n| n.to_lowercase()).collect();
    let kept = filters::filter(&all, &cli.stop_terms);
    if kept.len() < all.len() {
        info!(dropped = all.len() - kept.len(), "names rejected by the content filter");
    }
    if kept.is_empty() {
        anyhow::bail!("no valid, policy-clean names to verify");
    }

    let rdap = RdapClient::new(&cli.rdap_url)?;
    let candidates = kept.into_iter().map(|n| Candidate::new(n, 0, 0, 0)).collect();
    let available = rdap
        .verify(
            candidates,
            Duration::from_millis(cli.verify_delay_ms),
            Some(&PrintProgress),
        )
        .await;
    println!("{} available", available.len());
    Ok(())
}

pub async fn run_account(cli: &Cli, action: &AccountAction) -> Result<()> {
    let db = Database::connect(&cli.database_url).await?;
    match action {
        AccountAction::Add {
            username,
            password,
            email,
        } => {
            let id = db
                .create_account(username, password.as_deref(), email)
                .await?;
            info!(id, username = %username, "account added");
        }
        AccountAction::Reset { username } => {
            if db.reset_account(username).await? {
                info!(username = %username, "account reset to active");
            } else {
                anyhow::bail!("no account named '{}'", username);
            }
        }
        AccountAction::List => {
            println!(
                "{:<5} {:<24} {:<14} {:<8} last used",
                "id", "username", "status", "session"
            );
            for acc in db.list_accounts().await? {
                println!(
                    "{:<5} {:<24} {:<14} {:<8} {}",
                    acc.id,
                    acc.username,
                    acc.status,
                    if acc.has_session() { "yes" } else { "no" },
                    acc.last_used
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
    }
    Ok(())
}

pub async fn run_proxies(cli: &Cli, action: &ProxyAction) -> Result<()> {
    match action {
        ProxyAction::Check => {
            let pool = proxy_pool(cli);
            if pool.is_empty() {
                anyhow::bail!("no proxies configured (PROXY_FILE / PROXY_URL)");
            }
            let mut healthy = 0usize;
            for endpoint in pool.proxies() {
                let ok = pool.probe(endpoint).await;
                healthy += ok as usize;
                println!("{}\t{}", if ok { "ok  " } else { "dead" }, endpoint);
            }
            println!("{}/{} healthy", healthy, pool.len());
        }
    }
    Ok(())
}
