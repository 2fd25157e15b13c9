//! # Pipeline — Search Job Orchestrator
//!
//! Runs one search job end to end on the calling task:
//!
//! 1. Validate the requesting account (exists, active, has a stored session)
//! 2. Create the search task row
//! 3. Start the browser and verify the session (one proxy rotation on failure)
//! 4. Stream `target × overfetch` candidates, persisting each row before it is
//!    reported
//! 5. Close the browser
//! 6. Verify every candidate over RDAP, updating rows as results arrive
//! 7. Finalize the task with `found_count` = available rows
//!
//! Progress flows through a [`Reporter`]. Every fatal path marks the task
//! failed (when one exists) and emits exactly one `error` message. When the
//! receiving side goes away the run stops at the next stage boundary and the
//! task is failed with "client disconnected".

use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::{Account, AccountStatus, Database};
use crate::domain::{Candidate, DomainStatus};
use crate::events::{
    collection_progress, verification_progress, JobMessage, Reporter, COLLECTION_START,
    VERIFICATION_START,
};
use crate::prom_metrics::Metrics;
use crate::proxy::{ProxyManager, DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_URL};
use crate::scraper::driver::BrowserLauncher;
use crate::scraper::{ScrapeError, ScrapeOptions, SiteConfig, StealthScraper};
use crate::verify::{RdapClient, VerifyObserver, DEFAULT_RDAP_URL, DEFAULT_TIMEOUT};

pub const DEFAULT_OVERFETCH: usize = 3;

/// Largest `target_count` a single job accepts.
pub const MAX_TARGET_COUNT: usize = 1_000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub rdap_url: String,
    pub rdap_timeout: Duration,
    /// Candidates collected per requested domain.
    pub overfetch_multiplier: usize,
    pub verify_delay: Duration,
    pub proxy_file: Option<PathBuf>,
    pub proxy_url: Option<String>,
    /// URL fetched through a proxy to decide whether it is healthy.
    pub proxy_probe_url: String,
    pub legacy_state_file: Option<PathBuf>,
    pub site: SiteConfig,
    pub scrape: ScrapeOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            rdap_url: DEFAULT_RDAP_URL.to_string(),
            rdap_timeout: DEFAULT_TIMEOUT,
            overfetch_multiplier: DEFAULT_OVERFETCH,
            verify_delay: Duration::from_secs(1),
            proxy_file: None,
            proxy_url: None,
            proxy_probe_url: DEFAULT_PROBE_URL.to_string(),
            legacy_state_file: None,
            site: SiteConfig::default(),
            scrape: ScrapeOptions::default(),
        }
    }
}

/// What the operator asked for.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SearchRequest {
    #[serde(default = "default_target")]
    pub target_count: usize,
    #[serde(default)]
    pub username: String,
}

fn default_target() -> usize {
    10
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a username is required")]
    MissingUsername,

    #[error("unknown account '{0}'")]
    UnknownAccount(String),

    #[error("account '{username}' is {status}; upload a fresh session")]
    AccountInactive {
        username: String,
        status: AccountStatus,
    },

    #[error("no active session for '{0}'; connect one through the browser extension")]
    NoSession(String),

    #[error("target_count {0} is out of range (1..={max})", max = MAX_TARGET_COUNT)]
    TargetOutOfRange(usize),

    #[error("failed to start the browser: {0}")]
    Start(ScrapeError),

    #[error("session could not be verified, even after rotating the proxy")]
    Login,

    #[error("scraping aborted: {0}")]
    Detection(ScrapeError),

    #[error("no candidates found; the account may be banned or facing a captcha")]
    NoCandidates,

    #[error("client disconnected")]
    Disconnected,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    /// Rejected before any task row was created.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingUsername
                | PipelineError::UnknownAccount(_)
                | PipelineError::AccountInactive { .. }
                | PipelineError::NoSession(_)
                | PipelineError::TargetOutOfRange(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub task_id: i64,
    pub collected: usize,
    pub found: i64,
    pub available: Vec<Candidate>,
}

pub struct Pipeline {
    db: Database,
    config: PipelineConfig,
    launcher: Arc<dyn BrowserLauncher>,
    rdap: RdapClient,
    metrics: Option<Arc<Metrics>>,
}

impl Pipeline {
    pub fn new(
        db: Database,
        config: PipelineConfig,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> anyhow::Result<Self> {
        let rdap = RdapClient::with_timeout(&config.rdap_url, config.rdap_timeout)?;
        Ok(Pipeline {
            db,
            config,
            launcher,
            rdap,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one job to completion, reporting through `reporter`.
    pub async fn run(
        &self,
        request: SearchRequest,
        reporter: &Reporter,
    ) -> Result<JobSummary, PipelineError> {
        if let Some(m) = &self.metrics {
            m.jobs_active.inc();
        }
        let mut task_id = None;
        let result = self.execute(&request, reporter, &mut task_id).await;

        match &result {
            Ok(summary) => {
                info!(
                    task_id = summary.task_id,
                    collected = summary.collected,
                    found = summary.found,
                    "search complete"
                );
                self.record_outcome("completed");
            }
            Err(e) => {
                error!(task_id = ?task_id, error = %e, "search failed");
                if let Some(id) = task_id {
                    if let Err(db_err) = self.db.fail_task(id, &e.to_string()).await {
                        error!(task_id = id, error = %db_err, "failed to mark task failed");
                    }
                }
                if !matches!(e, PipelineError::Disconnected) {
                    reporter.error(e.to_string());
                }
                self.record_outcome("failed");
            }
        }
        if let Some(m) = &self.metrics {
            m.jobs_active.dec();
        }
        result
    }

    fn record_outcome(&self, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.record_job(outcome);
        }
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        reporter: &Reporter,
        task_slot: &mut Option<i64>,
    ) -> Result<JobSummary, PipelineError> {
        emit(reporter, JobMessage::status("Checking account...", Some(5)))?;
        let target = checked_target(request.target_count)?;
        let account = self.validate(&request.username).await?;

        let stored_target = i64::try_from(target)
            .map_err(|_| PipelineError::TargetOutOfRange(request.target_count))?;
        let task_id = self.db.create_task(stored_target).await?;
        *task_slot = Some(task_id);
        info!(task_id, target, account = %account.username, "search started");

        emit(
            reporter,
            JobMessage::Status {
                message: "Starting scraper with your session...".into(),
                progress: Some(25),
                task_id: Some(task_id),
                domain: None,
            },
        )?;

        let mut scraper = self.build_scraper(account, reporter);
        let collected = self.collect(&mut scraper, task_id, target, reporter).await;
        scraper.close().await;
        let candidates = collected?;

        if candidates.is_empty() {
            return Err(PipelineError::NoCandidates);
        }
        emit(
            reporter,
            JobMessage::status("Checking availability...", Some(VERIFICATION_START)),
        )?;

        let relay = ProgressRelay {
            db: &self.db,
            task_id,
            result_ids: candidates.iter().map(|(id, _)| *id).collect(),
            reporter,
            metrics: self.metrics.as_deref(),
        };
        let collected_count = candidates.len();
        let batch = candidates.into_iter().map(|(_, c)| c).collect();
        let available = self
            .rdap
            .verify(batch, self.config.verify_delay, Some(&relay))
            .await;
        if reporter.is_closed() {
            return Err(PipelineError::Disconnected);
        }

        let found = self.db.complete_task(task_id).await?.unwrap_or(0);
        reporter.send(JobMessage::done(format!(
            "Search finished: {} available of {} checked. History saved.",
            found, collected_count
        )));
        Ok(JobSummary {
            task_id,
            collected: collected_count,
            found,
            available,
        })
    }

    /// Account must exist, be active and carry a stored session.
    pub async fn validate(&self, username: &str) -> Result<Account, PipelineError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(PipelineError::MissingUsername);
        }
        let account = self
            .db
            .get_account_by_username(username)
            .await?
            .ok_or_else(|| PipelineError::UnknownAccount(username.to_string()))?;
        if account.status != AccountStatus::Active {
            return Err(PipelineError::AccountInactive {
                username: account.username,
                status: account.status,
            });
        }
        if !account.has_session() {
            return Err(PipelineError::NoSession(account.username));
        }
        Ok(account)
    }

    fn build_scraper(&self, account: Account, reporter: &Reporter) -> StealthScraper {
        let proxies = ProxyManager::load(
            self.config.proxy_file.as_deref(),
            self.config.proxy_url.as_deref(),
        )
        .with_probe(&self.config.proxy_probe_url, DEFAULT_PROBE_TIMEOUT);
        let relay = reporter.clone();
        let mut scraper = StealthScraper::new(
            self.launcher.clone(),
            Arc::new(proxies),
            self.config.site.clone(),
            self.config.scrape.clone(),
        )
        .with_store(self.db.clone())
        .with_account(account)
        .with_observer(Arc::new(move |label: &str| {
            relay.status(label, None);
        }));
        if let Some(path) = &self.config.legacy_state_file {
            scraper = scraper.with_legacy_state_file(path.clone());
        }
        scraper
    }

    /// Start, log in and stream candidates. Every yielded candidate is stored
    /// before it is reported.
    async fn collect(
        &self,
        scraper: &mut StealthScraper,
        task_id: i64,
        target: usize,
        reporter: &Reporter,
    ) -> Result<Vec<(i64, Candidate)>, PipelineError> {
        scraper.start().await.map_err(PipelineError::Start)?;
        self.db.mark_task_running(task_id).await?;
        if reporter.is_closed() {
            return Err(PipelineError::Disconnected);
        }

        if !self.login_with_rotation(scraper).await {
            return Err(PipelineError::Login);
        }
        emit(
            reporter,
            JobMessage::status("Collecting domains...", Some(COLLECTION_START)),
        )?;

        let over_fetch = target.saturating_mul(self.config.overfetch_multiplier.max(1));
        let mut collected = Vec::new();
        let stream = scraper.fetch_candidates(over_fetch);
        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let candidate = match item {
                Ok(c) => c,
                Err(e) if e.is_detection() => return Err(PipelineError::Detection(e)),
                Err(e) => {
                    warn!(task_id, error = %e, "scraping interrupted");
                    emit(
                        reporter,
                        JobMessage::status(
                            format!("Scraping interrupted: {}. Checking what was found...", e),
                            None,
                        ),
                    )?;
                    break;
                }
            };
            let result_id = self.db.insert_result(task_id, &candidate).await?;
            if let Some(m) = &self.metrics {
                m.candidates_scraped.inc();
            }
            collected.push((result_id, candidate.clone()));
            emit(
                reporter,
                JobMessage::Candidate {
                    domain: candidate,
                    progress: collection_progress(collected.len(), over_fetch),
                    message: format!("Collected: {}/{}", collected.len(), over_fetch),
                },
            )?;
        }
        Ok(collected)
    }

    /// Verify the session; on failure inspect the page and retry once behind
    /// another proxy.
    async fn login_with_rotation(&self, scraper: &mut StealthScraper) -> bool {
        match scraper.login().await {
            Ok(true) => return true,
            Ok(false) => warn!("session verification failed"),
            Err(e) => warn!(error = %e, "session verification errored"),
        }
        if let Err(e) = scraper.check_ban().await {
            warn!(error = %e, "ban check failed");
        }
        match scraper.rotate_proxy().await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                error!(error = %e, "proxy rotation failed");
                return false;
            }
        }
        match scraper.login().await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "login after rotation failed");
                false
            }
        }
    }
}

/// Zero is treated as one; anything above `MAX_TARGET_COUNT` is rejected.
fn checked_target(requested: usize) -> Result<usize, PipelineError> {
    if requested > MAX_TARGET_COUNT {
        return Err(PipelineError::TargetOutOfRange(requested));
    }
    Ok(requested.max(1))
}

fn emit(reporter: &Reporter, msg: JobMessage) -> Result<(), PipelineError> {
    if reporter.send(msg) {
        Ok(())
    } else {
        Err(PipelineError::Disconnected)
    }
}

/// Writes each verification outcome to the store, then reports it.
struct ProgressRelay<'a> {
    db: &'a Database,
    task_id: i64,
    result_ids: Vec<i64>,
    reporter: &'a Reporter,
    metrics: Option<&'a Metrics>,
}

#[async_trait]
impl VerifyObserver for ProgressRelay<'_> {
    async fn on_progress(
        &self,
        candidate: &Candidate,
        current: usize,
        total: usize,
    ) -> anyhow::Result<()> {
        let result_id = self
            .result_ids
            .get(current.saturating_sub(1))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no stored row for {}", candidate.name))?;
        self.db
            .update_result_status(result_id, candidate.status)
            .await?;
        if candidate.status == DomainStatus::Available {
            self.db.increment_found(self.task_id).await?;
        }
        if let Some(m) = self.metrics {
            m.record_verified(candidate.status.as_str());
        }

        let progress = verification_progress(current, total);
        let msg = if candidate.status == DomainStatus::Available {
            JobMessage::Result {
                domain: candidate.clone(),
                progress,
            }
        } else {
            JobMessage::Status {
                message: format!("{}: {}", candidate.name, candidate.status),
                progress: Some(progress),
                task_id: None,
                domain: Some(candidate.clone()),
            }
        };
        if !self.reporter.send(msg) {
            anyhow::bail!("client disconnected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"username":"manager_1"}"#).unwrap();
        assert_eq!(req.target_count, 10);
        assert_eq!(req.username, "manager_1");
        let req: SearchRequest = serde_json::from_str(r#"{"target_count":3}"#).unwrap();
        assert!(req.username.is_empty());
    }

    #[test]
    fn validation_errors_are_named() {
        assert!(PipelineError::MissingUsername.is_validation());
        assert!(PipelineError::NoSession("a".into()).is_validation());
        assert!(!PipelineError::NoCandidates.is_validation());
        let e = PipelineError::AccountInactive {
            username: "manager_1".into(),
            status: AccountStatus::Banned,
        };
        assert_eq!(
            e.to_string(),
            "account 'manager_1' is banned; upload a fresh session"
        );
    }

    #[test]
    fn target_count_bounds() {
        assert_eq!(checked_target(0).unwrap(), 1);
        assert_eq!(checked_target(MAX_TARGET_COUNT).unwrap(), MAX_TARGET_COUNT);
        let err = checked_target(usize::MAX / 2).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("target_count "));
    }

    #[tokio::test]
    async fn validate_checks_existence_status_and_session() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let launcher: Arc<dyn BrowserLauncher> = Arc::new(NoBrowser);
        let pipeline = Pipeline::new(db.clone(), PipelineConfig::default(), launcher).unwrap();

        assert!(matches!(
            pipeline.validate("  ").await,
            Err(PipelineError::MissingUsername)
        ));
        assert!(matches!(
            pipeline.validate("ghost").await,
            Err(PipelineError::UnknownAccount(_))
        ));

        db.create_account("fresh", None, "").await.unwrap();
        assert!(matches!(
            pipeline.validate("fresh").await,
            Err(PipelineError::NoSession(_))
        ));

        db.upsert_session("fresh", r#"{"cookies":[],"origins":[]}"#)
            .await
            .unwrap();
        assert_eq!(pipeline.validate("fresh").await.unwrap().username, "fresh");
    }

    struct NoBrowser;

    #[async_trait]
    impl BrowserLauncher for NoBrowser {
        async fn launch(
            &self,
            _: &crate::scraper::driver::LaunchOptions,
        ) -> crate::scraper::driver::Result<Box<dyn crate::scraper::driver::BrowserDriver>> {
            Err(crate::scraper::driver::DriverError::Closed)
        }
    }
}
