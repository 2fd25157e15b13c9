//! # Verify — RDAP Availability Checks
//!
//! Classifies each candidate with one registry lookup,
//! `GET {base}/domain/{name}`:
//!
//! | Response | Status |
//! |----------|--------|
//! | 404 | `available` |
//! | 200 | `taken` |
//! | anything else, or no response within the timeout | `error` |
//!
//! Errors are not retried; the candidate is simply left out of the available
//! set. Lookups run strictly one after another with a fixed delay between
//! consecutive queries (none after the last), which keeps the registry's
//! implicit rate limit happy: N lookups take at least `(N-1)·delay`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::{Candidate, DomainStatus};

pub const DEFAULT_RDAP_URL: &str = "https://rdap.verisign.com/com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Told about every candidate as soon as its status is known.
#[async_trait]
pub trait VerifyObserver: Send + Sync {
    async fn on_progress(
        &self,
        candidate: &Candidate,
        current: usize,
        total: usize,
    ) -> anyhow::Result<()>;
}

pub struct RdapClient {
    client: reqwest::Client,
    base_url: String,
}

impl RdapClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RdapClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One lookup for `name`.
    pub async fn check(&self, name: &str) -> DomainStatus {
        let url = format!("{}/domain/{}", self.base_url, name);
        match self.client.get(&url).send().await {
            Ok(resp) => match resp.status().as_u16() {
                404 => DomainStatus::Available,
                200 => DomainStatus::Taken,
                code => {
                    warn!(domain = name, status = code, "unexpected rdap status");
                    DomainStatus::Error
                }
            },
            Err(e) => {
                error!(domain = name, error = %e, "rdap request failed");
                DomainStatus::Error
            }
        }
    }

    /// Classify every candidate in order and return the available ones.
    ///
    /// The observer sees each annotated candidate with its 1-based position.
    /// Observer failures are logged and never stop verification.
    pub async fn verify(
        &self,
        candidates: Vec<Candidate>,
        delay: Duration,
        observer: Option<&dyn VerifyObserver>,
    ) -> Vec<Candidate> {
        let total = candidates.len();
        let mut available = Vec::new();

        for (i, mut candidate) in candidates.into_iter().enumerate() {
            info!(current = i + 1, total, domain = %candidate.name, "verifying");
            candidate.status = self.check(&candidate.name).await;
            match candidate.status {
                DomainStatus::Available => info!(domain = %candidate.name, "available"),
                DomainStatus::Taken => info!(domain = %candidate.name, "taken"),
                _ => info!(domain = %candidate.name, "lookup failed, skipping"),
            }

            if let Some(obs) = observer {
                if let Err(e) = obs.on_progress(&candidate, i + 1, total).await {
                    warn!(domain = %candidate.name, error = %e, "progress observer failed");
                }
            }

            if candidate.status == DomainStatus::Available {
                available.push(candidate);
            }
            if i + 1 < total && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(available = available.len(), checked = total, "verification complete");
        available
    }
}
