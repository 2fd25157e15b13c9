//! Candidate domains as they move through scrape → persist → verify.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one candidate. `Pending` until the verifier assigns exactly
/// one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DomainStatus {
    #[default]
    Pending,
    Available,
    Taken,
    Error,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Pending => "pending",
            DomainStatus::Available => "available",
            DomainStatus::Taken => "taken",
            DomainStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DomainStatus::Pending)
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row extracted from the listing, after filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    /// Backlink count reported by the listing.
    pub bl: u64,
    /// Years since first registration; 0 when the listing gave no usable year.
    pub age_years: u32,
    pub source_page: u32,
    #[serde(default)]
    pub status: DomainStatus,
}

impl Candidate {
    pub fn new(name: impl Into<String>, bl: u64, age_years: u32, source_page: u32) -> Self {
        Candidate {
            name: name.into(),
            bl,
            age_years,
            source_page,
            status: DomainStatus::Pending,
        }
    }
}
