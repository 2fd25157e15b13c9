//! Listing-page parsing and page-state classification.
//!
//! The listing is a `table#listing` where each domain row carries the name in
//! `a.namelinks`, the backlink count in `td.field_bl` and the first
//! registration year in `td.field_abirth`.

use ::scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::domain::Candidate;
use crate::filters;

/// Earliest birth year treated as plausible.
pub const MIN_BIRTH_YEAR: i32 = 1980;

static ROW: LazyLock<Selector> = LazyLock::new(|| sel("table#listing tr"));
static NAME: LazyLock<Selector> = LazyLock::new(|| sel("a.namelinks"));
static BL: LazyLock<Selector> = LazyLock::new(|| sel("td.field_bl"));
static BIRTH: LazyLock<Selector> = LazyLock::new(|| sel("td.field_abirth"));

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap_or_else(|e| panic!("static selector {:?}: {}", s, e))
}

/// Phrases that only appear on block or challenge pages.
pub const BAN_PHRASES: &[&str] = &[
    "ip address is blocked",
    "too many requests",
    "access denied",
    "are you a robot",
    "not a robot",
    "robot check",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Ok,
    Banned,
    SessionExpired,
}

/// Classify a page by its URL and HTML. Block phrases win over login walls.
pub fn classify_page(url: &str, html: &str) -> PageState {
    let content = html.to_lowercase();
    if BAN_PHRASES.iter().any(|p| content.contains(p)) {
        return PageState::Banned;
    }
    if url.contains("/login/") || (content.contains("login") && !content.contains("logout")) {
        return PageState::SessionExpired;
    }
    PageState::Ok
}

/// One parsed table row before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub name: String,
    pub bl: u64,
    /// Years since first registration, 0 when unknown.
    pub age_years: u32,
}

fn cell_text(row: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// Digits only after dropping thousands separators, else 0.
pub fn parse_backlinks(text: &str) -> u64 {
    let cleaned = text.trim().replace(',', "");
    if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
        cleaned.parse().unwrap_or(0)
    } else {
        0
    }
}

/// Age in years for a birth-year cell, 0 when the year is missing or
/// outside `MIN_BIRTH_YEAR..=reference_year`.
pub fn parse_age(text: &str, reference_year: i32) -> u32 {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    match text.parse::<i32>() {
        Ok(year) if (MIN_BIRTH_YEAR..=reference_year).contains(&year) => {
            (reference_year - year) as u32
        }
        _ => 0,
    }
}

/// Every domain row of the listing table, in page order. Rows without a
/// name link (headers, ads) are skipped.
pub fn parse_listing(html: &str, reference_year: i32) -> Vec<ListingRow> {
    let doc = Html::parse_document(html);
    doc.select(&ROW)
        .filter_map(|row| {
            let name = cell_text(&row, &NAME)?.to_lowercase();
            if name.is_empty() {
                return None;
            }
            let bl = cell_text(&row, &BL).map_or(0, |t| parse_backlinks(&t));
            let age_years = cell_text(&row, &BIRTH).map_or(0, |t| parse_age(&t, reference_year));
            Some(ListingRow {
                name,
                bl,
                age_years,
            })
        })
        .collect()
}

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Format,
    Policy(String),
    TooYoung(u32),
}

/// Apply format, content-policy and minimum-age checks. An unknown age (0)
/// passes.
pub fn accept_row(
    row: &ListingRow,
    min_age_years: u32,
    extra_terms: &[String],
) -> std::result::Result<(), Rejection> {
    if !filters::is_valid_format(&row.name) {
        return Err(Rejection::Format);
    }
    if let Some(term) = filters::matched_term(&row.name, extra_terms) {
        return Err(Rejection::Policy(term));
    }
    if row.age_years > 0 && row.age_years < min_age_years {
        return Err(Rejection::TooYoung(row.age_years));
    }
    Ok(())
}

impl ListingRow {
    pub fn into_candidate(self, source_page: u32) -> Candidate {
        Candidate::new(self.name, self.bl, self.age_years, source_page)
    }
}
