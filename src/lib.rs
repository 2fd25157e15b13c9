//! # dropscout
//!
//! Finds recently deleted, high-value `.com` names on a bot-hostile listing
//! site, drops anything that fails the content policy, and confirms live
//! availability with RDAP, streaming progress to the operator as it goes.
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`filters`] | Name format and content-policy checks |
//! | [`session`] | Serialized browser session (cookies + local storage) |
//! | [`domain`] | Candidate and verification status types |
//! | [`db`] | SQLite store for accounts, tasks and results |
//! | [`proxy`] | Proxy pool and liveness probes |
//! | [`scraper`] | Stealth browser session over WebDriver |
//! | [`verify`] | Rate-limited RDAP availability checks |
//! | [`events`] | Job channel messages and progress bands |
//! | [`pipeline`] | Scrape → persist → verify orchestration |
//! | [`prom_metrics`] | Prometheus registry |
//! | [`dashboard`] | Axum HTTP + WebSocket server |

pub mod dashboard;
pub mod db;
pub mod domain;
pub mod events;
pub mod filters;
pub mod pipeline;
pub mod prom_metrics;
pub mod proxy;
pub mod scraper;
pub mod session;
pub mod verify;
