//! # Prometheus Metrics
//!
//! Operational counters for the search pipeline and the HTTP surface, rendered
//! in the OpenMetrics text format by `GET /metrics`.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `dropscout_jobs` | Counter | `outcome` | Finished pipeline runs (`completed` / `failed`) |
//! | `dropscout_jobs_active` | Gauge | — | Pipeline runs in flight |
//! | `dropscout_candidates_scraped` | Counter | — | Candidates persisted from the listing |
//! | `dropscout_domains_verified` | Counter | `status` | RDAP outcomes (`available` / `taken` / `error`) |
//! | `dropscout_sessions_uploaded` | Counter | — | Session-ingestion calls accepted |
//! | `dropscout_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabel {
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabel {
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// All fields are atomic and safe to update from any task.
pub struct Metrics {
    pub registry: Registry,
    pub jobs: Family<OutcomeLabel, Counter>,
    pub jobs_active: Gauge,
    pub candidates_scraped: Counter,
    pub domains_verified: Family<StatusLabel, Counter>,
    pub sessions_uploaded: Counter,
    pub http_request_duration: Family<HttpLabel, Histogram>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let jobs = Family::<OutcomeLabel, Counter>::default();
        registry.register("dropscout_jobs", "Finished pipeline runs by outcome", jobs.clone());

        let jobs_active = Gauge::default();
        registry.register(
            "dropscout_jobs_active",
            "Pipeline runs currently in flight",
            jobs_active.clone(),
        );

        let candidates_scraped = Counter::default();
        registry.register(
            "dropscout_candidates_scraped",
            "Candidates persisted from the listing",
            candidates_scraped.clone(),
        );

        let domains_verified = Family::<StatusLabel, Counter>::default();
        registry.register(
            "dropscout_domains_verified",
            "RDAP lookups by outcome",
            domains_verified.clone(),
        );

        let sessions_uploaded = Counter::default();
        registry.register(
            "dropscout_sessions_uploaded",
            "Browser sessions accepted by the ingestion endpoint",
            sessions_uploaded.clone(),
        );

        let http_request_duration =
            Family::<HttpLabel, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.005, 2.0, 12))
            });
        registry.register(
            "dropscout_http_request_duration_seconds",
            "HTTP request latency",
            http_request_duration.clone(),
        );

        Self {
            registry,
            jobs,
            jobs_active,
            candidates_scraped,
            domains_verified,
            sessions_uploaded,
            http_request_duration,
        }
    }

    pub fn record_job(&self, outcome: &str) {
        self.jobs
            .get_or_create(&OutcomeLabel {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_verified(&self, status: &str) {
        self.domains_verified
            .get_or_create(&StatusLabel {
                status: status.to_string(),
            })
            .inc();
    }

    /// Render the registry in text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_contains_registered_metrics() {
        let m = Metrics::new();
        m.jobs_active.set(1);
        m.candidates_scraped.inc_by(4);
        m.record_job("completed");
        m.record_verified("available");

        let output = m.encode();
        assert!(output.contains("dropscout_jobs_active 1"));
        assert!(output.contains("dropscout_candidates_scraped_total 4"));
        assert!(output.contains("outcome=\"completed\""));
        assert!(output.contains("status=\"available\""));
    }

    #[test]
    fn status_counters_are_independent() {
        let m = Metrics::new();
        m.record_verified("available");
        m.record_verified("taken");
        m.record_verified("taken");
        let taken = m
            .domains_verified
            .get_or_create(&StatusLabel {
                status: "taken".into(),
            })
            .get();
        assert_eq!(taken, 2);
    }

    #[test]
    fn http_histogram_records_observations() {
        let m = Metrics::new();
        m.http_request_duration
            .get_or_create(&HttpLabel {
                method: "GET".into(),
                path: "/api/history".into(),
            })
            .observe(0.02);
        let output = m.encode();
        assert!(output.contains("dropscout_http_request_duration_seconds"));
        assert!(output.contains("path=\"/api/history\""));
    }
}
