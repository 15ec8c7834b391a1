//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resolver_alias_conflicts_total` (counter): aliases rejected as duplicates
//! - `resolver_alias_invalid_total` (counter): alias values rejected as malformed
//! - `resolver_vanity_entries` (gauge): live cached vanity entries
//! - `resolver_vanity_temporary_hits_total` / `_misses_total` (counter):
//!   lookups served while the vanity index was still loading
//! - `resolver_vanity_bloom_negative_total` (counter): lookups answered by the bloom filter
//! - `resolver_resolve_total` (counter): resolutions by `outcome`
//! - `resolver_mapping_chain_aborted_total` (counter): mapping chains cut at the iteration bound
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Indexes keep their own atomic counts; these metrics only mirror them

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter"),
    }
}

pub fn record_alias_conflict() {
    ::metrics::counter!("resolver_alias_conflicts_total").increment(1);
}

pub fn record_alias_invalid() {
    ::metrics::counter!("resolver_alias_invalid_total").increment(1);
}

pub fn record_vanity_entries(entries: i64) {
    ::metrics::gauge!("resolver_vanity_entries").set(entries as f64);
}

pub fn record_vanity_temporary_hit() {
    ::metrics::counter!("resolver_vanity_temporary_hits_total").increment(1);
}

pub fn record_vanity_temporary_miss() {
    ::metrics::counter!("resolver_vanity_temporary_misses_total").increment(1);
}

pub fn record_vanity_bloom_negative() {
    ::metrics::counter!("resolver_vanity_bloom_negative_total").increment(1);
}

/// Count one resolution; `outcome` is `found`, `redirect` or `not_found`.
pub fn record_resolve(outcome: &'static str) {
    ::metrics::counter!("resolver_resolve_total", "outcome" => outcome).increment(1);
}

pub fn record_mapping_chain_aborted() {
    ::metrics::counter!("resolver_mapping_chain_aborted_total").increment(1);
}
