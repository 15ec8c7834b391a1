//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Mapping indexes, resolver, HTTP surface produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap and optional; nothing reads them back

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
