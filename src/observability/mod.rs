//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events through `tracing`)
//!     → metrics.rs (counters, gauges, histograms through `metrics`)
//!
//! Consumers:
//!     → stdout (human or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows into every access log line
//! - Metric updates are cheap and safe to call without an installed recorder
//! - Exporter is optional and configured at startup only

pub mod logging;
pub mod metrics;
