//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! config subsystem produces:
//!     → logging.rs (structured log events)
//!     → metrics.rs (reload counters, server gauge)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Metrics are cheap (atomic increments) and optional to export

pub mod logging;
pub mod metrics;
