//! Metrics collection.
//!
//! # Metrics
//! - `mcp_config_reloads_total` (counter): watch-triggered reloads by outcome
//! - `mcp_config_watch_errors_total` (counter): errors reported by the watcher
//! - `mcp_config_servers` (gauge): servers in the current configuration
//!
//! # Design Decisions
//! - Recording is a no-op until the embedding process installs a recorder
//! - No exporter here; the supervisor owns the endpoint

/// Outcome label for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Success,
    Failure,
}

impl ReloadOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ReloadOutcome::Success => "success",
            ReloadOutcome::Failure => "failure",
        }
    }
}

pub fn record_reload(outcome: ReloadOutcome) {
    ::metrics::counter!("mcp_config_reloads_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_watch_error() {
    ::metrics::counter!("mcp_config_watch_errors_total").increment(1);
}

pub fn record_server_count(count: usize) {
    ::metrics::gauge!("mcp_config_servers").set(count as f64);
}
