// ABOUTME: Prometheus metrics for plugin loading, logins, sessions and dispatch.
// ABOUTME: Recording functions are no-ops until init_metrics installs the global recorder.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Mutex;

pub const PLUGINS_LOADED_TOTAL: &str = "relaybot_plugins_loaded_total";
pub const LOGINS_TOTAL: &str = "relaybot_logins_total";
pub const ACTIVE_SESSIONS: &str = "relaybot_active_sessions";
pub const EVENTS_DISPATCHED_TOTAL: &str = "relaybot_events_dispatched_total";
pub const HANDLER_FAILURES_TOTAL: &str = "relaybot_handler_failures_total";

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Install the Prometheus recorder and return a handle for rendering.
///
/// The recorder is process-global; repeated calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let mut slot = HANDLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    *slot = Some(handle.clone());
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Outcome is one of "loaded", "skipped" or "failed"
pub fn record_plugin_load(outcome: &'static str) {
    counter!(PLUGINS_LOADED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!(LOGINS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!(ACTIVE_SESSIONS).set(count as f64);
}

pub fn record_event_dispatched(kind: &str) {
    counter!(EVENTS_DISPATCHED_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_handler_failure(plugin: &str) {
    counter!(HANDLER_FAILURES_TOTAL, "plugin" => plugin.to_string()).increment(1);
}
