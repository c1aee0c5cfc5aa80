//! Queue controller configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Queue controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name used in log output
    #[serde(default = "default_name")]
    pub name: String,

    /// Log a compact rendering of the queue after every scheduling pass
    #[serde(default, rename = "debug-snapshots")]
    pub debug_snapshots: bool,

    /// Warn when a completed request carries an error status
    #[serde(default = "default_warn_on_application_error", rename = "warn-on-application-error")]
    pub warn_on_application_error: bool,

    /// Capacity of the connectivity broadcast channel
    #[serde(default = "default_connectivity_buffer", rename = "connectivity-buffer")]
    pub connectivity_buffer: usize,
}

fn default_name() -> String {
    debug!("default_name: called");
    "rwqueue".to_string()
}

fn default_warn_on_application_error() -> bool {
    debug!("default_warn_on_application_error: called");
    true
}

fn default_connectivity_buffer() -> usize {
    debug!("default_connectivity_buffer: called");
    16
}

impl Default for QueueConfig {
    fn default() -> Self {
        debug!("QueueConfig::default: called");
        Self {
            name: default_name(),
            debug_snapshots: false,
            warn_on_application_error: true,
            connectivity_buffer: 16,
        }
    }
}

impl QueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
