//! Control-plane configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Configuration for the FSM registry and its controllers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Stable identity of this process, as it appears in mastership
    /// declarations.
    pub node_id: String,
    /// How long event senders wait on a controller before giving up.
    pub event_timeout_ms: u64,
    /// Retry behavior for convergence operations.
    pub retry: RetryConfig,
}

impl ControlConfig {
    /// Config for a node with the given identity and default timings.
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            event_timeout_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }

    /// Per-event send/reply timeout.
    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }
}
