//! Supervisor configuration.

use std::time::Duration;

/// Reconnection parameters and the log tag for a supervised connection.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Human-readable tag used in warnings about this connection.
    pub description: String,

    /// First backoff delay after a failure. The very first connect attempt
    /// is made immediately.
    pub initial_delay: Duration,

    /// Cap on the backoff delay.
    pub max_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            description: "unknown".to_string(),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(64),
        }
    }
}

impl SupervisorConfig {
    /// Default parameters with a log tag.
    pub fn named(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}
