//! Controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use portal_expose_tunnel::DEFAULT_TUNNEL_IMAGE;

/// Configuration for the PortalExpose controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Container image for tunnel pods.
    pub tunnel_image: String,
    /// Delay before re-checking an object after a `Requeue` outcome.
    pub requeue_interval_secs: u64,
    /// Delay before retrying a reconcile that returned an error.
    pub error_backoff_secs: u64,
    /// Address for the health endpoints.
    pub listen_addr: String,
    /// Component name attached to emitted events.
    pub event_reporter: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tunnel_image: DEFAULT_TUNNEL_IMAGE.to_string(),
            requeue_interval_secs: 5,
            error_backoff_secs: 15,
            listen_addr: "0.0.0.0:8081".to_string(),
            event_reporter: "portal-expose-controller".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `TUNNEL_IMAGE`: Container image for tunnel pods
    /// - `REQUEUE_INTERVAL_SECS`: Poll interval while waiting for pods
    /// - `ERROR_BACKOFF_SECS`: Retry delay after a failed reconcile
    /// - `LISTEN_ADDR`: Bind address for `/health` and `/ready`
    /// - `EVENT_REPORTER`: Component name on emitted events
    ///
    /// Unparseable numbers keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("TUNNEL_IMAGE") {
            config.tunnel_image = val;
        }
        if let Some(val) = lookup("REQUEUE_INTERVAL_SECS") {
            if let Ok(n) = val.parse() {
                config.requeue_interval_secs = n;
            }
        }
        if let Some(val) = lookup("ERROR_BACKOFF_SECS") {
            if let Ok(n) = val.parse() {
                config.error_backoff_secs = n;
            }
        }
        if let Some(val) = lookup("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Some(val) = lookup("EVENT_REPORTER") {
            config.event_reporter = val;
        }

        config
    }

    /// Requeue delay as a `Duration`.
    #[must_use]
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_interval_secs)
    }

    /// Error backoff as a `Duration`.
    #[must_use]
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}
