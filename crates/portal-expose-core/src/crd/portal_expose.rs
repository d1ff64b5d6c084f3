//! PortalExpose Custom Resource Definition
//!
//! A PortalExpose declares an in-cluster Service to publish through one or more
//! Portal relays. The controller realizes it as a Deployment of tunnel pods and
//! reports health back onto the status subresource. Spec is user-owned, status
//! is controller-owned.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;
use crate::error::{CoreError, Result};

/// Maximum length of an application name (DNS label)
const MAX_APP_NAME_LEN: usize = 63;

/// Application to expose
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Application name, becomes the public subdomain
    #[schemars(regex(pattern = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$"), length(max = 63))]
    pub name: String,

    /// Service to expose, in the same namespace
    pub service: ServiceRef,
}

/// Reference to a Kubernetes Service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    /// Service name in the same namespace
    pub name: String,

    /// Service port to expose
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,
}

/// A Portal relay endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayTarget {
    /// Relay identifier
    pub name: String,

    /// Secure WebSocket URL of the relay
    #[schemars(regex(pattern = r"^wss://.*"))]
    pub url: String,
}

/// Relay configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelaySpec {
    /// Relay endpoints, in priority order
    #[schemars(length(min = 1))]
    pub targets: Vec<RelayTarget>,
}

/// Specification for a PortalExpose
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "portal.gosuda.org",
    version = "v1alpha1",
    kind = "PortalExpose",
    plural = "portalexposes",
    shortname = "pe",
    namespaced,
    status = "PortalExposeStatus",
    printcolumn = r#"{"name":"App","type":"string","jsonPath":".spec.app.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.publicURL"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PortalExposeSpec {
    /// Application to expose
    pub app: AppSpec,

    /// Relays to tunnel through
    pub relay: RelaySpec,

    /// TunnelClass to use; the default class is used when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_class_name: Option<String>,
}

impl PortalExposeSpec {
    /// Explicitly requested TunnelClass, treating an empty name as unset
    #[must_use]
    pub fn tunnel_class(&self) -> Option<&str> {
        self.tunnel_class_name.as_deref().filter(|n| !n.is_empty())
    }

    /// URL of the first declared relay, used to derive the public URL
    #[must_use]
    pub fn primary_relay_url(&self) -> Option<&str> {
        self.relay.targets.first().map(|t| t.url.as_str())
    }

    /// Check the spec against the schema constraints of the CRD
    ///
    /// The API server enforces the same rules at admission; this exists for
    /// callers that build specs in code.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !is_dns_label(&self.app.name) {
            return Err(CoreError::validation(
                "spec.app.name",
                format!(
                    "{:?} must be a lowercase DNS label of at most {MAX_APP_NAME_LEN} characters",
                    self.app.name
                ),
            ));
        }
        if self.app.service.name.is_empty() {
            return Err(CoreError::validation(
                "spec.app.service.name",
                "must not be empty",
            ));
        }
        if !(1..=65535).contains(&self.app.service.port) {
            return Err(CoreError::validation(
                "spec.app.service.port",
                format!("{} is outside 1-65535", self.app.service.port),
            ));
        }
        if self.relay.targets.is_empty() {
            return Err(CoreError::validation(
                "spec.relay.targets",
                "at least one relay target is required",
            ));
        }
        for target in &self.relay.targets {
            if !target.url.starts_with("wss://") {
                return Err(CoreError::validation(
                    "spec.relay.targets[].url",
                    format!("{:?} must start with wss://", target.url),
                ));
            }
        }
        Ok(())
    }
}

/// `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`, at most 63 characters
fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_APP_NAME_LEN
                && alnum(first)
                && alnum(last)
                && bytes.iter().all(|b| alnum(b) || *b == b'-')
        }
        _ => false,
    }
}

/// Coarse health of a PortalExpose
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExposurePhase {
    /// Tunnel pods are being created
    Pending,
    /// All pods ready and all relays connected
    Ready,
    /// Partially functional
    Degraded,
    /// Nothing is working, or a dependency is missing
    Failed,
}

impl ExposurePhase {
    /// Ready and Degraded both serve traffic
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

impl std::fmt::Display for ExposurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Tunnel pod readiness counters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TunnelPodStatus {
    /// Number of ready tunnel pods
    #[serde(default)]
    pub ready: i32,

    /// Desired number of tunnel pods
    #[serde(default)]
    pub total: i32,
}

/// Connection state of a single relay
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RelayState {
    /// Tunnel is connected to the relay
    Connected,
    /// Tunnel is not connected to the relay
    Disconnected,
    /// Connection state has not been observed
    #[default]
    Unknown,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Per-relay connection record
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayConnectionStatus {
    /// Relay name, matches `spec.relay.targets[].name`
    pub name: String,

    /// Connection state
    pub status: RelayState,

    /// When the connection was established
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,

    /// Last connection error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// State of all relay connections
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// One entry per declared relay target, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connected: Vec<RelayConnectionStatus>,
}

/// Observed state of a PortalExpose
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortalExposeStatus {
    /// Current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ExposurePhase>,

    /// Public endpoint, e.g. `https://my-app.portal.gosuda.org`
    #[serde(default, rename = "publicURL", skip_serializing_if = "String::is_empty")]
    pub public_url: String,

    /// Tunnel pod readiness
    #[serde(default)]
    pub tunnel_pods: TunnelPodStatus,

    /// Relay connection states
    #[serde(default)]
    pub relay: RelayStatus,

    /// Status conditions, unique by type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> PortalExposeSpec {
        PortalExposeSpec {
            app: AppSpec {
                name: "my-app".to_string(),
                service: ServiceRef {
                    name: "my-service".to_string(),
                    port: 8080,
                },
            },
            relay: RelaySpec {
                targets: vec![RelayTarget {
                    name: "primary".to_string(),
                    url: "wss://portal.example.org/relay".to_string(),
                }],
            },
            tunnel_class_name: None,
        }
    }

    #[test]
    fn spec_parses_from_wire_format() {
        let spec: PortalExposeSpec = serde_json::from_value(serde_json::json!({
            "app": { "name": "demo", "service": { "name": "web", "port": 80 } },
            "relay": { "targets": [{ "name": "a", "url": "wss://relay.example.com" }] },
            "tunnelClassName": "fast"
        }))
        .unwrap();

        assert_eq!(spec.app.name, "demo");
        assert_eq!(spec.app.service.port, 80);
        assert_eq!(spec.tunnel_class(), Some("fast"));
        assert_eq!(spec.primary_relay_url(), Some("wss://relay.example.com"));
    }

    #[test]
    fn empty_tunnel_class_name_means_default() {
        let mut spec = sample_spec();
        spec.tunnel_class_name = Some(String::new());
        assert_eq!(spec.tunnel_class(), None);
    }

    #[test]
    fn status_uses_public_url_key() {
        let status = PortalExposeStatus {
            phase: Some(ExposurePhase::Ready),
            public_url: "https://a.b".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value["publicURL"], "https://a.b");
        assert_eq!(value["phase"], "Ready");
        assert_eq!(value["tunnelPods"]["ready"], 0);
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_spec().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_app_names() {
        let too_long = "a".repeat(64);
        for name in ["", "-app", "app-", "App", "my_app", too_long.as_str()] {
            let mut spec = sample_spec();
            spec.app.name = name.to_string();
            assert!(spec.validate().is_err(), "{name:?} should be rejected");
        }

        let mut spec = sample_spec();
        spec.app.name = "a".repeat(63);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_port_and_relays() {
        let mut spec = sample_spec();
        spec.app.service.port = 0;
        assert!(spec.validate().is_err());

        let mut spec = sample_spec();
        spec.relay.targets.clear();
        assert!(spec.validate().is_err());

        let mut spec = sample_spec();
        spec.relay.targets[0].url = "https://relay.example.com".to_string();
        assert!(matches!(
            spec.validate(),
            Err(CoreError::Validation {
                field: "spec.relay.targets[].url",
                ..
            })
        ));
    }

    #[test]
    fn available_phases() {
        assert!(ExposurePhase::Ready.is_available());
        assert!(ExposurePhase::Degraded.is_available());
        assert!(!ExposurePhase::Pending.is_available());
        assert!(!ExposurePhase::Failed.is_available());
    }
}
