//! TunnelClass Custom Resource Definition
//!
//! A TunnelClass is a cluster-scoped profile describing how many tunnel pods to
//! run and how large they are. A PortalExpose references one by name, or falls
//! back to the class annotated as the cluster default.

use std::collections::BTreeMap;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Toleration;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use super::types::Condition;
use crate::error::CoreError;

/// Resource allocation tier for tunnel pods
///
/// Deserialization is lenient: any unrecognized value becomes [`TunnelSize::Small`]
/// so that a single hand-edited object cannot break a list call.
#[derive(Clone, Copy, Debug, Default, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TunnelSize {
    /// 100m/128Mi requests
    #[default]
    Small,
    /// 250m/256Mi requests
    Medium,
    /// 500m/512Mi requests
    Large,
}

impl FromStr for TunnelSize {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(CoreError::InvalidTunnelSize(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for TunnelSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

impl std::fmt::Display for TunnelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// Specification for a TunnelClass
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "portal.gosuda.org",
    version = "v1alpha1",
    kind = "TunnelClass",
    plural = "tunnelclasses",
    shortname = "tc",
    status = "TunnelClassStatus",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Size","type":"string","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TunnelClassSpec {
    /// Number of tunnel pod replicas
    #[schemars(range(min = 1))]
    pub replicas: i32,

    /// Resource allocation tier
    pub size: TunnelSize,

    /// Constrains tunnel pods to nodes with these labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Lets tunnel pods schedule onto tainted nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
}

/// Observed state of a TunnelClass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TunnelClassStatus {
    /// Last spec generation the controller observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_round_trips_known_values() {
        for size in [TunnelSize::Small, TunnelSize::Medium, TunnelSize::Large] {
            assert_eq!(size.to_string().parse::<TunnelSize>().unwrap(), size);
        }
        assert!("huge".parse::<TunnelSize>().is_err());
    }

    #[test]
    fn unknown_size_deserializes_as_small() {
        let spec: TunnelClassSpec =
            serde_json::from_value(serde_json::json!({ "replicas": 2, "size": "xlarge" }))
                .unwrap();
        assert_eq!(spec.size, TunnelSize::Small);
        assert_eq!(spec.replicas, 2);
    }

    #[test]
    fn spec_with_scheduling_constraints() {
        let spec: TunnelClassSpec = serde_json::from_value(serde_json::json!({
            "replicas": 3,
            "size": "large",
            "nodeSelector": { "role": "edge" },
            "tolerations": [{ "key": "edge", "operator": "Exists", "effect": "NoSchedule" }]
        }))
        .unwrap();

        assert_eq!(spec.size, TunnelSize::Large);
        assert_eq!(
            spec.node_selector.unwrap().get("role").map(String::as_str),
            Some("edge")
        );
        assert_eq!(spec.tolerations.unwrap()[0].key.as_deref(), Some("edge"));
    }
}
