//! Deployment specification builder for tunnel pods.
//!
//! This module turns a `PortalExpose` and its resolved `TunnelClass` into the
//! Deployment that runs the tunnel binary, and decides whether a live
//! Deployment has drifted from that desired state.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use portal_expose_core::{PortalExpose, TunnelClass, TunnelSize};

use crate::quantity::quantities_equal;

/// Tunnel image used when the controller is not configured otherwise.
pub const DEFAULT_TUNNEL_IMAGE: &str = "ghcr.io/gosuda/portal-tunnel:1.0.0";

/// Name of the tunnel container inside the pod.
pub const TUNNEL_CONTAINER_NAME: &str = "tunnel";

/// Label carrying the owning PortalExpose name.
pub const EXPOSE_LABEL: &str = "portal.gosuda.org/portalexpose";

/// Value of `app.kubernetes.io/managed-by` on every tunnel Deployment.
pub const MANAGED_BY: &str = "portal-expose-controller";

/// Surge and unavailability cap for rolling updates.
const ROLLING_UPDATE_CAP: &str = "25%";

/// Generate the Deployment name for a PortalExpose.
#[must_use]
pub fn deployment_name(exposure_name: &str) -> String {
    format!("{exposure_name}-tunnel")
}

/// Build the tunnel Deployment for a PortalExpose.
///
/// The result is deterministic in its inputs:
/// - name `{exposure}-tunnel` in the exposure's namespace
/// - labels identifying the tunnel workload and its owner, reused as selector
/// - replicas, node selector and tolerations taken from the class
/// - resources looked up from the class size
/// - a controller owner reference back to the exposure, when it has a UID
#[must_use]
pub fn build_deployment(exposure: &PortalExpose, class: &TunnelClass, image: &str) -> Deployment {
    let exposure_name = exposure.name_any();
    let labels = build_labels(&exposure_name);

    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(&exposure_name)),
            namespace: exposure.namespace(),
            labels: Some(labels.clone()),
            owner_references: exposure.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(class.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(build_strategy()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![build_container(exposure, class.spec.size, image)],
                    node_selector: class.spec.node_selector.clone(),
                    tolerations: class.spec.tolerations.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_labels(exposure_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            "portal-tunnel".to_string(),
        ),
        ("app.kubernetes.io/component".to_string(), "tunnel".to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
        (EXPOSE_LABEL.to_string(), exposure_name.to_string()),
    ])
}

fn build_strategy() -> DeploymentStrategy {
    DeploymentStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateDeployment {
            max_surge: Some(IntOrString::String(ROLLING_UPDATE_CAP.to_string())),
            max_unavailable: Some(IntOrString::String(ROLLING_UPDATE_CAP.to_string())),
        }),
    }
}

fn build_container(exposure: &PortalExpose, size: TunnelSize, image: &str) -> Container {
    Container {
        name: TUNNEL_CONTAINER_NAME.to_string(),
        image: Some(image.to_string()),
        args: Some(build_args(exposure)),
        resources: Some(resources_for_size(size)),
        ..Default::default()
    }
}

/// `expose --name <app> --host <svc>.<ns>.svc.cluster.local --port <port> --relay <url>...`
fn build_args(exposure: &PortalExpose) -> Vec<String> {
    let spec = &exposure.spec;
    let namespace = exposure.namespace().unwrap_or_default();

    let mut args = vec![
        "expose".to_string(),
        "--name".to_string(),
        spec.app.name.clone(),
        "--host".to_string(),
        format!("{}.{namespace}.svc.cluster.local", spec.app.service.name),
        "--port".to_string(),
        spec.app.service.port.to_string(),
    ];

    for target in &spec.relay.targets {
        args.push("--relay".to_string());
        args.push(target.url.clone());
    }

    args
}

/// Resource requests and limits for a tunnel size.
#[must_use]
pub fn resources_for_size(size: TunnelSize) -> ResourceRequirements {
    let (request_cpu, request_memory, limit_cpu, limit_memory) = match size {
        TunnelSize::Small => ("100m", "128Mi", "500m", "512Mi"),
        TunnelSize::Medium => ("250m", "256Mi", "1000m", "1Gi"),
        TunnelSize::Large => ("500m", "512Mi", "2000m", "2Gi"),
    };

    ResourceRequirements {
        requests: Some(resource_list(request_cpu, request_memory)),
        limits: Some(resource_list(limit_cpu, limit_memory)),
        ..Default::default()
    }
}

fn resource_list(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

/// Check whether a live Deployment differs from the desired one in the fields
/// the builder controls: replica count, container images and cpu/memory
/// requests. Everything else (labels, args, defaults filled in by the API
/// server) is ignored.
#[must_use]
pub fn needs_update(existing: &Deployment, desired: &Deployment) -> bool {
    let (Some(existing), Some(desired)) = (existing.spec.as_ref(), desired.spec.as_ref()) else {
        return true;
    };

    if existing.replicas != desired.replicas {
        return true;
    }

    let existing_containers = containers(existing);
    let desired_containers = containers(desired);
    if existing_containers.len() != desired_containers.len() {
        return true;
    }

    existing_containers
        .iter()
        .zip(desired_containers)
        .any(|(e, d)| {
            e.image != d.image
                || !request_equal(e, d, "cpu")
                || !request_equal(e, d, "memory")
        })
}

fn containers(spec: &DeploymentSpec) -> &[Container] {
    spec.template
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default()
}

fn request_equal(existing: &Container, desired: &Container, resource: &str) -> bool {
    let request = |c: &Container| {
        c.resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get(resource))
            .cloned()
    };

    match (request(existing), request(desired)) {
        (Some(a), Some(b)) => quantities_equal(&a, &b),
        (None, None) => true,
        _ => false,
    }
}
