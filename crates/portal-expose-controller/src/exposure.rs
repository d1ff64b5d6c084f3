//! PortalExpose reconciliation.
//!
//! [`ReconcileEngine::reconcile`] drives one PortalExpose toward its spec.
//! Each pass starts from the persisted object, so it is safe to repeat or to
//! restart at any point:
//!
//! 1. missing object: nothing to do
//! 2. deletion in progress: run the finalizer protocol
//! 3. no finalizer yet: add it and requeue before creating anything
//! 4. Service missing: `Failed`, wait for the Service to appear
//! 5. TunnelClass missing: `Failed`, wait for a class to appear
//! 6. no Deployment: create it, `Pending`, requeue
//! 7. Deployment drifted: update it, requeue
//! 8. otherwise: derive phase, relays and conditions from pod readiness

use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use portal_expose_core::conditions::{
    set_condition, AVAILABLE, PROGRESSING, RELAY_CONNECTED, SERVICE_EXISTS, TUNNEL_CLASS_EXISTS,
    TUNNEL_DEPLOYMENT_READY,
};
use portal_expose_core::finalizer::{add_finalizer, has_finalizer, remove_finalizer, FINALIZER_NAME};
use portal_expose_core::{
    ConditionStatus, ExposurePhase, PortalExpose, PortalExposeSpec, PortalExposeStatus,
    TunnelClass, TunnelPodStatus,
};
use portal_expose_tunnel::{
    build_deployment, carry_connected_at, compute_phase, compute_relay_statuses,
    construct_public_url, count_connected, deployment_name, needs_update,
};

use crate::class::ClassResolver;
use crate::config::ControllerConfig;
use crate::events::{reason, EventRecorder, EventType};
use crate::store::ClusterStore;
use crate::Result;

/// Result of a successful reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged; wait for the next change notification.
    Done,
    /// Progress was made; look again shortly.
    Requeue,
}

/// Reconciles PortalExpose objects against the cluster.
#[derive(Clone)]
pub struct ReconcileEngine {
    store: Arc<dyn ClusterStore>,
    events: Arc<dyn EventRecorder>,
    resolver: ClassResolver,
    tunnel_image: String,
}

impl ReconcileEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn ClusterStore>,
        events: Arc<dyn EventRecorder>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            resolver: ClassResolver::new(Arc::clone(&store)),
            store,
            events,
            tunnel_image: config.tunnel_image.clone(),
        }
    }

    /// Run one reconcile pass for the PortalExpose `namespace/name`.
    ///
    /// Missing Services and TunnelClasses are reported on the status and
    /// return `Done`; they are not errors.
    ///
    /// # Errors
    ///
    /// Returns store errors, including optimistic-concurrency conflicts. The
    /// caller is expected to retry with backoff.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        let Some(mut exposure) = self.store.get_exposure(namespace, name).await? else {
            debug!("PortalExpose not found, nothing to do");
            return Ok(ReconcileOutcome::Done);
        };

        if exposure.metadata.deletion_timestamp.is_some() {
            return self.finalize(&mut exposure).await;
        }

        if add_finalizer(&mut exposure.metadata, FINALIZER_NAME) {
            self.store.replace_exposure(&exposure).await?;
            debug!("Added cleanup finalizer");
            return Ok(ReconcileOutcome::Requeue);
        }

        let mut status = exposure.status.clone().unwrap_or_default();
        let previous_phase = status.phase;

        let service = exposure.spec.app.service.name.clone();
        if !self.store.service_exists(namespace, &service).await? {
            let message = format!("Service '{service}' not found in namespace '{namespace}'");
            warn!(service = %service, "Referenced Service not found");
            status.phase = Some(ExposurePhase::Failed);
            set_condition(
                &mut status.conditions,
                SERVICE_EXISTS,
                ConditionStatus::False,
                "ServiceNotFound",
                &message,
            );
            set_condition(
                &mut status.conditions,
                AVAILABLE,
                ConditionStatus::False,
                "ServiceNotFound",
                "PortalExpose failed due to missing Service",
            );
            self.write_status(&mut exposure, status).await?;
            self.events
                .publish(&exposure, EventType::Warning, reason::SERVICE_NOT_FOUND, &message)
                .await;
            return Ok(ReconcileOutcome::Done);
        }
        set_condition(
            &mut status.conditions,
            SERVICE_EXISTS,
            ConditionStatus::True,
            "ServiceFound",
            &format!("Service '{service}' exists"),
        );

        let class = match self.resolver.resolve(exposure.spec.tunnel_class()).await {
            Ok(class) => class,
            Err(e) if e.is_not_found() => {
                let message = e.to_string();
                warn!(error = %e, "TunnelClass not resolved");
                status.phase = Some(ExposurePhase::Failed);
                set_condition(
                    &mut status.conditions,
                    TUNNEL_CLASS_EXISTS,
                    ConditionStatus::False,
                    "TunnelClassNotFound",
                    &message,
                );
                self.write_status(&mut exposure, status).await?;
                self.events
                    .publish(
                        &exposure,
                        EventType::Warning,
                        reason::TUNNEL_CLASS_NOT_FOUND,
                        &message,
                    )
                    .await;
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e),
        };
        set_condition(
            &mut status.conditions,
            TUNNEL_CLASS_EXISTS,
            ConditionStatus::True,
            "TunnelClassFound",
            &format!("Using TunnelClass '{}'", class.name_any()),
        );

        let desired = build_deployment(&exposure, &class, &self.tunnel_image);
        let deployment_name = deployment_name(name);

        let Some(mut existing) = self.store.get_deployment(namespace, &deployment_name).await?
        else {
            self.store.create_deployment(&desired).await?;
            info!(
                deployment = %deployment_name,
                class = %class.name_any(),
                replicas = class.spec.replicas,
                "Created tunnel Deployment"
            );

            status.phase = Some(ExposurePhase::Pending);
            status.tunnel_pods = TunnelPodStatus {
                ready: 0,
                total: class.spec.replicas,
            };
            set_condition(
                &mut status.conditions,
                PROGRESSING,
                ConditionStatus::True,
                "DeploymentCreated",
                "Tunnel Deployment created, waiting for pods",
            );
            if let Some(relay_url) = exposure.spec.primary_relay_url() {
                status.public_url = construct_public_url(&exposure.spec.app.name, relay_url);
            }
            self.write_status(&mut exposure, status).await?;
            self.events
                .publish(
                    &exposure,
                    EventType::Normal,
                    reason::CREATED,
                    &format!("Created tunnel Deployment {deployment_name}"),
                )
                .await;
            return Ok(ReconcileOutcome::Requeue);
        };

        if needs_update(&existing, &desired) {
            existing.spec = desired.spec;
            self.store.replace_deployment(&existing).await?;
            info!(deployment = %deployment_name, "Updated drifted tunnel Deployment");

            set_condition(
                &mut status.conditions,
                PROGRESSING,
                ConditionStatus::True,
                "DeploymentUpdating",
                "Rolling update in progress",
            );
            self.write_status(&mut exposure, status).await?;
            return Ok(ReconcileOutcome::Requeue);
        }

        let observed = observe(&exposure, &class, &existing, &mut status);
        self.write_status(&mut exposure, status).await?;

        if previous_phase != Some(observed.phase) {
            info!(
                phase = %observed.phase,
                previous = ?previous_phase,
                ready = observed.ready,
                total = observed.total,
                "PortalExpose phase changed"
            );
            self.publish_phase(&exposure, &observed).await;
        }

        Ok(ReconcileOutcome::Done)
    }

    /// Finalizer-gated cleanup.
    ///
    /// The Deployment is deleted first and the pass requeues; the finalizer is
    /// released only once a later pass sees the Deployment gone.
    async fn finalize(&self, exposure: &mut PortalExpose) -> Result<ReconcileOutcome> {
        if !has_finalizer(&exposure.metadata, FINALIZER_NAME) {
            return Ok(ReconcileOutcome::Done);
        }

        let namespace = exposure.namespace().unwrap_or_default();
        let deployment_name = deployment_name(&exposure.name_any());

        if self
            .store
            .get_deployment(&namespace, &deployment_name)
            .await?
            .is_some()
        {
            self.store
                .delete_deployment(&namespace, &deployment_name)
                .await?;
            info!(deployment = %deployment_name, "Deleting tunnel Deployment");
            return Ok(ReconcileOutcome::Requeue);
        }

        remove_finalizer(&mut exposure.metadata, FINALIZER_NAME);
        self.store.replace_exposure(exposure).await?;
        info!("Tunnel Deployment gone, released finalizer");
        self.events
            .publish(
                exposure,
                EventType::Normal,
                reason::DELETED,
                "PortalExpose deleted, tunnel pods cleaned up",
            )
            .await;

        Ok(ReconcileOutcome::Done)
    }

    /// Persist `status` unless it is identical to what is stored.
    async fn write_status(
        &self,
        exposure: &mut PortalExpose,
        status: PortalExposeStatus,
    ) -> Result<()> {
        if exposure.status.as_ref() == Some(&status) {
            return Ok(());
        }
        exposure.status = Some(status);
        *exposure = self.store.replace_exposure_status(exposure).await?;
        Ok(())
    }

    async fn publish_phase(&self, exposure: &PortalExpose, observed: &Observed) {
        let (event_type, reason, message) = match observed.phase {
            ExposurePhase::Ready => (
                EventType::Normal,
                reason::READY,
                format!(
                    "PortalExpose is ready at {}",
                    exposure
                        .status
                        .as_ref()
                        .map(|s| s.public_url.as_str())
                        .unwrap_or_default()
                ),
            ),
            ExposurePhase::Degraded => (
                EventType::Warning,
                reason::DEGRADED,
                format!(
                    "Partial failure: {}/{} tunnel pods ready, {}/{} relays connected",
                    observed.ready, observed.total, observed.connected, observed.relays
                ),
            ),
            ExposurePhase::Failed => (
                EventType::Warning,
                reason::FAILED,
                "No tunnel pods ready and no relays connected".to_string(),
            ),
            ExposurePhase::Pending => return,
        };
        self.events
            .publish(exposure, event_type, reason, &message)
            .await;
    }
}

/// Counters derived during the steady-state pass.
struct Observed {
    phase: ExposurePhase,
    ready: i32,
    total: i32,
    connected: usize,
    relays: usize,
}

/// Fold Deployment readiness into `status`.
fn observe(
    exposure: &PortalExpose,
    class: &TunnelClass,
    deployment: &Deployment,
    status: &mut PortalExposeStatus,
) -> Observed {
    let deployment_status = deployment.status.as_ref();
    let ready = deployment_status
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let updated = deployment_status
        .and_then(|s| s.updated_replicas)
        .unwrap_or(0);
    let total = class.spec.replicas;

    let mut relays = compute_relay_statuses(&exposure.spec.relay.targets, ready > 0);
    carry_connected_at(&status.relay.connected, &mut relays, Utc::now());
    let connected = count_connected(&relays);
    let relay_count = relays.len();
    let phase = compute_phase(ready, total, connected, relay_count);

    status.phase = Some(phase);
    status.tunnel_pods = TunnelPodStatus { ready, total };
    status.relay.connected = relays;

    if ready == total && total > 0 {
        set_condition(
            &mut status.conditions,
            TUNNEL_DEPLOYMENT_READY,
            ConditionStatus::True,
            "AllPodsReady",
            &format!("{ready}/{total} tunnel pods ready"),
        );
    } else {
        set_condition(
            &mut status.conditions,
            TUNNEL_DEPLOYMENT_READY,
            ConditionStatus::False,
            "PodsNotReady",
            &format!("Only {ready}/{total} tunnel pods ready"),
        );
    }

    if connected == relay_count && relay_count > 0 {
        set_condition(
            &mut status.conditions,
            RELAY_CONNECTED,
            ConditionStatus::True,
            "AllRelaysConnected",
            &format!("{connected}/{relay_count} relays connected"),
        );
    } else {
        set_condition(
            &mut status.conditions,
            RELAY_CONNECTED,
            ConditionStatus::False,
            "PartialRelayConnection",
            &format!("{connected}/{relay_count} relays connected"),
        );
    }

    if phase.is_available() {
        set_condition(
            &mut status.conditions,
            AVAILABLE,
            ConditionStatus::True,
            "PortalExposeAvailable",
            &format!("PortalExpose is {phase}"),
        );
    } else {
        set_condition(
            &mut status.conditions,
            AVAILABLE,
            ConditionStatus::False,
            "PortalExposeNotAvailable",
            &format!("PortalExpose is {phase}"),
        );
    }

    if updated < total {
        set_condition(
            &mut status.conditions,
            PROGRESSING,
            ConditionStatus::True,
            "RollingUpdate",
            "Rolling update in progress",
        );
    } else {
        set_condition(
            &mut status.conditions,
            PROGRESSING,
            ConditionStatus::False,
            "DeploymentStable",
            "Deployment is stable",
        );
    }

    backfill_public_url(&exposure.spec, status);

    Observed {
        phase,
        ready,
        total,
        connected,
        relays: relay_count,
    }
}

fn backfill_public_url(spec: &PortalExposeSpec, status: &mut PortalExposeStatus) {
    if !status.public_url.is_empty() {
        return;
    }
    if let Some(relay_url) = spec.primary_relay_url() {
        status.public_url = construct_public_url(&spec.app.name, relay_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use portal_expose_core::conditions::find_condition;
    use portal_expose_core::{
        AppSpec, RelayState, RelaySpec, RelayTarget, ServiceRef, TunnelClassSpec, TunnelSize,
    };

    fn exposure(relays: &[&str]) -> PortalExpose {
        let mut exposure = PortalExpose::new(
            "web",
            PortalExposeSpec {
                app: AppSpec {
                    name: "web".into(),
                    service: ServiceRef {
                        name: "web-svc".into(),
                        port: 8080,
                    },
                },
                relay: RelaySpec {
                    targets: relays
                        .iter()
                        .map(|r| RelayTarget {
                            name: (*r).to_string(),
                            url: format!("wss://{r}.example.com/relay"),
                        })
                        .collect(),
                },
                tunnel_class_name: None,
            },
        );
        exposure.metadata.namespace = Some("apps".into());
        exposure
    }

    fn class(replicas: i32) -> TunnelClass {
        TunnelClass::new(
            "standard",
            TunnelClassSpec {
                replicas,
                size: TunnelSize::Small,
                node_selector: None,
                tolerations: None,
            },
        )
    }

    fn deployment(ready: i32, updated: i32) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                updated_replicas: Some(updated),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn condition_reason(status: &PortalExposeStatus, type_: &str) -> String {
        find_condition(&status.conditions, type_)
            .map(|c| c.reason.clone())
            .unwrap_or_default()
    }

    #[test]
    fn observe_all_ready() {
        let mut status = PortalExposeStatus::default();
        let observed = observe(&exposure(&["a", "b"]), &class(2), &deployment(2, 2), &mut status);

        assert_eq!(observed.phase, ExposurePhase::Ready);
        assert_eq!(status.tunnel_pods, TunnelPodStatus { ready: 2, total: 2 });
        assert_eq!(status.relay.connected.len(), 2);
        assert!(status
            .relay
            .connected
            .iter()
            .all(|r| r.status == RelayState::Connected && r.connected_at.is_some()));
        assert_eq!(status.public_url, "https://web.a.example.com");
        assert_eq!(condition_reason(&status, TUNNEL_DEPLOYMENT_READY), "AllPodsReady");
        assert_eq!(condition_reason(&status, RELAY_CONNECTED), "AllRelaysConnected");
        assert_eq!(condition_reason(&status, AVAILABLE), "PortalExposeAvailable");
        assert_eq!(condition_reason(&status, PROGRESSING), "DeploymentStable");
    }

    #[test]
    fn observe_partial_rollout() {
        let mut status = PortalExposeStatus::default();
        let observed = observe(&exposure(&["a"]), &class(3), &deployment(1, 2), &mut status);

        assert_eq!(observed.phase, ExposurePhase::Degraded);
        assert_eq!(condition_reason(&status, TUNNEL_DEPLOYMENT_READY), "PodsNotReady");
        assert_eq!(condition_reason(&status, AVAILABLE), "PortalExposeAvailable");
        assert_eq!(condition_reason(&status, PROGRESSING), "RollingUpdate");
    }

    #[test]
    fn observe_no_pods_ready() {
        let mut status = PortalExposeStatus::default();
        let observed = observe(&exposure(&["a"]), &class(1), &Deployment::default(), &mut status);

        assert_eq!(observed.phase, ExposurePhase::Pending);
        assert_eq!(status.relay.connected[0].status, RelayState::Disconnected);
        assert_eq!(condition_reason(&status, RELAY_CONNECTED), "PartialRelayConnection");
        assert_eq!(condition_reason(&status, AVAILABLE), "PortalExposeNotAvailable");
    }

    #[test]
    fn public_url_is_not_overwritten() {
        let mut status = PortalExposeStatus {
            public_url: "https://web.custom.example".into(),
            ..Default::default()
        };
        backfill_public_url(&exposure(&["a"]).spec, &mut status);
        assert_eq!(status.public_url, "https://web.custom.example");
    }
}
