//! Controller wiring.
//!
//! Two `kube` controllers run side by side:
//!
//! - PortalExpose: owns tunnel Deployments, and is also triggered by changes
//!   to referenced Services and to TunnelClasses, so objects parked in
//!   `Failed` recover as soon as the missing dependency appears
//! - TunnelClass: keeps the default-class annotation unique
//!
//! The runtime serializes reconciles per object, which the engines rely on.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use portal_expose_core::{PortalExpose, TunnelClass};
use portal_expose_tunnel::MANAGED_BY;

use crate::config::ControllerConfig;
use crate::events::{EventRecorder, KubeEventRecorder};
use crate::exposure::{ReconcileEngine, ReconcileOutcome};
use crate::store::{ClusterStore, KubeStore};
use crate::tunnel_class::ClassReconcileEngine;
use crate::{ControllerError, Result};

struct ExposureContext {
    engine: ReconcileEngine,
    requeue_interval: Duration,
    error_backoff: Duration,
}

struct ClassContext {
    engine: ClassReconcileEngine,
    requeue_interval: Duration,
    error_backoff: Duration,
}

/// Map a reconcile outcome onto a runtime action.
#[must_use]
pub fn to_action(outcome: ReconcileOutcome, requeue_interval: Duration) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::Requeue => Action::requeue(requeue_interval),
    }
}

/// PortalExposes in the Service's namespace that expose it.
#[must_use]
pub fn exposures_for_service(
    exposures: &[Arc<PortalExpose>],
    service: &Service,
) -> Vec<ObjectRef<PortalExpose>> {
    let namespace = service.namespace();
    let name = service.name_any();

    exposures
        .iter()
        .filter(|e| e.namespace() == namespace && e.spec.app.service.name == name)
        .map(|e| ObjectRef::from_obj(e.as_ref()))
        .collect()
}

/// PortalExposes that could resolve to the class: those naming it, and
/// those relying on whichever class is the default.
#[must_use]
pub fn exposures_for_class(
    exposures: &[Arc<PortalExpose>],
    class: &TunnelClass,
) -> Vec<ObjectRef<PortalExpose>> {
    let name = class.name_any();

    exposures
        .iter()
        .filter(|e| match e.spec.tunnel_class() {
            Some(explicit) => explicit == name,
            None => true,
        })
        .map(|e| ObjectRef::from_obj(e.as_ref()))
        .collect()
}

async fn reconcile_exposure(
    exposure: Arc<PortalExpose>,
    ctx: Arc<ExposureContext>,
) -> Result<Action> {
    let namespace = exposure
        .namespace()
        .ok_or(ControllerError::MissingField("metadata.namespace"))?;
    let outcome = ctx.engine.reconcile(&namespace, &exposure.name_any()).await?;
    Ok(to_action(outcome, ctx.requeue_interval))
}

fn exposure_error_policy(
    exposure: Arc<PortalExpose>,
    error: &ControllerError,
    ctx: Arc<ExposureContext>,
) -> Action {
    warn!(
        name = %exposure.name_any(),
        namespace = %exposure.namespace().unwrap_or_default(),
        error = %error,
        retriable = error.is_retriable(),
        "PortalExpose reconcile failed"
    );
    Action::requeue(ctx.error_backoff)
}

async fn reconcile_class(class: Arc<TunnelClass>, ctx: Arc<ClassContext>) -> Result<Action> {
    let outcome = ctx.engine.reconcile(&class.name_any()).await?;
    Ok(to_action(outcome, ctx.requeue_interval))
}

fn class_error_policy(
    class: Arc<TunnelClass>,
    error: &ControllerError,
    ctx: Arc<ClassContext>,
) -> Action {
    warn!(
        name = %class.name_any(),
        error = %error,
        retriable = error.is_retriable(),
        "TunnelClass reconcile failed"
    );
    Action::requeue(ctx.error_backoff)
}

/// Run both controllers until SIGINT or SIGTERM.
pub async fn run(client: Client, config: &ControllerConfig) {
    let store: Arc<dyn ClusterStore> = Arc::new(KubeStore::new(client.clone()));
    let events: Arc<dyn EventRecorder> = Arc::new(KubeEventRecorder::new(
        client.clone(),
        config.event_reporter.clone(),
    ));

    let exposure_ctx = Arc::new(ExposureContext {
        engine: ReconcileEngine::new(Arc::clone(&store), events, config),
        requeue_interval: config.requeue_interval(),
        error_backoff: config.error_backoff(),
    });
    let class_ctx = Arc::new(ClassContext {
        engine: ClassReconcileEngine::new(store),
        requeue_interval: config.requeue_interval(),
        error_backoff: config.error_backoff(),
    });

    let controller = Controller::new(
        Api::<PortalExpose>::all(client.clone()),
        WatcherConfig::default(),
    );
    let by_service = controller.store();
    let by_class = controller.store();

    let exposures = controller
        .owns(
            Api::<Deployment>::all(client.clone()),
            WatcherConfig::default().labels(&format!("app.kubernetes.io/managed-by={MANAGED_BY}")),
        )
        .watches(
            Api::<Service>::all(client.clone()),
            WatcherConfig::default(),
            move |service| exposures_for_service(&by_service.state(), &service),
        )
        .watches(
            Api::<TunnelClass>::all(client.clone()),
            WatcherConfig::default(),
            move |class| exposures_for_class(&by_class.state(), &class),
        )
        .shutdown_on_signal()
        .run(reconcile_exposure, exposure_error_policy, exposure_ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => debug!(object = %obj, ?action, "Reconciled PortalExpose"),
                Err(e) => debug!(error = %e, "PortalExpose controller error"),
            }
        });

    let classes = Controller::new(Api::<TunnelClass>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile_class, class_error_policy, class_ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => debug!(object = %obj, ?action, "Reconciled TunnelClass"),
                Err(e) => debug!(error = %e, "TunnelClass controller error"),
            }
        });

    info!("Controllers started");
    tokio::join!(exposures, classes);
    info!("Controllers stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use portal_expose_core::{
        AppSpec, PortalExposeSpec, RelaySpec, RelayTarget, ServiceRef, TunnelClassSpec,
        TunnelSize,
    };

    fn exposure(namespace: &str, name: &str, service: &str, class: Option<&str>) -> Arc<PortalExpose> {
        let mut exposure = PortalExpose::new(
            name,
            PortalExposeSpec {
                app: AppSpec {
                    name: name.into(),
                    service: ServiceRef {
                        name: service.into(),
                        port: 80,
                    },
                },
                relay: RelaySpec {
                    targets: vec![RelayTarget {
                        name: "main".into(),
                        url: "wss://relay.example.com".into(),
                    }],
                },
                tunnel_class_name: class.map(ToString::to_string),
            },
        );
        exposure.metadata.namespace = Some(namespace.into());
        Arc::new(exposure)
    }

    fn names(refs: &[ObjectRef<PortalExpose>]) -> Vec<String> {
        let mut names: Vec<_> = refs.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn services_map_to_exposures_in_same_namespace() {
        let exposures = vec![
            exposure("a", "one", "web", None),
            exposure("a", "two", "api", None),
            exposure("b", "three", "web", None),
        ];
        let service = Service {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("a".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(names(&exposures_for_service(&exposures, &service)), vec!["one"]);
    }

    #[test]
    fn classes_map_to_explicit_and_default_users() {
        let exposures = vec![
            exposure("a", "explicit", "web", Some("fast")),
            exposure("a", "other", "web", Some("slow")),
            exposure("b", "implicit", "web", None),
            exposure("b", "empty", "web", Some("")),
        ];
        let class = TunnelClass::new(
            "fast",
            TunnelClassSpec {
                replicas: 1,
                size: TunnelSize::Small,
                node_selector: None,
                tolerations: None,
            },
        );

        assert_eq!(
            names(&exposures_for_class(&exposures, &class)),
            vec!["empty", "explicit", "implicit"]
        );
    }

    #[test]
    fn outcomes_map_to_actions() {
        let interval = Duration::from_secs(5);
        assert_eq!(to_action(ReconcileOutcome::Done, interval), Action::await_change());
        assert_eq!(
            to_action(ReconcileOutcome::Requeue, interval),
            Action::requeue(interval)
        );
    }
}
