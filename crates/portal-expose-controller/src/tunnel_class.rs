//! TunnelClass reconciliation.
//!
//! Runs the default-class arbitration whenever a class carrying the default
//! annotation is observed, and records on each class whether it is currently
//! the default.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, instrument};

use portal_expose_core::conditions::{set_condition, DEFAULT_CLASS};
use portal_expose_core::finalizer::is_default_class;
use portal_expose_core::ConditionStatus;

use crate::class::DefaultClassArbiter;
use crate::exposure::ReconcileOutcome;
use crate::store::ClusterStore;
use crate::Result;

/// Reconciles TunnelClass objects.
#[derive(Clone)]
pub struct ClassReconcileEngine {
    store: Arc<dyn ClusterStore>,
    arbiter: DefaultClassArbiter,
}

impl ClassReconcileEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self {
            arbiter: DefaultClassArbiter::new(Arc::clone(&store)),
            store,
        }
    }

    /// Run one reconcile pass for the TunnelClass `name`.
    ///
    /// # Errors
    ///
    /// Returns store errors; the caller retries with backoff.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome> {
        let Some(mut class) = self.store.get_tunnel_class(name).await? else {
            debug!("TunnelClass not found, nothing to do");
            return Ok(ReconcileOutcome::Done);
        };

        let is_default = is_default_class(&class.metadata);
        if is_default {
            let cleared = self.arbiter.enforce_single_default(name).await?;
            if cleared > 0 {
                debug!(cleared, "Enforced single default TunnelClass");
            }
        }

        let mut status = class.status.clone().unwrap_or_default();
        status.observed_generation = class.metadata.generation;
        if is_default {
            set_condition(
                &mut status.conditions,
                DEFAULT_CLASS,
                ConditionStatus::True,
                "DefaultClass",
                "TunnelClass is the cluster default",
            );
        } else {
            set_condition(
                &mut status.conditions,
                DEFAULT_CLASS,
                ConditionStatus::False,
                "NotDefault",
                "TunnelClass is not the cluster default",
            );
        }

        if class.status.as_ref() != Some(&status) {
            class.status = Some(status);
            self.store.replace_tunnel_class_status(&class).await?;
            debug!(class = %class.name_any(), default = is_default, "Updated TunnelClass status");
        }

        Ok(ReconcileOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryStore;
    use portal_expose_core::conditions::is_condition_true;
    use portal_expose_core::finalizer::DEFAULT_CLASS_ANNOTATION;
    use portal_expose_core::{TunnelClass, TunnelClassSpec, TunnelSize};
    use std::collections::BTreeMap;

    fn class(name: &str, default: bool) -> TunnelClass {
        let mut class = TunnelClass::new(
            name,
            TunnelClassSpec {
                replicas: 2,
                size: TunnelSize::Medium,
                node_selector: None,
                tolerations: None,
            },
        );
        if default {
            class.metadata.annotations = Some(BTreeMap::from([(
                DEFAULT_CLASS_ANNOTATION.to_string(),
                "true".to_string(),
            )]));
        }
        class
    }

    fn default_condition(store: &MemoryStore, name: &str) -> bool {
        store
            .class(name)
            .and_then(|c| c.status)
            .is_some_and(|s| is_condition_true(&s.conditions, DEFAULT_CLASS))
    }

    #[tokio::test]
    async fn records_default_condition_and_generation() {
        let store = Arc::new(MemoryStore::new());
        store.insert_class(class("standard", true));
        store.insert_class(class("fast", false));
        let engine = ClassReconcileEngine::new(store.clone());

        engine.reconcile("standard").await.unwrap();
        engine.reconcile("fast").await.unwrap();

        assert!(default_condition(&store, "standard"));
        assert!(!default_condition(&store, "fast"));
        assert_eq!(
            store.class("standard").unwrap().status.unwrap().observed_generation,
            Some(1)
        );
    }

    #[tokio::test]
    async fn repeated_pass_does_not_rewrite_status() {
        let store = Arc::new(MemoryStore::new());
        store.insert_class(class("standard", true));
        let engine = ClassReconcileEngine::new(store.clone());

        engine.reconcile("standard").await.unwrap();
        let version = store.class("standard").unwrap().metadata.resource_version;
        engine.reconcile("standard").await.unwrap();
        assert_eq!(store.class("standard").unwrap().metadata.resource_version, version);
    }

    #[tokio::test]
    async fn missing_class_is_done() {
        let store = Arc::new(MemoryStore::new());
        let engine = ClassReconcileEngine::new(store);
        assert_eq!(engine.reconcile("gone").await.unwrap(), ReconcileOutcome::Done);
    }
}
