//! Cluster resource store.
//!
//! The reconcilers only talk to the cluster through [`ClusterStore`], which
//! exposes exactly the reads and writes they need. [`KubeStore`] backs it with
//! the Kubernetes API; the `mock` module provides an in-memory version for
//! tests.
//!
//! Replace calls carry the object's `resourceVersion`, so a stale write fails
//! with [`ControllerError::Conflict`] instead of silently overwriting a newer
//! one.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use portal_expose_core::{PortalExpose, TunnelClass};

use crate::{ControllerError, Result};

/// Typed access to the objects the controller reads and writes.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a PortalExpose. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn get_exposure(&self, namespace: &str, name: &str) -> Result<Option<PortalExpose>>;

    /// Replace a PortalExpose's metadata and spec.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the object changed since it was read.
    async fn replace_exposure(&self, exposure: &PortalExpose) -> Result<PortalExpose>;

    /// Replace a PortalExpose's status subresource.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the object changed since it was read.
    async fn replace_exposure_status(&self, exposure: &PortalExpose) -> Result<PortalExpose>;

    /// Check whether a Service exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Fetch a TunnelClass. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn get_tunnel_class(&self, name: &str) -> Result<Option<TunnelClass>>;

    /// List all TunnelClasses.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn list_tunnel_classes(&self) -> Result<Vec<TunnelClass>>;

    /// Replace a TunnelClass's metadata and spec.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the object changed since it was read.
    async fn replace_tunnel_class(&self, class: &TunnelClass) -> Result<TunnelClass>;

    /// Replace a TunnelClass's status subresource.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the object changed since it was read.
    async fn replace_tunnel_class_status(&self, class: &TunnelClass) -> Result<TunnelClass>;

    /// Fetch a Deployment. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// Create a Deployment.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if it already exists.
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// Replace a Deployment.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the object changed since it was read.
    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// Delete a Deployment. Deleting a missing Deployment is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`ClusterStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store using the given client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn exposures(&self, namespace: &str) -> Api<PortalExpose> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn classes(&self) -> Api<TunnelClass> {
        Api::all(self.client.clone())
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace of a namespaced object, which every write path requires.
fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String> {
    obj.namespace()
        .ok_or(ControllerError::MissingField("metadata.namespace"))
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_exposure(&self, namespace: &str, name: &str) -> Result<Option<PortalExpose>> {
        Ok(self.exposures(namespace).get_opt(name).await?)
    }

    async fn replace_exposure(&self, exposure: &PortalExpose) -> Result<PortalExpose> {
        let namespace = namespace_of(exposure)?;
        let name = exposure.name_any();
        Ok(self
            .exposures(&namespace)
            .replace(&name, &PostParams::default(), exposure)
            .await?)
    }

    async fn replace_exposure_status(&self, exposure: &PortalExpose) -> Result<PortalExpose> {
        let namespace = namespace_of(exposure)?;
        let name = exposure.name_any();
        let body = serde_json::to_vec(exposure)?;
        Ok(self
            .exposures(&namespace)
            .replace_status(&name, &PostParams::default(), body)
            .await?)
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(services.get_opt(name).await?.is_some())
    }

    async fn get_tunnel_class(&self, name: &str) -> Result<Option<TunnelClass>> {
        Ok(self.classes().get_opt(name).await?)
    }

    async fn list_tunnel_classes(&self) -> Result<Vec<TunnelClass>> {
        Ok(self.classes().list(&ListParams::default()).await?.items)
    }

    async fn replace_tunnel_class(&self, class: &TunnelClass) -> Result<TunnelClass> {
        Ok(self
            .classes()
            .replace(&class.name_any(), &PostParams::default(), class)
            .await?)
    }

    async fn replace_tunnel_class_status(&self, class: &TunnelClass) -> Result<TunnelClass> {
        let body = serde_json::to_vec(class)?;
        Ok(self
            .classes()
            .replace_status(&class.name_any(), &PostParams::default(), body)
            .await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        Ok(self.deployments(namespace).get_opt(name).await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = namespace_of(deployment)?;
        Ok(self
            .deployments(&namespace)
            .create(&PostParams::default(), deployment)
            .await?)
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = namespace_of(deployment)?;
        let name = deployment.name_any();
        Ok(self
            .deployments(&namespace)
            .replace(&name, &PostParams::default(), deployment)
            .await?)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .deployments(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(namespace, name, "Deployment already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::Utc;
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;
    use kube::core::ErrorResponse;
    use parking_lot::Mutex;

    type Key = (String, String);

    /// Store calls that can be made to fail with [`MemoryStore::fail_next`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StoreOp {
        /// [`ClusterStore::replace_exposure`].
        ReplaceExposure,
        /// [`ClusterStore::replace_exposure_status`].
        ReplaceExposureStatus,
        /// [`ClusterStore::get_tunnel_class`].
        GetTunnelClass,
        /// [`ClusterStore::list_tunnel_classes`].
        ListTunnelClasses,
        /// [`ClusterStore::create_deployment`].
        CreateDeployment,
    }

    /// A store that keeps objects in memory and mimics the API server's
    /// optimistic concurrency and finalizer-gated deletion.
    #[derive(Default)]
    pub struct MemoryStore {
        inner: Mutex<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        exposures: BTreeMap<Key, PortalExpose>,
        classes: BTreeMap<String, TunnelClass>,
        deployments: BTreeMap<Key, Deployment>,
        services: BTreeSet<Key>,
        faults: Vec<(StoreOp, ControllerError)>,
        version: u64,
    }

    impl Inner {
        /// Stamp a fresh resourceVersion, plus a uid for new objects.
        fn stamp(&mut self, meta: &mut ObjectMeta) {
            self.version += 1;
            meta.resource_version = Some(self.version.to_string());
            if meta.uid.is_none() {
                meta.uid = Some(format!("uid-{}", self.version));
                meta.generation = Some(1);
            }
        }
    }

    fn key(namespace: &str, name: &str) -> Key {
        (namespace.to_string(), name.to_string())
    }

    fn key_of<K: ResourceExt>(obj: &K) -> Result<Key> {
        Ok((namespace_of(obj)?, obj.name_any()))
    }

    fn not_found(kind: &str, name: &str) -> ControllerError {
        ControllerError::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{kind} {name:?} not found"),
            reason: "NotFound".to_string(),
            code: 404,
        }))
    }

    /// An unset incoming resourceVersion is an unconditional write.
    fn check_version(kind: &str, stored: &ObjectMeta, incoming: &ObjectMeta) -> Result<()> {
        if incoming.resource_version.is_some()
            && incoming.resource_version != stored.resource_version
        {
            return Err(ControllerError::Conflict(format!(
                "Operation cannot be fulfilled on {kind} {:?}: the object has been modified",
                stored.name.as_deref().unwrap_or_default()
            )));
        }
        Ok(())
    }

    impl MemoryStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next call of `op` fail with `error`. Faults queued for the
        /// same call fire in order, one per call.
        pub fn fail_next(&self, op: StoreOp, error: ControllerError) {
            self.inner.lock().faults.push((op, error));
        }

        fn take_fault(&self, op: StoreOp) -> Result<()> {
            let mut inner = self.inner.lock();
            match inner.faults.iter().position(|(queued, _)| *queued == op) {
                Some(index) => Err(inner.faults.remove(index).1),
                None => Ok(()),
            }
        }

        /// Add a PortalExpose as if a user had applied it.
        ///
        /// # Panics
        ///
        /// Panics if the object has no namespace.
        pub fn insert_exposure(&self, mut exposure: PortalExpose) {
            let key = key_of(&exposure).expect("PortalExpose needs a namespace");
            let mut inner = self.inner.lock();
            inner.stamp(&mut exposure.metadata);
            inner.exposures.insert(key, exposure);
        }

        /// Current copy of a PortalExpose.
        #[must_use]
        pub fn exposure(&self, namespace: &str, name: &str) -> Option<PortalExpose> {
            self.inner.lock().exposures.get(&key(namespace, name)).cloned()
        }

        /// Begin deleting a PortalExpose. It disappears immediately if it
        /// carries no finalizers, otherwise only once they are removed.
        pub fn mark_exposure_deleted(&self, namespace: &str, name: &str) {
            let mut inner = self.inner.lock();
            let Some(mut exposure) = inner.exposures.remove(&key(namespace, name)) else {
                return;
            };
            if exposure.finalizers().is_empty() {
                return;
            }
            exposure
                .metadata
                .deletion_timestamp
                .get_or_insert_with(|| Time(Utc::now()));
            inner.stamp(&mut exposure.metadata);
            inner.exposures.insert(key(namespace, name), exposure);
        }

        /// Edit a PortalExpose's spec or metadata out of band.
        pub fn edit_exposure(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut PortalExpose)) {
            let mut inner = self.inner.lock();
            let Some(mut exposure) = inner.exposures.remove(&key(namespace, name)) else {
                return;
            };
            edit(&mut exposure);
            inner.stamp(&mut exposure.metadata);
            inner.exposures.insert(key(namespace, name), exposure);
        }

        /// Add a Service.
        pub fn insert_service(&self, namespace: &str, name: &str) {
            self.inner.lock().services.insert(key(namespace, name));
        }

        /// Remove a Service.
        pub fn remove_service(&self, namespace: &str, name: &str) {
            self.inner.lock().services.remove(&key(namespace, name));
        }

        /// Add a TunnelClass.
        pub fn insert_class(&self, mut class: TunnelClass) {
            let mut inner = self.inner.lock();
            inner.stamp(&mut class.metadata);
            inner.classes.insert(class.name_any(), class);
        }

        /// Current copy of a TunnelClass.
        #[must_use]
        pub fn class(&self, name: &str) -> Option<TunnelClass> {
            self.inner.lock().classes.get(name).cloned()
        }

        /// Edit a TunnelClass out of band.
        pub fn edit_class(&self, name: &str, edit: impl FnOnce(&mut TunnelClass)) {
            let mut inner = self.inner.lock();
            let Some(mut class) = inner.classes.remove(name) else {
                return;
            };
            edit(&mut class);
            inner.stamp(&mut class.metadata);
            inner.classes.insert(name.to_string(), class);
        }

        /// Current copy of a Deployment.
        #[must_use]
        pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
            self.inner.lock().deployments.get(&key(namespace, name)).cloned()
        }

        /// Number of Deployments in the store.
        #[must_use]
        pub fn deployment_count(&self) -> usize {
            self.inner.lock().deployments.len()
        }

        /// Edit a Deployment out of band, as a user or another controller would.
        pub fn edit_deployment(
            &self,
            namespace: &str,
            name: &str,
            edit: impl FnOnce(&mut Deployment),
        ) {
            let mut inner = self.inner.lock();
            let Some(mut deployment) = inner.deployments.remove(&key(namespace, name)) else {
                return;
            };
            edit(&mut deployment);
            inner.stamp(&mut deployment.metadata);
            inner.deployments.insert(key(namespace, name), deployment);
        }

        /// Report `ready` ready pods on a Deployment, with every replica updated.
        pub fn set_deployment_ready(&self, namespace: &str, name: &str, ready: i32) {
            self.edit_deployment(namespace, name, |deployment| {
                let desired = deployment
                    .spec
                    .as_ref()
                    .and_then(|s| s.replicas)
                    .unwrap_or(1);
                deployment.status = Some(DeploymentStatus {
                    replicas: Some(desired),
                    ready_replicas: Some(ready),
                    available_replicas: Some(ready),
                    updated_replicas: Some(desired),
                    ..Default::default()
                });
            });
        }
    }

    #[async_trait]
    impl ClusterStore for MemoryStore {
        async fn get_exposure(&self, namespace: &str, name: &str) -> Result<Option<PortalExpose>> {
            Ok(self.exposure(namespace, name))
        }

        async fn replace_exposure(&self, exposure: &PortalExpose) -> Result<PortalExpose> {
            self.take_fault(StoreOp::ReplaceExposure)?;
            let key = key_of(exposure)?;
            let mut inner = self.inner.lock();
            let stored = inner
                .exposures
                .get(&key)
                .ok_or_else(|| not_found("portalexposes", &key.1))?;
            check_version("portalexposes", &stored.metadata, &exposure.metadata)?;

            let mut updated = exposure.clone();
            updated.status.clone_from(&stored.status);
            updated.metadata.deletion_timestamp.clone_from(&stored.metadata.deletion_timestamp);
            inner.stamp(&mut updated.metadata);

            if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
                inner.exposures.remove(&key);
            } else {
                inner.exposures.insert(key, updated.clone());
            }
            Ok(updated)
        }

        async fn replace_exposure_status(&self, exposure: &PortalExpose) -> Result<PortalExpose> {
            self.take_fault(StoreOp::ReplaceExposureStatus)?;
            let key = key_of(exposure)?;
            let mut inner = self.inner.lock();
            let mut stored = inner
                .exposures
                .remove(&key)
                .ok_or_else(|| not_found("portalexposes", &key.1))?;
            if let Err(e) = check_version("portalexposes", &stored.metadata, &exposure.metadata) {
                inner.exposures.insert(key, stored);
                return Err(e);
            }

            stored.status.clone_from(&exposure.status);
            inner.stamp(&mut stored.metadata);
            inner.exposures.insert(key, stored.clone());
            Ok(stored)
        }

        async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool> {
            Ok(self.inner.lock().services.contains(&key(namespace, name)))
        }

        async fn get_tunnel_class(&self, name: &str) -> Result<Option<TunnelClass>> {
            self.take_fault(StoreOp::GetTunnelClass)?;
            Ok(self.class(name))
        }

        async fn list_tunnel_classes(&self) -> Result<Vec<TunnelClass>> {
            self.take_fault(StoreOp::ListTunnelClasses)?;
            Ok(self.inner.lock().classes.values().cloned().collect())
        }

        async fn replace_tunnel_class(&self, class: &TunnelClass) -> Result<TunnelClass> {
            let name = class.name_any();
            let mut inner = self.inner.lock();
            let stored = inner
                .classes
                .get(&name)
                .ok_or_else(|| not_found("tunnelclasses", &name))?;
            check_version("tunnelclasses", &stored.metadata, &class.metadata)?;

            let mut updated = class.clone();
            updated.status.clone_from(&stored.status);
            inner.stamp(&mut updated.metadata);
            inner.classes.insert(name, updated.clone());
            Ok(updated)
        }

        async fn replace_tunnel_class_status(&self, class: &TunnelClass) -> Result<TunnelClass> {
            let name = class.name_any();
            let mut inner = self.inner.lock();
            let mut stored = inner
                .classes
                .get(&name)
                .cloned()
                .ok_or_else(|| not_found("tunnelclasses", &name))?;
            check_version("tunnelclasses", &stored.metadata, &class.metadata)?;

            stored.status.clone_from(&class.status);
            inner.stamp(&mut stored.metadata);
            inner.classes.insert(name, stored.clone());
            Ok(stored)
        }

        async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
            Ok(self.deployment(namespace, name))
        }

        async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
            self.take_fault(StoreOp::CreateDeployment)?;
            let key = key_of(deployment)?;
            let mut inner = self.inner.lock();
            if inner.deployments.contains_key(&key) {
                return Err(ControllerError::Conflict(format!(
                    "deployments.apps {:?} already exists",
                    key.1
                )));
            }

            let mut created = deployment.clone();
            created.metadata.resource_version = None;
            created.metadata.uid = None;
            inner.stamp(&mut created.metadata);
            inner.deployments.insert(key, created.clone());
            Ok(created)
        }

        async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
            let key = key_of(deployment)?;
            let mut inner = self.inner.lock();
            let stored = inner
                .deployments
                .get(&key)
                .ok_or_else(|| not_found("deployments.apps", &key.1))?;
            check_version("deployments.apps", &stored.metadata, &deployment.metadata)?;

            let mut updated = deployment.clone();
            updated.status.clone_from(&stored.status);
            updated.metadata.generation = stored.metadata.generation.map(|g| g + 1);
            inner.stamp(&mut updated.metadata);
            inner.deployments.insert(key, updated.clone());
            Ok(updated)
        }

        async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
            self.inner.lock().deployments.remove(&key(namespace, name));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MemoryStore;
    use super::*;
    use portal_expose_core::{
        AppSpec, PortalExposeSpec, RelaySpec, RelayTarget, ServiceRef, TunnelClassSpec,
        TunnelSize,
    };

    fn exposure() -> PortalExpose {
        let mut exposure = PortalExpose::new(
            "web",
            PortalExposeSpec {
                app: AppSpec {
                    name: "web".into(),
                    service: ServiceRef {
                        name: "web-svc".into(),
                        port: 80,
                    },
                },
                relay: RelaySpec {
                    targets: vec![RelayTarget {
                        name: "main".into(),
                        url: "wss://relay.example.com".into(),
                    }],
                },
                tunnel_class_name: None,
            },
        );
        exposure.metadata.namespace = Some("default".into());
        exposure
    }

    #[tokio::test]
    async fn stale_write_conflicts() {
        let store = MemoryStore::new();
        store.insert_exposure(exposure());

        let first = store.get_exposure("default", "web").await.unwrap().unwrap();
        let stale = first.clone();

        store.replace_exposure(&first).await.unwrap();
        let err = store.replace_exposure(&stale).await.unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));
        assert!(err.is_retriable());

        let err = store.replace_exposure_status(&stale).await.unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));
        assert!(store.exposure("default", "web").is_some());
    }

    #[tokio::test]
    async fn status_write_leaves_spec_alone() {
        let store = MemoryStore::new();
        store.insert_exposure(exposure());

        let mut current = store.get_exposure("default", "web").await.unwrap().unwrap();
        current.spec.app.name = "changed".into();
        current.status = Some(portal_expose_core::PortalExposeStatus {
            public_url: "https://web.relay.example.com".into(),
            ..Default::default()
        });
        let written = store.replace_exposure_status(&current).await.unwrap();

        assert_eq!(written.spec.app.name, "web");
        assert_eq!(
            written.status.unwrap().public_url,
            "https://web.relay.example.com"
        );
    }

    #[tokio::test]
    async fn deletion_waits_for_finalizers() {
        let store = MemoryStore::new();
        let mut with_finalizer = exposure();
        with_finalizer.metadata.finalizers = Some(vec!["example.com/hold".into()]);
        store.insert_exposure(with_finalizer);

        store.mark_exposure_deleted("default", "web");
        let mut pending = store.exposure("default", "web").unwrap();
        assert!(pending.metadata.deletion_timestamp.is_some());

        pending.metadata.finalizers = Some(Vec::new());
        store.replace_exposure(&pending).await.unwrap();
        assert!(store.exposure("default", "web").is_none());

        store.insert_exposure(exposure());
        store.mark_exposure_deleted("default", "web");
        assert!(store.exposure("default", "web").is_none());
    }

    #[tokio::test]
    async fn classes_list_and_conflict() {
        let store = MemoryStore::new();
        for name in ["b", "a"] {
            store.insert_class(TunnelClass::new(
                name,
                TunnelClassSpec {
                    replicas: 1,
                    size: TunnelSize::Small,
                    node_selector: None,
                    tolerations: None,
                },
            ));
        }

        let names: Vec<_> = store
            .list_tunnel_classes()
            .await
            .unwrap()
            .iter()
            .map(ResourceExt::name_any)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let stale = store.class("a").unwrap();
        store.edit_class("a", |c| c.spec.replicas = 3);
        assert!(matches!(
            store.replace_tunnel_class(&stale).await,
            Err(ControllerError::Conflict(_))
        ));
        assert!(store.get_tunnel_class("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        use super::mock::StoreOp;

        let store = MemoryStore::new();
        store.insert_exposure(exposure());
        store.fail_next(
            StoreOp::ReplaceExposureStatus,
            ControllerError::Conflict("injected".into()),
        );

        let current = store.get_exposure("default", "web").await.unwrap().unwrap();
        let err = store.replace_exposure_status(&current).await.unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));

        // Other calls are unaffected and the next write goes through
        store.replace_exposure(&current).await.unwrap();
        let current = store.get_exposure("default", "web").await.unwrap().unwrap();
        store.replace_exposure_status(&current).await.unwrap();
    }
}
