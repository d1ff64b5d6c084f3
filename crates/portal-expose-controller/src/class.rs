//! TunnelClass resolution and default-class arbitration.
//!
//! The "at most one default class" rule cannot be expressed as a store
//! constraint, so [`DefaultClassArbiter`] enforces it after the fact. Two
//! classes marked default at nearly the same time can coexist until both
//! arbitration passes finish; [`ClassResolver`] then returns whichever is
//! listed first.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info};

use portal_expose_core::finalizer::{clear_default_class, is_default_class};
use portal_expose_core::TunnelClass;

use crate::store::ClusterStore;
use crate::{ControllerError, Result};

/// Resolves the TunnelClass a PortalExpose should run with.
#[derive(Clone)]
pub struct ClassResolver {
    store: Arc<dyn ClusterStore>,
}

impl ClassResolver {
    /// Create a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Resolve an explicit class name, or the default class when `explicit`
    /// is `None` or empty.
    ///
    /// # Errors
    ///
    /// - `TunnelClassNotFound` if the named class does not exist
    /// - `NoDefaultTunnelClass` if no class carries the default annotation
    /// - store errors unchanged
    pub async fn resolve(&self, explicit: Option<&str>) -> Result<TunnelClass> {
        match explicit.filter(|name| !name.is_empty()) {
            Some(name) => self
                .store
                .get_tunnel_class(name)
                .await?
                .ok_or_else(|| ControllerError::TunnelClassNotFound(name.to_string())),
            None => {
                let class = self
                    .store
                    .list_tunnel_classes()
                    .await?
                    .into_iter()
                    .find(|class| is_default_class(&class.metadata))
                    .ok_or(ControllerError::NoDefaultTunnelClass)?;
                debug!(class = %class.name_any(), "Resolved default TunnelClass");
                Ok(class)
            }
        }
    }
}

/// Keeps the default-class annotation on at most one TunnelClass.
#[derive(Clone)]
pub struct DefaultClassArbiter {
    store: Arc<dyn ClusterStore>,
}

impl DefaultClassArbiter {
    /// Create an arbiter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Strip the default annotation from every class other than `keep`.
    ///
    /// Returns the number of classes that were changed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or updating a class fails; classes already
    /// updated stay updated and the next pass finishes the job.
    pub async fn enforce_single_default(&self, keep: &str) -> Result<usize> {
        let mut cleared = 0;

        for mut class in self.store.list_tunnel_classes().await? {
            if class.name_any() == keep || !is_default_class(&class.metadata) {
                continue;
            }
            clear_default_class(&mut class.metadata);
            self.store.replace_tunnel_class(&class).await?;
            info!(
                class = %class.name_any(),
                default = keep,
                "Removed default annotation from TunnelClass"
            );
            cleared += 1;
        }

        Ok(cleared)
    }
}
