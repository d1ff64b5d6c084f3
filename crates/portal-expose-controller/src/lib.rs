//! Kubernetes controller for PortalExpose and TunnelClass resources.
//!
//! This crate reconciles the cluster toward what PortalExpose objects
//! declare: one tunnel Deployment per PortalExpose, sized by its TunnelClass,
//! with health reported back on the status subresource.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 runner (kube::runtime::Controller)           │
//! │      PortalExpose + owned Deployments + Services + Classes   │
//! └──────────────────────────────────────────────────────────────┘
//!              │                                  │
//!              ▼                                  ▼
//! ┌──────────────────────────┐       ┌──────────────────────────┐
//! │     ReconcileEngine      │       │   ClassReconcileEngine   │
//! │  finalizer, Deployment,  │       │  single default class    │
//! │  status and conditions   │       │                          │
//! └──────────────────────────┘       └──────────────────────────┘
//!       │            │                            │
//!       ▼            ▼                            ▼
//! ┌───────────┐ ┌──────────────┐       ┌──────────────────────────┐
//! │ Class     │ │ EventRecorder│       │   DefaultClassArbiter    │
//! │ Resolver  │ │              │       │                          │
//! └───────────┘ └──────────────┘       └──────────────────────────┘
//!       │                                         │
//!       ▼                                         ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 ClusterStore (KubeStore / MemoryStore)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to drive the engines against the
//! in-memory store:
//!
//! ```ignore
//! use std::sync::Arc;
//! use portal_expose_controller::{
//!     ControllerConfig, MemoryStore, ReconcileEngine, ReconcileOutcome, RecordingEvents,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let events = Arc::new(RecordingEvents::new());
//! let engine = ReconcileEngine::new(store.clone(), events, &ControllerConfig::default());
//!
//! let outcome = engine.reconcile("default", "missing").await?;
//! assert_eq!(outcome, ReconcileOutcome::Done);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod class;
pub mod config;
pub mod crds;
pub mod error;
pub mod events;
pub mod exposure;
pub mod runner;
pub mod store;
pub mod tunnel_class;

pub use class::{ClassResolver, DefaultClassArbiter};
pub use config::ControllerConfig;
pub use error::{ControllerError, Result};
pub use events::{EventRecorder, EventType, KubeEventRecorder};
pub use exposure::{ReconcileEngine, ReconcileOutcome};
pub use store::{ClusterStore, KubeStore};
pub use tunnel_class::ClassReconcileEngine;

#[cfg(any(test, feature = "test-utils"))]
pub use events::mock::{RecordedEvent, RecordingEvents};
#[cfg(any(test, feature = "test-utils"))]
pub use store::mock::{MemoryStore, StoreOp};
