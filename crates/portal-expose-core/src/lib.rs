//! Core types and utilities for portal-expose.
//!
//! This crate provides the foundational pieces shared by the tunnel builder and
//! the controller:
//!
//! - **Resource schema**: the `PortalExpose` and `TunnelClass` custom resources
//! - **Conditions**: type-keyed status conditions with transition-time semantics
//! - **Finalizers**: helpers for the cleanup finalizer and the default-class marker
//! - **Error types**: validation and parsing errors
//!
//! # Example
//!
//! ```
//! use portal_expose_core::conditions::{set_condition, is_condition_true, SERVICE_EXISTS};
//! use portal_expose_core::crd::ConditionStatus;
//!
//! let mut conditions = Vec::new();
//! set_condition(
//!     &mut conditions,
//!     SERVICE_EXISTS,
//!     ConditionStatus::True,
//!     "ServiceFound",
//!     "Service exists",
//! );
//! assert!(is_condition_true(&conditions, SERVICE_EXISTS));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod conditions;
pub mod crd;
pub mod error;
pub mod finalizer;

pub use crd::{
    AppSpec, Condition, ConditionStatus, ExposurePhase, PortalExpose, PortalExposeSpec,
    PortalExposeStatus, RelayConnectionStatus, RelaySpec, RelayState, RelayStatus, RelayTarget,
    ServiceRef, TunnelClass, TunnelClassSpec, TunnelClassStatus, TunnelPodStatus, TunnelSize,
};
pub use error::{CoreError, Result};

/// API group shared by both custom resources.
pub const API_GROUP: &str = "portal.gosuda.org";
