//! Custom resource definitions.
//!
//! - [`PortalExpose`]: namespaced, declares which Service to expose and through
//!   which relays
//! - [`TunnelClass`]: cluster-scoped, a reusable replica and size profile

mod portal_expose;
mod tunnel_class;
mod types;

pub use portal_expose::{
    AppSpec, ExposurePhase, PortalExpose, PortalExposeSpec, PortalExposeStatus,
    RelayConnectionStatus, RelaySpec, RelayState, RelayStatus, RelayTarget, ServiceRef,
    TunnelPodStatus,
};
pub use tunnel_class::{TunnelClass, TunnelClassSpec, TunnelClassStatus, TunnelSize};
pub use types::{Condition, ConditionStatus};
