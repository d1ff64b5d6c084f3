//! Tunnel workload synthesis and status computation for portal-expose.
//!
//! Everything in this crate is a pure function of its inputs, so the
//! reconciler can be exercised without a cluster:
//!
//! - [`deployment`]: `PortalExpose` + `TunnelClass` → tunnel `Deployment`, and
//!   the drift check deciding whether a live Deployment needs an update
//! - [`status`]: phase table, per-relay connection records, public URL
//! - [`quantity`]: value comparison of Kubernetes resource quantities
//!
//! # Example
//!
//! ```
//! use portal_expose_tunnel::status::{compute_phase, construct_public_url};
//! use portal_expose_core::ExposurePhase;
//!
//! assert_eq!(compute_phase(1, 1, 1, 1), ExposurePhase::Ready);
//! assert_eq!(
//!     construct_public_url("my-app", "wss://portal.example.org/relay"),
//!     "https://my-app.portal.example.org"
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod deployment;
pub mod quantity;
pub mod status;

pub use deployment::{
    build_deployment, deployment_name, needs_update, resources_for_size, DEFAULT_TUNNEL_IMAGE,
    MANAGED_BY,
};
pub use status::{
    carry_connected_at, compute_phase, compute_relay_statuses, construct_public_url,
    count_connected,
};
