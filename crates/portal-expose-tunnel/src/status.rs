//! Status derivation for PortalExpose.
//!
//! Pod readiness is the only health signal available to the controller. These
//! functions fold it, together with the relay targets, into the coarse phase,
//! the per-relay connection records and the public URL.

use chrono::{DateTime, Utc};

use portal_expose_core::{ExposurePhase, RelayConnectionStatus, RelayState, RelayTarget};

/// Scheme every relay URL is expected to carry.
const RELAY_SCHEME: &str = "wss://";

/// Error recorded on relays while no tunnel pod is ready.
const PODS_NOT_READY: &str = "tunnel pods not ready";

/// Derive the phase from pod and relay counters.
///
/// Rules are evaluated in priority order, first match wins:
///
/// | rule | condition | phase |
/// |------|-----------|-------|
/// | 1 | all pods ready (`> 0`) and all relays connected (`> 0`) | Ready |
/// | 2 | any pod ready or any relay connected | Degraded |
/// | 3 | no pod ready but some desired | Pending |
/// | 4 | otherwise | Failed |
#[must_use]
pub fn compute_phase(
    ready_pods: i32,
    total_pods: i32,
    connected_relays: usize,
    total_relays: usize,
) -> ExposurePhase {
    let all_pods_ready = ready_pods == total_pods && total_pods > 0;
    let all_relays_connected = connected_relays == total_relays && total_relays > 0;

    if all_pods_ready && all_relays_connected {
        ExposurePhase::Ready
    } else if ready_pods > 0 || connected_relays > 0 {
        ExposurePhase::Degraded
    } else if ready_pods == 0 && total_pods > 0 {
        ExposurePhase::Pending
    } else {
        ExposurePhase::Failed
    }
}

/// Build one connection record per relay target, in declaration order.
///
/// There is no per-relay probing: every target is Connected when tunnel pods
/// are ready and Disconnected otherwise.
#[must_use]
pub fn compute_relay_statuses(
    targets: &[RelayTarget],
    pods_ready: bool,
) -> Vec<RelayConnectionStatus> {
    let state = if pods_ready {
        RelayState::Connected
    } else {
        RelayState::Disconnected
    };

    targets
        .iter()
        .map(|target| RelayConnectionStatus {
            name: target.name.clone(),
            status: state,
            connected_at: None,
            last_error: None,
        })
        .collect()
}

/// Fill in `connected_at` and `last_error` using the previously persisted records.
///
/// A relay that stays Connected keeps its original `connected_at`; one that
/// just became Connected is stamped with `now`. Disconnected relays lose their
/// timestamp and get an explanatory `last_error`.
pub fn carry_connected_at(
    previous: &[RelayConnectionStatus],
    current: &mut [RelayConnectionStatus],
    now: DateTime<Utc>,
) {
    for status in current.iter_mut() {
        match status.status {
            RelayState::Connected => {
                let earlier = previous
                    .iter()
                    .find(|p| p.name == status.name && p.status == RelayState::Connected)
                    .and_then(|p| p.connected_at);
                status.connected_at = Some(earlier.unwrap_or(now));
                status.last_error = None;
            }
            RelayState::Disconnected => {
                status.connected_at = None;
                status.last_error = Some(PODS_NOT_READY.to_string());
            }
            RelayState::Unknown => {}
        }
    }
}

/// Count the relays currently Connected.
#[must_use]
pub fn count_connected(statuses: &[RelayConnectionStatus]) -> usize {
    statuses
        .iter()
        .filter(|s| s.status == RelayState::Connected)
        .count()
}

/// Build the public URL for an app from a relay URL.
///
/// The host (and port, if any) is everything between `wss://` and the first
/// `/`, so `("my-app", "wss://portal.example.org/relay")` yields
/// `https://my-app.portal.example.org`. URLs without the scheme are used as-is
/// up to the first `/`.
#[must_use]
pub fn construct_public_url(app_name: &str, relay_url: &str) -> String {
    let rest = relay_url.strip_prefix(RELAY_SCHEME).unwrap_or(relay_url);
    let host = rest.split('/').next().unwrap_or_default();
    format!("https://{app_name}.{host}")
}
