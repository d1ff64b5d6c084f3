//! Status condition bookkeeping.
//!
//! A condition list is a plain `Vec<Condition>` owned by the resource status.
//! [`set_condition`] is the only mutation entry point; it keeps types unique and
//! moves `lastTransitionTime` only when the status actually flips.

use chrono::{DateTime, Utc};

use crate::crd::{Condition, ConditionStatus};

/// The PortalExpose is Ready or Degraded
pub const AVAILABLE: &str = "Available";
/// The tunnel Deployment is being created or rolled
pub const PROGRESSING: &str = "Progressing";
/// All tunnel pods are ready
pub const TUNNEL_DEPLOYMENT_READY: &str = "TunnelDeploymentReady";
/// All relays are connected
pub const RELAY_CONNECTED: &str = "RelayConnected";
/// The referenced Service was found
pub const SERVICE_EXISTS: &str = "ServiceExists";
/// The referenced (or default) TunnelClass was found
pub const TUNNEL_CLASS_EXISTS: &str = "TunnelClassExists";
/// The TunnelClass carries the default-class marker
pub const DEFAULT_CLASS: &str = "Default";

/// Set a condition, stamping transitions with the current time.
///
/// See [`set_condition_at`].
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) {
    set_condition_at(conditions, type_, status, reason, message, Utc::now());
}

/// Set a condition, stamping transitions with `now`.
///
/// If a condition of `type_` exists, its reason and message are always
/// overwritten, but `last_transition_time` only moves when `status` differs
/// from the stored one. Otherwise a new condition is appended.
pub fn set_condition_at(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = None;
        return;
    }

    conditions.push(Condition::new(type_, status, reason, message, now));
}

/// Find a condition by type
#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True if the condition exists and has status True
#[must_use]
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}
