//! Kubernetes event publishing.
//!
//! Events are best-effort notices for humans. Recording never fails the
//! reconcile: implementations log and swallow their own errors.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

use portal_expose_core::PortalExpose;

/// Event reasons emitted for a PortalExpose.
pub mod reason {
    /// Tunnel Deployment created.
    pub const CREATED: &str = "Created";
    /// Referenced Service is missing.
    pub const SERVICE_NOT_FOUND: &str = "ServiceNotFound";
    /// Referenced or default TunnelClass is missing.
    pub const TUNNEL_CLASS_NOT_FOUND: &str = "TunnelClassNotFound";
    /// Phase became Ready.
    pub const READY: &str = "Ready";
    /// Phase became Degraded.
    pub const DEGRADED: &str = "Degraded";
    /// Phase became Failed.
    pub const FAILED: &str = "Failed";
    /// Tunnel Deployment cleaned up and finalizer released.
    pub const DELETED: &str = "Deleted";
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Informational.
    Normal,
    /// Something needs attention.
    Warning,
}

impl EventType {
    /// Value of the `type` field on a core/v1 Event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// Publishes events about a PortalExpose.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Publish an event. Failures are logged, never returned.
    async fn publish(
        &self,
        exposure: &PortalExpose,
        event_type: EventType,
        reason: &str,
        message: &str,
    );
}

/// [`EventRecorder`] that creates core/v1 Events.
#[derive(Clone)]
pub struct KubeEventRecorder {
    client: Client,
    reporter: String,
}

impl KubeEventRecorder {
    /// Create a recorder reporting as `reporter`.
    #[must_use]
    pub fn new(client: Client, reporter: impl Into<String>) -> Self {
        Self {
            client,
            reporter: reporter.into(),
        }
    }

    fn build_event(&self, exposure: &PortalExpose, event_type: EventType, reason: &str, message: &str) -> Event {
        let now = Time(Utc::now());
        Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}.", exposure.name_any())),
                namespace: exposure.namespace(),
                ..Default::default()
            },
            involved_object: exposure.object_ref(&()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            type_: Some(event_type.as_str().to_string()),
            count: Some(1),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            source: Some(EventSource {
                component: Some(self.reporter.clone()),
                host: None,
            }),
            reporting_component: Some(self.reporter.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        exposure: &PortalExpose,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        let namespace = exposure.namespace().unwrap_or_default();
        let events: Api<Event> = Api::namespaced(self.client.clone(), &namespace);
        let event = self.build_event(exposure, event_type, reason, message);

        if let Err(e) = events.create(&PostParams::default(), &event).await {
            warn!(
                name = %exposure.name_any(),
                namespace = %namespace,
                reason,
                error = %e,
                "Failed to publish event"
            );
        }
    }
}

/// In-memory recorder for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// An event captured by [`RecordingEvents`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedEvent {
        /// Name of the PortalExpose.
        pub object: String,
        /// Severity.
        pub event_type: EventType,
        /// Reason code.
        pub reason: String,
        /// Human-readable message.
        pub message: String,
    }

    /// Recorder that keeps every event in memory.
    #[derive(Default)]
    pub struct RecordingEvents {
        events: Mutex<Vec<RecordedEvent>>,
    }

    impl RecordingEvents {
        /// Create an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All recorded events, oldest first.
        #[must_use]
        pub fn events(&self) -> Vec<RecordedEvent> {
            self.events.lock().clone()
        }

        /// Reasons of all recorded events, oldest first.
        #[must_use]
        pub fn reasons(&self) -> Vec<String> {
            self.events.lock().iter().map(|e| e.reason.clone()).collect()
        }

        /// Number of events with the given reason.
        #[must_use]
        pub fn count(&self, reason: &str) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|e| e.reason == reason)
                .count()
        }
    }

    #[async_trait]
    impl EventRecorder for RecordingEvents {
        async fn publish(
            &self,
            exposure: &PortalExpose,
            event_type: EventType,
            reason: &str,
            message: &str,
        ) {
            self.events.lock().push(RecordedEvent {
                object: exposure.name_any(),
                event_type,
                reason: reason.to_string(),
                message: message.to_string(),
            });
        }
    }
}
