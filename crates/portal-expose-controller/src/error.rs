//! Error types for the controller crate.

use thiserror::Error;

use portal_expose_core::finalizer::DEFAULT_CLASS_ANNOTATION;

/// Errors that can occur while reconciling.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// The object was modified since it was read.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A required field is missing from an object.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// The explicitly referenced TunnelClass does not exist.
    #[error("failed to get TunnelClass {0:?}: not found")]
    TunnelClassNotFound(String),

    /// No TunnelClass carries the default annotation.
    #[error(
        "no default TunnelClass found (annotate one with {}: \"true\")",
        DEFAULT_CLASS_ANNOTATION
    )]
    NoDefaultTunnelClass,

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML rendering error.
    #[error("Manifest rendering error: {0}")]
    Manifest(#[from] serde_yaml::Error),
}

impl From<kube::Error> for ControllerError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 409 => Self::Conflict(resp.message),
            other => Self::Kube(other),
        }
    }
}

impl ControllerError {
    /// Check if this error is retriable.
    ///
    /// Store and conflict errors are transient; the reconcile is retried
    /// with backoff and the error never reaches the resource status.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Kube(_) | Self::Conflict(_))
    }

    /// Check if this error means a referenced object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::TunnelClassNotFound(_) | Self::NoDefaultTunnelClass => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }
}

/// A specialized Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn conflict_is_mapped_and_retriable() {
        let err = ControllerError::from(api_error(409, "Conflict"));
        assert!(matches!(err, ControllerError::Conflict(_)));
        assert!(err.is_retriable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_classification() {
        assert!(ControllerError::from(api_error(404, "NotFound")).is_not_found());
        assert!(ControllerError::NoDefaultTunnelClass.is_not_found());
        assert!(ControllerError::TunnelClassNotFound("fast".into()).is_not_found());
        assert!(!ControllerError::NoDefaultTunnelClass.is_retriable());
        assert!(!ControllerError::MissingField("metadata.namespace").is_not_found());
    }

    #[test]
    fn messages_name_the_missing_class() {
        assert_eq!(
            ControllerError::TunnelClassNotFound("fast".into()).to_string(),
            "failed to get TunnelClass \"fast\": not found"
        );
        assert!(ControllerError::NoDefaultTunnelClass
            .to_string()
            .contains("portal.gosuda.org/is-default-class"));
    }
}
