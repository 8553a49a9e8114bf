//! Error types for the Kubeception operator
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the identity of the resource involved and is classified
//! as [`ErrorKind::Transient`] or [`ErrorKind::Fatal`] so the controller
//! runner can pick a requeue delay.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Whether retrying the same reconcile can be expected to succeed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Write conflict or backend temporarily unavailable
    Transient,
    /// Bad input that keeps failing until the user fixes it
    Fatal,
}

/// Main error type for Kubeception operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Optimistic-concurrency check failed on write
    #[error("write conflict on {resource}: {message}")]
    Conflict {
        /// Identity of the object being written (kind/namespace/name)
        resource: String,
        /// Description of the conflict
        message: String,
    },

    /// Object exists but is controlled by another owner
    #[error("ownership error on {resource}: {message}")]
    Ownership {
        /// Identity of the object already controlled elsewhere
        resource: String,
        /// Description of the existing controller
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.tls.ca-secret-name")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// TLS material could not be turned into a client configuration
    #[error("credential error for secret {secret}: {message}")]
    Credential {
        /// Secret the material was read from
        secret: String,
        /// Description of what's malformed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "store", "controller")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without resource context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a write conflict error
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an ownership error
    pub fn ownership(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Ownership {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a credential error for material read from `secret`
    pub fn credential(secret: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credential {
            secret: secret.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify the error for requeue purposes
    ///
    /// Kubernetes errors are transient when the API server reports a conflict,
    /// throttling or a server-side failure, or when the request never got a
    /// response at all. Every other API status means the request itself is wrong.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 || ae.code == 429 || ae.code >= 500 => {
                    ErrorKind::Transient
                }
                kube::Error::Api(_) => ErrorKind::Fatal,
                kube::Error::SerdeError(_) => ErrorKind::Fatal,
                _ => ErrorKind::Transient,
            },
            Error::Conflict { .. } => ErrorKind::Transient,
            Error::Internal { .. } => ErrorKind::Transient,
            Error::Ownership { .. }
            | Error::Validation { .. }
            | Error::Serialization { .. }
            | Error::Credential { .. } => ErrorKind::Fatal,
        }
    }

    /// Check if this error is retryable without user intervention
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Get the resource identity if this error is associated with one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Conflict { resource, .. }
            | Error::Ownership { resource, .. }
            | Error::Validation { resource, .. } => Some(resource),
            Error::Credential { secret, .. } => Some(secret),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
