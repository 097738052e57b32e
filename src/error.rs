//! Error types for the RavenDB operator
//!
//! Errors are structured with fields so that a failed pass can be traced back
//! to the cluster, resource kind or object that caused it.

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Topology or schema invariant violated by a RavenDBCluster spec
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// All violated rules, one per line
        message: String,
    },

    /// Access mode outside the recognized set
    #[error("unsupported mode: {mode}")]
    UnsupportedMode {
        /// The mode string as found in the spec
        mode: String,
    },

    /// A resource builder failed to produce a desired object
    #[error("failed to build {kind}: {source}")]
    Build {
        /// Kind of the resource being built
        kind: String,
        /// What went wrong inside the builder
        source: Box<Error>,
    },

    /// Creating or patching a child object failed
    #[error("failed to apply {kind} {namespace}/{name}: {source}")]
    Apply {
        /// Kind of the target object
        kind: String,
        /// Namespace of the target object
        namespace: String,
        /// Name of the target object
        name: String,
        /// The underlying store failure
        source: Box<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error for {kind}: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized
        kind: String,
    },

    /// The pass was cancelled before an I/O call completed
    #[error("reconcile pass cancelled")]
    Cancelled,

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "registry", "webhook")
        context: String,
    },
}

impl Error {
    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an unsupported mode error
    pub fn unsupported_mode(mode: impl Into<String>) -> Self {
        Self::UnsupportedMode { mode: mode.into() }
    }

    /// Wrap a builder failure with the kind of resource being built
    pub fn build(kind: impl Into<String>, source: Error) -> Self {
        Self::Build {
            kind: kind.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a store failure with the identity of the target object
    pub fn apply(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: Error,
    ) -> Self {
        Self::Apply {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: kind.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, mode and serialization errors need a spec change.
    /// Conflicts and throttling from the API server are transient, other 4xx
    /// responses are not. Wrapped errors inherit the answer of their source.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    matches!(ae.code, 409 | 429) || !(400..500).contains(&ae.code)
                }
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::UnsupportedMode { .. } => false,
            Error::Build { source, .. } => source.is_retryable(),
            Error::Apply { source, .. } => source.is_retryable(),
            Error::Serialization { .. } => false,
            Error::Cancelled => true,
            Error::Internal { .. } => true,
        }
    }
}
