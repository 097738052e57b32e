//! RavenDB operator - CRD-driven Kubernetes operator for RavenDB clusters
//!
//! The operator watches `RavenDBCluster` resources and drives a fixed set of
//! child objects toward the declared state: one StatefulSet, Service and
//! external access object per database node, plus a one-shot Job that joins
//! the nodes into a cluster.
//!
//! # Modules
//!
//! - [`crd`] - The RavenDBCluster Custom Resource Definition
//! - [`resource`] - Pure builders for desired child objects
//! - [`apply`] - Idempotent create / merge-apply against the API server
//! - [`actor`] - The ordered step pipeline run on every pass
//! - [`controller`] - Reconcile entry point and status reporting
//! - [`webhook`] - Validating admission webhook for RavenDBCluster
//! - [`config`] - Operator configuration
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod actor;
pub mod apply;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod resource;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Field manager recorded on every write the operator makes
pub const DEFAULT_FIELD_MANAGER: &str = "ravendb-operator";

/// Default port for the validating admission webhook
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Default interval between level-triggered passes, in seconds
pub const DEFAULT_REQUEUE_SECS: u64 = 60;

/// RavenDB cluster-internal TCP port
pub const TCP_PORT: i32 = 38888;

/// HTTP port used when the cluster runs unsecured
pub const NONE_WEB_PORT: i32 = 8080;

/// HTTPS port used under Let's Encrypt
pub const LETSENCRYPT_WEB_PORT: i32 = 443;
