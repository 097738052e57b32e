//! Controller for RavenDBCluster resources
//!
//! Each pass fetches the cluster fresh, runs the step pipeline and persists
//! status. Passes are level-triggered: a successful pass always requeues so
//! drift on the platform side is corrected without a new edit.

mod cluster;

pub use cluster::{
    desired_status, error_policy, reconcile, ClusterClient, ClusterClientImpl, Context,
    ContextBuilder, FAILURE_REQUEUE,
};

#[cfg(test)]
pub use cluster::MockClusterClient;
