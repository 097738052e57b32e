//! Custom Resource Definitions for the RavenDB operator

mod cluster;
mod types;

pub use cluster::{RavenDBCluster, RavenDBClusterSpec, RavenDBClusterStatus};
pub use types::{
    AccessMode, AwsExternalAccess, AwsNodeMapping, ClusterPhase, ClusterSetupSpec,
    ExternalAccessConfiguration, ExternalAccessType, IngressControllerExternalAccess, NodeSpec,
    NodeStatus, StorageSpec, VolumeSpec,
};
