//! RavenDBCluster Custom Resource Definition
//!
//! A RavenDBCluster describes a set of RavenDB nodes, how they are secured,
//! how they are exposed and, optionally, how they should be joined into a
//! cluster once they are running.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AccessMode, ClusterPhase, ClusterSetupSpec, ExternalAccessConfiguration, ExternalAccessType,
    NodeSpec, NodeStatus, StorageSpec,
};

fn default_image_pull_policy() -> String {
    "IfNotPresent".to_string()
}

/// Specification for a RavenDBCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ravendb.ravendb.io",
    version = "v1alpha1",
    kind = "RavenDBCluster",
    plural = "ravendbclusters",
    shortname = "rdbc",
    status = "RavenDBClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RavenDBClusterSpec {
    /// RavenDB container image
    pub image: String,

    /// Image pull policy for the RavenDB containers
    #[serde(default = "default_image_pull_policy")]
    pub image_pull_policy: String,

    /// Security mode: "None" or "LetsEncrypt"
    pub mode: String,

    /// Contact email for Let's Encrypt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Secret holding the RavenDB license under key `license.json`
    pub license_secret_ref: String,

    /// Secret holding the client certificate used by the bootstrap job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_secret_ref: Option<String>,

    /// Secret holding the certificate authority used by the bootstrap job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_secret_ref: Option<String>,

    /// DNS domain the per-node hosts live under
    pub domain: String,

    /// HTTP(S) bind URL; defaults by mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// TCP bind URL; defaults to `tcp://0.0.0.0:38888`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url_tcp: Option<String>,

    /// Nodes in declaration order
    pub nodes: Vec<NodeSpec>,

    /// Extra environment variables for every node container
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Persistent storage
    pub storage: StorageSpec,

    /// How nodes are exposed outside the Kubernetes cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_access_configuration: Option<ExternalAccessConfiguration>,

    /// Leader/watcher topology; when set, a bootstrap job joins the nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic_cluster_setup: Option<ClusterSetupSpec>,
}

impl RavenDBClusterSpec {
    /// Parse the access mode, failing with `UnsupportedMode` for unknown values
    pub fn access_mode(&self) -> Result<AccessMode, crate::Error> {
        self.mode.parse()
    }

    /// Node tags in declaration order
    pub fn node_tags(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.tag.as_str()).collect()
    }

    /// HTTP(S) bind URL for the given mode
    pub fn server_url(&self, mode: AccessMode) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| mode.default_server_url().to_string())
    }

    /// TCP bind URL
    pub fn server_url_tcp(&self) -> String {
        self.server_url_tcp
            .clone()
            .unwrap_or_else(|| format!("tcp://0.0.0.0:{}", crate::TCP_PORT))
    }

    /// Configured external access type, if any
    pub fn external_access_type(&self) -> Option<ExternalAccessType> {
        self.external_access_configuration
            .as_ref()
            .map(|c| c.type_)
    }

    /// Returns true if nodes are exposed through per-node Ingress objects
    ///
    /// Ingress is the default exposure when no external access is configured.
    pub fn uses_ingress(&self) -> bool {
        matches!(
            self.external_access_type(),
            None | Some(ExternalAccessType::IngressController)
        )
    }

    /// Returns true if nodes are exposed through AWS Network Load Balancers
    pub fn uses_aws_nlb(&self) -> bool {
        self.external_access_type() == Some(ExternalAccessType::AwsNlb)
    }

    /// IngressClass configured for the ingress-controller provider
    pub fn ingress_class_name(&self) -> Option<&str> {
        self.external_access_configuration
            .as_ref()
            .and_then(|c| c.ingress_controller_external_access.as_ref())
            .map(|i| i.ingress_class_name.as_str())
    }
}

/// Status for a RavenDBCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RavenDBClusterStatus {
    /// Current phase of the cluster lifecycle
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Human-readable summary of the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Per-node status in declaration order
    #[serde(default)]
    pub nodes: Vec<NodeStatus>,

    /// Spec generation the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl RavenDBClusterStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: ClusterPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Append a node status and return self for chaining
    pub fn node(mut self, tag: impl Into<String>, status: impl Into<String>) -> Self {
        self.nodes.push(NodeStatus::new(tag, status));
        self
    }

    /// Set the observed generation and return self for chaining
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}
