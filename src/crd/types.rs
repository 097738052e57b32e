//! Supporting types for the RavenDBCluster CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{LETSENCRYPT_WEB_PORT, NONE_WEB_PORT};

/// Security mode a RavenDB cluster runs in
///
/// The spec carries the mode as a plain string; it is parsed here so that an
/// unknown value is rejected by the builders instead of by deserialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Unsecured HTTP, reachable from the public network
    None,
    /// HTTPS with a Let's Encrypt certificate per node
    LetsEncrypt,
}

impl AccessMode {
    /// Port the server listens on for HTTP(S) traffic
    pub fn web_port(&self) -> i32 {
        match self {
            Self::None => NONE_WEB_PORT,
            Self::LetsEncrypt => LETSENCRYPT_WEB_PORT,
        }
    }

    /// Name of the web port on containers and services
    pub fn web_port_name(&self) -> &'static str {
        match self {
            Self::None => "http",
            Self::LetsEncrypt => "https",
        }
    }

    /// Bind URL used when `serverUrl` is not set
    pub fn default_server_url(&self) -> &'static str {
        match self {
            Self::None => "http://0.0.0.0:8080",
            Self::LetsEncrypt => "https://0.0.0.0:443",
        }
    }

    /// Backend protocol announced to the ingress controller
    pub fn backend_protocol(&self) -> &'static str {
        match self {
            Self::None => "HTTP",
            Self::LetsEncrypt => "HTTPS",
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "LetsEncrypt" => Ok(Self::LetsEncrypt),
            _ => Err(crate::Error::unsupported_mode(s)),
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::LetsEncrypt => write!(f, "LetsEncrypt"),
        }
    }
}

/// One RavenDB server instance in the cluster
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Short stable identifier, unique within the cluster (e.g. "A")
    pub tag: String,

    /// URL clients use to reach this node over HTTP(S)
    pub public_server_url: String,

    /// URL other nodes use to reach this node over TCP
    pub public_server_url_tcp: String,

    /// Secret holding the node certificate (`server.pfx`), required for LetsEncrypt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_secret_ref: Option<String>,
}

/// Storage configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Data volume backing `/var/lib/ravendb/data`
    pub data: VolumeSpec,
}

/// A persistent volume request
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Requested size (e.g. "10Gi")
    pub size: String,

    /// Storage class; cluster default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

/// How nodes are reachable from outside the Kubernetes cluster
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExternalAccessType {
    /// Per-node Ingress objects handled by an ingress controller
    #[serde(rename = "ingress-controller")]
    IngressController,
    /// Per-node AWS Network Load Balancer
    #[serde(rename = "aws-nlb")]
    AwsNlb,
}

impl std::fmt::Display for ExternalAccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IngressController => write!(f, "ingress-controller"),
            Self::AwsNlb => write!(f, "aws-nlb"),
        }
    }
}

/// External access configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAccessConfiguration {
    /// Which provider exposes the nodes
    #[serde(rename = "type")]
    pub type_: ExternalAccessType,

    /// Settings for the ingress-controller provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_controller_external_access: Option<IngressControllerExternalAccess>,

    /// Settings for the aws-nlb provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_external_access: Option<AwsExternalAccess>,
}

/// Ingress controller settings
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressControllerExternalAccess {
    /// IngressClass the per-node Ingress objects use
    pub ingress_class_name: String,
}

/// AWS load balancer settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsExternalAccess {
    /// Elastic IP and subnet per node tag
    #[serde(default)]
    pub node_mappings: Vec<AwsNodeMapping>,
}

/// Elastic IP and subnet assigned to one node's load balancer
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsNodeMapping {
    /// Node tag this mapping applies to
    pub tag: String,
    /// Elastic IP allocation id
    pub eip_allocation_id: String,
    /// Subnet the load balancer is placed in
    pub subnet_id: String,
}

/// Leader/watcher topology for automatic cluster setup
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSetupSpec {
    /// Tag of the node that forms the cluster and adds the others
    #[schemars(length(min = 1))]
    pub leader: String,

    /// Tags of nodes joined as watchers instead of members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1))]
    pub watchers: Option<Vec<String>>,
}

/// Cluster lifecycle phase
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterPhase {
    /// No pass has completed yet
    #[default]
    Pending,
    /// Child resources are in place and the database is rolling out
    Deploying,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Deploying => write!(f, "Deploying"),
        }
    }
}

/// Per-node status reported after a pass
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Node tag
    pub tag: String,
    /// Status literal (e.g. "Created")
    pub status: String,
}

impl NodeStatus {
    /// Create a node status entry
    pub fn new(tag: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            status: status.into(),
        }
    }
}
