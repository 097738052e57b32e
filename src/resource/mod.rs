//! Desired child resources for a RavenDBCluster
//!
//! Builders in this module are pure: they map a cluster (and, for per-node
//! objects, one of its nodes) to the typed object the operator wants to exist.
//! Nothing here talks to the API server. [`DesiredResource`] turns a typed
//! object into the untyped payload the apply layer works on and records the
//! owner reference that lets Kubernetes garbage-collect children.

mod ingress;
mod job;
mod load_balancer;
mod service;
mod statefulset;

pub use ingress::build_ingress;
pub use job::{bootstrapper_job_name, build_bootstrapper_job};
pub use load_balancer::{build_load_balancer_service, load_balancer_service_name};
pub use service::build_service;
pub use statefulset::{build_statefulset, STATEFULSET_OWNED_FIELDS};

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{EnvVar, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ApiResource;
use kube::{Resource, ResourceExt};
use serde::Serialize;

use crate::crd::RavenDBCluster;
use crate::{Error, Result};

/// Label carrying the node tag; services select pods by it
pub const NODE_TAG_LABEL: &str = "node-tag";

/// Value of the `app` label on every child object
pub const APP_NAME: &str = "ravendb";

/// Kinds of child object the operator manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// One per node, carries the RavenDB container
    StatefulSet,
    /// Per-node ClusterIP service and per-node AWS load balancer
    Service,
    /// Per-node ingress route
    Ingress,
    /// Cluster bootstrap job
    Job,
}

impl ResourceKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatefulSet => "StatefulSet",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::Job => "Job",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub kind: ResourceKind,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a new object key
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A child object the operator wants to exist, recomputed every pass
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredResource {
    /// Object kind
    pub kind: ResourceKind,
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
    /// Full object as JSON, owner reference included
    pub payload: serde_json::Value,
    /// Owner relation to the parent cluster
    pub owner: OwnerReference,
}

impl DesiredResource {
    /// Attach the cluster's controller owner reference to `object` and erase its type
    pub fn owned_by<K>(cluster: &RavenDBCluster, kind: ResourceKind, mut object: K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let owner = owner_reference(cluster)?;
        object.meta_mut().owner_references = Some(vec![owner.clone()]);

        let name = object.meta().name.clone().ok_or_else(|| {
            Error::internal_with_context("resource", format!("{kind} has no metadata.name"))
        })?;
        let namespace = object.meta().namespace.clone().ok_or_else(|| {
            Error::internal_with_context("resource", format!("{kind} {name} has no namespace"))
        })?;

        let payload = serde_json::to_value(&object)
            .map_err(|e| Error::serialization_for_kind(kind.as_str(), e.to_string()))?;

        Ok(Self {
            kind,
            name,
            namespace,
            payload,
            owner,
        })
    }

    /// Key identifying the target object
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind, &self.namespace, &self.name)
    }
}

/// Controller owner reference pointing at the cluster
///
/// Requires the cluster to carry a uid, i.e. to have been read from the API server.
pub fn owner_reference(cluster: &RavenDBCluster) -> Result<OwnerReference> {
    cluster.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal_with_context(
            "owner",
            format!("RavenDBCluster {} has no uid", cluster.name_any()),
        )
    })
}

/// Maps each managed kind to the API resource used to address it
pub struct TypeRegistry {
    kinds: HashMap<ResourceKind, ApiResource>,
}

impl TypeRegistry {
    /// Registry with every kind the operator manages
    pub fn new() -> Self {
        let kinds = HashMap::from([
            (
                ResourceKind::StatefulSet,
                ApiResource::erase::<StatefulSet>(&()),
            ),
            (ResourceKind::Service, ApiResource::erase::<Service>(&())),
            (ResourceKind::Ingress, ApiResource::erase::<Ingress>(&())),
            (ResourceKind::Job, ApiResource::erase::<Job>(&())),
        ]);
        Self { kinds }
    }

    /// API resource for a kind
    pub fn resolve(&self, kind: ResourceKind) -> Result<&ApiResource> {
        self.kinds.get(&kind).ok_or_else(|| {
            Error::internal_with_context("registry", format!("no API resource registered for {kind}"))
        })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Naming and labels shared by the builders
// =============================================================================

/// Name of the per-node StatefulSet, Service and Ingress
///
/// Tags are conventionally upper case; object names must be DNS labels.
pub fn node_resource_name(tag: &str) -> String {
    format!("ravendb-{}", tag.to_lowercase())
}

/// Labels identifying a cluster's child objects
pub fn cluster_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            crate::DEFAULT_FIELD_MANAGER.to_string(),
        ),
        (
            "app.kubernetes.io/instance".to_string(),
            cluster_name.to_string(),
        ),
    ])
}

/// Labels identifying one node's child objects
pub fn node_labels(cluster_name: &str, tag: &str) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cluster_name);
    labels.insert(NODE_TAG_LABEL.to_string(), tag.to_string());
    labels
}

/// Selector matching one node's pod
pub fn selector_labels(tag: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NODE_TAG_LABEL.to_string(), tag.to_string())])
}

/// Namespace the cluster (and therefore all its children) lives in
pub(crate) fn cluster_namespace(cluster: &RavenDBCluster) -> Result<String> {
    cluster.namespace().ok_or_else(|| {
        Error::internal_with_context(
            "resource",
            format!("RavenDBCluster {} has no namespace", cluster.name_any()),
        )
    })
}

/// Plain-value environment variable
///
/// An empty value is left unset. The API server omits empty values when it
/// stores an object, so sending `""` would read back as drift on every pass.
pub(crate) fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    let value = value.into();
    EnvVar {
        name: name.to_string(),
        value: (!value.is_empty()).then_some(value),
        ..Default::default()
    }
}
