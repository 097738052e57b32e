//! Shared fixtures and an in-memory object store for unit tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::apply::ObjectStore;
use crate::crd::{
    AwsExternalAccess, AwsNodeMapping, ClusterSetupSpec, ExternalAccessConfiguration,
    ExternalAccessType, NodeSpec, RavenDBCluster, RavenDBClusterSpec, StorageSpec, VolumeSpec,
};
use crate::resource::{ObjectKey, ResourceKind};
use crate::Error;

// =============================================================================
// Test Fixtures
// =============================================================================

fn node(tag: &str, scheme: &str, port: u16) -> NodeSpec {
    let host = tag.to_lowercase();
    NodeSpec {
        tag: tag.to_string(),
        public_server_url: format!("{scheme}://{host}.db.example.com:{port}"),
        public_server_url_tcp: format!("tcp://{host}-tcp.db.example.com:38888"),
        cert_secret_ref: None,
    }
}

/// Unsecured three-node spec (A, B, C)
pub fn sample_spec() -> RavenDBClusterSpec {
    RavenDBClusterSpec {
        image: "ravendb/ravendb:6.2-latest".to_string(),
        image_pull_policy: "IfNotPresent".to_string(),
        mode: "None".to_string(),
        email: None,
        license_secret_ref: "ravendb-license".to_string(),
        client_cert_secret_ref: None,
        ca_cert_secret_ref: None,
        domain: "db.example.com".to_string(),
        server_url: None,
        server_url_tcp: None,
        nodes: vec![
            node("A", "http", 8080),
            node("B", "http", 8080),
            node("C", "http", 8080),
        ],
        env: BTreeMap::new(),
        storage: StorageSpec {
            data: VolumeSpec {
                size: "10Gi".to_string(),
                storage_class_name: None,
            },
        },
        external_access_configuration: None,
        automatic_cluster_setup: None,
    }
}

/// Unsecured cluster as read back from the API server
pub fn sample_cluster(name: &str) -> RavenDBCluster {
    let mut cluster = RavenDBCluster::new(name, sample_spec());
    cluster.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("db".to_string()),
        uid: Some(format!("uid-{name}")),
        generation: Some(1),
        ..Default::default()
    };
    cluster
}

/// Let's Encrypt cluster with a certificate secret per node
pub fn letsencrypt_cluster(name: &str) -> RavenDBCluster {
    let mut cluster = sample_cluster(name);
    cluster.spec.mode = "LetsEncrypt".to_string();
    cluster.spec.email = Some("ops@example.com".to_string());
    cluster.spec.nodes = ["A", "B", "C"]
        .iter()
        .map(|tag| NodeSpec {
            cert_secret_ref: Some(format!("ravendb-{}-cert", tag.to_lowercase())),
            ..node(tag, "https", 443)
        })
        .collect();
    cluster
}

/// Enable automatic cluster setup with the given topology
pub fn with_setup(
    mut cluster: RavenDBCluster,
    leader: &str,
    watchers: Option<Vec<&str>>,
) -> RavenDBCluster {
    cluster.spec.automatic_cluster_setup = Some(ClusterSetupSpec {
        leader: leader.to_string(),
        watchers: watchers.map(|w| w.into_iter().map(str::to_string).collect()),
    });
    cluster
}

/// Expose every node through its own AWS NLB
pub fn with_aws_nlb(mut cluster: RavenDBCluster) -> RavenDBCluster {
    let node_mappings = cluster
        .spec
        .nodes
        .iter()
        .map(|n| {
            let tag = n.tag.to_lowercase();
            AwsNodeMapping {
                tag: n.tag.clone(),
                eip_allocation_id: format!("eipalloc-{tag}"),
                subnet_id: format!("subnet-{tag}"),
            }
        })
        .collect();
    cluster.spec.external_access_configuration = Some(ExternalAccessConfiguration {
        type_: ExternalAccessType::AwsNlb,
        ingress_controller_external_access: None,
        aws_external_access: Some(AwsExternalAccess { node_mappings }),
    });
    cluster
}

// =============================================================================
// In-memory Object Store
// =============================================================================

/// Object store backed by a map, applying merge patches like the API server
///
/// Records every write so tests can assert on idempotence.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectKey, serde_json::Value>>,
    writes: Mutex<Vec<(String, ObjectKey)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current object, if any
    pub fn object(&self, kind: ResourceKind, name: &str) -> Option<serde_json::Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&ObjectKey::new(kind, "db", name))
            .cloned()
    }

    /// Replace an object, simulating an edit made outside the operator
    pub fn put(&self, kind: ResourceKind, name: &str, value: serde_json::Value) {
        self.objects
            .lock()
            .unwrap()
            .insert(ObjectKey::new(kind, "db", name), value);
    }

    /// Names of objects of a kind, sorted
    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.kind == kind)
            .map(|k| k.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every create/patch made so far, as ("create" | "patch", key)
    pub fn writes(&self) -> Vec<(String, ObjectKey)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn create(&self, key: &ObjectKey, object: &serde_json::Value) -> Result<(), Error> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Err(Error::internal_with_context(
                "memory-store",
                format!("{key} already exists"),
            ));
        }
        let mut object = object.clone();
        drop_empty_values(&mut object);
        objects.insert(key.clone(), object);
        self.writes
            .lock()
            .unwrap()
            .push(("create".to_string(), key.clone()));
        Ok(())
    }

    async fn merge_patch(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<(), Error> {
        let mut objects = self.objects.lock().unwrap();
        let live = objects.get_mut(key).ok_or_else(|| {
            Error::internal_with_context("memory-store", format!("{key} not found"))
        })?;
        json_patch::merge(live, patch);
        drop_empty_values(live);
        self.writes
            .lock()
            .unwrap()
            .push(("patch".to_string(), key.clone()));
        Ok(())
    }
}

/// Drop `"value": ""` from name/value entries, as the API server does for env vars
fn drop_empty_values(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.contains_key("name") && map.get("value").and_then(serde_json::Value::as_str) == Some("") {
                map.remove("value");
            }
            map.values_mut().for_each(drop_empty_values);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(drop_empty_values),
        _ => {}
    }
}
