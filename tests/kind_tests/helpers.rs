//! Test helpers for integration tests
//!
//! Provides utilities for managing the kind cluster, the CRD and fixtures.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Config, CustomResourceExt};
use tokio::sync::OnceCell;
use tokio::time::sleep;

use ravendb_operator::crd::{NodeSpec, RavenDBCluster, RavenDBClusterSpec, StorageSpec, VolumeSpec};

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "ravendb-operator-test";

/// Namespace every test cluster object lives in
pub const TEST_NAMESPACE: &str = "ravendb-it";

static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

static CRD_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    println!("Kind cluster '{name}' created successfully");
    Ok(())
}

/// Install the RavenDBCluster CRD and the test namespace
pub async fn install_crd(client: &Client) -> Result<(), kube::Error> {
    let crd = RavenDBCluster::crd();
    let crd_name = crd.metadata.name.clone().unwrap_or_default();
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    match crds.get(&crd_name).await {
        Ok(_) => {
            println!("CRD already installed, deleting and reinstalling...");
            crds.delete(&crd_name, &DeleteParams::default()).await?;
            sleep(Duration::from_secs(2)).await;
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(e),
    }

    println!("Installing RavenDBCluster CRD...");
    crds.create(&PostParams::default(), &crd).await?;
    sleep(Duration::from_secs(2)).await;

    ensure_namespace(client, TEST_NAMESPACE).await?;

    println!("CRD installed successfully");
    Ok(())
}

/// Create a namespace if it does not exist yet
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<(), kube::Error> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match namespaces.create(&PostParams::default(), &namespace).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    let context_name = format!("kind-{TEST_CLUSTER_NAME}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready (cluster created once, CRD installed once)
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cluster_result = CLUSTER_INIT.get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME));
    cluster_result.clone()?;

    let client = create_test_client().await?;

    let crd_result = CRD_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            install_crd(&client)
                .await
                .map_err(|e| format!("failed to install CRD: {e}"))
        })
        .await;
    crd_result.clone()?;

    Ok(client)
}

/// Unsecured three-node cluster object ready to be created
pub fn sample_cluster(name: &str) -> RavenDBCluster {
    let nodes = ["A", "B", "C"]
        .iter()
        .map(|tag| {
            let host = tag.to_lowercase();
            NodeSpec {
                tag: tag.to_string(),
                public_server_url: format!("http://{host}.{name}.example.com:8080"),
                public_server_url_tcp: format!("tcp://{host}-tcp.{name}.example.com:38888"),
                cert_secret_ref: None,
            }
        })
        .collect();

    let mut cluster = RavenDBCluster::new(
        name,
        RavenDBClusterSpec {
            image: "ravendb/ravendb:6.2-latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            mode: "None".to_string(),
            email: None,
            license_secret_ref: "ravendb-license".to_string(),
            client_cert_secret_ref: None,
            ca_cert_secret_ref: None,
            domain: format!("{name}.example.com"),
            server_url: None,
            server_url_tcp: None,
            nodes,
            env: BTreeMap::new(),
            storage: StorageSpec {
                data: VolumeSpec {
                    size: "1Gi".to_string(),
                    storage_class_name: None,
                },
            },
            external_access_configuration: None,
            automatic_cluster_setup: None,
        },
    );
    cluster.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    cluster
}

/// Delete a cluster object, ignoring errors
///
/// Children are removed by the garbage collector through their owner reference.
pub async fn cleanup_cluster(client: &Client, namespace: &str, name: &str) {
    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), namespace);
    let _ = api.delete(name, &DeleteParams::default()).await;
    sleep(Duration::from_secs(1)).await;
}
