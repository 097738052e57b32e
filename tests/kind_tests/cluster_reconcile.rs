//! Integration tests for reconcile passes
//!
//! These tests run the reconciler directly against a kind API server, without
//! a watch loop, and inspect the objects it leaves behind.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::Client;

use ravendb_operator::controller::{reconcile, Context};
use ravendb_operator::crd::{ClusterPhase, ClusterSetupSpec, RavenDBCluster};

use super::helpers::{cleanup_cluster, ensure_namespace, ensure_test_cluster, sample_cluster};

/// Each story gets its own namespace, since child names only depend on node tags
async fn setup(client: &Client, name: &str) -> RavenDBCluster {
    ensure_namespace(client, name)
        .await
        .expect("failed to create namespace");
    cleanup_cluster(client, name, name).await;

    let mut cluster = sample_cluster(name);
    cluster.metadata.namespace = Some(name.to_string());
    cluster
}

async fn create_and_reconcile(client: &Client, cluster: RavenDBCluster) -> RavenDBCluster {
    let namespace = cluster.metadata.namespace.clone().unwrap();
    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), &namespace);
    let created = api
        .create(&PostParams::default(), &cluster)
        .await
        .expect("failed to create cluster");

    let ctx = Arc::new(Context::builder(client.clone()).build());
    let action = reconcile(Arc::new(created.clone()), ctx)
        .await
        .expect("reconcile should succeed");
    assert_ne!(action, Action::await_change());
    created
}

// =============================================================================
// Reconcile Stories
// =============================================================================

/// Story: one pass creates a statefulset, service and ingress per node and
/// reports Deploying
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_first_pass_creates_children() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "rec-children";
    let cluster = setup(&client, name).await;

    let created = create_and_reconcile(&client, cluster).await;
    let uid = created.metadata.uid.clone().unwrap();

    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), name);
    let services: Api<Service> = Api::namespaced(client.clone(), name);
    let ingresses: Api<Ingress> = Api::namespaced(client.clone(), name);

    for tag in ["a", "b", "c"] {
        let object_name = format!("ravendb-{tag}");
        let sts = statefulsets.get(&object_name).await.expect("statefulset");
        let owner = &sts.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.uid, uid);
        assert_eq!(owner.controller, Some(true));
        assert_eq!(sts.spec.as_ref().unwrap().replicas, Some(1));

        let svc = services.get(&object_name).await.expect("service");
        let ports: Vec<i32> = svc.spec.unwrap().ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![8080, 38888]);

        let ing = ingresses.get(&object_name).await.expect("ingress");
        assert_eq!(ing.spec.unwrap().rules.unwrap().len(), 2);
    }

    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), name);
    let status = api.get(name).await.unwrap().status.expect("status written");
    assert_eq!(status.phase, ClusterPhase::Deploying);
    assert_eq!(status.nodes.len(), 3);
    assert!(status.nodes.iter().all(|n| n.status == "Created"));

    cleanup_cluster(&client, name, name).await;
}

/// Story: a second pass leaves every child at the same resource version
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_second_pass_changes_nothing() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "rec-idempotent";
    let cluster = setup(&client, name).await;

    create_and_reconcile(&client, cluster).await;

    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), name);
    let before = statefulsets
        .get("ravendb-a")
        .await
        .unwrap()
        .metadata
        .resource_version;

    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), name);
    let current = api.get(name).await.unwrap();
    let ctx = Arc::new(Context::builder(client.clone()).build());
    reconcile(Arc::new(current), ctx)
        .await
        .expect("second reconcile should succeed");

    let after = statefulsets
        .get("ravendb-a")
        .await
        .unwrap()
        .metadata
        .resource_version;
    assert_eq!(before, after);

    cleanup_cluster(&client, name, name).await;
}

/// Story: automatic setup produces the bootstrap job
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_setup_creates_bootstrap_job() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "rec-bootstrap";
    let mut cluster = setup(&client, name).await;
    cluster.spec.ca_cert_secret_ref = Some("ravendb-ca".to_string());
    cluster.spec.automatic_cluster_setup = Some(ClusterSetupSpec {
        leader: "A".to_string(),
        watchers: Some(vec!["C".to_string()]),
    });
    create_and_reconcile(&client, cluster).await;

    let jobs: Api<Job> = Api::namespaced(client.clone(), name);
    let job = jobs
        .get(&format!("{name}-bootstrapper"))
        .await
        .expect("bootstrap job");
    let env = job.spec.unwrap().template.spec.unwrap().containers[0]
        .env
        .clone()
        .unwrap();
    let leader = env
        .iter()
        .find(|e| e.name == "RAVEN_BOOTSTRAP_LEADER")
        .and_then(|e| e.value.clone());
    assert_eq!(leader.as_deref(), Some("A"));

    cleanup_cluster(&client, name, name).await;
}
