//! Integration tests for CRD operations
//!
//! These tests tell the story of how users interact with RavenDBCluster
//! resources through the Kubernetes API.

use kube::api::{Api, Patch, PatchParams, PostParams};

use ravendb_operator::crd::{ClusterPhase, ClusterSetupSpec, RavenDBCluster, RavenDBClusterStatus};

use super::helpers::{cleanup_cluster, ensure_test_cluster, sample_cluster, TEST_NAMESPACE};

// =============================================================================
// Create / Read Stories
// =============================================================================

/// Story: a user declares a three node cluster and reads it back unchanged
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_creates_cluster() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-create";
    cleanup_cluster(&client, TEST_NAMESPACE, name).await;

    let created = api
        .create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create cluster");

    assert_eq!(created.metadata.name.as_deref(), Some(name));
    assert!(created.metadata.uid.is_some());
    assert_eq!(created.spec.node_tags(), vec!["A", "B", "C"]);
    assert_eq!(created.spec.image_pull_policy, "IfNotPresent");

    let fetched = api.get(name).await.expect("failed to get cluster");
    assert_eq!(fetched.spec, created.spec);

    cleanup_cluster(&client, TEST_NAMESPACE, name).await;
}

/// Story: the schema rejects an empty leader before any webhook runs
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_schema_rejects_empty_leader() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-empty-leader";
    cleanup_cluster(&client, TEST_NAMESPACE, name).await;

    let mut cluster = sample_cluster(name);
    cluster.spec.automatic_cluster_setup = Some(ClusterSetupSpec {
        leader: String::new(),
        watchers: None,
    });

    let result = api.create(&PostParams::default(), &cluster).await;
    match result {
        Err(kube::Error::Api(e)) => assert_eq!(e.code, 422, "unexpected error: {e:?}"),
        other => panic!("expected schema rejection, got {other:?}"),
    }
}

// =============================================================================
// Status Subresource Stories
// =============================================================================

/// Story: status is written through the subresource and survives spec edits
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_is_a_subresource() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<RavenDBCluster> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-status";
    cleanup_cluster(&client, TEST_NAMESPACE, name).await;

    api.create(&PostParams::default(), &sample_cluster(name))
        .await
        .expect("failed to create cluster");

    let status = RavenDBClusterStatus::with_phase(ClusterPhase::Deploying)
        .message("Ensured desired state for 3 RavenDB nodes")
        .node("A", "Created");
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await
    .expect("failed to patch status");

    api.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(&serde_json::json!({"spec": {"image": "ravendb/ravendb:7.0-latest"}})),
    )
    .await
    .expect("failed to patch spec");

    let fetched = api.get(name).await.expect("failed to get cluster");
    assert_eq!(fetched.spec.image, "ravendb/ravendb:7.0-latest");
    let fetched_status = fetched.status.expect("status should persist");
    assert_eq!(fetched_status.phase, ClusterPhase::Deploying);
    assert_eq!(fetched_status.nodes.len(), 1);

    cleanup_cluster(&client, TEST_NAMESPACE, name).await;
}
