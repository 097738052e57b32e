//! One-shot Job that joins the nodes into a RavenDB cluster
//!
//! The Job only carries the topology; the join protocol itself runs inside
//! the container.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{cluster_labels, cluster_namespace, env_var};
use crate::crd::{AccessMode, ClusterSetupSpec, RavenDBCluster};
use crate::Result;

const BACKOFF_LIMIT: i32 = 6;
const CERTS_VOLUME: &str = "bootstrap-certs";
const CERTS_MOUNT_PATH: &str = "/ravendb/bootstrap-certs";

/// Name of the bootstrap Job for a cluster
pub fn bootstrapper_job_name(cluster_name: &str) -> String {
    format!("{cluster_name}-bootstrapper")
}

/// Build the bootstrap Job for a cluster with automatic setup enabled
pub fn build_bootstrapper_job(cluster: &RavenDBCluster, setup: &ClusterSetupSpec) -> Result<Job> {
    let mode = cluster.spec.access_mode()?;
    let cluster_name = cluster.name_any();

    let mut labels = cluster_labels(&cluster_name);
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "bootstrapper".to_string(),
    );

    let watchers = setup.watchers.clone().unwrap_or_default().join(",");
    let nodes = cluster
        .spec
        .nodes
        .iter()
        .map(|n| format!("{}={}", n.tag, n.public_server_url))
        .collect::<Vec<_>>()
        .join(",");

    let mut env = vec![
        env_var("RAVEN_Setup_Mode", mode.to_string()),
        env_var("RAVEN_BOOTSTRAP_LEADER", setup.leader.clone()),
        env_var("RAVEN_BOOTSTRAP_WATCHERS", watchers),
        env_var("RAVEN_BOOTSTRAP_NODES", nodes),
    ];

    // None talks to the nodes through the CA, LetsEncrypt with a client certificate
    let cert_secret = match mode {
        AccessMode::None => cluster.spec.ca_cert_secret_ref.as_deref(),
        AccessMode::LetsEncrypt => cluster.spec.client_cert_secret_ref.as_deref(),
    };

    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    if let Some(secret) = cert_secret {
        env.push(env_var("RAVEN_BOOTSTRAP_CERTS_DIR", CERTS_MOUNT_PATH));
        volumes.push(Volume {
            name: CERTS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: CERTS_VOLUME.to_string(),
            mount_path: CERTS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(bootstrapper_job_name(&cluster_name)),
            namespace: Some(cluster_namespace(cluster)?),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(BACKOFF_LIMIT),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("OnFailure".to_string()),
                    containers: vec![Container {
                        name: "bootstrapper".to_string(),
                        image: Some(cluster.spec.image.clone()),
                        image_pull_policy: Some(cluster.spec.image_pull_policy.clone()),
                        env: Some(env),
                        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
                        ..Default::default()
                    }],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
