//! Per-node StatefulSet running one RavenDB server

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, SecretKeySelector, SecretVolumeSource,
    Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use super::{cluster_namespace, env_var, node_labels, node_resource_name, selector_labels};
use crate::crd::{AccessMode, NodeSpec, RavenDBCluster};
use crate::{Error, Result};

/// Fields of a StatefulSet the operator owns and corrects on every pass
pub const STATEFULSET_OWNED_FIELDS: &[&[&str]] = &[
    &["metadata", "ownerReferences"],
    &["metadata", "labels"],
    &["metadata", "annotations"],
    &["spec", "replicas"],
    &["spec", "template", "metadata", "labels"],
    &["spec", "template", "spec", "containers"],
    &["spec", "template", "spec", "volumes"],
];

const CONTAINER_NAME: &str = "ravendb";
const DATA_VOLUME: &str = "ravendb";
const DATA_MOUNT_PATH: &str = "/var/lib/ravendb/data";
const CERTS_VOLUME: &str = "ravendb-certs";
const CERTS_MOUNT_PATH: &str = "/ravendb/certs";
const LICENSE_SECRET_KEY: &str = "license.json";
const SSL_PASSTHROUGH_ANNOTATION: &str = "ingress.kubernetes.io/ssl-passthrough";

/// Build the StatefulSet for one node
///
/// Fails with `UnsupportedMode` for an unknown mode and with a validation
/// error when a LetsEncrypt node has no certificate secret.
pub fn build_statefulset(cluster: &RavenDBCluster, node: &NodeSpec) -> Result<StatefulSet> {
    let mode = cluster.spec.access_mode()?;
    let cluster_name = cluster.name_any();
    let name = node_resource_name(&node.tag);
    let labels = node_labels(&cluster_name, &node.tag);

    let mut env = common_env(cluster, node, mode);
    let mut volume_mounts = vec![VolumeMount {
        name: DATA_VOLUME.to_string(),
        mount_path: DATA_MOUNT_PATH.to_string(),
        ..Default::default()
    }];
    let mut volumes = Vec::new();
    let mut annotations = BTreeMap::new();

    match mode {
        AccessMode::None => {
            env.push(env_var(
                "RAVEN_Security_UnsecuredAccessAllowed",
                "PublicNetwork",
            ));
        }
        AccessMode::LetsEncrypt => {
            let secret = node.cert_secret_ref.as_deref().ok_or_else(|| {
                Error::validation_for(
                    &cluster_name,
                    format!(
                        "node {} has no certSecretRef, required when mode is LetsEncrypt",
                        node.tag
                    ),
                )
            })?;

            env.push(env_var(
                "RAVEN_Security_Certificate_Path",
                format!("{CERTS_MOUNT_PATH}/server.pfx"),
            ));
            env.push(env_var("RAVEN_Security_Certificate_Exec_TimeoutInSec", "60"));
            env.push(env_var(
                "RAVEN_Security_Certificate_LetsEncrypt_Email",
                cluster.spec.email.clone().unwrap_or_default(),
            ));

            volume_mounts.push(VolumeMount {
                name: CERTS_VOLUME.to_string(),
                mount_path: CERTS_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            });
            volumes.push(Volume {
                name: CERTS_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            annotations.insert(SSL_PASSTHROUGH_ANNOTATION.to_string(), "true".to_string());
        }
    }

    append_user_env(&mut env, &cluster.spec.env);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(cluster.spec.image.clone()),
        image_pull_policy: Some(cluster.spec.image_pull_policy.clone()),
        ports: Some(container_ports(mode)),
        env: Some(env),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    let storage = &cluster.spec.storage.data;
    let data_claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(cluster_namespace(cluster)?),
            labels: Some(labels.clone()),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            service_name: Some(name),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&node.tag)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![data_claim]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Variables every node gets regardless of mode
fn common_env(cluster: &RavenDBCluster, node: &NodeSpec, mode: AccessMode) -> Vec<EnvVar> {
    vec![
        env_var("RAVEN_Setup_Mode", mode.to_string()),
        EnvVar {
            name: "RAVEN_License".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: cluster.spec.license_secret_ref.clone(),
                    key: LICENSE_SECRET_KEY.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        env_var("RAVEN_License_Eula_Accepted", "true"),
        env_var("RAVEN_ServerUrl", cluster.spec.server_url(mode)),
        env_var("RAVEN_ServerUrl_Tcp", cluster.spec.server_url_tcp()),
        env_var("RAVEN_PublicServerUrl", node.public_server_url.clone()),
        env_var("RAVEN_PublicServerUrl_Tcp", node.public_server_url_tcp.clone()),
    ]
}

/// User variables go last; names the operator already set are skipped
fn append_user_env(env: &mut Vec<EnvVar>, extra: &BTreeMap<String, String>) {
    for (name, value) in extra {
        if env.iter().any(|e| &e.name == name) {
            continue;
        }
        env.push(env_var(name, value.clone()));
    }
}

fn container_ports(mode: AccessMode) -> Vec<ContainerPort> {
    let port = mode.web_port();
    vec![
        ContainerPort {
            name: Some(mode.web_port_name().to_string()),
            container_port: port,
            ..Default::default()
        },
        ContainerPort {
            name: Some("tcp".to_string()),
            container_port: port,
            ..Default::default()
        },
    ]
}
