//! Per-node Ingress with an HTTP(S) host and a TCP host

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{cluster_namespace, node_labels, node_resource_name};
use crate::crd::{AccessMode, NodeSpec, RavenDBCluster};
use crate::{Result, TCP_PORT};

/// Annotation prefixes understood by ingress-nginx, current and legacy
const ANNOTATION_PREFIXES: [&str; 2] = ["nginx.ingress.kubernetes.io", "ingress.kubernetes.io"];

/// Build the Ingress routing `{tag}.{domain}` and `{tag}-tcp.{domain}` to one node
pub fn build_ingress(cluster: &RavenDBCluster, node: &NodeSpec) -> Result<Ingress> {
    let mode = cluster.spec.access_mode()?;
    let name = node_resource_name(&node.tag);
    let tag = node.tag.to_lowercase();
    let domain = cluster.spec.domain.to_lowercase();

    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(cluster_namespace(cluster)?),
            labels: Some(node_labels(&cluster.name_any(), &node.tag)),
            annotations: Some(annotations(mode)),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: cluster.spec.ingress_class_name().map(str::to_string),
            rules: Some(vec![
                prefix_rule(format!("{tag}.{domain}"), &name, mode.web_port()),
                prefix_rule(format!("{tag}-tcp.{domain}"), &name, TCP_PORT),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn annotations(mode: AccessMode) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    for prefix in ANNOTATION_PREFIXES {
        annotations.insert(
            format!("{prefix}/backend-protocol"),
            mode.backend_protocol().to_string(),
        );
        if mode == AccessMode::LetsEncrypt {
            annotations.insert(format!("{prefix}/ssl-passthrough"), "true".to_string());
        }
    }
    annotations
}

fn prefix_rule(host: String, service: &str, port: i32) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(port),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    }
}
