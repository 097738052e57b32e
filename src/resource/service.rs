//! Per-node ClusterIP Service

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{cluster_labels, cluster_namespace, node_resource_name, selector_labels};
use crate::crd::{NodeSpec, RavenDBCluster};
use crate::{Result, TCP_PORT};

/// Build the Service fronting one node's pod
pub fn build_service(cluster: &RavenDBCluster, node: &NodeSpec) -> Result<Service> {
    let mode = cluster.spec.access_mode()?;

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(node_resource_name(&node.tag)),
            namespace: Some(cluster_namespace(cluster)?),
            labels: Some(cluster_labels(&cluster.name_any())),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&node.tag)),
            ports: Some(vec![
                ServicePort {
                    name: Some(mode.web_port_name().to_string()),
                    port: mode.web_port(),
                    target_port: Some(IntOrString::Int(mode.web_port())),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("tcp".to_string()),
                    port: TCP_PORT,
                    target_port: Some(IntOrString::Int(TCP_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    })
}
