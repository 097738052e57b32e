//! Per-node AWS Network Load Balancer exposed as a LoadBalancer Service

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{cluster_namespace, node_labels, node_resource_name, selector_labels};
use crate::crd::{NodeSpec, RavenDBCluster};
use crate::{Error, Result, TCP_PORT};

const AWS_LB_ANNOTATION_PREFIX: &str = "service.beta.kubernetes.io/aws-load-balancer";

/// Name of the load balancer Service for a node
pub fn load_balancer_service_name(tag: &str) -> String {
    format!("{}-external", node_resource_name(tag))
}

/// Build the internet-facing NLB Service for one node
///
/// The node must have an entry in `awsExternalAccess.nodeMappings`; the Elastic
/// IP and subnet pin the balancer so the node's public address is stable.
pub fn build_load_balancer_service(cluster: &RavenDBCluster, node: &NodeSpec) -> Result<Service> {
    let mode = cluster.spec.access_mode()?;
    let cluster_name = cluster.name_any();

    let mapping = cluster
        .spec
        .external_access_configuration
        .as_ref()
        .and_then(|c| c.aws_external_access.as_ref())
        .and_then(|aws| aws.node_mappings.iter().find(|m| m.tag == node.tag))
        .ok_or_else(|| {
            Error::validation_for(
                &cluster_name,
                format!("no awsExternalAccess node mapping for tag {:?}", node.tag),
            )
        })?;

    let annotations = BTreeMap::from([
        (format!("{AWS_LB_ANNOTATION_PREFIX}-type"), "external".to_string()),
        (
            format!("{AWS_LB_ANNOTATION_PREFIX}-nlb-target-type"),
            "ip".to_string(),
        ),
        (
            format!("{AWS_LB_ANNOTATION_PREFIX}-scheme"),
            "internet-facing".to_string(),
        ),
        (
            format!("{AWS_LB_ANNOTATION_PREFIX}-eip-allocations"),
            mapping.eip_allocation_id.clone(),
        ),
        (
            format!("{AWS_LB_ANNOTATION_PREFIX}-subnets"),
            mapping.subnet_id.clone(),
        ),
    ]);

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(load_balancer_service_name(&node.tag)),
            namespace: Some(cluster_namespace(cluster)?),
            labels: Some(node_labels(&cluster_name, &node.tag)),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
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
