//! The ordered step pipeline run on every reconcile pass
//!
//! A pass is a fixed sequence of steps. Cluster-scoped steps run once, then
//! every node-scoped step runs for the first declared node, then for the
//! second, and so on. Each step has a pure predicate deciding whether it
//! applies to the spec at hand, and an idempotent `act` that builds the
//! desired object and hands it to the [`ApplyEngine`].
//!
//! The pipeline is fail-fast: the first error aborts the rest of the pass and
//! is returned to the caller. Objects already written stay; the next pass
//! picks up from there.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::apply::ApplyEngine;
use crate::crd::{NodeSpec, NodeStatus, RavenDBCluster, RavenDBClusterSpec};
use crate::resource::{
    build_bootstrapper_job, build_ingress, build_load_balancer_service, build_service,
    build_statefulset, DesiredResource, ResourceKind, STATEFULSET_OWNED_FIELDS,
};
use crate::{Error, Result};

/// Status literal reported for a node whose steps all succeeded
pub const NODE_CREATED: &str = "Created";

/// Steps that run once per cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterStep {
    /// Bootstrap Job joining the nodes, when automatic setup is requested
    Bootstrapper,
}

/// Steps that run once per declared node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStep {
    /// The node's StatefulSet, drift-corrected every pass
    StatefulSet,
    /// The node's ClusterIP Service
    Service,
    /// The node's Ingress, unless another external access provider is chosen
    Ingress,
    /// The node's AWS NLB, when aws-nlb external access is chosen
    AwsLoadBalancer,
}

/// A pipeline step, scoped either to the cluster or to one node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Runs once per pass
    Cluster(ClusterStep),
    /// Runs once per node per pass
    Node(NodeStep),
}

/// Every step, in execution order
pub const PIPELINE: &[Step] = &[
    Step::Cluster(ClusterStep::Bootstrapper),
    Step::Node(NodeStep::StatefulSet),
    Step::Node(NodeStep::Service),
    Step::Node(NodeStep::Ingress),
    Step::Node(NodeStep::AwsLoadBalancer),
];

impl ClusterStep {
    /// Step name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootstrapper => "BootstrapperStep",
        }
    }

    /// Whether the step applies to `spec`
    pub fn should_act(&self, spec: &RavenDBClusterSpec) -> bool {
        match self {
            Self::Bootstrapper => spec.automatic_cluster_setup.is_some(),
        }
    }

    /// Drive the step's object toward the desired state; true if anything was written
    pub async fn act(&self, cluster: &RavenDBCluster, engine: &ApplyEngine) -> Result<bool> {
        match self {
            Self::Bootstrapper => {
                let Some(setup) = cluster.spec.automatic_cluster_setup.as_ref() else {
                    return Ok(false);
                };
                let job = build_bootstrapper_job(cluster, setup)
                    .map_err(|e| Error::build(ResourceKind::Job.as_str(), e))?;
                let desired = DesiredResource::owned_by(cluster, ResourceKind::Job, job)?;
                engine.get_or_create(&desired).await
            }
        }
    }
}

impl NodeStep {
    /// Step name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatefulSet => "StatefulSetStep",
            Self::Service => "ServiceStep",
            Self::Ingress => "IngressStep",
            Self::AwsLoadBalancer => "AwsLoadBalancerStep",
        }
    }

    /// Whether the step applies to `spec`
    pub fn should_act(&self, spec: &RavenDBClusterSpec) -> bool {
        match self {
            Self::StatefulSet | Self::Service => true,
            Self::Ingress => spec.uses_ingress(),
            Self::AwsLoadBalancer => spec.uses_aws_nlb(),
        }
    }

    /// Drive the step's object for `node` toward the desired state
    pub async fn act(
        &self,
        cluster: &RavenDBCluster,
        node: &NodeSpec,
        engine: &ApplyEngine,
    ) -> Result<bool> {
        match self {
            Self::StatefulSet => {
                let sts = build_statefulset(cluster, node).map_err(|e| self.build_error(e))?;
                let desired = DesiredResource::owned_by(cluster, ResourceKind::StatefulSet, sts)?;
                engine.merge_apply(&desired, STATEFULSET_OWNED_FIELDS).await
            }
            Self::Service => {
                let svc = build_service(cluster, node).map_err(|e| self.build_error(e))?;
                let desired = DesiredResource::owned_by(cluster, ResourceKind::Service, svc)?;
                engine.get_or_create(&desired).await
            }
            Self::Ingress => {
                let ing = build_ingress(cluster, node).map_err(|e| self.build_error(e))?;
                let desired = DesiredResource::owned_by(cluster, ResourceKind::Ingress, ing)?;
                engine.get_or_create(&desired).await
            }
            Self::AwsLoadBalancer => {
                let svc =
                    build_load_balancer_service(cluster, node).map_err(|e| self.build_error(e))?;
                let desired = DesiredResource::owned_by(cluster, ResourceKind::Service, svc)?;
                engine.get_or_create(&desired).await
            }
        }
    }

    fn build_error(&self, source: Error) -> Error {
        let kind = match self {
            Self::StatefulSet => ResourceKind::StatefulSet,
            Self::Service | Self::AwsLoadBalancer => ResourceKind::Service,
            Self::Ingress => ResourceKind::Ingress,
        };
        Error::build(kind.as_str(), source)
    }
}

impl Step {
    /// Step name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cluster(step) => step.name(),
            Self::Node(step) => step.name(),
        }
    }

    /// Whether the step applies to `spec`
    pub fn should_act(&self, spec: &RavenDBClusterSpec) -> bool {
        match self {
            Self::Cluster(step) => step.should_act(spec),
            Self::Node(step) => step.should_act(spec),
        }
    }
}

/// Result of a fully successful pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassOutcome {
    /// True if any step created or patched an object
    pub changed: bool,
    /// Per-node status in declaration order
    pub nodes: Vec<NodeStatus>,
}

/// Run every applicable step of [`PIPELINE`] against `cluster`
///
/// Stops at the first failing step and returns its error.
pub async fn run(cluster: &RavenDBCluster, engine: &ApplyEngine) -> Result<PassOutcome> {
    let spec = &cluster.spec;
    let mut outcome = PassOutcome::default();

    for step in PIPELINE {
        let Step::Cluster(step) = step else { continue };
        if !step.should_act(spec) {
            debug!(step = step.name(), "step not applicable");
            continue;
        }
        let changed = step.act(cluster, engine).await?;
        debug!(step = step.name(), changed, "step completed");
        outcome.changed |= changed;
    }

    for node in &spec.nodes {
        for step in PIPELINE {
            let Step::Node(step) = step else { continue };
            if !step.should_act(spec) {
                continue;
            }
            let changed = step.act(cluster, node, engine).await?;
            debug!(step = step.name(), node = %node.tag, changed, "step completed");
            outcome.changed |= changed;
        }
        outcome.nodes.push(NodeStatus::new(&node.tag, NODE_CREATED));
    }

    info!(
        cluster = %cluster.name_any(),
        nodes = spec.nodes.len(),
        changed = outcome.changed,
        "pipeline completed"
    );
    Ok(outcome)
}
