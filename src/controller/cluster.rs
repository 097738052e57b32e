//! RavenDBCluster controller implementation
//!
//! A pass moves through Fetching, Synchronizing and Reporting. Absent clusters
//! end the pass quietly. Any step failure leaves status untouched and is
//! handed to [`error_policy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::actor::{self, PassOutcome};
use crate::apply::{ApplyEngine, CancellableStore, KubeStore, ObjectStore};
use crate::config::OperatorConfig;
use crate::crd::{ClusterPhase, RavenDBCluster, RavenDBClusterStatus};
use crate::resource::TypeRegistry;
use crate::Error;

/// Delay before retrying a pass that failed with a retryable error
pub const FAILURE_REQUEUE: Duration = Duration::from_secs(30);

/// Trait abstracting RavenDBCluster reads and status writes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a cluster, `None` if it was deleted
    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RavenDBCluster>, Error>;

    /// Merge-patch the status subresource of a cluster
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RavenDBClusterStatus,
    ) -> Result<(), Error>;
}

/// Real cluster client backed by the Kubernetes API
pub struct ClusterClientImpl {
    client: Client,
    field_manager: String,
}

impl ClusterClientImpl {
    /// Create a client recording writes under `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl ClusterClient for ClusterClientImpl {
    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RavenDBCluster>, Error> {
        let api: Api<RavenDBCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RavenDBClusterStatus,
    ) -> Result<(), Error> {
        let api: Api<RavenDBCluster> = Api::namespaced(self.client.clone(), namespace);

        let status_patch = serde_json::json!({
            "status": status
        });

        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        api.patch_status(name, &params, &Patch::Merge(&status_patch))
            .await?;

        Ok(())
    }
}

/// Controller context shared by every pass
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(&operator_config)
///     .shutdown(token)
///     .build();
/// ```
pub struct Context {
    /// RavenDBCluster reads and status writes
    pub clusters: Arc<dyn ClusterClient>,
    /// Child object reads and writes
    pub store: Arc<dyn ObjectStore>,
    /// Delay before the next pass after a successful one
    pub requeue_interval: Duration,
    /// Operator-wide shutdown; each pass runs under a child of it
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with fake clients
    #[cfg(test)]
    pub fn for_testing(clusters: Arc<dyn ClusterClient>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            clusters,
            store,
            requeue_interval: Duration::from_secs(crate::DEFAULT_REQUEUE_SECS),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    field_manager: String,
    requeue_interval: Duration,
    shutdown: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        let defaults = OperatorConfig::default();
        Self {
            client,
            field_manager: defaults.field_manager,
            requeue_interval: defaults.requeue_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Take field manager and requeue interval from the operator config
    pub fn config(mut self, config: &OperatorConfig) -> Self {
        self.field_manager = config.field_manager.clone();
        self.requeue_interval = config.requeue_interval;
        self
    }

    /// Set the operator-wide shutdown token
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let clusters = ClusterClientImpl::new(self.client.clone(), self.field_manager.clone());
        let store = KubeStore::new(
            self.client,
            Arc::new(TypeRegistry::new()),
            self.field_manager,
        );

        Context {
            clusters: Arc::new(clusters),
            store: Arc::new(store),
            requeue_interval: self.requeue_interval,
            shutdown: self.shutdown,
        }
    }
}

/// Reconcile a RavenDBCluster
///
/// Always re-reads the cluster by key, so the pass works from the freshest
/// spec rather than the cached copy the watcher handed over.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<RavenDBCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = cluster.name_any();
    let namespace = cluster
        .namespace()
        .ok_or_else(|| Error::internal_with_context("reconcile", "cluster has no namespace"))?;
    let token = ctx.shutdown.child_token();
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Fetching
    let fetched = cancellable(&token, ctx.clusters.get_cluster(&namespace, &name)).await?;
    let Some(cluster) = fetched else {
        debug!("cluster no longer exists");
        return Ok(Action::await_change());
    };
    info!(%namespace, generation = ?cluster.metadata.generation, "reconciling cluster");

    // Synchronizing
    let store = Arc::new(CancellableStore::new(ctx.store.clone(), token.clone()));
    let engine = ApplyEngine::new(store);
    let outcome = actor::run(&cluster, &engine).await?;

    // Reporting
    let status = desired_status(&cluster, &outcome);
    if cluster.status.as_ref() == Some(&status) {
        debug!(changed = outcome.changed, "status up to date");
    } else {
        cancellable(
            &token,
            ctx.clusters.patch_status(&namespace, &name, &status),
        )
        .await?;
        info!(phase = %status.phase, "updated status");
    }

    Ok(Action::requeue(ctx.requeue_interval))
}

/// Status reported after a fully successful pass
pub fn desired_status(cluster: &RavenDBCluster, outcome: &PassOutcome) -> RavenDBClusterStatus {
    let mut status = RavenDBClusterStatus::with_phase(ClusterPhase::Deploying)
        .message(format!(
            "Ensured desired state for {} RavenDB nodes",
            cluster.spec.nodes.len()
        ))
        .observed_generation(cluster.metadata.generation);
    status.nodes = outcome.nodes.clone();
    status
}

/// Decide what to do after a failed pass
///
/// Errors that need a spec change wait for the next edit, everything else is
/// retried after [`FAILURE_REQUEUE`].
pub fn error_policy(cluster: Arc<RavenDBCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    if matches!(error, Error::Cancelled) {
        debug!(cluster = %cluster.name_any(), "pass cancelled");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(
            %error,
            cluster = %cluster.name_any(),
            "reconciliation failed, will retry"
        );
        Action::requeue(FAILURE_REQUEUE)
    } else {
        error!(
            %error,
            cluster = %cluster.name_any(),
            "reconciliation failed, waiting for spec change"
        );
        Action::await_change()
    }
}

async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
