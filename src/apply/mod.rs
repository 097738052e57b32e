//! Idempotent application of desired objects
//!
//! Two strategies are offered:
//!
//! - [`ApplyEngine::get_or_create`] creates an object if it is absent and
//!   otherwise leaves it alone. Used for objects whose drift the operator does
//!   not correct (Services, Ingresses, the bootstrap Job).
//! - [`ApplyEngine::merge_apply`] creates an absent object, or sends a merge
//!   patch restricted to the fields the caller owns when any of them drifted.
//!
//! Both report whether they changed anything. All I/O goes through an
//! [`ObjectStore`], so the engine can be exercised without an API server.

mod merge;

pub use merge::{contains, owned_patch, FieldPath};

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::resource::{DesiredResource, ObjectKey, TypeRegistry};
use crate::Error;

/// Trait abstracting namespaced object reads and writes
///
/// Objects travel as JSON so a single store serves every managed kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error>;

    /// Create an object
    async fn create(&self, key: &ObjectKey, object: &serde_json::Value) -> Result<(), Error>;

    /// Apply an RFC 7386 merge patch to an existing object
    async fn merge_patch(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<(), Error>;
}

/// Real object store backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
    registry: Arc<TypeRegistry>,
    field_manager: String,
}

impl KubeStore {
    /// Create a store resolving kinds through `registry`
    pub fn new(client: Client, registry: Arc<TypeRegistry>, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            registry,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, key: &ObjectKey) -> Result<Api<DynamicObject>, Error> {
        let resource = self.registry.resolve(key.kind)?;
        Ok(Api::namespaced_with(
            self.client.clone(),
            &key.namespace,
            resource,
        ))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error> {
        let object = self.api(key)?.get_opt(&key.name).await?;
        object
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::serialization_for_kind(key.kind.as_str(), e.to_string()))
    }

    async fn create(&self, key: &ObjectKey, object: &serde_json::Value) -> Result<(), Error> {
        let object: DynamicObject = serde_json::from_value(object.clone())
            .map_err(|e| Error::serialization_for_kind(key.kind.as_str(), e.to_string()))?;
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api(key)?.create(&params, &object).await?;
        Ok(())
    }

    async fn merge_patch(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<(), Error> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api(key)?
            .patch(&key.name, &params, &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}

/// Store wrapper that abandons every call once a pass is cancelled
pub struct CancellableStore {
    inner: Arc<dyn ObjectStore>,
    token: CancellationToken,
}

impl CancellableStore {
    /// Race every call on `inner` against `token`
    pub fn new(inner: Arc<dyn ObjectStore>, token: CancellationToken) -> Self {
        Self { inner, token }
    }
}

#[async_trait]
impl ObjectStore for CancellableStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = self.inner.get(key) => result,
        }
    }

    async fn create(&self, key: &ObjectKey, object: &serde_json::Value) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = self.inner.create(key, object) => result,
        }
    }

    async fn merge_patch(&self, key: &ObjectKey, patch: &serde_json::Value) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            result = self.inner.merge_patch(key, patch) => result,
        }
    }
}

/// Applies desired objects through an [`ObjectStore`]
pub struct ApplyEngine {
    store: Arc<dyn ObjectStore>,
}

impl ApplyEngine {
    /// Create an engine writing through `store`
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create the object if it does not exist; never touch an existing one
    ///
    /// Returns true if the object was created.
    pub async fn get_or_create(&self, desired: &DesiredResource) -> Result<bool, Error> {
        let key = desired.key();
        if self.fetch(&key).await?.is_some() {
            debug!(kind = %key.kind, name = %key.name, "object exists, leaving untouched");
            return Ok(false);
        }

        self.create(&key, desired).await?;
        Ok(true)
    }

    /// Create the object, or patch the owned fields that drifted
    ///
    /// Returns true if the object was created or patched.
    pub async fn merge_apply(
        &self,
        desired: &DesiredResource,
        owned: &[FieldPath<'_>],
    ) -> Result<bool, Error> {
        let key = desired.key();
        let Some(live) = self.fetch(&key).await? else {
            self.create(&key, desired).await?;
            return Ok(true);
        };

        let patch = owned_patch(&desired.payload, owned);
        if contains(&live, &patch) {
            debug!(kind = %key.kind, name = %key.name, "owned fields up to date");
            return Ok(false);
        }

        self.store
            .merge_patch(&key, &patch)
            .await
            .map_err(|e| wrap(&key, e))?;
        info!(kind = %key.kind, name = %key.name, "patched drifted fields");
        Ok(true)
    }

    async fn fetch(&self, key: &ObjectKey) -> Result<Option<serde_json::Value>, Error> {
        self.store.get(key).await.map_err(|e| wrap(key, e))
    }

    async fn create(&self, key: &ObjectKey, desired: &DesiredResource) -> Result<(), Error> {
        self.store
            .create(key, &desired.payload)
            .await
            .map_err(|e| wrap(key, e))?;
        info!(kind = %key.kind, name = %key.name, "created object");
        Ok(())
    }
}

fn wrap(key: &ObjectKey, source: Error) -> Error {
    match source {
        Error::Cancelled => Error::Cancelled,
        other => Error::apply(key.kind.as_str(), &key.namespace, &key.name, other),
    }
}
