//! Boundary to the cluster API
//!
//! The engine never talks to the API server directly. Everything goes through
//! a `Dispatcher`, which the controller backs with a kube client and tests
//! back with `MemoryDispatcher`.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Any namespaced resource the dispatcher can move in and out of the cluster
pub trait ClusterResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespace and name of a resource
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Failure reported by a dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Optimistic concurrency conflict (stale resourceVersion or already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network failure, throttling or server-side error
    #[error("Transient error: {0}")]
    Transient(String),

    /// The API server rejected the object
    #[error("Invalid resource: {0}")]
    Invalid(String),

    /// Authentication or authorization failure
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DispatchError {
    /// Whether a short requeue is expected to resolve the failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Conflict(_) | DispatchError::Transient(_))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

/// Generic fetch/create/update/delete access to namespaced cluster resources
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Fetch a resource; `None` when it does not exist
    async fn fetch<K: ClusterResource>(&self, key: &ObjectKey) -> Result<Option<K>, DispatchError>;

    /// Create a resource
    async fn create<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError>;

    /// Replace a resource; its resourceVersion must match the live one
    async fn update<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError>;

    /// Replace the status subresource
    async fn update_status<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError>;

    /// Delete a resource
    async fn delete<K: ClusterResource>(&self, key: &ObjectKey) -> Result<(), DispatchError>;
}
