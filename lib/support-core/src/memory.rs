//! In-memory dispatcher
//!
//! Stores resources as JSON keyed by kind, namespace and name, and follows
//! the API server rules the engine depends on: creates fail on existing
//! objects, updates must carry the live resourceVersion, and the status
//! subresource is written separately from the rest of the object.

use crate::dispatcher::{ClusterResource, DispatchError, Dispatcher, ObjectKey};
use async_trait::async_trait;
use kube::Resource;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Dispatcher operation, used to inject failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

type StoreKey = (String, String, String);

/// MemoryDispatcher keeps cluster objects in a map instead of an API server
pub struct MemoryDispatcher {
    // Map of (kind, namespace, name) to the serialized object
    objects: Arc<RwLock<HashMap<StoreKey, Value>>>,
    // One-shot failures keyed by operation and kind
    failures: Arc<RwLock<HashMap<(Operation, String), DispatchError>>>,
    writes: AtomicUsize,
    versions: AtomicUsize,
}

fn store_key<K: ClusterResource>(key: &ObjectKey) -> StoreKey {
    (
        K::kind(&()).to_string(),
        key.namespace.clone(),
        key.name.clone(),
    )
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            writes: AtomicUsize::new(0),
            versions: AtomicUsize::new(0),
        }
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Seed an object without counting it as a write
    pub async fn insert<K: ClusterResource>(&self, resource: K) -> Result<(), DispatchError> {
        let mut resource = resource;
        let meta = resource.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(self.next_version());

        let key = store_key::<K>(&ObjectKey::of(&resource));
        let value = serde_json::to_value(&resource)?;
        self.objects.write().await.insert(key, value);
        Ok(())
    }

    /// Read an object back
    pub async fn get<K: ClusterResource>(&self, key: &ObjectKey) -> Option<K> {
        let objects = self.objects.read().await;
        objects
            .get(&store_key::<K>(key))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Fail the next `operation` on resources of kind `K` with `error`
    pub async fn fail_next<K: ClusterResource>(&self, operation: Operation, error: DispatchError) {
        self.failures
            .write()
            .await
            .insert((operation, K::kind(&()).to_string()), error);
    }

    /// Number of successful create/update/update_status/delete calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects of kind `K`
    pub async fn count<K: ClusterResource>(&self) -> usize {
        let kind = K::kind(&()).to_string();
        let objects = self.objects.read().await;
        objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    async fn injected<K: ClusterResource>(
        &self,
        operation: Operation,
    ) -> Result<(), DispatchError> {
        let mut failures = self.failures.write().await;
        match failures.remove(&(operation, K::kind(&()).to_string())) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_version(
        stored: &Value,
        provided: Option<&String>,
        key: &ObjectKey,
    ) -> Result<(), DispatchError> {
        let live = stored
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        match provided {
            Some(version) if Some(version.as_str()) != live => Err(DispatchError::Conflict(format!(
                "{} has been modified; resourceVersion {} is stale",
                key, version
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    async fn fetch<K: ClusterResource>(&self, key: &ObjectKey) -> Result<Option<K>, DispatchError> {
        self.injected::<K>(Operation::Fetch).await?;
        let objects = self.objects.read().await;
        match objects.get(&store_key::<K>(key)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError> {
        self.injected::<K>(Operation::Create).await?;
        let key = ObjectKey::of(resource);
        let mut objects = self.objects.write().await;
        let skey = store_key::<K>(&key);
        if objects.contains_key(&skey) {
            return Err(DispatchError::Conflict(format!("{} {} already exists", K::kind(&()), key)));
        }

        let mut resource = resource.clone();
        let meta = resource.meta_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(self.next_version());
        objects.insert(skey, serde_json::to_value(&resource)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Created {} {}", K::kind(&()), key);
        Ok(())
    }

    async fn update<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError> {
        self.injected::<K>(Operation::Update).await?;
        let key = ObjectKey::of(resource);
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&store_key::<K>(&key))
            .ok_or_else(|| DispatchError::NotFound(format!("{} {}", K::kind(&()), key)))?;
        Self::check_version(stored, resource.meta().resource_version.as_ref(), &key)?;

        let mut resource = resource.clone();
        resource.meta_mut().resource_version = Some(self.next_version());
        let mut value = serde_json::to_value(&resource)?;
        // status is owned by the status subresource
        if let Some(obj) = value.as_object_mut() {
            match stored.get("status") {
                Some(status) => obj.insert("status".to_string(), status.clone()),
                None => obj.remove("status"),
            };
        }
        *stored = value;
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Updated {} {}", K::kind(&()), key);
        Ok(())
    }

    async fn update_status<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError> {
        self.injected::<K>(Operation::UpdateStatus).await?;
        let key = ObjectKey::of(resource);
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&store_key::<K>(&key))
            .ok_or_else(|| DispatchError::NotFound(format!("{} {}", K::kind(&()), key)))?;
        Self::check_version(stored, resource.meta().resource_version.as_ref(), &key)?;

        let value = serde_json::to_value(resource)?;
        let version = Value::String(self.next_version());
        if let Some(obj) = stored.as_object_mut() {
            match value.get("status") {
                Some(status) => obj.insert("status".to_string(), status.clone()),
                None => obj.remove("status"),
            };
            if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
                meta.insert("resourceVersion".to_string(), version);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Updated status of {} {}", K::kind(&()), key);
        Ok(())
    }

    async fn delete<K: ClusterResource>(&self, key: &ObjectKey) -> Result<(), DispatchError> {
        self.injected::<K>(Operation::Delete).await?;
        let mut objects = self.objects.write().await;
        objects
            .remove(&store_key::<K>(key))
            .ok_or_else(|| DispatchError::NotFound(format!("{} {}", K::kind(&()), key)))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Deleted {} {}", K::kind(&()), key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use support_api::v1alpha1::{SupportingService, SupportingServiceStatus};

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.create(&config_map("cfg")).await.unwrap();

        let fetched: ConfigMap = dispatcher
            .fetch(&ObjectKey::new("ns", "cfg"))
            .await
            .unwrap()
            .expect("config map should exist");
        assert!(fetched.metadata.uid.is_some());
        assert!(fetched.metadata.resource_version.is_some());
        assert_eq!(dispatcher.write_count(), 1);
        assert_eq!(dispatcher.count::<ConfigMap>().await, 1);
    }

    #[tokio::test]
    async fn test_create_existing_conflicts() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.create(&config_map("cfg")).await.unwrap();
        let err = dispatcher.create(&config_map("cfg")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.create(&config_map("cfg")).await.unwrap();
        let key = ObjectKey::new("ns", "cfg");
        let live: ConfigMap = dispatcher.fetch(&key).await.unwrap().unwrap();

        dispatcher.update(&live).await.unwrap();
        let err = dispatcher.update(&live).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let dispatcher = MemoryDispatcher::new();
        let err = dispatcher.update(&config_map("cfg")).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_status_and_update_status_keeps_spec() {
        let dispatcher = MemoryDispatcher::new();
        let mut instance = SupportingService::new("svc", Default::default());
        instance.metadata.namespace = Some("ns".to_string());
        dispatcher.insert(instance).await.unwrap();
        let key = ObjectKey::new("ns", "svc");

        let mut live: SupportingService = dispatcher.fetch(&key).await.unwrap().unwrap();
        live.status = Some(SupportingServiceStatus {
            image: Some("img".to_string()),
            ..Default::default()
        });
        live.spec.replicas = Some(3);
        dispatcher.update_status(&live).await.unwrap();

        let stored: SupportingService = dispatcher.get(&key).await.unwrap();
        assert_eq!(stored.spec.replicas, None);
        assert_eq!(stored.status.unwrap().image.as_deref(), Some("img"));

        let mut live: SupportingService = dispatcher.fetch(&key).await.unwrap().unwrap();
        live.status = None;
        live.spec.replicas = Some(2);
        dispatcher.update(&live).await.unwrap();
        let stored: SupportingService = dispatcher.get(&key).await.unwrap();
        assert_eq!(stored.spec.replicas, Some(2));
        assert!(stored.status.is_some());
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher
            .fail_next::<ConfigMap>(Operation::Create, DispatchError::Forbidden("nope".into()))
            .await;
        assert!(dispatcher.create(&config_map("cfg")).await.is_err());
        assert!(dispatcher.create(&config_map("cfg")).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.create(&config_map("cfg")).await.unwrap();
        let key = ObjectKey::new("ns", "cfg");
        dispatcher.delete::<ConfigMap>(&key).await.unwrap();
        assert!(dispatcher.get::<ConfigMap>(&key).await.is_none());
        assert!(matches!(
            dispatcher.delete::<ConfigMap>(&key).await,
            Err(DispatchError::NotFound(_))
        ));
    }
}
