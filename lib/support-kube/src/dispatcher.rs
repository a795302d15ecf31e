//! Dispatcher backed by the Kubernetes API

use async_trait::async_trait;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use support_core::{ClusterResource, DispatchError, Dispatcher, ObjectKey};
use tracing::debug;

/// KubeDispatcher sends dispatcher calls to the API server
#[derive(Clone)]
pub struct KubeDispatcher {
    client: Client,
    field_manager: String,
}

impl KubeDispatcher {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K: ClusterResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

/// Map a kube error onto the dispatcher's error kinds
pub fn classify(err: kube::Error) -> DispatchError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            409 => DispatchError::Conflict(resp.message),
            400 | 422 => DispatchError::Invalid(resp.message),
            401 | 403 => DispatchError::Forbidden(resp.message),
            404 => DispatchError::NotFound(resp.message),
            code => DispatchError::Transient(format!("{} (HTTP {})", resp.message, code)),
        },
        kube::Error::SerdeError(e) => DispatchError::Serialization(e.to_string()),
        other => DispatchError::Transient(other.to_string()),
    }
}

#[async_trait]
impl Dispatcher for KubeDispatcher {
    async fn fetch<K: ClusterResource>(&self, key: &ObjectKey) -> Result<Option<K>, DispatchError> {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(classify)
    }

    async fn create<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError> {
        let namespace = resource.namespace().unwrap_or_default();
        self.api::<K>(&namespace)
            .create(&self.post_params(), resource)
            .await
            .map_err(classify)?;
        debug!("Created {} {}/{}", K::kind(&()), namespace, resource.name_any());
        Ok(())
    }

    async fn update<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        self.api::<K>(&namespace)
            .replace(&name, &self.post_params(), resource)
            .await
            .map_err(classify)?;
        debug!("Replaced {} {}/{}", K::kind(&()), namespace, name);
        Ok(())
    }

    async fn update_status<K: ClusterResource>(&self, resource: &K) -> Result<(), DispatchError> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let data = serde_json::to_vec(resource)?;
        self.api::<K>(&namespace)
            .replace_status(&name, &self.post_params(), data)
            .await
            .map_err(classify)?;
        debug!("Replaced status of {} {}/{}", K::kind(&()), namespace, name);
        Ok(())
    }

    async fn delete<K: ClusterResource>(&self, key: &ObjectKey) -> Result<(), DispatchError> {
        self.api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::background())
            .await
            .map_err(classify)?;
        debug!("Deleted {} {}", K::kind(&()), key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("request failed with {}", code),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_api_errors() {
        assert!(matches!(classify(api_error(409)), DispatchError::Conflict(_)));
        assert!(matches!(classify(api_error(422)), DispatchError::Invalid(_)));
        assert!(matches!(classify(api_error(400)), DispatchError::Invalid(_)));
        assert!(matches!(classify(api_error(403)), DispatchError::Forbidden(_)));
        assert!(matches!(classify(api_error(401)), DispatchError::Forbidden(_)));
        assert!(matches!(classify(api_error(404)), DispatchError::NotFound(_)));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for code in [429, 500, 503] {
            let err = classify(api_error(code));
            assert!(err.is_retryable(), "{} should be retryable", code);
            assert!(err.to_string().contains(&code.to_string()));
        }
    }

    #[test]
    fn test_conflict_is_retryable() {
        assert!(classify(api_error(409)).is_retryable());
        assert!(!classify(api_error(403)).is_retryable());
    }

    #[test]
    fn test_serde_errors_classify_as_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            classify(kube::Error::SerdeError(err)),
            DispatchError::Serialization(_)
        ));
    }
}
