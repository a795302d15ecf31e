//! Kubernetes client for the supporting service operator

use kube::Client;

use crate::dispatcher::KubeDispatcher;

/// ClusterClient wraps the Kubernetes client the controller runs against
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    /// Connect using the in-cluster config or the local kubeconfig
    pub async fn new() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Get a clone of the Kubernetes client
    pub fn clone_client(&self) -> Client {
        self.client.clone()
    }

    /// Dispatcher writing as `field_manager`
    pub fn dispatcher(&self, field_manager: &str) -> KubeDispatcher {
        KubeDispatcher::new(self.client.clone(), field_manager)
    }
}
