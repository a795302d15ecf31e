//! SupportingService controller wiring the reconciliation engine to the cluster

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use support_api::{Infrastructure, Route, SupportingService};
use support_core::desired::{LABEL_MANAGED_BY, MANAGED_BY};
use support_core::{ControllerConfig, ObjectKey, ReconcileResult, Reconciler};
use support_kube::{instances_referencing, ClusterClient, KubeDispatcher};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("SupportingService {0} has no namespace")]
    MissingNamespace(String),
}

/// Shared state handed to every reconcile call
pub struct Context {
    reconciler: Reconciler<KubeDispatcher>,
    resync_interval: Duration,
    error_requeue: Duration,
}

pub struct SupportingServiceController {
    client: ClusterClient,
    config: ControllerConfig,
}

/// Requeue policy for an engine result
pub fn action_for(result: &ReconcileResult, resync_interval: Duration) -> Action {
    if result.terminal {
        Action::await_change()
    } else if let Some(after) = result.requeue_after {
        Action::requeue(after)
    } else {
        Action::requeue(resync_interval)
    }
}

async fn reconcile(
    instance: Arc<SupportingService>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    if instance.namespace().is_none() {
        return Err(ReconcileError::MissingNamespace(instance.name_any()));
    }
    let key = ObjectKey::of(instance.as_ref());
    let result = ctx.reconciler.reconcile(&key).await;
    debug!(instance = %key, phase = ?result.phase, "Reconciled");
    Ok(action_for(&result, ctx.resync_interval))
}

fn error_policy(
    instance: Arc<SupportingService>,
    err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    warn!(instance = %instance.name_any(), error = %err, "Error reconciling SupportingService");
    Action::requeue(ctx.error_requeue)
}

impl SupportingServiceController {
    pub fn new(client: ClusterClient, config: ControllerConfig) -> Self {
        Self { client, config }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
    {
        let client: Client = self.client.clone_client();
        match &self.config.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            namespace = self.config.namespace.as_deref().unwrap_or("*"),
            "Starting SupportingService reconciliation"
        );

        let dispatcher = Arc::new(self.client.dispatcher(MANAGED_BY));
        let ctx = Arc::new(Context {
            reconciler: Reconciler::new(dispatcher, self.config.reconciler.clone()),
            resync_interval: self.config.resync_interval,
            error_requeue: self.config.reconciler.transient_requeue,
        });

        let owned = watcher::Config::default()
            .labels(&format!("{}={}", LABEL_MANAGED_BY, MANAGED_BY));
        let controller =
            Controller::new(self.api::<SupportingService>(), watcher::Config::default());
        let store = controller.store();

        let mut stream = controller
            .owns(self.api::<ConfigMap>(), owned.clone())
            .owns(self.api::<Deployment>(), owned.clone())
            .owns(self.api::<Service>(), owned.clone())
            .owns(self.api::<Route>(), owned)
            .watches(
                self.api::<Infrastructure>(),
                watcher::Config::default(),
                move |infra| {
                    let instances = store.state();
                    instances_referencing(instances.iter().map(|i| i.as_ref()), &infra)
                },
            )
            .run(reconcile, error_policy, ctx)
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((obj, _)) => debug!("Reconciled SupportingService {}", obj),
                Err(e) => warn!("Error in reconciliation stream: {}", e),
            }
        }

        Ok(())
    }
}
