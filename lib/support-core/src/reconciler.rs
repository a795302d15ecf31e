//! Reconciliation engine for SupportingService instances
//!
//! One pass fetches the instance, gates on its infrastructure, resolves the
//! route host, computes the desired children and converges the cluster onto
//! them. Progress is reported through the condition history; the status
//! subresource is written at most once per pass and only when it changed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::{Resource, ResourceExt};
use support_api::v1alpha1::{ConditionType, SupportingService, SupportingServiceStatus};
use support_api::Route;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::conditions::{self, ConditionTracker};
use crate::config::ReconcilerConfig;
use crate::dependency::DependencyResolver;
use crate::desired::{build_desired_state, route_required, DesiredResource};
use crate::dispatcher::{ClusterResource, DispatchError, Dispatcher, ObjectKey};
use crate::drift::Drift;
use crate::hostname::resolve_host;

/// Where an instance stands after a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Pending,
    WaitingOnInfra,
    Provisioning,
    Deployed,
    Failed,
}

/// Outcome of one reconciliation pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Run another pass after this delay
    pub requeue_after: Option<Duration>,
    /// The pass cannot make progress until the instance or its environment changes
    pub terminal: bool,
    pub phase: Phase,
}

impl ReconcileResult {
    pub fn done(phase: Phase) -> Self {
        Self {
            requeue_after: None,
            terminal: false,
            phase,
        }
    }

    pub fn requeue(after: Duration, phase: Phase) -> Self {
        Self {
            requeue_after: Some(after),
            terminal: false,
            phase,
        }
    }

    pub fn terminal() -> Self {
        Self {
            requeue_after: None,
            terminal: true,
            phase: Phase::Failed,
        }
    }
}

pub struct Reconciler<D> {
    dispatcher: Arc<D>,
    config: ReconcilerConfig,
}

impl<D: Dispatcher> Reconciler<D> {
    pub fn new(dispatcher: Arc<D>, config: ReconcilerConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one pass for the instance at `key`
    pub async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult {
        self.reconcile_at(key, Utc::now()).await
    }

    /// Run one pass, stamping conditions with `now`
    pub async fn reconcile_at(&self, key: &ObjectKey, now: DateTime<Utc>) -> ReconcileResult {
        self.run_pass(key, now)
            .instrument(info_span!("reconcile", instance = %key))
            .await
    }

    async fn run_pass(&self, key: &ObjectKey, now: DateTime<Utc>) -> ReconcileResult {
        let instance = match self.dispatcher.fetch::<SupportingService>(key).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                debug!("Instance no longer exists");
                return ReconcileResult::done(Phase::Pending);
            }
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "Failed to fetch instance");
                return ReconcileResult::requeue(self.config.transient_requeue, Phase::Pending);
            }
            Err(err) => {
                error!(error = %err, "Failed to fetch instance");
                return ReconcileResult::terminal();
            }
        };

        let observed = instance.status.clone().unwrap_or_default();
        let mut status = observed.clone();
        let result = self.converge(key, &instance, &mut status, now).await;
        if !conditions::is_true(&status.conditions, ConditionType::Deployed) {
            status.external_uri = None;
        }

        if status == observed {
            return result;
        }
        let mut updated = instance;
        updated.status = Some(status);
        match self.dispatcher.update_status(&updated).await {
            Ok(()) => result,
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "Status update interrupted");
                ReconcileResult::requeue(self.config.transient_requeue, result.phase)
            }
            Err(err) => {
                error!(error = %err, "Failed to update status");
                ReconcileResult::terminal()
            }
        }
    }

    async fn converge(
        &self,
        key: &ObjectKey,
        instance: &SupportingService,
        status: &mut SupportingServiceStatus,
        now: DateTime<Utc>,
    ) -> ReconcileResult {
        let mut tracker = ConditionTracker::new(&mut status.conditions, now);

        let readiness = match DependencyResolver::new(self.dispatcher.as_ref())
            .check_ready(instance)
            .await
        {
            Ok(readiness) => readiness,
            Err(err) => return self.interrupted(&mut tracker, err),
        };
        if !readiness.is_ready() {
            let summary = readiness.summary();
            info!(reasons = %summary, "Waiting on infrastructure");
            tracker.set_true(ConditionType::WaitingOnInfra, "InfraNotReady", summary);
            tracker.resolve(
                ConditionType::Deployed,
                "InfraNotReady",
                "infrastructure is no longer ready",
            );

            let waited = tracker
                .latest(ConditionType::WaitingOnInfra)
                .and_then(conditions::transition_time)
                .and_then(|since| (now - since).to_std().ok())
                .unwrap_or_default();
            let delay = self.config.backoff.delay_for(waited);
            debug!(?waited, ?delay, "Requeueing until infrastructure is ready");
            return ReconcileResult::requeue(delay, Phase::WaitingOnInfra);
        }
        tracker.resolve(
            ConditionType::WaitingOnInfra,
            "InfraReady",
            "all infrastructure is ready",
        );

        let route_host = if route_required(instance) {
            let resolution = match resolve_host(
                instance.spec.host.as_deref(),
                key,
                self.config.builder.route_domain.as_deref(),
            ) {
                Ok(resolution) => resolution,
                Err(err) => {
                    error!(error = %err, "Cannot provision a route host");
                    return failed(&mut tracker, "HostUnresolvable", err.to_string());
                }
            };
            match &resolution.rejected {
                Some(violations) => {
                    warn!(%violations, host = %resolution.host, "Custom host rejected");
                    tracker.set_true(
                        ConditionType::HostInvalid,
                        "CustomHostRejected",
                        format!("{}; using {}", violations, resolution.host),
                    );
                }
                None => {
                    tracker.resolve(
                        ConditionType::HostInvalid,
                        "HostValid",
                        format!("using {}", resolution.host),
                    );
                }
            }
            Some(resolution.host)
        } else {
            tracker.resolve(ConditionType::HostInvalid, "RouteDisabled", "no route is exposed");
            None
        };

        let desired = match build_desired_state(
            instance,
            route_host.as_deref(),
            &readiness.env,
            &self.config.builder,
        ) {
            Ok(desired) => desired,
            Err(err) => {
                error!(error = %err, "Cannot build desired state");
                return failed(&mut tracker, "InvalidSpec", err.to_string());
            }
        };
        if desired.violations.is_empty() {
            tracker.resolve(ConditionType::SpecInvalid, "SpecValid", "");
        } else {
            warn!(violations = %desired.violations, "Ignoring invalid spec fields");
            tracker.set_true(
                ConditionType::SpecInvalid,
                "SpecFieldsIgnored",
                desired.violations.to_string(),
            );
        }

        for resource in desired.iter() {
            let applied = match resource {
                DesiredResource::ConfigMap(r) => self.apply(r).await,
                DesiredResource::Deployment(r) => self.apply(r).await,
                DesiredResource::Service(r) => self.apply(r).await,
                DesiredResource::Route(r) => self.apply(r).await,
            };
            if let Err(err) = applied {
                warn!(
                    kind = resource.kind(),
                    name = %resource.name(),
                    error = %err,
                    "Apply failed"
                );
                return self.interrupted(&mut tracker, err);
            }
        }
        if desired.route().is_none() {
            if let Err(err) = self.remove_route(key, instance).await {
                return self.interrupted(&mut tracker, err);
            }
        }

        tracker.resolve(ConditionType::Provisioning, "Provisioned", "");
        tracker.resolve(ConditionType::Failed, "Recovered", "");
        tracker.set_true(
            ConditionType::Deployed,
            "Deployed",
            format!("{} resources applied", desired.resources.len()),
        );

        status.image = Some(desired.image.clone());
        status.external_uri = desired
            .route_host
            .as_ref()
            .map(|host| format!("http://{}", host));
        ReconcileResult::done(Phase::Deployed)
    }

    /// Record a dispatcher failure in the middle of a pass
    fn interrupted(
        &self,
        tracker: &mut ConditionTracker<'_>,
        err: DispatchError,
    ) -> ReconcileResult {
        if err.is_retryable() {
            tracker.set_true(ConditionType::Provisioning, "ApplyInterrupted", err.to_string());
            ReconcileResult::requeue(self.config.transient_requeue, Phase::Provisioning)
        } else {
            error!(error = %err, "Cluster rejected a change");
            failed(tracker, "ApplyFailed", err.to_string())
        }
    }

    /// Create the resource or bring a drifted live copy back in line
    async fn apply<K: ClusterResource + Drift>(&self, desired: &K) -> Result<(), DispatchError> {
        let key = ObjectKey::of(desired);
        let kind = K::kind(&());
        match self.dispatcher.fetch::<K>(&key).await? {
            None => {
                self.dispatcher.create(desired).await?;
                info!(kind = %kind, name = %key.name, "Created");
            }
            Some(live) => match desired.reconcile_onto(&live) {
                Some(updated) => {
                    self.dispatcher.update(&updated).await?;
                    info!(kind = %kind, name = %key.name, "Updated drifted resource");
                }
                None => debug!(kind = %kind, name = %key.name, "In sync"),
            },
        }
        Ok(())
    }

    /// Delete the instance's route when it is no longer exposed
    async fn remove_route(
        &self,
        key: &ObjectKey,
        instance: &SupportingService,
    ) -> Result<(), DispatchError> {
        let Some(route) = self.dispatcher.fetch::<Route>(key).await? else {
            return Ok(());
        };
        let owned = instance
            .meta()
            .uid
            .as_ref()
            .is_some_and(|uid| route.owner_references().iter().any(|o| &o.uid == uid));
        if !owned {
            debug!("Leaving route not owned by this instance");
            return Ok(());
        }

        match self.dispatcher.delete::<Route>(key).await {
            Ok(()) | Err(DispatchError::NotFound(_)) => {
                info!("Deleted route");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Mark the instance failed; a failed instance is no longer deployed
fn failed(tracker: &mut ConditionTracker<'_>, reason: &str, message: String) -> ReconcileResult {
    tracker.resolve(ConditionType::Deployed, "Failed", message.clone());
    tracker.set_true(ConditionType::Failed, reason, message);
    ReconcileResult::terminal()
}
