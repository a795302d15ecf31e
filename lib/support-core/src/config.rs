//! Operator configuration
//!
//! Every setting has a default and can be overridden through a `SUPPORT_*`
//! environment variable.

use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::validation::{
    validate_dns1123_subdomain, DNS1123_LABEL_MAX_LENGTH, DNS1123_SUBDOMAIN_MAX_LENGTH,
};

pub const ENV_NAMESPACE: &str = "SUPPORT_WATCH_NAMESPACE";
pub const ENV_ROUTE_DOMAIN: &str = "SUPPORT_ROUTE_DOMAIN";
pub const ENV_IMAGE_REGISTRY: &str = "SUPPORT_IMAGE_REGISTRY";
pub const ENV_IMAGE_TAG: &str = "SUPPORT_IMAGE_TAG";
pub const ENV_BACKOFF_INITIAL: &str = "SUPPORT_BACKOFF_INITIAL_SECONDS";
pub const ENV_BACKOFF_MAX: &str = "SUPPORT_BACKOFF_MAX_SECONDS";
pub const ENV_TRANSIENT_REQUEUE: &str = "SUPPORT_TRANSIENT_REQUEUE_SECONDS";
pub const ENV_RESYNC_INTERVAL: &str = "SUPPORT_RESYNC_SECONDS";
pub const ENV_LOG_FORMAT: &str = "SUPPORT_LOG_FORMAT";

/// Requeue delays while waiting on infrastructure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next check, given how long the instance has waited.
    ///
    /// Requeueing after the time already waited doubles the interval on every
    /// pass, without keeping a retry counter anywhere.
    pub fn delay_for(&self, waited: Duration) -> Duration {
        waited.max(self.initial).min(self.max)
    }
}

/// Settings for desired state computation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Registry prefix for default images
    pub image_registry: String,
    /// Tag for default images
    pub image_tag: String,
    /// Domain appended to derived route hosts
    pub route_domain: Option<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            image_registry: "quay.io/datum-support".to_string(),
            image_tag: "latest".to_string(),
            route_domain: None,
        }
    }
}

/// Settings for the reconciliation engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub backoff: BackoffPolicy,
    /// Requeue after conflicts and transient dispatcher failures
    pub transient_requeue: Duration,
    pub builder: BuilderConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            transient_requeue: Duration::from_secs(5),
            builder: BuilderConfig::default(),
        }
    }
}

/// Settings for the controller process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Periodic re-verification of converged instances
    pub resync_interval: Duration,
    /// Emit JSON logs
    pub json_logs: bool,
    pub reconciler: ReconcilerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_interval: Duration::from_secs(300),
            json_logs: false,
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to read variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ControllerConfig::default();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.namespace = lookup(ENV_NAMESPACE);
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.json_logs = match format.as_str() {
                "json" => true,
                "text" => false,
                other => {
                    return Err(CoreError::InvalidConfiguration(format!(
                        "{} must be \"json\" or \"text\", got {:?}",
                        ENV_LOG_FORMAT, other
                    )))
                }
            };
        }
        if let Some(secs) = lookup(ENV_RESYNC_INTERVAL) {
            config.resync_interval = parse_seconds(ENV_RESYNC_INTERVAL, &secs)?;
        }

        let reconciler = &mut config.reconciler;
        if let Some(secs) = lookup(ENV_BACKOFF_INITIAL) {
            reconciler.backoff.initial = parse_seconds(ENV_BACKOFF_INITIAL, &secs)?;
        }
        if let Some(secs) = lookup(ENV_BACKOFF_MAX) {
            reconciler.backoff.max = parse_seconds(ENV_BACKOFF_MAX, &secs)?;
        }
        if let Some(secs) = lookup(ENV_TRANSIENT_REQUEUE) {
            reconciler.transient_requeue = parse_seconds(ENV_TRANSIENT_REQUEUE, &secs)?;
        }
        if let Some(registry) = lookup(ENV_IMAGE_REGISTRY) {
            reconciler.builder.image_registry = registry.trim_end_matches('/').to_string();
        }
        if let Some(tag) = lookup(ENV_IMAGE_TAG) {
            reconciler.builder.image_tag = tag;
        }
        reconciler.builder.route_domain = lookup(ENV_ROUTE_DOMAIN);

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let backoff = &self.reconciler.backoff;
        if backoff.initial.is_zero() || backoff.initial > backoff.max {
            return Err(CoreError::InvalidConfiguration(format!(
                "backoff must satisfy 0 < initial ({:?}) <= max ({:?})",
                backoff.initial, backoff.max
            )));
        }
        if self.reconciler.transient_requeue.is_zero() {
            return Err(CoreError::InvalidConfiguration(format!(
                "{} must be positive",
                ENV_TRANSIENT_REQUEUE
            )));
        }

        if let Some(domain) = &self.reconciler.builder.route_domain {
            let violations = validate_dns1123_subdomain(domain, ENV_ROUTE_DOMAIN);
            if !violations.is_empty() {
                return Err(CoreError::InvalidConfiguration(violations.to_string()));
            }
            // a derived label plus the dot must still fit in a subdomain
            if domain.len() + DNS1123_LABEL_MAX_LENGTH + 1 > DNS1123_SUBDOMAIN_MAX_LENGTH {
                return Err(CoreError::InvalidConfiguration(format!(
                    "{} is too long to prefix with a {} character label",
                    ENV_ROUTE_DOMAIN, DNS1123_LABEL_MAX_LENGTH
                )));
            }
        }
        Ok(())
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| CoreError::InvalidConfiguration(format!("{}={:?}: {}", key, value, e)))
}
