//! Infrastructure dependency resolution

use std::collections::BTreeMap;
use std::fmt;

use kube::ResourceExt;
use support_api::v1alpha1::{Capability, Infrastructure, SupportingService};
use tracing::debug;

use crate::dispatcher::{DispatchError, Dispatcher, ObjectKey};
use crate::kind::KindContract;

/// Why an instance cannot be deployed yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockingReason {
    /// The referenced Infrastructure does not exist
    NotFound { name: String },
    /// The referenced Infrastructure exists but has not reported ready
    NotReady { name: String, message: Option<String> },
    /// The referenced Infrastructure provides something else
    CapabilityMismatch {
        name: String,
        expected: Capability,
        actual: Capability,
    },
    /// The service kind needs a capability no reference provides
    MissingCapability { capability: Capability },
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::NotFound { name } => write!(f, "infrastructure {} not found", name),
            BlockingReason::NotReady { name, message: Some(message) } => {
                write!(f, "infrastructure {} not ready: {}", name, message)
            }
            BlockingReason::NotReady { name, message: None } => {
                write!(f, "infrastructure {} not ready", name)
            }
            BlockingReason::CapabilityMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "infrastructure {} provides {} but {} was expected",
                name, actual, expected
            ),
            BlockingReason::MissingCapability { capability } => {
                write!(f, "no {} referenced", capability)
            }
        }
    }
}

/// Readiness of an instance's infrastructure
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub reasons: Vec<BlockingReason>,
    /// Environment published by the ready references; later references win
    pub env: BTreeMap<String, String>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.reasons.is_empty()
    }

    /// All blocking reasons on one line
    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Checks an instance's infrastructure references through a dispatcher
pub struct DependencyResolver<'a, D> {
    dispatcher: &'a D,
}

impl<'a, D: Dispatcher> DependencyResolver<'a, D> {
    pub fn new(dispatcher: &'a D) -> Self {
        Self { dispatcher }
    }

    /// Collect every reason the instance is blocked, plus the environment of
    /// the references that are ready
    pub async fn check_ready(
        &self,
        instance: &SupportingService,
    ) -> Result<Readiness, DispatchError> {
        let namespace = instance.namespace().unwrap_or_default();
        let mut readiness = Readiness::default();

        for reference in &instance.spec.infra {
            let key = ObjectKey::new(namespace.clone(), reference.name.clone());
            let infra = match self.dispatcher.fetch::<Infrastructure>(&key).await? {
                Some(infra) => infra,
                None => {
                    readiness.reasons.push(BlockingReason::NotFound {
                        name: reference.name.clone(),
                    });
                    continue;
                }
            };

            if infra.spec.capability != reference.capability {
                readiness.reasons.push(BlockingReason::CapabilityMismatch {
                    name: reference.name.clone(),
                    expected: reference.capability,
                    actual: infra.spec.capability,
                });
                continue;
            }

            match infra.status {
                Some(status) if status.ready => readiness.env.extend(status.env),
                status => readiness.reasons.push(BlockingReason::NotReady {
                    name: reference.name.clone(),
                    message: status.and_then(|s| s.message),
                }),
            }
        }

        for capability in KindContract::of(instance.spec.service_type).requires {
            if !instance.spec.infra.iter().any(|r| r.capability == *capability) {
                readiness.reasons.push(BlockingReason::MissingCapability {
                    capability: *capability,
                });
            }
        }

        debug!(
            instance = %ObjectKey::of(instance),
            blocked = readiness.reasons.len(),
            "Checked infrastructure readiness"
        );
        Ok(readiness)
    }
}
