//! Core reconciliation functionality for supporting services
//!
//! This library provides:
//! - Condition tracking for the status history of each instance
//! - Hostname provisioning (custom host validation, derived host truncation)
//! - Desired state computation per supporting service kind
//! - Infrastructure dependency resolution
//! - The reconciliation engine driving all of the above through a `Dispatcher`

pub mod conditions;
pub mod config;
pub mod dependency;
pub mod desired;
pub mod dispatcher;
pub mod drift;
pub mod error;
pub mod hostname;
pub mod kind;
pub mod memory;
pub mod reconciler;
pub mod validation;

pub use conditions::ConditionTracker;
pub use config::{BackoffPolicy, BuilderConfig, ControllerConfig, ReconcilerConfig};
pub use dependency::{BlockingReason, DependencyResolver, Readiness};
pub use desired::{build_desired_state, BuildError, DesiredResource, DesiredResourceSet};
pub use dispatcher::{ClusterResource, DispatchError, Dispatcher, ObjectKey};
pub use error::{CoreError, Result};
pub use hostname::{resolve_host, HostError, HostResolution, HostSource};
pub use kind::KindContract;
pub use memory::MemoryDispatcher;
pub use reconciler::{Phase, ReconcileResult, Reconciler};
pub use validation::{FieldViolation, ViolationList};
