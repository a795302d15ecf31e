//! Kubernetes integration for the supporting service operator
pub mod client;
pub mod discovery;
pub mod dispatcher;

pub use client::ClusterClient;
pub use discovery::instances_referencing;
pub use dispatcher::{classify, KubeDispatcher};
