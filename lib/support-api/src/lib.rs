//! Datum supporting service API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources for the supporting service operator:
//! - SupportingService: A supporting service (jobs service, data index, consoles...) to deploy
//! - Infrastructure: Infrastructure (broker, persistence) consumed by supporting services
//!
//! It also carries typed bindings for the OpenShift Route kind the operator
//! creates to expose services outside the cluster.

pub mod v1alpha1;
pub mod openshift;

pub use v1alpha1::{Infrastructure, SupportingService};
pub use openshift::Route;
