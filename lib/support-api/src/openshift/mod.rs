/// Bindings to OpenShift route CRDs
///
/// This module provides type-safe Rust bindings to the OpenShift Route
/// custom resource so the operator can describe external exposure of its
/// services. Fields the operator does not set are modelled too, so replacing
/// a live Route does not drop them.

pub mod route;

pub use route::{Route, RoutePort, RouteSpec, RouteTargetReference, RouteTls};
