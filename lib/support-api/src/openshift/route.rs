use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Route from OpenShift - Maps an external hostname to a Service port
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "RouteStatus",
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// External hostname (generated by the router when empty)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Service this route sends traffic to
    pub to: RouteTargetReference,

    /// Target port on the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    /// Path the router matches before sending traffic to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// TLS termination, usually set by cluster administrators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,

    /// Wildcard admission policy (None or Subdomain)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard_policy: Option<String>,

    /// Additional weighted backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_backends: Option<Vec<RouteTargetReference>>,
}

/// Reference to the Route backend
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteTargetReference {
    /// Kind of the backend (always "Service")
    pub kind: String,

    /// Name of the backend
    pub name: String,

    /// Relative share of traffic among the backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// TLS settings of a Route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    /// edge, passthrough or reencrypt
    pub termination: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ca_certificate: Option<String>,
}

/// Port selection for a Route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    /// Name of the service port
    pub target_port: String,
}

/// Status of a Route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteStatus {
    /// Router admissions
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

/// Admission of a Route by one router
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    /// Host admitted by the router
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Name of the router
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,
}
