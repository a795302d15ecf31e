use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::condition::Condition;
use super::infrastructure::Capability;

/// SupportingService deploys one supporting service (jobs service, data index,
/// management console...) into its namespace and exposes it when the kind is
/// externally reachable
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "support.datum.net",
    version = "v1alpha1",
    kind = "SupportingService",
    plural = "supportingservices",
    namespaced,
    derive = "Default",
    status = "SupportingServiceStatus",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".status.image"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.externalURI"}"#,
    printcolumn = r#"{"name":"Service Type","type":"string","jsonPath":".spec.serviceType"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct SupportingServiceSpec {
    /// Which supporting service to run
    pub service_type: ServiceKind,

    /// Number of pods (defaults to 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Image override; derived from the service type when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Custom external hostname for the route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Infrastructure this service consumes
    #[serde(default)]
    pub infra: Vec<InfraReference>,

    /// Extra container environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Application properties rendered into the service ConfigMap
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Port override; the service type's port contract is used when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<ServicePortSpec>>,

    /// Whether to expose the service through a Route (defaults per service type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose_route: Option<bool>,

    /// Labels added to every generated resource
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Supported supporting service kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ServiceKind {
    /// Job scheduling service
    #[default]
    JobsService,
    /// Process data index
    DataIndex,
    /// Management console
    ManagementConsole,
    /// Task console
    TaskConsole,
    /// Trusty AI service
    #[serde(rename = "TrustyAI")]
    TrustyAi,
    /// Trusty UI
    #[serde(rename = "TrustyUI")]
    TrustyUi,
    /// Explainability service (cluster-internal)
    Explainability,
}

impl ServiceKind {
    /// Short kebab-case name used in labels and image names
    pub fn component_name(&self) -> &'static str {
        match self {
            ServiceKind::JobsService => "jobs-service",
            ServiceKind::DataIndex => "data-index",
            ServiceKind::ManagementConsole => "management-console",
            ServiceKind::TaskConsole => "task-console",
            ServiceKind::TrustyAi => "trusty-ai",
            ServiceKind::TrustyUi => "trusty-ui",
            ServiceKind::Explainability => "explainability",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.component_name())
    }
}

/// Weak reference to an Infrastructure resource in the same namespace
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InfraReference {
    /// Name of the Infrastructure resource
    pub name: String,

    /// Capability the service expects the resource to provide
    pub capability: Capability,
}

/// A named port exposed by the service container
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortSpec {
    /// Port name (referenced by the Route)
    pub name: String,

    /// Container and service port
    pub port: i32,

    /// Protocol (defaults to TCP)
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// Status of a SupportingService
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupportingServiceStatus {
    /// Condition history, oldest first
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Image currently deployed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// External URI to reach the service
    #[serde(rename = "externalURI", skip_serializing_if = "Option::is_none")]
    pub external_uri: Option<String>,
}

fn default_protocol() -> String {
    "TCP".to_string()
}
