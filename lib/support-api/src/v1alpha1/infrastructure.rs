use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Infrastructure describes a piece of shared infrastructure (message broker,
/// persistence store...) that supporting services consume by name
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "support.datum.net",
    version = "v1alpha1",
    kind = "Infrastructure",
    plural = "infrastructures",
    namespaced,
    derive = "Default",
    status = "InfrastructureStatus",
    printcolumn = r#"{"name":"Capability","type":"string","jsonPath":".spec.capability"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
)]
pub struct InfrastructureSpec {
    /// What this infrastructure provides
    pub capability: Capability,
}

/// Capability provided by an Infrastructure resource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Capability {
    #[default]
    MessageBroker,
    PersistenceStore,
    Monitoring,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MessageBroker => f.write_str("message broker"),
            Capability::PersistenceStore => f.write_str("persistence store"),
            Capability::Monitoring => f.write_str("monitoring"),
        }
    }
}

/// Status of an Infrastructure resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct InfrastructureStatus {
    /// Whether the infrastructure can be consumed
    #[serde(default)]
    pub ready: bool,

    /// Human-readable readiness message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Connection properties handed to consumers as environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
