//! Per-kind contracts for supporting services

use support_api::v1alpha1::{Capability, ServiceKind, ServicePortSpec};

/// A port the service container listens on
#[derive(Clone, Copy, Debug)]
pub struct PortDef {
    pub name: &'static str,
    pub port: i32,
    pub protocol: &'static str,
}

/// What every supporting service kind provides and needs
#[derive(Debug)]
pub struct KindContract {
    /// Image name under the configured registry
    pub image_name: &'static str,
    /// Ports, primary first
    pub ports: &'static [PortDef],
    /// Whether the kind is reachable from outside the cluster by default
    pub exposed: bool,
    /// Capabilities the kind cannot run without
    pub requires: &'static [Capability],
    /// Environment every container of the kind gets
    pub base_env: &'static [(&'static str, &'static str)],
}

const HTTP: PortDef = PortDef {
    name: "http",
    port: 8080,
    protocol: "TCP",
};

const JOBS_SERVICE: KindContract = KindContract {
    image_name: "jobs-service",
    ports: &[HTTP],
    exposed: true,
    requires: &[],
    base_env: &[("HTTP_PORT", "8080")],
};

const DATA_INDEX: KindContract = KindContract {
    image_name: "data-index",
    ports: &[HTTP],
    exposed: true,
    requires: &[Capability::PersistenceStore, Capability::MessageBroker],
    base_env: &[("HTTP_PORT", "8080")],
};

const MANAGEMENT_CONSOLE: KindContract = KindContract {
    image_name: "management-console",
    ports: &[HTTP],
    exposed: true,
    requires: &[],
    base_env: &[("HTTP_PORT", "8080")],
};

const TASK_CONSOLE: KindContract = KindContract {
    image_name: "task-console",
    ports: &[HTTP],
    exposed: true,
    requires: &[],
    base_env: &[("HTTP_PORT", "8080")],
};

const TRUSTY_AI: KindContract = KindContract {
    image_name: "trusty-ai",
    ports: &[HTTP],
    exposed: true,
    requires: &[Capability::PersistenceStore, Capability::MessageBroker],
    base_env: &[("HTTP_PORT", "8080")],
};

const TRUSTY_UI: KindContract = KindContract {
    image_name: "trusty-ui",
    ports: &[HTTP],
    exposed: true,
    requires: &[],
    base_env: &[("HTTP_PORT", "8080")],
};

const EXPLAINABILITY: KindContract = KindContract {
    image_name: "explainability",
    ports: &[HTTP],
    exposed: false,
    requires: &[Capability::MessageBroker],
    base_env: &[("HTTP_PORT", "8080")],
};

impl KindContract {
    pub fn of(kind: ServiceKind) -> &'static KindContract {
        match kind {
            ServiceKind::JobsService => &JOBS_SERVICE,
            ServiceKind::DataIndex => &DATA_INDEX,
            ServiceKind::ManagementConsole => &MANAGEMENT_CONSOLE,
            ServiceKind::TaskConsole => &TASK_CONSOLE,
            ServiceKind::TrustyAi => &TRUSTY_AI,
            ServiceKind::TrustyUi => &TRUSTY_UI,
            ServiceKind::Explainability => &EXPLAINABILITY,
        }
    }

    /// Port contract in the CRD's port representation
    pub fn port_contract(&self) -> Vec<ServicePortSpec> {
        self.ports
            .iter()
            .map(|p| ServicePortSpec {
                name: p.name.to_string(),
                port: p.port,
                protocol: p.protocol.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_primary_port() {
        for kind in [
            ServiceKind::JobsService,
            ServiceKind::DataIndex,
            ServiceKind::ManagementConsole,
            ServiceKind::TaskConsole,
            ServiceKind::TrustyAi,
            ServiceKind::TrustyUi,
            ServiceKind::Explainability,
        ] {
            let contract = KindContract::of(kind);
            assert!(!contract.ports.is_empty(), "{} has no ports", kind);
            assert_eq!(contract.image_name, kind.component_name());
        }
    }

    #[test]
    fn test_explainability_is_internal() {
        assert!(!KindContract::of(ServiceKind::Explainability).exposed);
        assert!(KindContract::of(ServiceKind::JobsService).exposed);
    }

    #[test]
    fn test_port_contract() {
        let ports = KindContract::of(ServiceKind::JobsService).port_contract();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name, "http");
        assert_eq!(ports[0].port, 8080);
    }
}
