/// API version v1alpha1 for supporting service CRDs

pub mod supporting_service;
pub mod infrastructure;
pub mod condition;

pub use supporting_service::{
    InfraReference, ServiceKind, ServicePortSpec, SupportingService, SupportingServiceSpec,
    SupportingServiceStatus,
};
pub use infrastructure::{Capability, Infrastructure, InfrastructureSpec, InfrastructureStatus};
pub use condition::{Condition, ConditionStatus, ConditionType};

/// API group for supporting service resources
pub const API_GROUP: &str = "support.datum.net";
/// API version for supporting service resources
pub const API_VERSION: &str = "v1alpha1";
