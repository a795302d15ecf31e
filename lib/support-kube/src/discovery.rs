//! Discovery of the instances an Infrastructure change affects

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use support_api::{Infrastructure, SupportingService};
use tracing::debug;

/// Instances in the infrastructure's namespace that reference it by name
pub fn instances_referencing<'a, I>(
    instances: I,
    infra: &Infrastructure,
) -> Vec<ObjectRef<SupportingService>>
where
    I: IntoIterator<Item = &'a SupportingService>,
{
    let name = infra.name_any();
    let namespace = infra.namespace();

    let matching: Vec<_> = instances
        .into_iter()
        .filter(|instance| instance.namespace() == namespace)
        .filter(|instance| instance.spec.infra.iter().any(|r| r.name == name))
        .map(ObjectRef::from_obj)
        .collect();

    debug!(
        "Infrastructure {}/{} affects {} instances",
        namespace.as_deref().unwrap_or_default(),
        name,
        matching.len()
    );
    matching
}
