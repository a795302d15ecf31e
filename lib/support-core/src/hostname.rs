//! Hostname provisioning for supporting service routes
//!
//! A route either uses the host the user asked for, when it is a valid RFC 1123
//! hostname, or a host derived from `name-namespace`. The derived label must
//! fit the 63 character label limit, so the name portion is shortened while
//! the namespace is always kept whole.

use thiserror::Error;

use crate::dispatcher::ObjectKey;
use crate::validation::{validate_hostname, ViolationList, DNS1123_LABEL_MAX_LENGTH};

/// Field path reported for custom host violations
pub const HOST_FIELD_PATH: &str = "spec.host";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error(
        "hostname {name}-{namespace} is {length} characters, exceeding the {max} character \
         limit, and the name cannot absorb the {excess} character reduction"
    )]
    NameTooLong {
        name: String,
        namespace: String,
        length: usize,
        excess: usize,
        max: usize,
    },

    #[error("derived host {host} is invalid: {violations}")]
    InvalidDerivedHost {
        host: String,
        violations: ViolationList,
    },
}

/// Where a resolved host came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostSource {
    Custom,
    Derived,
}

/// Outcome of host resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostResolution {
    pub host: String,
    pub source: HostSource,
    /// Violations of a rejected custom host; the derived host was used instead
    pub rejected: Option<ViolationList>,
}

/// Validate a user supplied host. An empty host is valid and means "derive one".
pub fn validate_custom_host(host: &str) -> Result<(), ViolationList> {
    if host.is_empty() {
        return Ok(());
    }
    validate_hostname(host, HOST_FIELD_PATH).into_result()
}

/// Shorten `name` so that `name-namespace` fits in a DNS label.
///
/// A cut never leaves a trailing `.` or `-` on the name, and at least one
/// character of the name must survive.
pub fn truncate_name(name: &str, namespace: &str) -> Result<String, HostError> {
    let name_len = name.chars().count();
    let length = name_len + 1 + namespace.chars().count();
    if length <= DNS1123_LABEL_MAX_LENGTH {
        return Ok(name.to_string());
    }

    let excess = length - DNS1123_LABEL_MAX_LENGTH;
    let too_long = || HostError::NameTooLong {
        name: name.to_string(),
        namespace: namespace.to_string(),
        length,
        excess,
        max: DNS1123_LABEL_MAX_LENGTH,
    };
    if name_len <= excess {
        return Err(too_long());
    }

    let truncated: String = name.chars().take(name_len - excess).collect();
    let trimmed = truncated.trim_end_matches(['.', '-']);
    if trimmed.is_empty() {
        return Err(too_long());
    }
    Ok(trimmed.to_string())
}

fn checked(host: String) -> Result<String, HostError> {
    let violations = validate_hostname(&host, HOST_FIELD_PATH);
    if violations.is_empty() {
        Ok(host)
    } else {
        Err(HostError::InvalidDerivedHost { host, violations })
    }
}

/// Default host label: `name-namespace`, truncated to fit a DNS label
pub fn derive_default_host(name: &str, namespace: &str) -> Result<String, HostError> {
    let name = truncate_name(name, namespace)?;
    checked(format!("{}-{}", name, namespace))
}

/// Resolve the route host for an instance.
///
/// A custom host is used verbatim when valid. An invalid one is reported in
/// `rejected` and the derived host takes its place. The derived label gets
/// `.domain` appended when a route domain is configured.
pub fn resolve_host(
    custom_host: Option<&str>,
    identity: &ObjectKey,
    domain: Option<&str>,
) -> Result<HostResolution, HostError> {
    let custom_host = custom_host.unwrap_or_default();

    let rejected = match validate_custom_host(custom_host) {
        Ok(()) if !custom_host.is_empty() => {
            return Ok(HostResolution {
                host: custom_host.to_string(),
                source: HostSource::Custom,
                rejected: None,
            });
        }
        Ok(()) => None,
        Err(violations) => Some(violations),
    };

    let label = derive_default_host(&identity.name, &identity.namespace)?;
    let host = match domain {
        Some(domain) if !domain.is_empty() => format!("{}.{}", label, domain),
        _ => label,
    };

    Ok(HostResolution {
        host: checked(host)?,
        source: HostSource::Derived,
        rejected,
    })
}
