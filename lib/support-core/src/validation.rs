//! Field validation returning every violation at once
//!
//! Mirrors the Kubernetes naming rules: RFC 1123 labels are lowercase
//! alphanumerics and '-', at most 63 characters, starting and ending with an
//! alphanumeric; RFC 1123 subdomains are dot-separated labels, at most 253
//! characters overall.

use std::fmt;

pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

/// One rejected field value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    pub field_path: String,
    pub invalid_value: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(
        field_path: impl Into<String>,
        invalid_value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            invalid_value: invalid_value.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Invalid value: {:?}: {}",
            self.field_path, self.invalid_value, self.reason
        )
    }
}

/// Aggregated violations for one validation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViolationList(Vec<FieldViolation>);

impl ViolationList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.0.push(violation);
    }

    pub fn extend(&mut self, other: ViolationList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldViolation> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), ViolationList> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ViolationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ViolationList {}

impl IntoIterator for ViolationList {
    type Item = FieldViolation;
    type IntoIter = std::vec::IntoIter<FieldViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

fn is_label_edge(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Label syntax without the length limit (subdomain segments have none)
fn label_format_ok(label: &str) -> bool {
    match (label.chars().next(), label.chars().last()) {
        (Some(first), Some(last)) => {
            is_label_edge(first) && is_label_edge(last) && label.chars().all(is_label_char)
        }
        _ => false,
    }
}

fn quoted(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a RFC 1123 label, reporting each distinct rule it breaks
pub fn validate_dns1123_label(value: &str, field_path: &str) -> ViolationList {
    let mut violations = ViolationList::new();

    if value.is_empty() {
        violations.push(FieldViolation::new(field_path, value, "must not be empty"));
        return violations;
    }

    if value.chars().count() > DNS1123_LABEL_MAX_LENGTH {
        violations.push(FieldViolation::new(
            field_path,
            value,
            format!("must be no more than {} characters", DNS1123_LABEL_MAX_LENGTH),
        ));
    }

    let mut uppercase: Vec<char> = Vec::new();
    let mut invalid: Vec<char> = Vec::new();
    for c in value.chars() {
        if c.is_ascii_uppercase() {
            if !uppercase.contains(&c) {
                uppercase.push(c);
            }
        } else if !is_label_char(c) && !invalid.contains(&c) {
            invalid.push(c);
        }
    }
    if !uppercase.is_empty() {
        violations.push(FieldViolation::new(
            field_path,
            value,
            format!("must be lowercase, found {}", quoted(&uppercase)),
        ));
    }
    if !invalid.is_empty() {
        violations.push(FieldViolation::new(
            field_path,
            value,
            format!(
                "must consist of alphanumeric characters or '-', found {}",
                quoted(&invalid)
            ),
        ));
    }

    if value.chars().next().is_some_and(|c| !c.is_ascii_alphanumeric()) {
        violations.push(FieldViolation::new(
            field_path,
            value,
            "must start with an alphanumeric character",
        ));
    }
    if value.chars().last().is_some_and(|c| !c.is_ascii_alphanumeric()) {
        violations.push(FieldViolation::new(
            field_path,
            value,
            "must end with an alphanumeric character",
        ));
    }

    violations
}

/// Validate a RFC 1123 subdomain as a whole
pub fn validate_dns1123_subdomain(value: &str, field_path: &str) -> ViolationList {
    let mut violations = ViolationList::new();

    if value.chars().count() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        violations.push(FieldViolation::new(
            field_path,
            value,
            format!(
                "must be no more than {} characters",
                DNS1123_SUBDOMAIN_MAX_LENGTH
            ),
        ));
    }
    if !value.split('.').all(label_format_ok) {
        violations.push(FieldViolation::new(
            field_path,
            value,
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, \
             '-' or '.', and must start and end with an alphanumeric character",
        ));
    }

    violations
}

/// Validate a hostname: the subdomain check plus every label on its own
pub fn validate_hostname(value: &str, field_path: &str) -> ViolationList {
    let mut violations = validate_dns1123_subdomain(value, field_path);
    for label in value.split('.') {
        violations.extend(validate_dns1123_label(label, field_path));
    }
    violations
}

/// Validate an environment variable name (C identifier)
pub fn validate_env_name(value: &str, field_path: &str) -> ViolationList {
    let mut violations = ViolationList::new();
    let valid = match value.chars().next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        violations.push(FieldViolation::new(
            field_path,
            value,
            "a valid environment variable name must consist of alphabetic characters, \
             digits or '_', and must not start with a digit",
        ));
    }
    violations
}
