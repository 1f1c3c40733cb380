//! Validation of configuration fragments.
//!
//! Every [`NetConfig`](crate::model::NetConfig) fragment and firewall rule
//! implements [`Validatable`]. The diff engine validates the whole
//! replacement set before touching the existing configuration, so an invalid
//! fragment aborts an update without a partial write.
//!
//! # Example
//!
//! ```rust
//! use netadmin::model::{Ip4Config, NetConfig, NetStatus};
//! use netadmin::validation::Validatable;
//!
//! let ip4 = NetConfig::Ip4(Ip4Config {
//!     status: NetStatus::EnabledLan,
//!     prefix: 40,
//!     ..Default::default()
//! });
//!
//! let result = ip4.validate();
//! assert!(!result.is_valid());
//! for issue in result.errors() {
//!     eprintln!("{}", issue);
//! }
//! ```

use std::fmt;

use crate::error::{Error, ValidationErrorInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// The fragment is rejected.
    Error,
    /// The fragment is accepted but probably not what was meant.
    Warning,
}

/// One finding about one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Property-style field name, e.g. `ip4.prefix`.
    pub field: String,
    pub message: String,
    pub severity: ValidationSeverity,
}

impl ValidationError {
    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            ValidationSeverity::Error => "invalid",
            ValidationSeverity::Warning => "suspicious",
        };
        write!(f, "{} {}: {}", level, self.field, self.message)
    }
}

/// Findings collected while validating, in the order they were found.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        severity: ValidationSeverity,
    ) {
        self.issues.push(ValidationError {
            field: field.into(),
            message: message.into(),
            severity,
        });
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(field, message, ValidationSeverity::Error);
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(field, message, ValidationSeverity::Warning);
    }

    /// Append the findings of `other`.
    pub fn merge(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationError> {
        self.issues.iter().filter(|i| !i.is_error())
    }

    /// Valid unless an error was found; warnings do not count.
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// `Err(Error::Validation)` carrying every error, dropping warnings.
    pub fn into_result(self) -> Result<(), Error> {
        let errors: Vec<ValidationErrorInfo> = self
            .issues
            .into_iter()
            .filter(ValidationError::is_error)
            .map(|e| ValidationErrorInfo::new(e.field, e.message))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

/// A value that can be checked before it is applied.
pub trait Validatable {
    fn validate(&self) -> ValidationResult;

    fn is_valid(&self) -> bool {
        self.validate().is_valid()
    }
}

/// Kernel limit on interface names, excluding the terminating NUL.
const MAX_IFNAME_LEN: usize = 15;

/// Interface names end up in property keys, daemon arguments and the
/// `,`/`;`-separated firewall records.
pub fn validate_ifname(name: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if name.is_empty() {
        result.add_error(field, "interface name is empty");
    } else if name.len() > MAX_IFNAME_LEN {
        result.add_error(
            field,
            format!("'{}' is longer than {} characters", name, MAX_IFNAME_LEN),
        );
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\0' | ',' | ';') || c.is_whitespace())
    {
        result.add_error(field, format!("'{}' contains {:?}", name, c));
    }
    result
}

fn validate_prefix(prefix: u8, max: u8, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if prefix > max {
        result.add_error(field, format!("prefix {} is out of range 0-{}", prefix, max));
    }
    result
}

pub fn validate_ipv4_prefix_len(prefix: u8, field: &str) -> ValidationResult {
    validate_prefix(prefix, 32, field)
}

pub fn validate_ipv6_prefix_len(prefix: u8, field: &str) -> ValidationResult {
    validate_prefix(prefix, 128, field)
}

/// `start..=end`, where port 0 is accepted but never matches.
pub fn validate_port_range(start: u16, end: u16, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if start > end {
        result.add_error(field, format!("range {}:{} is reversed", start, end));
    }
    if start == 0 {
        result.add_warning(field, "port 0 never matches a packet");
    }
    result
}

/// Six colon-separated hex octets.
pub fn validate_mac(mac: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut octets = 0;
    let well_formed = mac.split(':').all(|octet| {
        octets += 1;
        octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit())
    });
    if !well_formed || octets != 6 {
        result.add_error(field, format!("'{}' is not a MAC address", mac));
    }
    result
}
