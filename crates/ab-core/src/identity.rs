//! # Identity Guard
//!
//! Keeps ordinary submissions from posing as the operator. The check is a
//! case-sensitive substring match: `"alice-admin"` is refused when the
//! reserved name is `"admin"`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// The reserved display name. Never empty, since an empty name would be a
/// substring of every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperatorName(String);

impl OperatorName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::validation("operator name must not be empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OperatorName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<OperatorName> for String {
    fn from(value: OperatorName) -> Self {
        value.0
    }
}

impl fmt::Display for OperatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejects `submitted_name` when it contains `reserved_name`.
/// An empty submission is accepted; the store default applies later.
pub fn validate_name(submitted_name: &str, reserved_name: &str) -> Result<()> {
    if !submitted_name.is_empty() && submitted_name.contains(reserved_name) {
        return Err(AppError::Forbidden(format!(
            "display name may not contain the reserved name `{reserved_name}`"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct IdentityGuard {
    reserved: OperatorName,
}

impl IdentityGuard {
    pub fn new(reserved: OperatorName) -> Self {
        Self { reserved }
    }

    pub fn reserved(&self) -> &OperatorName {
        &self.reserved
    }

    /// Returns the name to store: `None` means "use the store default".
    pub fn check(&self, submitted: Option<&str>) -> Result<Option<String>> {
        match submitted {
            None | Some("") => Ok(None),
            Some(name) => {
                validate_name(name, self.reserved.as_str())?;
                Ok(Some(name.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_of_reserved_name_is_rejected() {
        let err = validate_name("alice-admin", "admin").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(validate_name("admin", "admin").is_err());
    }

    #[test]
    fn unrelated_or_differently_cased_names_pass() {
        assert!(validate_name("alice", "admin").is_ok());
        assert!(validate_name("ADMIN", "admin").is_ok());
        assert!(validate_name("", "admin").is_ok());
    }

    #[test]
    fn guard_maps_empty_to_default() {
        let guard = IdentityGuard::new(OperatorName::new("jerry").unwrap());
        assert_eq!(guard.check(None).unwrap(), None);
        assert_eq!(guard.check(Some("")).unwrap(), None);
        assert_eq!(guard.check(Some("bob")).unwrap().as_deref(), Some("bob"));
        assert!(guard.check(Some("not-jerry")).is_err());
    }

    #[test]
    fn blank_operator_name_is_refused() {
        assert!(OperatorName::new("").is_err());
        assert!(OperatorName::new("   ").is_err());
        assert!(serde_json::from_str::<OperatorName>("\"\"").is_err());
        let op: OperatorName = serde_json::from_str("\"root\"").unwrap();
        assert_eq!(op.as_str(), "root");
    }
}
