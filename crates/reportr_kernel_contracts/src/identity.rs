#![forbid(unsafe_code)]

use crate::common::validate_text;
use crate::{ContractViolation, Validate};

pub const DEFAULT_TRUSTED_DOMAIN: &str = "choate.edu";

/// Result of the upstream identity exchange, before any trust decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub email: String,
    pub domain_hint: String,
}

impl IdentityClaim {
    pub fn new(email: impl Into<String>, domain_hint: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            domain_hint: domain_hint.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustedDomain(String);

impl TrustedDomain {
    pub fn new(domain: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(domain.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The suffix every trusted email must carry, e.g. `@choate.edu`.
    pub fn email_suffix(&self) -> String {
        format!("@{}", self.0)
    }
}

impl Default for TrustedDomain {
    fn default() -> Self {
        Self(DEFAULT_TRUSTED_DOMAIN.to_string())
    }
}

impl Validate for TrustedDomain {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("trusted_domain", &self.0, 253)?;
        if !self.0.is_ascii() {
            return Err(ContractViolation::InvalidValue {
                field: "trusted_domain",
                reason: "must be ASCII",
            });
        }
        if self.0.contains('@') || self.0.chars().any(char::is_whitespace) {
            return Err(ContractViolation::InvalidValue {
                field: "trusted_domain",
                reason: "must be a bare domain",
            });
        }
        if !self.0.contains('.') {
            return Err(ContractViolation::InvalidValue {
                field: "trusted_domain",
                reason: "must contain a dot",
            });
        }
        if self.0.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ContractViolation::InvalidValue {
                field: "trusted_domain",
                reason: "must be lower-case",
            });
        }
        Ok(())
    }
}

/// An email confirmed to belong to the trusted domain.
///
/// Only [`VerifiedIdentity::verify`] mints new values; deserialization exists so
/// stored reports can be replayed.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct VerifiedIdentity(String);

impl VerifiedIdentity {
    pub fn verify(claim: &IdentityClaim, domain: &TrustedDomain) -> Result<Self, ContractViolation> {
        if claim.domain_hint != domain.as_str() {
            return Err(ContractViolation::InvalidValue {
                field: "identity_claim.domain_hint",
                reason: "does not match trusted domain",
            });
        }
        let Some(local) = claim.email.strip_suffix(&domain.email_suffix()) else {
            return Err(ContractViolation::InvalidValue {
                field: "identity_claim.email",
                reason: "does not end with trusted domain",
            });
        };
        if local.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "identity_claim.email",
                reason: "local part must not be empty",
            });
        }
        let v = Self(claim.email.clone());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for VerifiedIdentity {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("verified_identity", &self.0, 320)?;
        match self.0.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(ContractViolation::InvalidValue {
                field: "verified_identity",
                reason: "must be an email address",
            }),
        }
    }
}

impl std::fmt::Display for VerifiedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
