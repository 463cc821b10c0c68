#![forbid(unsafe_code)]

use reportr_kernel_contracts::identity::{IdentityClaim, TrustedDomain, VerifiedIdentity};
use tracing::warn;

use crate::desk::GateError;

/// Judges the result of the upstream identity exchange against the one
/// trusted organizational domain.
#[derive(Debug, Clone, Default)]
pub struct IdentityVerifier {
    domain: TrustedDomain,
}

impl IdentityVerifier {
    pub fn new(domain: TrustedDomain) -> Self {
        Self { domain }
    }

    pub fn trusted_domain(&self) -> &TrustedDomain {
        &self.domain
    }

    pub fn verify(&self, claim: &IdentityClaim) -> Result<VerifiedIdentity, GateError> {
        VerifiedIdentity::verify(claim, &self.domain).map_err(|violation| {
            warn!(
                domain_hint = %claim.domain_hint,
                trusted_domain = %self.domain.as_str(),
                %violation,
                "identity claim rejected"
            );
            GateError::Unauthorized
        })
    }
}
