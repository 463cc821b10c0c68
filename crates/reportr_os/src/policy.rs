#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use reportr_kernel_contracts::identity::VerifiedIdentity;
use reportr_kernel_contracts::ContractViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllowListError {
    #[error("failed to read admin allow-list '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse admin allow-list '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid admin allow-list entry: {0}")]
    Invalid(#[from] ContractViolation),
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowListFile {
    admins: Vec<String>,
}

/// Identities permitted to export every report. Fixed for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowList {
    admins: BTreeSet<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(admins: I) -> Result<Self, ContractViolation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = BTreeSet::new();
        for raw in admins {
            let admin = raw.as_ref().trim();
            if admin.is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "admin_allow_list.admins",
                    reason: "must not contain blank entries",
                });
            }
            if !admin.contains('@') {
                return Err(ContractViolation::InvalidValue {
                    field: "admin_allow_list.admins",
                    reason: "entries must be email addresses",
                });
            }
            out.insert(admin.to_string());
        }
        Ok(Self { admins: out })
    }

    /// Reads `{"admins": [...]}` from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AllowListError> {
        let path = path.as_ref();
        let payload = fs::read(path).map_err(|source| AllowListError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: AllowListFile =
            serde_json::from_slice(&payload).map_err(|source| AllowListError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file.admins)?)
    }

    pub fn is_admin(&self, identity: &VerifiedIdentity) -> bool {
        self.admins.contains(identity.as_str())
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}
