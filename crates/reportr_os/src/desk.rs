#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use reportr_kernel_contracts::identity::VerifiedIdentity;
use reportr_kernel_contracts::report::{ReportRecord, ReportSubmission};
use reportr_kernel_contracts::{ContractViolation, UnixTimeSec, Validate};
use reportr_storage::repo::ReportRepo;
use reportr_storage::StorageError;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::export;
use crate::policy::AdminAllowList;
use crate::session::SessionContext;

#[derive(Debug, Error)]
pub enum GateError {
    /// No session, a rejected identity, or a non-admin on an admin operation.
    /// Deliberately carries no cause.
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid report: {0}")]
    Validation(#[from] ContractViolation),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to render export: {0}")]
    Export(#[from] serde_json::Error),
}

/// Submission and export flows over one report repository.
pub struct ReportDesk<R> {
    repo: Arc<Mutex<R>>,
    admins: Arc<AdminAllowList>,
}

impl<R> Clone for ReportDesk<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            admins: self.admins.clone(),
        }
    }
}

impl<R: ReportRepo> ReportDesk<R> {
    pub fn new(repo: R, admins: AdminAllowList) -> Self {
        Self {
            repo: Arc::new(Mutex::new(repo)),
            admins: Arc::new(admins),
        }
    }

    pub fn admins(&self) -> &AdminAllowList {
        &self.admins
    }

    /// Stamps the submission with the session identity and `now`, then appends
    /// it. Success is returned only once the repository accepted the write.
    pub fn submit(
        &self,
        session: &SessionContext,
        submission: ReportSubmission,
        now: UnixTimeSec,
    ) -> Result<ReportRecord, GateError> {
        let reporter = require_identity(session, "submit")?;
        submission.validate()?;
        let record = ReportRecord::v1(reporter.clone(), submission, now)?;
        let mut repo = self.lock_repo()?;
        repo.insert_report_row(record.clone()).map_err(|err| {
            error!(error = %err, "report insert failed");
            GateError::Storage(err)
        })?;
        info!(
            reporter = %record.reporter,
            priority = record.priority,
            "report accepted"
        );
        Ok(record)
    }

    pub fn export_records(&self, session: &SessionContext) -> Result<Vec<ReportRecord>, GateError> {
        let identity = require_identity(session, "export")?;
        if !self.admins.is_admin(identity) {
            warn!(op = "export", "non-admin export refused");
            return Err(GateError::Unauthorized);
        }
        let repo = self.lock_repo()?;
        repo.report_rows().map_err(|err| {
            error!(error = %err, "report scan failed");
            GateError::Storage(err)
        })
    }

    pub fn export_json(&self, session: &SessionContext) -> Result<serde_json::Value, GateError> {
        let records = self.export_records(session)?;
        info!(format = "json", records = records.len(), "reports exported");
        Ok(export::to_json(&records)?)
    }

    pub fn export_csv(&self, session: &SessionContext) -> Result<String, GateError> {
        let records = self.export_records(session)?;
        info!(format = "csv", records = records.len(), "reports exported");
        Ok(export::to_csv(&records))
    }

    fn lock_repo(&self) -> Result<std::sync::MutexGuard<'_, R>, GateError> {
        self.repo.lock().map_err(|_| {
            error!("report repository lock poisoned");
            GateError::Storage(StorageError::Unavailable(
                "report repository lock poisoned".to_string(),
            ))
        })
    }
}

fn require_identity<'a>(
    session: &'a SessionContext,
    op: &'static str,
) -> Result<&'a VerifiedIdentity, GateError> {
    session.get().ok_or_else(|| {
        warn!(op, "unauthenticated call refused");
        GateError::Unauthorized
    })
}
