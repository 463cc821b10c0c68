#![forbid(unsafe_code)]

use reportr_kernel_contracts::report::ReportRecord;

use crate::report_store::{ReportStore, StorageError};

/// Typed repository interface for append-only report persistence.
///
/// Rows are insert-only and readable only by full scan, in insertion order.
pub trait ReportRepo {
    fn insert_report_row(&mut self, record: ReportRecord) -> Result<(), StorageError>;
    fn report_rows(&self) -> Result<Vec<ReportRecord>, StorageError>;
}

impl ReportRepo for ReportStore {
    fn insert_report_row(&mut self, record: ReportRecord) -> Result<(), StorageError> {
        self.append_report(record)
    }

    fn report_rows(&self) -> Result<Vec<ReportRecord>, StorageError> {
        Ok(self.rows().to_vec())
    }
}
