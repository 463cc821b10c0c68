#![forbid(unsafe_code)]

pub mod repo;
pub mod report_store;

pub use report_store::{ReportStore, StorageError};
