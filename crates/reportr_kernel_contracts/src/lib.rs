#![forbid(unsafe_code)]

pub mod common;
pub mod identity;
pub mod report;

pub use common::{ContractViolation, SchemaVersion, UnixTimeSec, Validate};
