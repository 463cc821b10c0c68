#![forbid(unsafe_code)]

use crate::common::validate_text;
use crate::identity::VerifiedIdentity;
use crate::{ContractViolation, SchemaVersion, UnixTimeSec, Validate};

pub const REPORT_RECORD_SCHEMA_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_PARTICIPANTS: usize = 64;
pub const MAX_PARTICIPANT_NAME_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 8192;

/// Field names of a [`ReportRecord`] in serialization order.
pub const REPORT_RECORD_FIELDS: [&str; 6] = [
    "reporter",
    "instigators",
    "witnesses",
    "priority",
    "description",
    "submitted_at",
];

/// Client-supplied body of a report. The reporter is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSubmission {
    pub instigators: Vec<String>,
    pub witnesses: Vec<String>,
    pub priority: i64,
    pub description: String,
}

impl Validate for ReportSubmission {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_participants("report_submission.instigators", &self.instigators)?;
        validate_participants("report_submission.witnesses", &self.witnesses)?;
        validate_text(
            "report_submission.description",
            &self.description,
            MAX_DESCRIPTION_LEN,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReportRecord {
    pub reporter: VerifiedIdentity,
    pub instigators: Vec<String>,
    pub witnesses: Vec<String>,
    pub priority: i64,
    pub description: String,
    pub submitted_at: UnixTimeSec,
}

impl ReportRecord {
    pub fn v1(
        reporter: VerifiedIdentity,
        submission: ReportSubmission,
        submitted_at: UnixTimeSec,
    ) -> Result<Self, ContractViolation> {
        let ReportSubmission {
            instigators,
            witnesses,
            priority,
            description,
        } = submission;
        let record = Self {
            reporter,
            instigators,
            witnesses,
            priority,
            description,
            submitted_at,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for ReportRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.reporter.validate()?;
        validate_participants("report_record.instigators", &self.instigators)?;
        validate_participants("report_record.witnesses", &self.witnesses)?;
        validate_text(
            "report_record.description",
            &self.description,
            MAX_DESCRIPTION_LEN,
        )?;
        if self.submitted_at.0 <= 0 {
            return Err(ContractViolation::InvalidValue {
                field: "report_record.submitted_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

fn validate_participants(field: &'static str, names: &[String]) -> Result<(), ContractViolation> {
    if names.len() > MAX_PARTICIPANTS {
        return Err(ContractViolation::TooManyEntries {
            field,
            max: MAX_PARTICIPANTS,
            got: names.len(),
        });
    }
    for name in names {
        validate_text(field, name, MAX_PARTICIPANT_NAME_LEN)?;
    }
    Ok(())
}
