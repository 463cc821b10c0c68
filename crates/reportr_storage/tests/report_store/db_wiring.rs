#![forbid(unsafe_code)]

use std::fs;
use std::io::Write;

use reportr_kernel_contracts::identity::{IdentityClaim, TrustedDomain, VerifiedIdentity};
use reportr_kernel_contracts::report::{ReportRecord, ReportSubmission};
use reportr_kernel_contracts::UnixTimeSec;
use reportr_storage::repo::ReportRepo;
use reportr_storage::{ReportStore, StorageError};

fn reporter() -> VerifiedIdentity {
    VerifiedIdentity::verify(
        &IdentityClaim::new("dbw_reporter@choate.edu", "choate.edu"),
        &TrustedDomain::default(),
    )
    .unwrap()
}

fn record(priority: i64, at: i64) -> ReportRecord {
    ReportRecord::v1(
        reporter(),
        ReportSubmission {
            instigators: vec!["Jo".to_string(), "Max".to_string()],
            witnesses: vec!["Ray".to_string()],
            priority,
            description: "locker room, after practice".to_string(),
        },
        UnixTimeSec(at),
    )
    .unwrap()
}

#[test]
fn at_store_db_01_empty_repo_scans_empty() {
    let s = ReportStore::new_in_memory();
    assert!(s.report_rows().unwrap().is_empty());
}

#[test]
fn at_store_db_02_identical_inserts_are_not_deduplicated() {
    let mut s = ReportStore::new_in_memory();
    s.insert_report_row(record(1, 100)).unwrap();
    s.insert_report_row(record(1, 100)).unwrap();
    let rows = s.report_rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], rows[1]);
}

#[test]
fn at_store_db_03_journal_survives_reopen_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/reports.jsonl");
    {
        let mut s = ReportStore::open_journal(&path).unwrap();
        s.insert_report_row(record(3, 100)).unwrap();
        s.insert_report_row(record(1, 200)).unwrap();
    }
    let reopened = ReportStore::open_journal(&path).unwrap();
    let rows = reopened.report_rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].priority, 3);
    assert_eq!(rows[1].submitted_at, UnixTimeSec(200));
    assert_eq!(reopened.journal_path(), Some(path.as_path()));
}

#[test]
fn at_store_db_04_journal_lines_are_versioned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");
    let mut s = ReportStore::open_journal(&path).unwrap();
    s.insert_report_row(record(2, 100)).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let line: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(line["schema_version"], 1);
    assert_eq!(line["record"]["reporter"], "dbw_reporter@choate.edu");
    assert_eq!(line["record"]["witnesses"], serde_json::json!(["Ray"]));
}

#[test]
fn at_store_db_05_corrupt_line_fails_open_with_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");
    {
        let mut s = ReportStore::open_journal(&path).unwrap();
        s.insert_report_row(record(2, 100)).unwrap();
    }
    let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f).unwrap();
    writeln!(f, "{{not json").unwrap();
    drop(f);
    match ReportStore::open_journal(&path) {
        Err(StorageError::CorruptJournal { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected corrupt journal error, got {other:?}"),
    }
}

#[test]
fn at_store_db_06_unknown_schema_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");
    let line = serde_json::json!({ "schema_version": 9, "record": record(1, 1) });
    fs::write(&path, format!("{line}\n")).unwrap();
    let err = ReportStore::open_journal(&path).unwrap_err();
    assert!(err.to_string().contains("unsupported schema_version=9"));
}

#[test]
fn at_store_db_07_torn_final_line_is_dropped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");
    {
        let mut s = ReportStore::open_journal(&path).unwrap();
        s.insert_report_row(record(2, 100)).unwrap();
    }
    let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
    write!(f, "{{\"schema_version\":1,\"rec").unwrap();
    drop(f);

    let mut reopened = ReportStore::open_journal(&path).unwrap();
    assert_eq!(reopened.report_rows().unwrap().len(), 1);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.ends_with('\n'));
    assert!(!text.contains("\"rec\n"));

    reopened.insert_report_row(record(5, 300)).unwrap();
    drop(reopened);
    let rows = ReportStore::open_journal(&path)
        .unwrap()
        .report_rows()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].priority, 5);
}

#[test]
fn at_store_db_08_complete_final_line_without_newline_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");
    let line = serde_json::json!({ "schema_version": 1, "record": record(4, 100) });
    fs::write(&path, line.to_string()).unwrap();

    let mut s = ReportStore::open_journal(&path).unwrap();
    assert_eq!(s.report_rows().unwrap().len(), 1);
    s.insert_report_row(record(6, 200)).unwrap();
    drop(s);

    let rows = ReportStore::open_journal(&path)
        .unwrap()
        .report_rows()
        .unwrap();
    assert_eq!(
        rows.iter().map(|r| r.priority).collect::<Vec<_>>(),
        vec![4, 6]
    );
}

#[test]
fn at_store_db_09_corrupt_line_before_the_tail_still_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");
    let good = serde_json::json!({ "schema_version": 1, "record": record(1, 100) });
    fs::write(&path, format!("{{broken\n{good}\n{{\"schema_version\":1")).unwrap();
    match ReportStore::open_journal(&path) {
        Err(StorageError::CorruptJournal { line, .. }) => assert_eq!(line, 1),
        other => panic!("expected corrupt journal error, got {other:?}"),
    }
}
