#![forbid(unsafe_code)]

use reportr_kernel_contracts::report::{ReportRecord, REPORT_RECORD_FIELDS};

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

const SEQUENCE_SEPARATOR: &str = " ";

/// Typed view of one record field, as seen by the tabular export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldValue<'a> {
    Text(&'a str),
    Integer(i64),
    Sequence(&'a [String]),
}

/// Cells in [`REPORT_RECORD_FIELDS`] order.
fn record_fields(record: &ReportRecord) -> [FieldValue<'_>; REPORT_RECORD_FIELDS.len()] {
    [
        FieldValue::Text(record.reporter.as_str()),
        FieldValue::Sequence(&record.instigators),
        FieldValue::Sequence(&record.witnesses),
        FieldValue::Integer(record.priority),
        FieldValue::Text(&record.description),
        FieldValue::Integer(record.submitted_at.0),
    ]
}

/// Structural JSON export: the record list as-is.
pub fn to_json(records: &[ReportRecord]) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(records)
}

/// Flattened CSV export.
///
/// Sequence fields are joined with a single space, so an element that itself
/// contains a space cannot be split back out. An empty input yields the header
/// line alone.
pub fn to_csv(records: &[ReportRecord]) -> String {
    let mut out = String::new();
    push_row(&mut out, REPORT_RECORD_FIELDS.iter().copied());
    for record in records {
        let cells: Vec<String> = record_fields(record).into_iter().map(flatten).collect();
        push_row(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn flatten(value: FieldValue<'_>) -> String {
    match value {
        FieldValue::Text(s) => s.to_string(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Sequence(items) => items.join(SEQUENCE_SEPARATOR),
    }
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_cell(out, cell);
    }
    out.push_str("\r\n");
}

fn push_cell(out: &mut String, cell: &str) {
    if cell.contains(&[',', '"', '\r', '\n'][..]) {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reportr_kernel_contracts::identity::{IdentityClaim, TrustedDomain, VerifiedIdentity};
    use reportr_kernel_contracts::report::ReportSubmission;
    use reportr_kernel_contracts::UnixTimeSec;

    fn record(
        instigators: Vec<String>,
        witnesses: Vec<String>,
        description: &str,
    ) -> ReportRecord {
        let reporter = VerifiedIdentity::verify(
            &IdentityClaim::new("r@choate.edu", "choate.edu"),
            &TrustedDomain::default(),
        )
        .unwrap();
        ReportRecord::v1(
            reporter,
            ReportSubmission {
                instigators,
                witnesses,
                priority: 4,
                description: description.to_string(),
            },
            UnixTimeSec(1_700_000_000),
        )
        .unwrap()
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn at_export_01_empty_csv_is_header_only() {
        assert_eq!(
            to_csv(&[]),
            "reporter,instigators,witnesses,priority,description,submitted_at\r\n"
        );
    }

    #[test]
    fn at_export_02_sequences_joined_scalars_pass_through() {
        let csv = to_csv(&[record(names(&["Sam", "Kit"]), names(&[]), "shoving")]);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "r@choate.edu,Sam Kit,,4,shoving,1700000000");
        assert_eq!(lines[2], "");
    }

    #[test]
    fn at_export_03_special_characters_are_quoted() {
        let csv = to_csv(&[record(
            names(&["O'Neil, Jr."]),
            names(&["Ana"]),
            "said \"stop\"\nthen left",
        )]);
        assert!(csv.contains(",\"O'Neil, Jr.\",Ana,4,\"said \"\"stop\"\"\nthen left\",1700000000\r\n"));
    }

    #[test]
    fn at_export_04_rows_keep_input_order() {
        let csv = to_csv(&[
            record(names(&["A"]), names(&[]), "first"),
            record(names(&["B"]), names(&[]), "second"),
        ]);
        let first = csv.find("first").unwrap();
        let second = csv.find("second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn at_export_05_json_is_structural() {
        let value = to_json(&[record(names(&["A", "B"]), names(&["C"]), "d")]).unwrap();
        assert_eq!(value[0]["instigators"], serde_json::json!(["A", "B"]));
        assert_eq!(value[0]["priority"], 4);
        assert_eq!(value[0]["submitted_at"], 1_700_000_000);
        assert_eq!(value[0]["reporter"], "r@choate.edu");
        assert_eq!(to_json(&[]).unwrap(), serde_json::json!([]));
    }

    #[test]
    fn at_export_07_row_cells_line_up_with_header() {
        let r = record(names(&["A"]), names(&[]), "d");
        assert_eq!(
            record_fields(&r)[0],
            FieldValue::Text("r@choate.edu")
        );
        assert_eq!(record_fields(&r)[3], FieldValue::Integer(4));
        let csv = to_csv(&[r]);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(
            lines[0].split(',').count(),
            lines[1].split(',').count()
        );
    }

    #[test]
    fn at_export_08_spaced_element_does_not_split_back() {
        let csv = to_csv(&[record(names(&["Mary Ann"]), names(&["Li", "Bo"]), "d")]);
        let row = csv.split("\r\n").nth(1).unwrap();
        let cells: Vec<&str> = row.split(',').collect();
        assert_eq!(cells[1], "Mary Ann");
        let instigators: Vec<&str> = cells[1].split(' ').collect();
        assert_eq!(instigators, vec!["Mary", "Ann"]);
        let witnesses: Vec<&str> = cells[2].split(' ').collect();
        assert_eq!(witnesses, vec!["Li", "Bo"]);
    }

    proptest! {
        #[test]
        fn at_export_06_space_free_sequences_split_back(
            instigators in prop::collection::vec("[A-Za-z]{1,8}", 0..6),
            witnesses in prop::collection::vec("[A-Za-z]{1,8}", 0..6),
        ) {
            let csv = to_csv(&[record(instigators.clone(), witnesses.clone(), "d")]);
            let row = csv.split("\r\n").nth(1).unwrap();
            let cells: Vec<&str> = row.split(',').collect();
            let split = |cell: &str| -> Vec<String> {
                if cell.is_empty() {
                    Vec::new()
                } else {
                    cell.split(' ').map(str::to_string).collect()
                }
            };
            prop_assert_eq!(split(cells[1]), instigators);
            prop_assert_eq!(split(cells[2]), witnesses);
        }
    }
}
