use crate::error::{ReportError, Result};
use crate::portfolio::Project;
use crate::types::{RawRow, Record, REQUIRED_COLUMNS};
use crate::util::{non_empty, parse_date_safe};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    /// Date cells present but not parseable; those dates are left missing.
    pub unparsed_dates: usize,
    /// Rows the CSV reader could not decode at all.
    pub skipped_rows: usize,
}

pub fn load_csv(path: impl AsRef<Path>) -> Result<(Vec<Record>, LoadReport)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    info!(path = %path.display(), "loading review export");
    load_from_reader(file)
}

pub fn load_from_reader<R: Read>(reader: R) -> Result<(Vec<Record>, LoadReport)> {
    // Headers are matched by name below, so stray padding must not count.
    let rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);
    read_rows(rdr)
}

fn read_rows<R: Read>(mut rdr: csv::Reader<R>) -> Result<(Vec<Record>, LoadReport)> {
    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == **c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ReportError::MissingColumns(missing));
    }

    let mut rows = Vec::new();
    let mut skipped_rows = 0usize;
    for (idx, result) in rdr.deserialize::<RawRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                debug!(row = idx + 2, error = %e, "skipping undecodable row");
                skipped_rows += 1;
            }
        }
    }

    let (records, mut report) = normalize(rows);
    report.total_rows += skipped_rows;
    report.skipped_rows = skipped_rows;
    Ok((records, report))
}

/// Turn raw export rows into records. Unparseable dates become `None`; every
/// other field passes through as text.
pub fn normalize(rows: Vec<RawRow>) -> (Vec<Record>, LoadReport) {
    let mut report = LoadReport {
        total_rows: rows.len(),
        ..LoadReport::default()
    };

    let records = rows
        .into_iter()
        .map(|row| {
            let submitted = parse_date_safe(row.date_submitted.as_deref());
            let letter_sent = parse_date_safe(row.date_letter_sent.as_deref());
            if submitted.is_none() && non_empty(row.date_submitted.as_deref()).is_some() {
                report.unparsed_dates += 1;
            }
            if letter_sent.is_none() && non_empty(row.date_letter_sent.as_deref()).is_some() {
                report.unparsed_dates += 1;
            }

            Record {
                submitted,
                letter_sent,
                name: non_empty(row.development_name.as_deref()).unwrap_or_default(),
                project_no: non_empty(row.project_no.as_deref()).unwrap_or_default(),
                review_cycle_eng: non_empty(row.review_cycle_eng.as_deref()),
                review_cycle_sur: non_empty(row.review_cycle_sur.as_deref()),
                review_cycle_pln: non_empty(row.review_cycle_pln.as_deref()),
                ..Record::default()
            }
        })
        .collect();

    (records, report)
}

/// Custom-field names used to pull a [`Record`] out of a portfolio project.
#[derive(Debug, Clone)]
pub struct FieldNames {
    pub approval_date: String,
    pub submitted_date: String,
    pub project_number: String,
    pub category: String,
    pub plat_type: String,
    pub single_family_lots: String,
    pub townhome_lots: String,
    pub multi_family_units: String,
    pub area: String,
    pub square_feet: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            approval_date: "Approval Date".into(),
            submitted_date: "Date Submitted".into(),
            project_number: "Project Number".into(),
            category: "Zoning".into(),
            plat_type: "Plat Type".into(),
            single_family_lots: "Single-Family Lots".into(),
            townhome_lots: "Townhome Lots".into(),
            multi_family_units: "Multi-Family Units".into(),
            area: "Acreage".into(),
            square_feet: "Square Feet".into(),
        }
    }
}

/// Field-by-name extraction of a portfolio project.
///
/// Returns the record and how many expected fields were absent from the
/// project. Absent fields are `None`, never an error.
pub fn from_project(project: &Project, names: &FieldNames) -> (Record, usize) {
    let expected = [
        &names.approval_date,
        &names.project_number,
        &names.category,
        &names.single_family_lots,
        &names.townhome_lots,
        &names.multi_family_units,
        &names.area,
        &names.square_feet,
    ];
    let missing = expected
        .iter()
        .filter(|name| project.field(name).is_none())
        .count();
    if missing > 0 {
        debug!(
            project = %project.name,
            gid = %project.gid,
            missing,
            "project lacks expected custom fields"
        );
    }

    let record = Record {
        submitted: project.date(&names.submitted_date),
        letter_sent: project.date(&names.approval_date),
        name: project.name.trim().to_string(),
        project_no: project
            .text(&names.project_number)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        single_family_lots: project.number(&names.single_family_lots),
        townhome_lots: project.number(&names.townhome_lots),
        multi_family_units: project.number(&names.multi_family_units),
        area: project.number(&names.area),
        square_feet: project.number(&names.square_feet),
        category: project.text(&names.category).and_then(|s| non_empty(Some(s))),
        plat_type: project.text(&names.plat_type).and_then(|s| non_empty(Some(s))),
        ..Record::default()
    };
    (record, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::parse_projects;
    use chrono::NaiveDate;

    const HEADER: &str = "Date Submitted,Development Name,Project No,Review Cycle - ENG,Review Cycle - SUR,Review Cycle - PLN,Date Comment Letter Sent\n";

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn loads_rows_and_keeps_bad_dates_as_missing() {
        let csv = format!(
            "{}{}{}",
            HEADER,
            "2024-07-01,Maple Grove,P-1,1,1,2,2024-07-29\n",
            "not a date,Birch Park,P-2,2,,1,8/5/2024\n"
        );
        let (records, report) = load_from_reader(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.unparsed_dates, 1);

        assert_eq!(records[0].submitted, Some(date(2024, 7, 1)));
        assert_eq!(records[0].letter_sent, Some(date(2024, 7, 29)));
        assert_eq!(records[0].name, "Maple Grove");
        assert_eq!(records[0].review_cycle_pln.as_deref(), Some("2"));

        assert_eq!(records[1].submitted, None);
        assert_eq!(records[1].letter_sent, Some(date(2024, 8, 5)));
        assert_eq!(records[1].review_cycle_sur, None);
    }

    #[test]
    fn blank_dates_are_not_counted_as_unparsed() {
        let csv = format!("{}{}", HEADER, ",Cedar Hill,P-3,1,1,1,\n");
        let (records, report) = load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(records[0].submitted, None);
        assert_eq!(records[0].letter_sent, None);
        assert_eq!(report.unparsed_dates, 0);
    }

    #[test]
    fn padded_headers_still_map_to_fields() {
        let csv = concat!(
            " Date Submitted ,Development Name,Project No,Review Cycle - ENG,",
            "Review Cycle - SUR,Review Cycle - PLN, Date Comment Letter Sent\n",
            "2024-07-01,Maple Grove,P-1,1,1,2,2024-07-29\n"
        );
        let (records, report) = load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(records[0].submitted, Some(date(2024, 7, 1)));
        assert_eq!(records[0].letter_sent, Some(date(2024, 7, 29)));
        assert_eq!(report.unparsed_dates, 0);
    }

    #[test]
    fn two_digit_year_dates_give_sane_lengths() {
        let csv = format!("{}{}", HEADER, "7/1/24,Maple Grove,P-1,1,1,2,7/29/24\n");
        let (records, _) = load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(records[0].submitted, Some(date(2024, 7, 1)));
        assert_eq!(records[0].letter_sent, Some(date(2024, 7, 29)));
    }

    #[test]
    fn missing_columns_fail_fast() {
        let csv = "Date Submitted,Development Name\n2024-07-01,Maple\n";
        match load_from_reader(csv.as_bytes()) {
            Err(ReportError::MissingColumns(cols)) => {
                assert!(cols.contains(&"Project No".to_string()));
                assert!(cols.contains(&"Date Comment Letter Sent".to_string()));
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn extracts_record_from_project_fields() {
        let json = r#"[{"gid": "1", "name": " Harbor Point ", "custom_fields": [
            {"name": "Approval Date", "type": "date", "date_value": {"date": "2024-05-02"}},
            {"name": "Zoning", "type": "enum", "enum_value": {"name": "Residential"}},
            {"name": "Project Number", "type": "text", "text_value": "R-9"},
            {"name": "Single-Family Lots", "type": "number", "number_value": 42},
            {"name": "Acreage", "type": "number", "number_value": 12.5}
        ]}]"#;
        let projects = parse_projects(json).unwrap();
        let (record, missing) = from_project(&projects[0], &FieldNames::default());

        assert_eq!(record.name, "Harbor Point");
        assert_eq!(record.project_no, "R-9");
        assert_eq!(record.letter_sent, Some(date(2024, 5, 2)));
        assert_eq!(record.category.as_deref(), Some("Residential"));
        assert_eq!(record.single_family_lots, Some(42.0));
        assert_eq!(record.townhome_lots, None);
        assert_eq!(record.area, Some(12.5));
        // townhome lots, multi-family units, square feet
        assert_eq!(missing, 3);
    }
}
