use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// CSV column headers the review export must carry.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "Date Submitted",
    "Date Comment Letter Sent",
    "Development Name",
    "Project No",
    "Review Cycle - ENG",
    "Review Cycle - SUR",
    "Review Cycle - PLN",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRow {
    #[serde(rename = "Date Submitted")]
    pub date_submitted: Option<String>,
    #[serde(rename = "Date Comment Letter Sent")]
    pub date_letter_sent: Option<String>,
    #[serde(rename = "Development Name")]
    pub development_name: Option<String>,
    #[serde(rename = "Project No")]
    pub project_no: Option<String>,
    #[serde(rename = "Review Cycle - ENG")]
    pub review_cycle_eng: Option<String>,
    #[serde(rename = "Review Cycle - SUR")]
    pub review_cycle_sur: Option<String>,
    #[serde(rename = "Review Cycle - PLN")]
    pub review_cycle_pln: Option<String>,
}

/// One review or portfolio project after normalization.
///
/// `letter_sent` is the comment-letter date for plan reviews and the
/// approval date for portfolio projects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub submitted: Option<NaiveDate>,
    pub letter_sent: Option<NaiveDate>,
    pub name: String,
    pub project_no: String,
    pub review_cycle_eng: Option<String>,
    pub review_cycle_sur: Option<String>,
    pub review_cycle_pln: Option<String>,
    pub single_family_lots: Option<f64>,
    pub townhome_lots: Option<f64>,
    pub multi_family_units: Option<f64>,
    pub area: Option<f64>,
    pub square_feet: Option<f64>,
    pub category: Option<String>,
    pub plat_type: Option<String>,
}

/// Which record date assigns a record to a fiscal period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DateField {
    Submitted,
    #[default]
    LetterSent,
}

impl DateField {
    pub fn of(self, record: &Record) -> Option<NaiveDate> {
        match self {
            DateField::Submitted => record.submitted,
            DateField::LetterSent => record.letter_sent,
        }
    }
}

/// A record as listed on a period's detail sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDetail {
    pub submitted: Option<NaiveDate>,
    pub name: String,
    pub project_no: String,
    pub review_cycle_eng: Option<String>,
    pub review_cycle_sur: Option<String>,
    pub review_cycle_pln: Option<String>,
    pub letter_sent: Option<NaiveDate>,
    /// Whole days from submission to letter; `None` when either date is
    /// missing.
    pub review_length: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    #[serde(rename = "Month")]
    pub label: String,
    #[serde(rename = "Total Reviews")]
    pub total_reviews: usize,
    #[serde(rename = "> 30 Days")]
    pub exceeding: usize,
    #[serde(rename = "≤ 30 Days")]
    pub at_or_under: usize,
    #[serde(rename = "Average Review Length")]
    pub average_length: f64,
    /// Share of scored reviews at or under the threshold, in `[0, 1]`.
    #[serde(rename = "% Reviews ≤ 30 Days")]
    pub at_or_under_ratio: f64,
}

/// Console rendering of a [`PeriodSummary`].
#[derive(Debug, Clone, Tabled)]
pub struct PeriodSummaryRow {
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "Total Reviews")]
    pub total_reviews: String,
    #[tabled(rename = "> 30 Days")]
    pub exceeding: String,
    #[tabled(rename = "≤ 30 Days")]
    pub at_or_under: String,
    #[tabled(rename = "Average Review Length")]
    pub average_length: String,
    #[tabled(rename = "% Reviews ≤ 30 Days")]
    pub ratio: String,
}

/// One matched project projected for the approvals table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApprovalRow {
    pub name: String,
    pub project_no: String,
    pub plat_type: Option<String>,
    pub approved: Option<NaiveDate>,
    /// Projected numeric columns in [`crate::approvals::ReportFlavor::columns`]
    /// order, kept exactly as provided.
    pub values: Vec<Option<f64>>,
}

/// Console rendering of an approvals row.
#[derive(Debug, Clone, Tabled)]
pub struct ApprovalPreviewRow {
    #[tabled(rename = "Project")]
    pub name: String,
    #[tabled(rename = "Project No")]
    pub project_no: String,
    #[tabled(rename = "Plat Type")]
    pub plat_type: String,
    #[tabled(rename = "Values")]
    pub values: String,
}
