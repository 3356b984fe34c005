//! Approval-window filter for the portfolio report.
//!
//! Projects approved within a calendar-year window whose zoning is on an
//! allow-list are projected onto a flavor-specific set of numeric columns
//! and summed into a TOTAL row.

use crate::error::{ReportError, Result};
use crate::loader::{from_project, FieldNames};
use crate::portfolio::Project;
use crate::types::{ApprovalPreviewRow, ApprovalRow, Record};
use crate::util::format_number;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFlavor {
    Residential,
    Commercial,
}

/// A numeric column of the approvals table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    SingleFamilyLots,
    TownhomeLots,
    MultiFamilyUnits,
    Area,
    SquareFeet,
}

impl Measure {
    pub fn header(self) -> &'static str {
        match self {
            Measure::SingleFamilyLots => "Single-Family Lots",
            Measure::TownhomeLots => "Townhome Lots",
            Measure::MultiFamilyUnits => "Multi-Family Units",
            Measure::Area => "Acreage",
            Measure::SquareFeet => "Square Feet",
        }
    }

    /// Area is fractional; everything else is a whole count.
    pub fn decimals(self) -> usize {
        match self {
            Measure::Area => 2,
            _ => 0,
        }
    }

    pub fn of(self, record: &Record) -> Option<f64> {
        match self {
            Measure::SingleFamilyLots => record.single_family_lots,
            Measure::TownhomeLots => record.townhome_lots,
            Measure::MultiFamilyUnits => record.multi_family_units,
            Measure::Area => record.area,
            Measure::SquareFeet => record.square_feet,
        }
    }
}

impl ReportFlavor {
    pub fn columns(self) -> &'static [Measure] {
        match self {
            ReportFlavor::Residential => &[
                Measure::SingleFamilyLots,
                Measure::TownhomeLots,
                Measure::MultiFamilyUnits,
                Measure::Area,
            ],
            ReportFlavor::Commercial => &[Measure::SquareFeet, Measure::Area],
        }
    }

    /// Zoning categories reported when the caller does not choose any.
    pub fn default_categories(self) -> &'static [&'static str] {
        match self {
            ReportFlavor::Residential => &[
                "Residential",
                "Single-Family Residential",
                "Townhome",
                "Multi-Family Residential",
                "Mixed Use",
            ],
            ReportFlavor::Commercial => &["Commercial", "Office", "Industrial", "Mixed Use"],
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ReportFlavor::Residential => "residential_approvals.xlsx",
            ReportFlavor::Commercial => "commercial_approvals.xlsx",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ReportFlavor::Residential => "Residential Approvals",
            ReportFlavor::Commercial => "Commercial Approvals",
        }
    }
}

/// Inclusive window `[year_start-01-01, year_end-12-31]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ApprovalWindow {
    pub fn new(year_start: i32, year_end: i32) -> Result<Self> {
        if year_start > year_end {
            return Err(ReportError::Config(format!(
                "year window starts after it ends ({} > {})",
                year_start, year_end
            )));
        }
        let start = NaiveDate::from_ymd_opt(year_start, 1, 1);
        let end = NaiveDate::from_ymd_opt(year_end, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(ReportError::Config(format!(
                "year window {}..={} is out of range",
                year_start, year_end
            ))),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub total: usize,
    pub matched: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalReport {
    pub rows: Vec<ApprovalRow>,
    /// Grand sums in [`ReportFlavor::columns`] order.
    pub totals: Vec<f64>,
    pub counts: MatchCounts,
    /// Expected custom fields that were absent across all projects.
    pub missing_fields: usize,
}

/// Project number → plat type, built from a separate project collection.
pub fn build_plat_lookup(projects: &[Project], names: &FieldNames) -> HashMap<String, String> {
    let mut lookup = HashMap::new();
    for p in projects {
        let number = p.text(&names.project_number).map(str::trim);
        let plat = p.text(&names.plat_type).map(str::trim);
        if let (Some(number), Some(plat)) = (number, plat) {
            if !number.is_empty() && !plat.is_empty() {
                lookup.insert(number.to_string(), plat.to_string());
            }
        }
    }
    debug!(entries = lookup.len(), "built plat type lookup");
    lookup
}

/// Filter records to the window and allow-list and accumulate totals.
///
/// `plat_lookup` must be complete before this is called; the record's own
/// plat type is used only when the lookup has no entry.
pub fn filter_and_aggregate(
    records: &[Record],
    window: &ApprovalWindow,
    allowed: &HashSet<String>,
    flavor: ReportFlavor,
    plat_lookup: &HashMap<String, String>,
) -> ApprovalReport {
    let columns = flavor.columns();
    let mut totals = vec![0.0; columns.len()];
    let mut rows = Vec::new();

    for r in records {
        let in_window = r.letter_sent.map_or(false, |d| window.contains(d));
        let allowed_category = r
            .category
            .as_deref()
            .map_or(false, |c| allowed.contains(c));
        if !(in_window && allowed_category) {
            continue;
        }

        let values: Vec<Option<f64>> = columns.iter().map(|m| m.of(r)).collect();
        for (total, value) in totals.iter_mut().zip(&values) {
            *total += value.unwrap_or(0.0);
        }

        rows.push(ApprovalRow {
            name: r.name.clone(),
            project_no: r.project_no.clone(),
            plat_type: plat_lookup
                .get(&r.project_no)
                .cloned()
                .or_else(|| r.plat_type.clone()),
            approved: r.letter_sent,
            values,
        });
    }

    let counts = MatchCounts {
        total: records.len(),
        matched: rows.len(),
    };
    info!(total = counts.total, matched = counts.matched, ?flavor, "filtered approvals");

    ApprovalReport {
        rows,
        totals,
        counts,
        missing_fields: 0,
    }
}

/// Portfolio entry point: extract records from projects, then filter.
pub fn approvals_from_projects(
    projects: &[Project],
    plat_projects: &[Project],
    names: &FieldNames,
    window: &ApprovalWindow,
    allowed: &HashSet<String>,
    flavor: ReportFlavor,
) -> ApprovalReport {
    let plat_lookup = build_plat_lookup(plat_projects, names);

    let mut missing_fields = 0usize;
    let records: Vec<Record> = projects
        .iter()
        .map(|p| {
            let (record, missing) = from_project(p, names);
            missing_fields += missing;
            record
        })
        .collect();
    if missing_fields > 0 {
        info!(missing_fields, "custom fields absent; treated as blank");
    }

    let mut report = filter_and_aggregate(&records, window, allowed, flavor, &plat_lookup);
    report.missing_fields = missing_fields;
    report
}

fn render_values(pairs: impl Iterator<Item = (Measure, Option<f64>)>) -> String {
    pairs
        .map(|(m, v)| match v {
            Some(v) => format!("{}={}", m.header(), format_number(v, m.decimals())),
            None => format!("{}=", m.header()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn preview_rows(report: &ApprovalReport, flavor: ReportFlavor) -> Vec<ApprovalPreviewRow> {
    let columns = flavor.columns();
    let mut out: Vec<ApprovalPreviewRow> = report
        .rows
        .iter()
        .map(|row| ApprovalPreviewRow {
            name: row.name.clone(),
            project_no: row.project_no.clone(),
            plat_type: row.plat_type.clone().unwrap_or_default(),
            values: render_values(columns.iter().copied().zip(row.values.iter().copied())),
        })
        .collect();
    out.push(ApprovalPreviewRow {
        name: "TOTAL".into(),
        project_no: String::new(),
        plat_type: String::new(),
        values: render_values(columns.iter().copied().zip(report.totals.iter().map(|t| Some(*t)))),
    });
    out
}
