//! XLSX report assembly.
//!
//! Fiscal report layout:
//!
//! ```text
//! Sheet: Summary
//! | Month    | Total Reviews | > 30 Days | ≤ 30 Days | Average Review Length | % Reviews ≤ 30 Days |   [bar chart @ G1]
//! | Jul 2024 | 2             | 0         | 2         | 29.00                 | 100.0%              |   [line chart @ G31]
//!
//! Sheet: Jul 2024 (one per fiscal period)
//! | Date Submitted | Development Name | Project No | Review Cycle - ENG | ... | Date Comment Letter Sent | Length of Review |
//! ```
//!
//! The approvals report is a single flat sheet closed by a TOTAL row.

use crate::approvals::{ApprovalReport, ReportFlavor};
use crate::error::Result;
use crate::reports::{PeriodBucket, REVIEW_THRESHOLD_DAYS};
use crate::types::ReviewDetail;
use crate::util::format_number;
use chrono::NaiveDate;
use rust_xlsxwriter::{
    Chart, ChartType, ConditionalFormatCell, ConditionalFormatCellRule, Format, FormatAlign,
    Workbook, Worksheet,
};
use std::collections::HashSet;
use tracing::{info, warn};

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const FISCAL_FILE_NAME: &str = "monthly_review_data.xlsx";

/// Excel refuses longer sheet names.
pub const MAX_SHEET_NAME: usize = 31;
const SUMMARY_SHEET: &str = "Summary";
/// Added to the longest value of a column when sizing it.
const WIDTH_PADDING: usize = 5;
/// Last row (0-based) the review-length highlight covers.
const HIGHLIGHT_LAST_ROW: u32 = 999;

const HEADER_FILL: u32 = 0xB5DBAF;
const EXCEEDS_FILL: u32 = 0xFFC7CE;
const DATE_FORMAT: &str = "yyyy-mm-dd";

const SUMMARY_HEADERS: [&str; 6] = [
    "Month",
    "Total Reviews",
    "> 30 Days",
    "≤ 30 Days",
    "Average Review Length",
    "% Reviews ≤ 30 Days",
];

const DETAIL_HEADERS: [&str; 8] = [
    "Date Submitted",
    "Development Name",
    "Project No",
    "Review Cycle - ENG",
    "Review Cycle - SUR",
    "Review Cycle - PLN",
    "Date Comment Letter Sent",
    "Length of Review",
];
const LENGTH_COL: u16 = 7;

struct Formats {
    header: Format,
    date: Format,
    decimal: Format,
    percent: Format,
    integer: Format,
    total_label: Format,
    total_integer: Format,
    total_decimal: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_font_size(12)
                .set_background_color(HEADER_FILL)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap(),
            date: Format::new().set_num_format(DATE_FORMAT),
            decimal: Format::new().set_num_format("#,##0.00"),
            percent: Format::new().set_num_format("0.0%"),
            integer: Format::new().set_num_format("#,##0"),
            total_label: Format::new().set_bold(),
            total_integer: Format::new().set_bold().set_num_format("#,##0"),
            total_decimal: Format::new().set_bold().set_num_format("#,##0.00"),
        }
    }
}

/// Tracks the longest display string per column.
struct ColumnWidths(Vec<usize>);

impl ColumnWidths {
    fn from_headers(headers: &[&str]) -> Self {
        Self(headers.iter().map(|h| h.chars().count()).collect())
    }

    fn observe(&mut self, col: u16, text: &str) {
        let col = col as usize;
        if col >= self.0.len() {
            self.0.resize(col + 1, 0);
        }
        self.0[col] = self.0[col].max(text.chars().count());
    }

    fn widths(&self) -> Vec<usize> {
        self.0.iter().map(|w| w + WIDTH_PADDING).collect()
    }

    fn apply(&self, sheet: &mut Worksheet) -> Result<()> {
        for (col, width) in self.widths().into_iter().enumerate() {
            sheet.set_column_width(col as u16, width as f64)?;
        }
        Ok(())
    }
}

/// Hands out sheet names that Excel accepts and that never repeat.
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_lowercase());
    }

    pub fn name(&mut self, raw: &str) -> String {
        let cleaned: String = raw
            .chars()
            .map(|c| match c {
                '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
                c => c,
            })
            .collect();
        let cleaned = cleaned.trim_matches('\'');
        let cleaned = if cleaned.is_empty() { "Sheet" } else { cleaned };

        let base: String = cleaned.chars().take(MAX_SHEET_NAME).collect();
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut n = 2;
        loop {
            let suffix = format!(" ({})", n);
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            let candidate = format!("{}{}", cleaned.chars().take(keep).collect::<String>(), suffix);
            if self.used.insert(candidate.to_lowercase()) {
                warn!(label = raw, sheet = %candidate, "sheet name collided after truncation");
                return candidate;
            }
            n += 1;
        }
    }
}

/// Builds the fiscal review workbook.
#[derive(Debug, Clone)]
pub struct ReviewWorkbook {
    pub include_charts: bool,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for ReviewWorkbook {
    fn default() -> Self {
        Self {
            include_charts: true,
            chart_width: 864,
            chart_height: 432,
        }
    }
}

impl ReviewWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_charts(mut self) -> Self {
        self.include_charts = false;
        self
    }

    /// Serialize buckets into workbook bytes.
    pub fn assemble(&self, buckets: &[PeriodBucket]) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let formats = Formats::new();
        let mut namer = SheetNamer::new();
        namer.reserve(SUMMARY_SHEET);

        let summary = workbook.add_worksheet();
        summary.set_name(SUMMARY_SHEET)?;
        self.write_summary(summary, buckets, &formats)?;

        for bucket in buckets {
            let name = namer.name(&bucket.period.label);
            let sheet = workbook.add_worksheet();
            sheet.set_name(&name)?;
            write_details(sheet, &bucket.details, &formats)?;
        }

        let buffer = workbook.save_to_buffer()?;
        info!(sheets = buckets.len() + 1, bytes = buffer.len(), "assembled review workbook");
        Ok(buffer)
    }

    fn write_summary(
        &self,
        sheet: &mut Worksheet,
        buckets: &[PeriodBucket],
        formats: &Formats,
    ) -> Result<()> {
        let mut widths = ColumnWidths::from_headers(&SUMMARY_HEADERS);
        write_header(sheet, &SUMMARY_HEADERS, &formats.header)?;

        for (i, bucket) in buckets.iter().enumerate() {
            let row = i as u32 + 1;
            let s = &bucket.summary;
            sheet.write_string(row, 0, &s.label)?;
            sheet.write_number(row, 1, s.total_reviews as f64)?;
            sheet.write_number(row, 2, s.exceeding as f64)?;
            sheet.write_number(row, 3, s.at_or_under as f64)?;
            sheet.write_number_with_format(row, 4, s.average_length, &formats.decimal)?;
            sheet.write_number_with_format(row, 5, s.at_or_under_ratio, &formats.percent)?;

            widths.observe(0, &s.label);
            widths.observe(1, &s.total_reviews.to_string());
            widths.observe(2, &s.exceeding.to_string());
            widths.observe(3, &s.at_or_under.to_string());
            widths.observe(4, &format!("{:.2}", s.average_length));
            widths.observe(5, &format!("{:.1}%", s.at_or_under_ratio * 100.0));
        }
        widths.apply(sheet)?;
        sheet.set_freeze_panes(1, 0)?;

        if self.include_charts && !buckets.is_empty() {
            let last = buckets.len() as u32;
            sheet.insert_chart(0, 6, &self.breakdown_chart(last))?;
            sheet.insert_chart(30, 6, &self.average_chart(last))?;
        }
        Ok(())
    }

    /// Stacked columns: at-or-under below, exceeding on top.
    fn breakdown_chart(&self, last_row: u32) -> Chart {
        let mut chart = Chart::new(ChartType::ColumnStacked);
        chart
            .add_series()
            .set_name("≤ 30 Days")
            .set_categories((SUMMARY_SHEET, 1, 0, last_row, 0))
            .set_values((SUMMARY_SHEET, 1, 3, last_row, 3));
        chart
            .add_series()
            .set_name("> 30 Days")
            .set_categories((SUMMARY_SHEET, 1, 0, last_row, 0))
            .set_values((SUMMARY_SHEET, 1, 2, last_row, 2));
        chart.title().set_name("Review Duration Breakdown per Month");
        chart.x_axis().set_name("Month");
        chart.y_axis().set_name("Number of Projects");
        chart.set_width(self.chart_width).set_height(self.chart_height);
        chart
    }

    fn average_chart(&self, last_row: u32) -> Chart {
        let mut chart = Chart::new(ChartType::Line);
        chart
            .add_series()
            .set_name("Average Review Length")
            .set_categories((SUMMARY_SHEET, 1, 0, last_row, 0))
            .set_values((SUMMARY_SHEET, 1, 4, last_row, 4));
        chart.title().set_name("Average Review Duration per Month");
        chart.x_axis().set_name("Month");
        chart.y_axis().set_name("Average Days");
        chart.set_width(self.chart_width).set_height(self.chart_height);
        chart
    }
}

fn write_header(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<()> {
    for (col, h) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *h, format)?;
    }
    Ok(())
}

fn write_date(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    date: Option<NaiveDate>,
    format: &Format,
    widths: &mut ColumnWidths,
) -> Result<()> {
    if let Some(d) = date {
        sheet.write_datetime_with_format(row, col, &d, format)?;
        widths.observe(col, &d.format("%Y-%m-%d").to_string());
    }
    Ok(())
}

/// Review-cycle counters are numbers in most exports but pass through as
/// text when they are not.
fn write_passthrough(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<&str>,
    widths: &mut ColumnWidths,
) -> Result<()> {
    let Some(v) = value else {
        return Ok(());
    };
    match v.parse::<f64>() {
        Ok(n) => sheet.write_number(row, col, n)?,
        Err(_) => sheet.write_string(row, col, v)?,
    };
    widths.observe(col, v);
    Ok(())
}

fn write_details(sheet: &mut Worksheet, details: &[ReviewDetail], formats: &Formats) -> Result<()> {
    let mut widths = ColumnWidths::from_headers(&DETAIL_HEADERS);
    write_header(sheet, &DETAIL_HEADERS, &formats.header)?;

    for (i, d) in details.iter().enumerate() {
        let row = i as u32 + 1;
        write_date(sheet, row, 0, d.submitted, &formats.date, &mut widths)?;
        sheet.write_string(row, 1, &d.name)?;
        widths.observe(1, &d.name);
        sheet.write_string(row, 2, &d.project_no)?;
        widths.observe(2, &d.project_no);
        write_passthrough(sheet, row, 3, d.review_cycle_eng.as_deref(), &mut widths)?;
        write_passthrough(sheet, row, 4, d.review_cycle_sur.as_deref(), &mut widths)?;
        write_passthrough(sheet, row, 5, d.review_cycle_pln.as_deref(), &mut widths)?;
        write_date(sheet, row, 6, d.letter_sent, &formats.date, &mut widths)?;
        if let Some(days) = d.review_length {
            sheet.write_number(row, LENGTH_COL, days as f64)?;
            widths.observe(LENGTH_COL, &days.to_string());
        }
    }
    widths.apply(sheet)?;

    let highlight = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::GreaterThan(REVIEW_THRESHOLD_DAYS as i32))
        .set_format(Format::new().set_background_color(EXCEEDS_FILL));
    sheet.add_conditional_format(1, LENGTH_COL, HIGHLIGHT_LAST_ROW, LENGTH_COL, &highlight)?;
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Builds the flat approvals workbook.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalWorkbook {
    pub flavor: ReportFlavor,
}

impl ApprovalWorkbook {
    pub fn new(flavor: ReportFlavor) -> Self {
        Self { flavor }
    }

    pub fn assemble(&self, report: &ApprovalReport) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let formats = Formats::new();
        let columns = self.flavor.columns();

        let mut headers = vec!["Project", "Project No", "Plat Type", "Approval Date"];
        headers.extend(columns.iter().map(|m| m.header()));
        let first_measure = 4u16;

        let sheet = workbook.add_worksheet();
        sheet.set_name(self.flavor.title())?;
        let mut widths = ColumnWidths::from_headers(&headers);
        write_header(sheet, &headers, &formats.header)?;

        for (i, r) in report.rows.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &r.name)?;
            widths.observe(0, &r.name);
            sheet.write_string(row, 1, &r.project_no)?;
            widths.observe(1, &r.project_no);
            if let Some(plat) = &r.plat_type {
                sheet.write_string(row, 2, plat)?;
                widths.observe(2, plat);
            }
            write_date(sheet, row, 3, r.approved, &formats.date, &mut widths)?;

            for (j, (measure, value)) in columns.iter().zip(&r.values).enumerate() {
                let col = first_measure + j as u16;
                if let Some(v) = value {
                    let format = if measure.decimals() > 0 {
                        &formats.decimal
                    } else {
                        &formats.integer
                    };
                    sheet.write_number_with_format(row, col, *v, format)?;
                    widths.observe(col, &format_number(*v, measure.decimals()));
                }
            }
        }

        let total_row = report.rows.len() as u32 + 1;
        sheet.write_string_with_format(total_row, 0, "TOTAL", &formats.total_label)?;
        for (j, (measure, total)) in columns.iter().zip(&report.totals).enumerate() {
            let col = first_measure + j as u16;
            let format = if measure.decimals() > 0 {
                &formats.total_decimal
            } else {
                &formats.total_integer
            };
            sheet.write_number_with_format(total_row, col, *total, format)?;
            widths.observe(col, &format_number(*total, measure.decimals()));
        }

        sheet.write_string(
            total_row + 2,
            0,
            &format!(
                "Matched {} of {} projects",
                report.counts.matched, report.counts.total
            ),
        )?;
        widths.apply(sheet)?;
        sheet.set_freeze_panes(1, 0)?;

        let buffer = workbook.save_to_buffer()?;
        info!(rows = report.rows.len(), bytes = buffer.len(), "assembled approvals workbook");
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::{filter_and_aggregate, ApprovalWindow};
    use crate::calendar::periods;
    use crate::reports::aggregate;
    use crate::types::{DateField, Record};
    use std::collections::HashMap;
    use std::io::{Cursor, Read};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sample_buckets() -> Vec<PeriodBucket> {
        let records = vec![
            Record {
                submitted: Some(date(2024, 7, 1)),
                letter_sent: Some(date(2024, 7, 29)),
                name: "Maple Grove".into(),
                project_no: "P-1".into(),
                review_cycle_eng: Some("1".into()),
                review_cycle_pln: Some("n/a".into()),
                ..Record::default()
            },
            Record {
                submitted: None,
                letter_sent: Some(date(2024, 8, 5)),
                name: "Birch Park".into(),
                project_no: "P-2".into(),
                ..Record::default()
            },
        ];
        aggregate(&records, &periods(7, 2024).unwrap(), DateField::LetterSent)
    }

    /// One XML part of a saved workbook, or `None` when the part is absent.
    fn xlsx_part(bytes: &[u8], part: &str) -> Option<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(part).ok()?;
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        Some(xml)
    }

    fn sheet_names(workbook_xml: &str) -> Vec<String> {
        workbook_xml
            .split("<sheet name=\"")
            .skip(1)
            .filter_map(|rest| rest.split('"').next())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn review_workbook_has_summary_then_one_sheet_per_period() {
        let bytes = ReviewWorkbook::new().assemble(&sample_buckets()).unwrap();
        assert_eq!(bytes[0..2], *b"PK");

        let names = sheet_names(&xlsx_part(&bytes, "xl/workbook.xml").unwrap());
        assert_eq!(names.len(), 13);
        assert_eq!(names[0], "Summary");
        assert_eq!(names[1], "Jul 2024");
        assert_eq!(names[6], "Dec 2024");
        assert_eq!(names[7], "Jan 2025");
        assert_eq!(names[12], "Jun 2025");
    }

    #[test]
    fn detail_sheets_highlight_long_reviews() {
        let bytes = ReviewWorkbook::new().assemble(&sample_buckets()).unwrap();

        let jul = xlsx_part(&bytes, "xl/worksheets/sheet2.xml").unwrap();
        assert!(jul.contains("<conditionalFormatting sqref=\"H2:H1000\">"));
        assert!(jul.contains("operator=\"greaterThan\""));
        assert!(jul.contains("<formula>30</formula>"));
        // Maple Grove: 28 days in column H of the first data row.
        assert!(jul.contains("<c r=\"H2\""));
        assert!(jul.contains("<v>28</v>"));

        let styles = xlsx_part(&bytes, "xl/styles.xml").unwrap();
        assert!(styles.contains("FFC7CE"));
        assert!(styles.contains("formatCode=\"yyyy-mm-dd\""));
    }

    #[test]
    fn summary_charts_are_anchored_at_g1_and_g31() {
        let bytes = ReviewWorkbook::new().assemble(&sample_buckets()).unwrap();
        let drawing = xlsx_part(&bytes, "xl/drawings/drawing1.xml").unwrap();

        assert_eq!(drawing.matches("<xdr:twoCellAnchor").count(), 2);
        let from: Vec<&str> = drawing
            .split("<xdr:from>")
            .skip(1)
            .filter_map(|rest| rest.split("</xdr:from>").next())
            .collect();
        assert_eq!(from.len(), 2);
        assert!(from[0].contains("<xdr:col>6</xdr:col>"));
        assert!(from[0].contains("<xdr:row>0</xdr:row>"));
        assert!(from[1].contains("<xdr:col>6</xdr:col>"));
        assert!(from[1].contains("<xdr:row>30</xdr:row>"));
    }

    #[test]
    fn review_workbook_without_charts_has_no_drawing() {
        let bytes = ReviewWorkbook::new()
            .no_charts()
            .assemble(&sample_buckets())
            .unwrap();
        assert_eq!(sheet_names(&xlsx_part(&bytes, "xl/workbook.xml").unwrap()).len(), 13);
        assert!(xlsx_part(&bytes, "xl/drawings/drawing1.xml").is_none());
    }

    #[test]
    fn approvals_workbook_closes_with_total_row() {
        let records = vec![Record {
            letter_sent: Some(date(2024, 6, 1)),
            name: "Depot Square".into(),
            project_no: "C-1".into(),
            square_feet: Some(5000.0),
            area: Some(2.0),
            category: Some("Commercial".into()),
            ..Record::default()
        }];
        let allowed = ["Commercial".to_string()].into_iter().collect();
        let report = filter_and_aggregate(
            &records,
            &ApprovalWindow::new(2024, 2024).unwrap(),
            &allowed,
            ReportFlavor::Commercial,
            &HashMap::new(),
        );
        let bytes = ApprovalWorkbook::new(ReportFlavor::Commercial)
            .assemble(&report)
            .unwrap();

        let names = sheet_names(&xlsx_part(&bytes, "xl/workbook.xml").unwrap());
        assert_eq!(names, vec!["Commercial Approvals".to_string()]);

        // Header on row 1, the match on row 2, TOTAL right after it.
        let sheet = xlsx_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains("<row r=\"3\""));
        assert!(sheet.contains("<c r=\"A3\""));
        assert!(sheet.contains("<c r=\"E3\""));
        assert!(sheet.contains("<c r=\"F3\""));
        assert!(!sheet.contains("<row r=\"4\""));
        assert!(sheet.contains("<v>5000</v>"));

        let strings = xlsx_part(&bytes, "xl/sharedStrings.xml").unwrap();
        assert!(strings.contains(">TOTAL<"));
        assert!(strings.contains("Matched 1 of 1 projects"));
    }

    #[test]
    fn sheet_names_are_truncated() {
        let mut namer = SheetNamer::new();
        let long = "Fiscal Period Ending In A Very Long Month Name";
        let name = namer.name(long);
        assert_eq!(name.chars().count(), MAX_SHEET_NAME);
        assert!(long.starts_with(&name));
    }

    #[test]
    fn truncated_collisions_get_suffixes() {
        let mut namer = SheetNamer::new();
        let a = namer.name("Quarterly Review Summary For July 2024");
        let b = namer.name("Quarterly Review Summary For July 2025");
        let c = namer.name("Quarterly Review Summary For July 2026");
        assert_ne!(a, b);
        assert!(b.ends_with(" (2)"));
        assert!(c.ends_with(" (3)"));
        assert!(b.chars().count() <= MAX_SHEET_NAME);
    }

    #[test]
    fn reserved_and_forbidden_names() {
        let mut namer = SheetNamer::new();
        namer.reserve("Summary");
        assert_eq!(namer.name("summary"), "summary (2)");
        assert_eq!(namer.name("Q1/Q2 [draft]"), "Q1_Q2 _draft_");
        assert_eq!(namer.name("Jul 2024"), "Jul 2024");
    }

    #[test]
    fn column_widths_use_longest_value_plus_padding() {
        let mut widths = ColumnWidths::from_headers(&["Month", "Total Reviews"]);
        widths.observe(0, "Sep 2024");
        widths.observe(1, "12");
        assert_eq!(widths.widths(), vec![8 + WIDTH_PADDING, 13 + WIDTH_PADDING]);
    }
}
