// Entry point and command-line flow.
//
// Two reports, one subcommand each:
// - `fiscal` buckets a review CSV export into fiscal months and writes the
//   summary + per-month workbook.
// - `approvals` filters an exported portfolio by approval year and zoning
//   and writes the flat approvals workbook with a TOTAL row.
// Every setting is passed down explicitly; nothing is held in global state.
mod approvals;
mod calendar;
mod error;
mod loader;
mod output;
mod portfolio;
mod reports;
mod types;
mod util;
mod workbook;

use anyhow::{Context, Result};
use approvals::{ApprovalWindow, ReportFlavor};
use clap::{Parser, Subcommand};
use loader::FieldNames;
use portfolio::{JsonExportSource, RetryPolicy};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use types::DateField;
use workbook::{ApprovalWorkbook, ReviewWorkbook, FISCAL_FILE_NAME, XLSX_MIME};

#[derive(Parser)]
#[command(name = "review_report")]
#[command(author, version, about = "Fiscal review and approvals spreadsheet reports", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize review turnaround per fiscal month
    Fiscal {
        /// Review export (CSV)
        #[arg(short, long, value_name = "CSV")]
        input: PathBuf,

        /// Calendar year the fiscal year starts in
        #[arg(long, env = "FISCAL_START_YEAR")]
        start_year: i32,

        /// First calendar month of the fiscal year
        #[arg(long, env = "FISCAL_START_MONTH", default_value_t = calendar::DEFAULT_START_MONTH)]
        start_month: u32,

        /// Date that assigns a review to a month
        #[arg(long, value_enum, default_value_t = DateField::LetterSent)]
        date_field: DateField,

        /// Output workbook
        #[arg(short, long, default_value = FISCAL_FILE_NAME)]
        output: PathBuf,

        /// Skip the embedded charts
        #[arg(long)]
        no_charts: bool,

        /// Also write the period summaries as JSON
        #[arg(long, value_name = "PATH")]
        summary_json: Option<PathBuf>,

        /// Also write the period summaries as CSV
        #[arg(long, value_name = "PATH")]
        summary_csv: Option<PathBuf>,
    },

    /// Total approved lots/area for a year window
    Approvals {
        /// Portfolio export (JSON)
        #[arg(short, long, value_name = "JSON")]
        projects: PathBuf,

        /// Separate export used to look up plat types by project number
        #[arg(long, value_name = "JSON")]
        plats: Option<PathBuf>,

        /// First calendar year of the window
        #[arg(long)]
        year_start: i32,

        /// Last calendar year of the window (defaults to --year-start)
        #[arg(long)]
        year_end: Option<i32>,

        #[arg(long, value_enum)]
        flavor: ReportFlavor,

        /// Zoning categories to include (repeatable; defaults per flavor)
        #[arg(long = "category", value_name = "CATEGORY")]
        categories: Vec<String>,

        /// Output workbook (defaults per flavor)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn validate_year(year: i32, what: &str) -> error::Result<i32> {
    if (1900..=9999).contains(&year) {
        Ok(year)
    } else {
        Err(error::ReportError::Config(format!(
            "{} {} is not a valid calendar year",
            what, year
        )))
    }
}

#[allow(clippy::too_many_arguments)]
fn run_fiscal(
    input: PathBuf,
    start_year: i32,
    start_month: u32,
    date_field: DateField,
    out_path: PathBuf,
    no_charts: bool,
    summary_json: Option<PathBuf>,
    summary_csv: Option<PathBuf>,
) -> Result<()> {
    let start_year = validate_year(start_year, "fiscal start year")?;
    let periods = calendar::periods(start_month, start_year)?;

    let (records, load_report) = loader::load_csv(&input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    println!(
        "Processing dataset... ({} rows loaded)",
        util::format_int(load_report.total_rows)
    );
    if load_report.unparsed_dates > 0 {
        println!(
            "Note: {} date values could not be read and were left blank.",
            util::format_int(load_report.unparsed_dates)
        );
    }
    if load_report.skipped_rows > 0 {
        println!(
            "Note: {} rows skipped due to decode errors.",
            util::format_int(load_report.skipped_rows)
        );
    }

    let buckets = reports::aggregate(&records, &periods, date_field);

    println!("\nReview Turnaround by Fiscal Month (FY starting {})\n", periods[0].label);
    output::preview_table_rows(&reports::summary_rows(&buckets), periods.len());
    let slowest = reports::slowest_periods(&buckets, 3);
    if !slowest.is_empty() {
        let names: Vec<String> = slowest
            .iter()
            .map(|s| format!("{} ({} days)", s.label, util::format_number(s.average_length, 2)))
            .collect();
        println!("Slowest months: {}\n", names.join(", "));
    }

    let mut assembler = ReviewWorkbook::new();
    if no_charts {
        assembler = assembler.no_charts();
    }
    let bytes = assembler.assemble(&buckets)?;
    output::write_atomic(&out_path, &bytes)?;
    info!(mime = XLSX_MIME, "fiscal report ready");
    println!("(Workbook exported to {})", out_path.display());

    let summaries: Vec<&types::PeriodSummary> = buckets.iter().map(|b| &b.summary).collect();
    if let Some(path) = summary_json {
        output::write_json(&path, &summaries)?;
        println!("(Summary JSON exported to {})", path.display());
    }
    if let Some(path) = summary_csv {
        output::write_csv(&path, &summaries)?;
        println!("(Summary CSV exported to {})", path.display());
    }
    Ok(())
}

fn run_approvals(
    projects: PathBuf,
    plats: Option<PathBuf>,
    year_start: i32,
    year_end: Option<i32>,
    flavor: ReportFlavor,
    categories: Vec<String>,
    out_path: Option<PathBuf>,
) -> Result<()> {
    let year_start = validate_year(year_start, "window start year")?;
    let year_end = validate_year(year_end.unwrap_or(year_start), "window end year")?;
    let window = ApprovalWindow::new(year_start, year_end)?;

    let allowed: HashSet<String> = if categories.is_empty() {
        flavor
            .default_categories()
            .iter()
            .map(|c| c.to_string())
            .collect()
    } else {
        categories.into_iter().collect()
    };

    let retry = RetryPolicy::default();
    let project_list = retry
        .fetch(&JsonExportSource::new(&projects))
        .context("portfolio projects unavailable")?;
    // The lookup collection is fully loaded before filtering begins.
    let plat_list = match &plats {
        Some(path) => retry
            .fetch(&JsonExportSource::new(path))
            .context("plat lookup projects unavailable")?,
        None => Vec::new(),
    };

    let report = approvals::approvals_from_projects(
        &project_list,
        &plat_list,
        &FieldNames::default(),
        &window,
        &allowed,
        flavor,
    );

    println!("\n{} ({}-{})\n", flavor.title(), year_start, year_end);
    output::preview_table_rows(&approvals::preview_rows(&report, flavor), 10);
    println!(
        "Matched {} of {} projects.",
        util::format_int(report.counts.matched),
        util::format_int(report.counts.total)
    );
    if report.missing_fields > 0 {
        println!(
            "Note: {} expected custom fields were missing and treated as blank.",
            util::format_int(report.missing_fields)
        );
    }

    let out_path = out_path.unwrap_or_else(|| PathBuf::from(flavor.file_name()));
    let bytes = ApprovalWorkbook::new(flavor).assemble(&report)?;
    output::write_atomic(&out_path, &bytes)?;
    info!(mime = XLSX_MIME, "approvals report ready");
    println!("(Workbook exported to {})", out_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("review_report v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fiscal {
            input,
            start_year,
            start_month,
            date_field,
            output,
            no_charts,
            summary_json,
            summary_csv,
        } => run_fiscal(
            input,
            start_year,
            start_month,
            date_field,
            output,
            no_charts,
            summary_json,
            summary_csv,
        ),
        Commands::Approvals {
            projects,
            plats,
            year_start,
            year_end,
            flavor,
            categories,
            output,
        } => run_approvals(
            projects, plats, year_start, year_end, flavor, categories, output,
        ),
    }
}
