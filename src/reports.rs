use crate::calendar::{period_index, FiscalPeriod};
use crate::types::{DateField, PeriodSummary, PeriodSummaryRow, Record, ReviewDetail};
use crate::util::{average, days_diff, format_int, format_number, round2};
use std::cmp::Ordering;
use tracing::info;

/// Reviews longer than this many days count as exceeding.
pub const REVIEW_THRESHOLD_DAYS: i64 = 30;

/// A fiscal period together with everything reported about it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodBucket {
    pub period: FiscalPeriod,
    pub summary: PeriodSummary,
    pub details: Vec<ReviewDetail>,
}

/// Assign records to fiscal periods by `date_field` and summarize each
/// period. Buckets come back in period order, one per period.
pub fn aggregate(
    records: &[Record],
    periods: &[FiscalPeriod],
    date_field: DateField,
) -> Vec<PeriodBucket> {
    let mut details: Vec<Vec<ReviewDetail>> = vec![Vec::new(); periods.len()];
    let mut unassigned = 0usize;

    for r in records {
        match date_field.of(r).and_then(|d| period_index(periods, d)) {
            Some(idx) => details[idx].push(review_detail(r)),
            None => unassigned += 1,
        }
    }
    info!(
        records = records.len(),
        unassigned,
        "assigned records to fiscal periods"
    );

    periods
        .iter()
        .zip(details)
        .map(|(period, mut rows)| {
            sort_details(&mut rows, date_field);
            PeriodBucket {
                summary: summarize(&period.label, &rows),
                period: period.clone(),
                details: rows,
            }
        })
        .collect()
}

pub fn review_length(record: &Record) -> Option<i64> {
    match (record.submitted, record.letter_sent) {
        (Some(submitted), Some(sent)) => Some(days_diff(submitted, sent)),
        _ => None,
    }
}

pub fn exceeds_threshold(days: i64) -> bool {
    days > REVIEW_THRESHOLD_DAYS
}

fn review_detail(r: &Record) -> ReviewDetail {
    ReviewDetail {
        submitted: r.submitted,
        name: r.name.clone(),
        project_no: r.project_no.clone(),
        review_cycle_eng: r.review_cycle_eng.clone(),
        review_cycle_sur: r.review_cycle_sur.clone(),
        review_cycle_pln: r.review_cycle_pln.clone(),
        letter_sent: r.letter_sent,
        review_length: review_length(r),
    }
}

fn sort_details(rows: &mut [ReviewDetail], date_field: DateField) {
    let key = |d: &ReviewDetail| match date_field {
        DateField::Submitted => d.submitted,
        DateField::LetterSent => d.letter_sent,
    };
    rows.sort_by(|a, b| {
        key(a)
            .cmp(&key(b))
            .then_with(|| a.project_no.cmp(&b.project_no))
    });
}

/// Statistics over the scored rows of one period. Rows without a review
/// length are listed on the detail sheet but ignored here.
pub fn summarize(label: &str, rows: &[ReviewDetail]) -> PeriodSummary {
    let lengths: Vec<i64> = rows.iter().filter_map(|d| d.review_length).collect();
    let total_reviews = lengths.len();
    let exceeding = lengths.iter().filter(|d| exceeds_threshold(**d)).count();
    let at_or_under = total_reviews - exceeding;
    let as_f64: Vec<f64> = lengths.iter().map(|d| *d as f64).collect();

    let at_or_under_ratio = if total_reviews == 0 {
        0.0
    } else {
        at_or_under as f64 / total_reviews as f64
    };

    PeriodSummary {
        label: label.to_string(),
        total_reviews,
        exceeding,
        at_or_under,
        average_length: round2(average(&as_f64)),
        at_or_under_ratio,
    }
}

/// Periods sorted by average review length, longest first. Used for the
/// console digest.
pub fn slowest_periods(buckets: &[PeriodBucket], n: usize) -> Vec<&PeriodSummary> {
    let mut summaries: Vec<&PeriodSummary> = buckets
        .iter()
        .map(|b| &b.summary)
        .filter(|s| s.total_reviews > 0)
        .collect();
    summaries.sort_by(|a, b| {
        b.average_length
            .partial_cmp(&a.average_length)
            .unwrap_or(Ordering::Equal)
    });
    summaries.truncate(n);
    summaries
}

pub fn summary_rows(buckets: &[PeriodBucket]) -> Vec<PeriodSummaryRow> {
    buckets
        .iter()
        .map(|b| {
            let s = &b.summary;
            PeriodSummaryRow {
                month: s.label.clone(),
                total_reviews: format_int(s.total_reviews),
                exceeding: format_int(s.exceeding),
                at_or_under: format_int(s.at_or_under),
                average_length: format_number(s.average_length, 2),
                ratio: format!("{}%", format_number(s.at_or_under_ratio * 100.0, 1)),
            }
        })
        .collect()
}
