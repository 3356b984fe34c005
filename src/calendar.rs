//! Fiscal calendar: twelve consecutive monthly windows starting at a
//! configured month.

use crate::error::{ReportError, Result};
use chrono::{Datelike, Days, NaiveDate};

/// First calendar month of the fiscal year unless configured otherwise.
pub const DEFAULT_START_MONTH: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalPeriod {
    /// Display label such as `Jul 2024`.
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalPeriod {
    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Enumerate the twelve fiscal periods beginning at `start_month` of
/// `start_year`, in chronological order.
pub fn periods(start_month: u32, start_year: i32) -> Result<Vec<FiscalPeriod>> {
    if !(1..=12).contains(&start_month) {
        return Err(ReportError::InvalidFiscalStartMonth(start_month));
    }

    let months = (start_month..=12).chain(1..start_month);
    months
        .map(|month| {
            let year = if month >= start_month {
                start_year
            } else {
                start_year + 1
            };
            month_window(year, month)
        })
        .collect()
}

fn month_window(year: i32, month: u32) -> Result<FiscalPeriod> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ReportError::Config(format!("year {} is out of range", year)))?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .ok_or_else(|| ReportError::Config(format!("year {} is out of range", next_year)))?;

    Ok(FiscalPeriod {
        label: start.format("%b %Y").to_string(),
        start,
        end,
    })
}

/// Fiscal period index (0-based) of a calendar month.
pub fn fiscal_month_index(calendar_month: u32, start_month: u32) -> usize {
    ((calendar_month + 12 - start_month) % 12) as usize
}

/// Position of the period containing `date`, if any.
pub fn period_index(periods: &[FiscalPeriod], date: NaiveDate) -> Option<usize> {
    let first = periods.first()?;
    let idx = fiscal_month_index(date.month(), first.start.month());
    periods.get(idx).filter(|p| p.contains(date)).map(|_| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn july_fiscal_year_spans_two_calendar_years() {
        let periods = periods(7, 2024).unwrap();
        assert_eq!(periods.len(), 12);

        let first = &periods[0];
        assert_eq!(first.label, "Jul 2024");
        assert_eq!(first.start, date(2024, 7, 1));
        assert_eq!(first.end, date(2024, 7, 31));

        let last = &periods[11];
        assert_eq!(last.label, "Jun 2025");
        assert_eq!(last.start, date(2025, 6, 1));
        assert_eq!(last.end, date(2025, 6, 30));
    }

    #[test]
    fn december_wraps_to_january() {
        let periods = periods(7, 2024).unwrap();
        let dec = periods.iter().find(|p| p.label == "Dec 2024").unwrap();
        assert_eq!(dec.end, date(2024, 12, 31));
        let jan = periods.iter().find(|p| p.label == "Jan 2025").unwrap();
        assert_eq!(jan.start, date(2025, 1, 1));
    }

    #[test]
    fn leap_february_ends_on_29th() {
        let periods = periods(7, 2023).unwrap();
        let feb = periods.iter().find(|p| p.label == "Feb 2024").unwrap();
        assert_eq!(feb.end, date(2024, 2, 29));
    }

    #[test]
    fn every_start_month_gives_contiguous_year() {
        for start_month in 1..=12 {
            let periods = periods(start_month, 2024).unwrap();
            assert_eq!(periods.len(), 12, "start month {}", start_month);
            assert_eq!(periods[0].start.month(), start_month);
            for pair in periods.windows(2) {
                assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
                assert!(pair[0].start <= pair[0].end);
            }
            let span = (periods[11].end - periods[0].start).num_days() + 1;
            assert!(span == 365 || span == 366);
        }
    }

    #[test]
    fn january_start_stays_in_one_year() {
        let periods = periods(1, 2025).unwrap();
        assert!(periods.iter().all(|p| p.start.year() == 2025));
    }

    #[test]
    fn rejects_out_of_range_start_month() {
        assert!(matches!(
            periods(0, 2024),
            Err(ReportError::InvalidFiscalStartMonth(0))
        ));
        assert!(matches!(
            periods(13, 2024),
            Err(ReportError::InvalidFiscalStartMonth(13))
        ));
    }

    #[test]
    fn locates_period_for_date() {
        let periods = periods(7, 2024).unwrap();
        let idx = period_index(&periods, date(2025, 2, 14)).unwrap();
        assert_eq!(periods[idx].label, "Feb 2025");
        assert_eq!(period_index(&periods, date(2024, 7, 31)), Some(0));
        assert!(period_index(&periods, date(2025, 7, 1)).is_none());
        assert!(period_index(&periods, date(2024, 6, 30)).is_none());
    }
}
