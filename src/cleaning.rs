//! The two cleaning operations: fixed-bound price filtering and review date
//! normalization.

use crate::constants::OUTPUT_DATE_FORMAT;
use crate::dataset::Dataset;
use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

/// Inclusive `[min, max]` price bounds. `min <= max` is not checked; an
/// inverted range simply matches nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, price: f64) -> bool {
        self.min <= price && price <= self.max
    }

    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub rows_in: usize,
    pub kept: usize,
    pub dropped: usize,
    /// Dropped rows whose price was empty or not a number
    pub unparsable: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateReport {
    pub parsed: usize,
    pub missing: usize,
    /// Non-empty values that could not be read as a date and were blanked
    pub coerced: usize,
}

/// Parse a price cell. Empty, non-numeric and NaN values have no price.
pub fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|p| !p.is_nan())
}

/// Keep exactly the rows whose `column` value lies within `range`.
pub fn drop_price_outliers(dataset: &mut Dataset, column: &str, range: PriceRange) -> Result<FilterReport> {
    let idx = dataset.column_index(column)?;
    let rows_in = dataset.len();
    let mut unparsable = 0;
    let dropped = dataset.retain_rows(|row| match parse_price(row.get(idx).unwrap_or("")) {
        Some(price) => range.contains(price),
        None => {
            unparsable += 1;
            false
        }
    });
    let report = FilterReport {
        rows_in,
        kept: dataset.len(),
        dropped,
        unparsable,
    };
    debug!(?report, "Price filter applied");
    Ok(report)
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y%m%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Read a review date. ISO dates are the common case; timestamps keep only
/// their calendar date, as written (no timezone shift).
pub fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Rewrite `column` as ISO dates; anything unreadable becomes an empty cell.
pub fn normalize_review_dates(dataset: &mut Dataset, column: &str) -> Result<DateReport> {
    let idx = dataset.column_index(column)?;
    let mut report = DateReport::default();
    dataset.map_column(idx, |raw| match parse_review_date(raw) {
        Some(date) => {
            report.parsed += 1;
            date.format(OUTPUT_DATE_FORMAT).to_string()
        }
        None => {
            report.missing += 1;
            if !raw.trim().is_empty() {
                report.coerced += 1;
            }
            String::new()
        }
    });
    if report.coerced > 0 {
        warn!(column, coerced = report.coerced, "Unreadable dates replaced with missing values");
    }
    Ok(report)
}
