// src/months.rs

use chrono::{Datelike, NaiveDateTime};
use std::fmt;

/// One (year, month) slot of the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {}", month);
        MonthKey { year, month }
    }

    /// Remote object name, e.g. `fhvhv_tripdata_2024-03.parquet`.
    pub fn remote_name(&self) -> String {
        format!("fhvhv_tripdata_{}-{:02}.parquet", self.year, self.month)
    }

    /// Local staging name for the downloaded file.
    pub fn staging_name(&self) -> String {
        format!("temp_{}", self.remote_name())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Where a run starts and whether its first month needs the watermark filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub start_month: u32,
    /// Exclusive lower bound applied to the first processed month only.
    pub after: Option<NaiveDateTime>,
}

impl ResumePoint {
    /// Resolve the first month of a run from the sink's watermark.
    ///
    /// Returns `None` when the watermark lies in a year after `year`, i.e.
    /// every month of the configured year is already behind it.
    pub fn resolve(
        watermark: Option<NaiveDateTime>,
        year: i32,
        configured_start: u32,
    ) -> Option<ResumePoint> {
        match watermark {
            None => Some(ResumePoint {
                start_month: configured_start,
                after: None,
            }),
            Some(w) if w.year() == year => Some(ResumePoint {
                start_month: w.month(),
                after: Some(w),
            }),
            Some(w) if w.year() < year => Some(ResumePoint {
                start_month: configured_start,
                after: Some(w),
            }),
            Some(_) => None,
        }
    }
}

/// Months `start..=end` of `year`, ascending. Empty when `start > end`.
pub fn month_sequence(year: i32, start: u32, end: u32) -> Vec<MonthKey> {
    (start..=end).map(|m| MonthKey::new(year, m)).collect()
}
