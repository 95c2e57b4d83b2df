// src/testutil.rs
//
// Fixtures shared by the unit tests: synthetic trip batches, a Parquet
// writer, an in-memory sink, and a scripted remote source.

use anyhow::{anyhow, Result};
use arrow::{
    array::{ArrayRef, AsArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray},
    datatypes::{DataType, Field, Int64Type, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};
use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    config::Config,
    fetch::{FetchOutcome, RemoteSource},
    months::MonthKey,
    sink::RowSink,
};

/// `n` trips with ids `start..start + n`; trip `i` drops off at
/// 2024-03-01 00:00 plus `i` hours.
pub fn trip_batch(start: i64, n: usize) -> RecordBatch {
    let base = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    trips_from(base, start, n)
}

/// Like [`trip_batch`] but hours are counted from `base`.
pub fn trips_from(base: NaiveDateTime, start: i64, n: usize) -> RecordBatch {
    let ids: Vec<i64> = (start..start + n as i64).collect();
    let dropoff: Vec<i64> = ids
        .iter()
        .map(|i| (base + Duration::hours(*i)).and_utc().timestamp_micros())
        .collect();
    let pickup: Vec<i64> = dropoff.iter().map(|t| t - 20 * 60 * 1_000_000).collect();
    let license: Vec<&str> = ids
        .iter()
        .map(|i| if i % 2 == 0 { "HV0003" } else { "HV0005" })
        .collect();
    let miles: Vec<f64> = ids.iter().map(|i| *i as f64 * 0.5).collect();

    let schema = Arc::new(Schema::new(vec![
        Field::new("trip_id", DataType::Int64, false),
        Field::new("hvfhs_license_num", DataType::Utf8, false),
        Field::new(
            "pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new(
            "dropoff_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("trip_miles", DataType::Float64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(StringArray::from(license)),
        Arc::new(TimestampMicrosecondArray::from(pickup)),
        Arc::new(TimestampMicrosecondArray::from(dropoff)),
        Arc::new(Float64Array::from(miles)),
    ];
    RecordBatch::try_new(schema, columns).unwrap()
}

/// `trip_id` values of a batch produced by [`trip_batch`].
pub fn ids(batch: &RecordBatch) -> Vec<i64> {
    batch
        .column(0)
        .as_primitive::<Int64Type>()
        .values()
        .to_vec()
}

pub fn write_parquet(path: &Path, batch: &RecordBatch, row_group_rows: usize) {
    let props = WriterProperties::builder()
        .set_max_row_group_size(row_group_rows)
        .build();
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

/// Configuration pointing at `staging_dir`, with no real database behind it.
pub fn test_config(staging_dir: &Path, year: i32, start: u32, end: u32) -> Config {
    let vars = [
        ("DB_HOST", "localhost".to_string()),
        ("DB_NAME", "rides".to_string()),
        ("DB_USER", "loader".to_string()),
        ("BASE_URL", "http://127.0.0.1:9/trip-data".to_string()),
        ("YEAR", year.to_string()),
        ("START_MONTH", start.to_string()),
        ("END_MONTH", end.to_string()),
        ("STAGING_DIR", staging_dir.display().to_string()),
        ("ROW_CHUNK_SIZE", "500".to_string()),
    ];
    Config::from_vars(vars.into_iter().map(|(k, v)| (k.to_string(), v))).unwrap()
}

/// Sink that keeps appended windows in memory.
#[derive(Default)]
pub struct MemorySink {
    watermark: Option<NaiveDateTime>,
    fail_after: Option<usize>,
    appended: Mutex<Vec<RecordBatch>>,
}

impl MemorySink {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_watermark(watermark: NaiveDateTime) -> Self {
        MemorySink {
            watermark: Some(watermark),
            ..Default::default()
        }
    }

    /// Accept `n` windows, then fail every later append.
    pub fn failing_after(n: usize) -> Self {
        MemorySink {
            fail_after: Some(n),
            ..Default::default()
        }
    }

    pub fn appended(&self) -> Vec<RecordBatch> {
        self.appended.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.appended().iter().map(|b| b.num_rows()).sum()
    }

    pub fn all_ids(&self) -> Vec<i64> {
        self.appended().iter().flat_map(ids).collect()
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn watermark(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.watermark)
    }

    async fn append(&self, window: &RecordBatch) -> Result<u64> {
        let mut appended = self.appended.lock().unwrap();
        if self.fail_after.is_some_and(|n| appended.len() >= n) {
            return Err(anyhow!("insert rejected"));
        }
        appended.push(window.clone());
        Ok(window.num_rows() as u64)
    }
}

/// Sink whose watermark query always fails, as if the database were down.
pub struct UnreachableSink;

#[async_trait]
impl RowSink for UnreachableSink {
    async fn watermark(&self) -> Result<Option<NaiveDateTime>> {
        Err(anyhow!("connection refused"))
    }

    async fn append(&self, _window: &RecordBatch) -> Result<u64> {
        Err(anyhow!("connection refused"))
    }
}

/// Scripted reply for one month.
#[derive(Clone)]
pub enum Script {
    Serve(RecordBatch),
    Status(u16),
    /// Transfer dies mid-stream.
    Broken,
    /// Bytes arrive but are not Parquet.
    Garbage,
}

/// Remote source answering from a per-month script; unscripted months 404.
pub struct ScriptedSource {
    scripts: HashMap<u32, Script>,
    requested: Mutex<Vec<MonthKey>>,
    /// Staged paths seen by each fetch, checked later for cleanup.
    staged: Mutex<Vec<PathBuf>>,
}

impl ScriptedSource {
    pub fn new(scripts: impl IntoIterator<Item = (u32, Script)>) -> Self {
        ScriptedSource {
            scripts: scripts.into_iter().collect(),
            requested: Mutex::new(Vec::new()),
            staged: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_months(&self) -> Vec<u32> {
        self.requested.lock().unwrap().iter().map(|k| k.month).collect()
    }

    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.staged.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    async fn fetch(&self, key: MonthKey, dest: &Path) -> Result<FetchOutcome> {
        self.requested.lock().unwrap().push(key);
        self.staged.lock().unwrap().push(dest.to_path_buf());
        match self.scripts.get(&key.month) {
            None => Ok(FetchOutcome::Unavailable { status: 404 }),
            Some(Script::Status(status)) => Ok(FetchOutcome::Unavailable { status: *status }),
            Some(Script::Broken) => Err(anyhow!("connection reset by peer")),
            Some(Script::Garbage) => {
                std::fs::write(dest, b"<html>maintenance</html>")?;
                Ok(FetchOutcome::Staged { bytes: 24 })
            }
            Some(Script::Serve(batch)) => {
                write_parquet(dest, batch, 64);
                Ok(FetchOutcome::Staged {
                    bytes: std::fs::metadata(dest)?.len(),
                })
            }
        }
    }
}
