// src/read.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, AsArray, BooleanArray, PrimitiveArray},
    compute::{concat_batches, filter_record_batch},
    datatypes::{
        ArrowPrimitiveType, DataType, TimeUnit, TimestampMicrosecondType,
        TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
    },
    record_batch::RecordBatch,
};
use chrono::NaiveDateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{fs::File, path::Path};
use sysinfo::System;
use tracing::{debug, info, instrument, warn};

/// One month's rows, fully decoded.
#[derive(Debug)]
pub struct MonthTable {
    /// Rows left after the watermark filter, in file order.
    pub batch: RecordBatch,
    /// Rows present in the file before filtering.
    pub rows_in_file: usize,
}

impl MonthTable {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

/// Exclusive lower bound on a timestamp column.
#[derive(Debug, Clone, Copy)]
pub struct After<'a> {
    pub column: &'a str,
    pub bound: NaiveDateTime,
}

/// Decode the whole staged Parquet file into one `RecordBatch`, then, when
/// `after` is given, keep only rows whose timestamp is strictly later.
///
/// The entire month is held in memory; that is a precondition of the loader,
/// checked (advisory only) against the host's available memory first.
#[instrument(level = "debug", skip(path, after), fields(path = %path.display()))]
pub fn read_month(path: &Path, after: Option<After<'_>>) -> Result<MonthTable> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading Parquet footer of {}", path.display()))?;

    let decoded_estimate: i64 = builder
        .metadata()
        .row_groups()
        .iter()
        .map(|rg| rg.total_byte_size())
        .sum();
    check_capacity(decoded_estimate.max(0) as u64);

    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .with_context(|| format!("building Parquet reader for {}", path.display()))?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("decoding {}", path.display()))?;
    let batch = concat_batches(&schema, &batches).context("concatenating record batches")?;
    drop(batches);

    let rows_in_file = batch.num_rows();
    debug!(rows = rows_in_file, columns = batch.num_columns(), "decoded");

    let batch = match after {
        Some(after) => {
            let kept = filter_after(&batch, after)?;
            info!(
                column = after.column,
                after = %after.bound,
                kept = kept.num_rows(),
                dropped = rows_in_file - kept.num_rows(),
                "applied watermark filter"
            );
            kept
        }
        None => batch,
    };

    Ok(MonthTable {
        batch,
        rows_in_file,
    })
}

/// Rows of `batch` whose `after.column` value is strictly greater than
/// `after.bound`. Nulls are dropped. Timestamps are compared as UTC instants.
pub fn filter_after(batch: &RecordBatch, after: After<'_>) -> Result<RecordBatch> {
    let idx = batch
        .schema()
        .index_of(after.column)
        .with_context(|| format!("file has no column {:?}", after.column))?;
    let col = batch.column(idx);
    let bound = after.bound.and_utc();

    let mask = match col.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            greater_than(col.as_primitive::<TimestampSecondType>(), bound.timestamp())
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => greater_than(
            col.as_primitive::<TimestampMillisecondType>(),
            bound.timestamp_millis(),
        ),
        DataType::Timestamp(TimeUnit::Microsecond, _) => greater_than(
            col.as_primitive::<TimestampMicrosecondType>(),
            bound.timestamp_micros(),
        ),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            let nanos = bound
                .timestamp_nanos_opt()
                .context("watermark outside the nanosecond timestamp range")?;
            greater_than(col.as_primitive::<TimestampNanosecondType>(), nanos)
        }
        other => bail!("column {:?} has type {}, not a timestamp", after.column, other),
    };

    filter_record_batch(batch, &mask).context("filtering rows by watermark")
}

fn greater_than<T>(values: &PrimitiveArray<T>, bound: i64) -> BooleanArray
where
    T: ArrowPrimitiveType<Native = i64>,
{
    values
        .iter()
        .map(|v| Some(v.is_some_and(|t| t > bound)))
        .collect()
}

/// Concatenation briefly holds the decoded batches twice.
fn check_capacity(decoded_bytes: u64) {
    let mut sys = System::new();
    sys.refresh_memory();
    let available = sys.available_memory();
    let needed = decoded_bytes.saturating_mul(2);
    if available > 0 && needed > available {
        warn!(
            needed_mb = needed / (1024 * 1024),
            available_mb = available / (1024 * 1024),
            "month may not fit in memory"
        );
    }
}
