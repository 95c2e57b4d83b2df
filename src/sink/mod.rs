// src/sink/mod.rs

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::NaiveDateTime;

pub mod postgres;
pub mod value;

pub use postgres::PgSink;
pub use value::SqlValue;

/// Append-only destination table for trip rows.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Largest value of the timestamp column, or `None` when the table is empty.
    async fn watermark(&self) -> Result<Option<NaiveDateTime>>;

    /// Append every row of `window`, in order. Returns the number of rows
    /// inserted. Not transactional: on `Err`, statements that already
    /// succeeded stay committed.
    async fn append(&self, window: &RecordBatch) -> Result<u64>;
}
