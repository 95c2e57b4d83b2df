// src/load.rs

use arrow::record_batch::RecordBatch;
use std::fmt;
use tracing::info;

use crate::sink::RowSink;

/// Contiguous `(offset, len)` windows covering `0..num_rows`; every window
/// has `chunk` rows except possibly the last.
pub fn windows(num_rows: usize, chunk: usize) -> impl Iterator<Item = (usize, usize)> {
    let chunk = chunk.max(1);
    (0..num_rows)
        .step_by(chunk)
        .map(move |offset| (offset, chunk.min(num_rows - offset)))
}

/// A window failed after `loaded` rows of the month were already committed.
#[derive(Debug)]
pub struct LoadError {
    pub loaded: u64,
    pub source: anyhow::Error,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#} (after {} rows loaded)", self.source, self.loaded)
    }
}

impl std::error::Error for LoadError {}

/// Append `table` to the sink one window at a time, logging progress after
/// each. Returns rows inserted.
pub async fn load_table<S>(sink: &S, table: &RecordBatch, chunk: usize) -> Result<u64, LoadError>
where
    S: RowSink + ?Sized,
{
    let total = table.num_rows();
    let mut loaded = 0u64;
    for (offset, len) in windows(total, chunk) {
        let window = table.slice(offset, len);
        match sink.append(&window).await {
            Ok(n) => loaded += n,
            Err(source) => return Err(LoadError { loaded, source }),
        }
        info!(
            loaded,
            total,
            progress = %format!("{:.1}%", loaded as f64 * 100.0 / total as f64),
            "window loaded"
        );
    }
    Ok(loaded)
}
