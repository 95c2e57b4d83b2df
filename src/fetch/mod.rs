// src/fetch/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::months::MonthKey;

pub mod http;

pub use http::HttpSource;

/// Write-buffer size used while streaming a download to disk.
pub const DOWNLOAD_CHUNK_BYTES: usize = 8 * 1024;

/// What to do when the remote answers a month request with a non-2xx status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The month (and every later one) has not been published.
    EndOfData,
    /// Only this month failed; try the next.
    SkipMonth,
}

/// 403 and 404 mean the month has not been released yet, so nothing after
/// it will be either. Every other failure status is treated as specific to
/// the month.
pub fn classify_status(status: u16) -> Unavailable {
    match status {
        403 | 404 => Unavailable::EndOfData,
        _ => Unavailable::SkipMonth,
    }
}

/// Result of asking the remote for one month's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The body was written to the destination path.
    Staged { bytes: u64 },
    /// The remote answered with a non-success status.
    Unavailable { status: u16 },
}

/// A source of monthly trip files.
///
/// `Err` means the transfer itself failed (connection, mid-stream I/O); the
/// caller treats that as a per-month failure. Implementations must not leave
/// a partial file at `dest` when they return `Err`.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(&self, key: MonthKey, dest: &Path) -> Result<FetchOutcome>;
}
