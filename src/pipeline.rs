// src/pipeline.rs

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    config::Config,
    fetch::{classify_status, FetchOutcome, RemoteSource, Unavailable},
    load::load_table,
    months::{month_sequence, MonthKey, ResumePoint},
    read::{read_month, After},
    sink::RowSink,
    stage::{sweep_stale, StagedFile},
};

/// How one month ended. Fatal conditions are not represented here; they are
/// returned as `Err` from [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthOutcome {
    Loaded { rows: u64 },
    /// The month failed; `rows` were committed before the failure.
    Skipped { reason: String, rows: u64 },
    /// The remote has nothing for this month or any later one.
    EndOfData { status: u16 },
}

impl MonthOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            MonthOutcome::Loaded { rows } | MonthOutcome::Skipped { rows, .. } => *rows,
            MonthOutcome::EndOfData { .. } => 0,
        }
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub watermark: Option<NaiveDateTime>,
    pub months: Vec<(MonthKey, MonthOutcome)>,
    pub rows_loaded: u64,
}

impl RunSummary {
    pub fn stopped_at(&self) -> Option<MonthKey> {
        self.months
            .iter()
            .find(|(_, o)| matches!(o, MonthOutcome::EndOfData { .. }))
            .map(|(k, _)| *k)
    }

    pub fn months_loaded(&self) -> usize {
        self.months
            .iter()
            .filter(|(_, o)| matches!(o, MonthOutcome::Loaded { .. }))
            .count()
    }

    pub fn months_skipped(&self) -> usize {
        self.months
            .iter()
            .filter(|(_, o)| matches!(o, MonthOutcome::Skipped { .. }))
            .count()
    }
}

/// Resume from the sink's watermark and load every configured month in
/// order, one at a time.
///
/// Only a failure to read the watermark (or to scan the staging directory)
/// aborts the run; per-month failures are logged and skipped.
pub async fn run<Src, Snk>(cfg: &Config, source: &Src, sink: &Snk) -> Result<RunSummary>
where
    Src: RemoteSource + ?Sized,
    Snk: RowSink + ?Sized,
{
    let swept = sweep_stale(&cfg.staging_dir)?;
    if swept > 0 {
        warn!(swept, dir = %cfg.staging_dir.display(), "removed staged files from an earlier run");
    }

    let watermark = sink.watermark().await.context("reading watermark")?;
    let mut summary = RunSummary {
        watermark,
        ..Default::default()
    };
    match watermark {
        Some(w) => info!(last_loaded = %w, "resuming after last loaded dropoff"),
        None => info!("no existing data found"),
    }

    let Some(resume) = ResumePoint::resolve(watermark, cfg.year, cfg.start_month) else {
        info!(year = cfg.year, "watermark is past the configured year; nothing to do");
        return Ok(summary);
    };

    let months = month_sequence(cfg.year, resume.start_month, cfg.end_month);
    info!(
        year = cfg.year,
        from = resume.start_month,
        to = cfg.end_month,
        count = months.len(),
        "months to process"
    );

    for (i, key) in months.into_iter().enumerate() {
        let after = if i == 0 { resume.after } else { None };
        let outcome = process_month(cfg, source, sink, key, after).await;
        summary.rows_loaded += outcome.rows();

        match &outcome {
            MonthOutcome::Loaded { rows } => info!(month = %key, rows, "month complete"),
            MonthOutcome::Skipped { reason, rows } => {
                warn!(month = %key, rows, reason = %reason, "month skipped")
            }
            MonthOutcome::EndOfData { status } => {
                info!(month = %key, status, "data not released yet; stopping")
            }
        }

        let stop = matches!(outcome, MonthOutcome::EndOfData { .. });
        summary.months.push((key, outcome));
        if stop {
            break;
        }
    }

    Ok(summary)
}

/// Fetch, read, and load one month. The staged file is removed and the
/// decoded table dropped before this returns, whatever the outcome.
#[instrument(level = "info", skip_all, fields(month = %key))]
pub async fn process_month<Src, Snk>(
    cfg: &Config,
    source: &Src,
    sink: &Snk,
    key: MonthKey,
    after: Option<NaiveDateTime>,
) -> MonthOutcome
where
    Src: RemoteSource + ?Sized,
    Snk: RowSink + ?Sized,
{
    let staged = StagedFile::new(cfg.staging_dir.join(key.staging_name()));

    match source.fetch(key, staged.path()).await {
        Ok(FetchOutcome::Staged { bytes }) => {
            let on_disk = staged.size_bytes().unwrap_or_else(|e| {
                warn!(error = %format!("{:#}", e), "cannot stat staged file");
                bytes
            });
            info!(
                file = %key.remote_name(),
                size_mb = %format!("{:.1}", on_disk as f64 / (1024.0 * 1024.0)),
                "downloaded"
            );
        }
        Ok(FetchOutcome::Unavailable { status }) => {
            return match classify_status(status) {
                Unavailable::EndOfData => MonthOutcome::EndOfData { status },
                Unavailable::SkipMonth => MonthOutcome::Skipped {
                    reason: format!("server returned {}", status),
                    rows: 0,
                },
            };
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "download failed");
            return MonthOutcome::Skipped {
                reason: format!("download failed: {:#}", e),
                rows: 0,
            };
        }
    }

    let path = staged.path().to_path_buf();
    let column = cfg.timestamp_column.clone();
    let decoded = tokio::task::spawn_blocking(move || {
        let after = after.map(|bound| After {
            column: &column,
            bound,
        });
        read_month(&path, after)
    })
    .await;

    let table = match decoded {
        Ok(Ok(table)) => table,
        Ok(Err(e)) => {
            error!(error = %format!("{:#}", e), "unreadable file");
            return MonthOutcome::Skipped {
                reason: format!("unreadable file: {:#}", e),
                rows: 0,
            };
        }
        Err(e) => {
            error!(error = %e, "reader task failed");
            return MonthOutcome::Skipped {
                reason: format!("reader task failed: {}", e),
                rows: 0,
            };
        }
    };
    info!(
        rows = table.num_rows(),
        rows_in_file = table.rows_in_file,
        chunk = cfg.row_chunk_size,
        "loading"
    );

    let outcome = match load_table(sink, &table.batch, cfg.row_chunk_size).await {
        Ok(rows) => MonthOutcome::Loaded { rows },
        Err(e) => {
            error!(error = %e, "load failed");
            MonthOutcome::Skipped {
                reason: format!("load failed: {}", e),
                rows: e.loaded,
            }
        }
    };

    drop(table);
    drop(staged);
    outcome
}
