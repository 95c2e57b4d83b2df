use anyhow::Result;
use ridesload::{bootstrap::ensure_database, fetch::HttpSource, pipeline, sink::PgSink, Config};
use std::fs;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::from_env()?;
    info!(
        year = cfg.year,
        start_month = cfg.start_month,
        end_month = cfg.end_month,
        table = %cfg.table,
        "NYC FHVHV import starting"
    );
    fs::create_dir_all(&cfg.staging_dir)?;

    // ─── 3) database ─────────────────────────────────────────────────
    if cfg.ensure_database {
        ensure_database(&cfg.db).await?;
    }
    let sink = PgSink::connect(&cfg).await?;
    let source = HttpSource::new(cfg.base_url.clone())?;

    // ─── 4) months ───────────────────────────────────────────────────
    let start = Instant::now();
    let summary = pipeline::run(&cfg, &source, &sink).await?;

    info!(
        loaded = summary.months_loaded(),
        skipped = summary.months_skipped(),
        stopped_at = ?summary.stopped_at().map(|k| k.to_string()),
        elapsed = ?start.elapsed(),
        "import complete"
    );
    println!(
        "Total rows loaded this run: {} into {}.{}",
        summary.rows_loaded, cfg.db.name, cfg.table
    );
    Ok(())
}
