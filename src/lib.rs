//! Resumable monthly loader for NYC FHVHV trip records: downloads each
//! month's Parquet file, decodes it, and appends the rows to PostgreSQL.

pub mod bootstrap;
pub mod config;
pub mod fetch;
pub mod load;
pub mod months;
pub mod pipeline;
pub mod read;
pub mod sink;
pub mod stage;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use pipeline::{run, MonthOutcome, RunSummary};
