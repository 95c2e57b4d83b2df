// src/sink/postgres.rs

use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::{
    types::{ToSql, Type},
    Client, NoTls, Statement,
};
use tracing::{debug, error, info};

use super::{value::SqlValue, RowSink};
use crate::{config::Config, load::windows};

/// PostgreSQL caps a single statement at this many bind parameters.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Appends trip rows to an existing table with multi-row `INSERT` statements.
pub struct PgSink {
    client: Client,
    table: String,
    timestamp_column: String,
    insert_batch_size: usize,
}

impl PgSink {
    /// Connect to the configured database. The connection task is driven on
    /// the runtime in the background.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let (client, connection) = cfg
            .db
            .pg_config(&cfg.db.name)
            .connect(NoTls)
            .await
            .with_context(|| {
                format!(
                    "connecting to {}:{}/{}",
                    cfg.db.host, cfg.db.port, cfg.db.name
                )
            })?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });
        info!(host = %cfg.db.host, database = %cfg.db.name, "connected to postgres");

        Ok(Self::from_client(client, cfg))
    }

    pub fn from_client(client: Client, cfg: &Config) -> Self {
        PgSink {
            client,
            table: cfg.table.clone(),
            timestamp_column: cfg.timestamp_column.clone(),
            insert_batch_size: cfg.insert_batch_size,
        }
    }

    async fn prepare_insert(&self, columns: &[String], rows: usize) -> Result<Statement> {
        let sql = insert_statement(&self.table, columns, rows);
        self.client
            .prepare(&sql)
            .await
            .with_context(|| format!("preparing {}-row insert into {}", rows, self.table))
    }
}

#[async_trait]
impl RowSink for PgSink {
    async fn watermark(&self) -> Result<Option<NaiveDateTime>> {
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_ident(&self.timestamp_column),
            quote_table(&self.table)
        );
        let row = self
            .client
            .query_one(sql.as_str(), &[])
            .await
            .with_context(|| format!("querying watermark: {}", sql))?;

        let ty = row.columns()[0].type_().clone();
        let watermark = match ty {
            Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(0)?,
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<DateTime<Utc>>>(0)?
                .map(|t| t.naive_utc()),
            Type::DATE => row
                .try_get::<_, Option<NaiveDate>>(0)?
                .map(|d| d.and_time(chrono::NaiveTime::MIN)),
            other => bail!(
                "column {}.{} has type {}, expected a timestamp",
                self.table,
                self.timestamp_column,
                other
            ),
        };
        debug!(?watermark, "read watermark");
        Ok(watermark)
    }

    async fn append(&self, window: &RecordBatch) -> Result<u64> {
        let total = window.num_rows();
        if total == 0 {
            return Ok(0);
        }
        let columns: Vec<String> = window
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let per_stmt = rows_per_statement(self.insert_batch_size, columns.len());

        let full_rows = per_stmt.min(total);
        let full = self.prepare_insert(&columns, full_rows).await?;
        let mut inserted = 0u64;
        for (offset, len) in statement_windows(total, self.insert_batch_size, columns.len()) {
            let tail;
            let stmt = if len == full_rows {
                &full
            } else {
                tail = self.prepare_insert(&columns, len).await?;
                &tail
            };

            let mut values = Vec::with_capacity(len * columns.len());
            for row in offset..offset + len {
                for (c, col) in window.columns().iter().enumerate() {
                    values.push(SqlValue::from_array(col.as_ref(), row).with_context(|| {
                        format!("reading column {} at row {}", columns[c], row)
                    })?);
                }
            }
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

            let n = self
                .client
                .execute(stmt, &params)
                .await
                .with_context(|| format!("inserting {} rows into {}", len, self.table))?;
            inserted += n;
        }
        Ok(inserted)
    }
}

/// How many rows fit in one `INSERT` given the configured batch size and the
/// bind-parameter limit.
pub fn rows_per_statement(insert_batch_size: usize, columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1))
        .min(insert_batch_size)
        .max(1)
}

/// `(offset, len)` row ranges of the `INSERT` statements used to append
/// `total` rows of a `columns`-wide window.
pub fn statement_windows(
    total: usize,
    insert_batch_size: usize,
    columns: usize,
) -> impl Iterator<Item = (usize, usize)> {
    windows(total, rows_per_statement(insert_batch_size, columns))
}

/// `INSERT INTO t ("a", "b") VALUES ($1, $2), ($3, $4), ...`
pub fn insert_statement(table: &str, columns: &[String], rows: usize) -> String {
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let width = columns.len();
    let tuples = (0..rows)
        .map(|r| {
            let placeholders = (1..=width)
                .map(|c| format!("${}", r * width + c))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", placeholders)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_table(table),
        cols,
        tuples
    )
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name (`schema.table`).
pub fn quote_table(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
