// src/bootstrap.rs

use anyhow::{Context, Result};
use tokio_postgres::NoTls;
use tracing::{error, info};

use crate::{config::DbConfig, sink::postgres::quote_ident};

/// Database every PostgreSQL server has, used to create the target one.
const MAINTENANCE_DB: &str = "postgres";

/// Create `db.name` if it does not exist yet. Returns `true` when it was
/// created by this call.
pub async fn ensure_database(db: &DbConfig) -> Result<bool> {
    let (client, connection) = db
        .pg_config(MAINTENANCE_DB)
        .connect(NoTls)
        .await
        .with_context(|| format!("connecting to {}:{}/{}", db.host, db.port, MAINTENANCE_DB))?;
    let conn = tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "postgres connection error");
        }
    });

    let exists = client
        .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&db.name])
        .await
        .context("checking pg_database")?
        .is_some();

    let created = if exists {
        info!(database = %db.name, "database already exists");
        false
    } else {
        client
            .batch_execute(&create_database_sql(&db.name))
            .await
            .with_context(|| format!("creating database {}", db.name))?;
        info!(database = %db.name, "database created");
        true
    };

    drop(client);
    let _ = conn.await;
    Ok(created)
}

fn create_database_sql(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(name))
}
