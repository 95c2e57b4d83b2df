// src/fetch/http.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::{path::Path, time::Duration};
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, instrument};
use url::Url;

use super::{FetchOutcome, RemoteSource, DOWNLOAD_CHUNK_BYTES};
use crate::{months::MonthKey, stage::remove_quietly};

/// Fetches `{base_url}/fhvhv_tripdata_{YYYY}-{MM}.parquet` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: Url,
}

impl HttpSource {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(HttpSource { client, base_url })
    }

    /// Full URL of one month's file.
    pub fn url_for(&self, key: MonthKey) -> Result<Url> {
        self.base_url
            .join(&key.remote_name())
            .with_context(|| format!("joining {} onto {}", key.remote_name(), self.base_url))
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    #[instrument(level = "debug", skip(self, dest), fields(month = %key))]
    async fn fetch(&self, key: MonthKey, dest: &Path) -> Result<FetchOutcome> {
        let url = self.url_for(key)?;
        debug!(%url, "requesting");

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            return Ok(FetchOutcome::Unavailable {
                status: status.as_u16(),
            });
        }

        match stream_to_file(resp, dest).await {
            Ok(bytes) => Ok(FetchOutcome::Staged { bytes }),
            Err(e) => {
                remove_quietly(dest);
                Err(e.context(format!("downloading {}", url)))
            }
        }
    }
}

/// Stream the response body to `dest` through a fixed-size write buffer.
async fn stream_to_file(resp: reqwest::Response, dest: &Path) -> Result<u64> {
    let file = File::create(dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_BYTES, file);

    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("reading chunk from response")?;
        writer
            .write_all(&chunk)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    writer.flush().await.context("flushing staged file")?;
    Ok(written)
}
