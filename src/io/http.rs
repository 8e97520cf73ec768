use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use anyhow::{Result, anyhow, bail};

const MAX_RETRY: u32 = 10;

/// HTTP Range reader for remote backup images.
///
/// Cataloging touches only the descriptor blocks it walks and extraction
/// touches only the blocks it seeks to, so a remote image is never
/// downloaded in full.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to verify Range support and get the image size
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        // Send HEAD request to check capabilities
        let resp = client.head(&url).send().await?;

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            bail!("Remote server does not support Range requests");
        }

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    async fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let range = format!("bytes={}-{}", start, end);
        let resp = self
            .client
            .get(&self.url)
            .header("Range", &range)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;

            match self.fetch_range(current_start, end).await {
                Ok(bytes) => {
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    let transient = e
                        .downcast_ref::<reqwest::Error>()
                        .is_some_and(|e| e.is_timeout() || e.is_connect());
                    if !transient {
                        return Err(e);
                    }
                    retry_count += 1;
                    if retry_count >= MAX_RETRY {
                        bail!("Max retries exceeded");
                    }
                    eprintln!("Connection error, retry {}/{}: {}", retry_count, MAX_RETRY, e);
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
