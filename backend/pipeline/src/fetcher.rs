use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio_stream::StreamExt;
use voxrelay_core::{AudioFetcher, ByteStream, FetchableLocation};

/// Downloads audio over HTTP as a byte stream. Single attempt, no retry.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioFetcher for HttpFetcher {
    async fn fetch(&self, location: &FetchableLocation) -> Result<ByteStream> {
        let response = self
            .client
            .get(&location.url)
            .send()
            .await
            .context("audio download request failed")?
            .error_for_status()
            .context("audio download returned an error status")?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::pin(stream))
    }
}
