// file: src/network/download.rs
// version: 1.0.0
// guid: c61d8e4b-0a29-4f73-9e5b-d2f7a3b08c15

//! HTTP access: binary download and public address lookup

use crate::error::ProvisionError;
use crate::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// HTTP operations needed by the provisioning steps
#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Download `url` into `dest`, replacing it
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Fetch a small plain-text body
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Query a plain-text "what is my IP" endpoint and parse the answer
pub async fn public_ip(fetcher: &dyn HttpFetcher, url: &str) -> Result<IpAddr> {
    let body = fetcher.fetch_text(url).await?;
    let trimmed = body.trim();
    trimmed.parse::<IpAddr>().map_err(|_| {
        ProvisionError::network(format!(
            "Public IP service {} returned an invalid address: '{}'",
            url,
            trimmed.chars().take(64).collect::<String>()
        ))
    })
}

/// reqwest-backed downloader with a progress bar
pub struct NetworkDownloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl NetworkDownloader {
    /// Create a new network downloader
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            show_progress: true,
        })
    }

    /// Disable the terminal progress bar (quiet mode)
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn progress_bar(&self, total_size: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

#[async_trait::async_trait]
impl HttpFetcher for NetworkDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProvisionError::network(format!("Download of {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProvisionError::network(format!(
                "Download of {} failed with status: {}",
                url,
                response.status()
            )));
        }

        let pb = self.progress_bar(response.content_length().unwrap_or(0));

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ProvisionError::network(format!("Download of {} interrupted: {}", url, e))
            })?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await?;
        pb.finish_and_clear();

        info!("Downloaded {} bytes to: {}", downloaded, dest.display());
        Ok(())
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ProvisionError::network(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProvisionError::network(format!(
                "Request to {} failed with status: {}",
                url,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ProvisionError::network(format!("Reading {} failed: {}", url, e)))
    }
}
