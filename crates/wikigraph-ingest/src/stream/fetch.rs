//! Dump download.

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::DumpConfig;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};

/// Downloads a dump to disk, retrying throttled or interrupted transfers.
///
/// The body is written to `<dest>.part` and renamed once complete, so a
/// present `dest` is always a whole dump.
pub struct DumpFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
    progress: bool,
}

impl DumpFetcher {
    /// Creates a fetcher sending `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            retry: RetryConfig::default(),
            progress: true,
        })
    }

    /// Creates a fetcher from the dump section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &DumpConfig) -> Result<Self> {
        Ok(Self::new(&config.user_agent)?
            .with_retry(RetryConfig::with_max_retries(config.download_retries)))
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Shows or hides the byte progress bar.
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Downloads `url` to `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or immediately for
    /// non-retryable failures such as 404 or 403.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());
        let bytes = with_retry(&self.retry, "dump download", || self.download(url, dest)).await?;
        info!("Downloaded {} bytes", bytes);
        Ok(bytes)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        check_status(response.status())?;

        let total = response.content_length();
        let progress = self.progress_bar(total);
        let part = part_path(dest);
        let mut file = tokio::fs::File::create(&part).await?;
        let mut written = 0u64;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }
        file.flush().await?;
        drop(file);
        progress.finish_and_clear();

        if let Some(expected) = total {
            if written != expected {
                return Err(Error::Download(format!(
                    "body truncated: {written} of {expected} bytes"
                )));
            }
        }

        tokio::fs::rename(&part, dest).await?;
        Ok(written)
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn check_status(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimit(format!("HTTP {status}"))),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(Error::Authentication(format!("HTTP {status}")))
        }
        _ => Err(Error::Download(format!("HTTP {status}"))),
    }
}
