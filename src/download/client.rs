use crate::error::FetchError;
use futures_util::StreamExt;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for download retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fail on the first error
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Upper bound on the buffer reserved up front from a `Content-Length` header
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.unwrap_or(0).min(MAX_PREALLOCATION) as usize
}

/// Download a file into memory
pub async fn download_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Network(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let mut data = Vec::with_capacity(initial_capacity(response.content_length()));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| FetchError::Network(format!("Error downloading {}: {}", url, e)))?;
        data.extend_from_slice(&chunk);
    }

    debug!("Downloaded {} bytes from {}", data.len(), url);
    Ok(data)
}

/// Download a file with automatic retry on failure
pub async fn download_bytes_with_retry(
    client: &reqwest::Client,
    url: &str,
    config: RetryConfig,
) -> Result<Vec<u8>, FetchError> {
    let mut last_error = None;
    let mut delay = config.initial_delay_ms;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            warn!(
                "Retry attempt {}/{} for {}, waiting {}ms",
                attempt, config.max_retries, url, delay
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay = ((delay as f64) * config.backoff_multiplier) as u64;
            delay = delay.min(config.max_delay_ms);
        }

        match download_bytes(client, url).await {
            Ok(data) => {
                if attempt > 0 {
                    info!("Successfully downloaded {} after {} retries", url, attempt);
                }
                return Ok(data);
            }
            // Client errors will not fix themselves
            Err(e) if is_client_error(&e) => return Err(e),
            Err(e) => {
                warn!("Download attempt {} failed for {}: {}", attempt + 1, url, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        FetchError::Network(format!(
            "Failed to download {} after {} retries",
            url, config.max_retries
        ))
    }))
}

fn is_client_error(error: &FetchError) -> bool {
    matches!(error, FetchError::Status { status, .. } if (400..500).contains(status))
}

/// Hex SHA-1 of a buffer
pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Verify SHA1 hash of a downloaded buffer
pub fn verify_sha1(data: &[u8], expected: &str) -> bool {
    sha1_hex(data).eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(1024)), 1024);
        assert_eq!(initial_capacity(Some(u64::MAX)), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn test_sha1_hex() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_verify_sha1_ignores_case() {
        assert!(verify_sha1(b"abc", "A9993E364706816ABA3E25717850C26C9CD0D89D"));
        assert!(!verify_sha1(b"abd", "a9993e364706816aba3e25717850c26c9cd0d89d"));
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 500);
        assert_eq!(RetryConfig::none().max_retries, 0);
    }

    #[tokio::test]
    async fn test_download_unreachable_host_is_network_error() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let result = download_bytes_with_retry(&client, "http://127.0.0.1:9/mod.jar", RetryConfig::none()).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
