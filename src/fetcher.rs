use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, header};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;

static MAX_RETRIES: usize = 2;
static DELAY_FACTOR: u64 = 50;
static MAX_DELAY: Duration = Duration::from_secs(1);

/// Delays between attempts after a transport error: 100ms, 200ms.
pub fn fetch_backoff() -> impl Iterator<Item = Duration> {
  ExponentialBackoff::from_millis(2)
    .factor(DELAY_FACTOR)
    .max_delay(MAX_DELAY)
    .take(MAX_RETRIES)
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
  pub content_type: Option<String>,
  pub data: Vec<u8>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
  async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

pub struct HttpFetcher {
  client: Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
  async fn fetch(&self, url: &str) -> Result<FetchedImage> {
    // Only transport errors are retried; an HTTP error status is final.
    let response = Retry::spawn(fetch_backoff(), || {
      self.client.get(url).send()
    })
      .await?
      .error_for_status()?;

    let content_type = response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|s| s.to_string());
    let data = response.bytes().await?.to_vec();

    Ok(FetchedImage { content_type, data })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fetch_backoff_adds_little_to_a_dead_image() {
    let delays: Vec<Duration> = fetch_backoff().collect();
    assert_eq!(delays, vec![Duration::from_millis(100), Duration::from_millis(200)]);
  }
}
