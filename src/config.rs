use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::scraper::DEFAULT_SEARCH_BASE_URL;

#[derive(Debug, Clone)]
pub struct Config {
  pub server_port: u16,
  pub output_dir: PathBuf,
  pub webdriver_url: String,
  pub search_base_url: String,
  pub archive_retention: Duration,
  pub fetch_timeout: Duration,
  pub load_wait_timeout: Duration,
  pub link_wait_timeout: Duration,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      server_port: parsed("SERVER_PORT", 4000),
      output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".into()).into(),
      webdriver_url: env::var("WEBDRIVER_URL").unwrap_or_else(|_| "http://localhost:4444".into()),
      search_base_url: env::var("SEARCH_BASE_URL").unwrap_or_else(|_| DEFAULT_SEARCH_BASE_URL.into()),
      archive_retention: Duration::from_secs(parsed("ARCHIVE_RETENTION_SECS", 30 * 60)),
      fetch_timeout: Duration::from_secs(parsed("FETCH_TIMEOUT_SECS", 30)),
      load_wait_timeout: Duration::from_secs(parsed("LOAD_WAIT_TIMEOUT_SECS", 30)),
      link_wait_timeout: Duration::from_secs(parsed("LINK_WAIT_TIMEOUT_SECS", 10)),
    }
  }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
  env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default)
}
