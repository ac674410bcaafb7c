use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ScrapeError {
  #[error("navigation to {url} failed: {reason}")]
  Navigation { url: String, reason: String },
  #[error("no images found")]
  NoResultsFound,
  #[error("browser session failed: {0}")]
  Session(String),
  #[error("could not extract image link from candidate {index}: {reason}")]
  Extraction { index: usize, reason: String },
  #[error("download of {url} failed: {reason}")]
  Download { url: String, reason: String },
  #[error("task {0} does not exist")]
  LookupNotFound(Uuid),
}

impl ScrapeError {
  pub fn session(err: anyhow::Error) -> Self {
    ScrapeError::Session(format!("{:#}", err))
  }
}
