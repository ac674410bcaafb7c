use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::archiver::Archiver;
use crate::browser::{BrowseSession, BrowserLauncher};
use crate::collector::{CollectorSettings, collect};
use crate::error::ScrapeError;
use crate::fetcher::ImageFetcher;
use crate::models::{Task, TaskHandle};
use crate::search_filter::{SearchFilter, search_url};
use crate::task_store::TaskStore;

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://www.google.com/search";

pub const MSG_INITIALIZATION_FAILED: &str = "Initialization Failed";
pub const MSG_NO_IMAGES_FOUND: &str = "No Images Found";
pub const MSG_SCRAPING_FAILED: &str = "Scraping Failed";
pub const MSG_ARCHIVING_FAILED: &str = "Archiving Failed";
pub const MSG_READY: &str = "Your Images Are Ready";

#[derive(Debug, Clone)]
pub struct ScrapeJob {
  pub search: String,
  pub num_of_images: usize,
  pub filter: SearchFilter,
}

/// Runs scrape jobs: browse, collect links, download, archive.
pub struct Scraper {
  launcher: Arc<dyn BrowserLauncher>,
  fetcher: Arc<dyn ImageFetcher>,
  archiver: Archiver,
  search_base_url: String,
  collector: CollectorSettings,
}

impl Scraper {
  pub fn new(launcher: Arc<dyn BrowserLauncher>, fetcher: Arc<dyn ImageFetcher>, archiver: Archiver) -> Self {
    Self {
      launcher,
      fetcher,
      archiver,
      search_base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
      collector: CollectorSettings::default(),
    }
  }

  pub fn with_search_base_url(mut self, url: impl Into<String>) -> Self {
    self.search_base_url = url.into();
    self
  }

  pub fn with_collector_settings(mut self, settings: CollectorSettings) -> Self {
    self.collector = settings;
    self
  }

  pub fn archiver(&self) -> &Archiver {
    &self.archiver
  }

  /// Drives one job to a terminal state and returns the collected image links.
  ///
  /// The new task is handed to `on_task_created` before any work starts; the
  /// handle it returns is the one mutated for the rest of the run.
  pub async fn run<F>(&self, job: ScrapeJob, on_task_created: F) -> Vec<String>
  where
    F: FnOnce(TaskHandle) -> TaskHandle + Send,
  {
    let task = on_task_created(TaskHandle::new(Task::new()));
    let task_id = task.id();
    info!("Task {}: scraping {} images for {:?}", task_id, job.num_of_images, job.search);

    let url = match search_url(&self.search_base_url, &job.search, &job.filter) {
      Ok(url) => url,
      Err(e) => {
        error!("Task {}: invalid search url: {:#}", task_id, e);
        task.fail(MSG_INITIALIZATION_FAILED);
        return Vec::new();
      }
    };

    let mut session = match self.launcher.launch().await {
      Ok(session) => session,
      Err(e) => {
        error!("Task {}: could not open browser session: {:#}", task_id, e);
        task.fail(MSG_INITIALIZATION_FAILED);
        return Vec::new();
      }
    };

    if let Err(e) = session.navigate(url.as_str()).await {
      let err = ScrapeError::Navigation { url: url.to_string(), reason: format!("{:#}", e) };
      error!("Task {}: {}", task_id, err);
      task.fail(MSG_INITIALIZATION_FAILED);
      release(session, &task).await;
      return Vec::new();
    }

    let collected = collect(session.as_mut(), job.num_of_images, &task, &self.collector).await;
    release(session, &task).await;

    let references = match collected {
      Ok(references) => references,
      Err(ScrapeError::NoResultsFound) => {
        warn!("Task {}: no images found for {:?}", task_id, job.search);
        task.fail(MSG_NO_IMAGES_FOUND);
        return Vec::new();
      }
      Err(e) => {
        error!("Task {}: {}", task_id, e);
        task.fail(MSG_SCRAPING_FAILED);
        return Vec::new();
      }
    };

    if let Err(e) = self.archiver.download_and_archive(self.fetcher.as_ref(), &references, &task).await {
      error!("Task {}: archiving failed: {:#}", task_id, e);
      task.fail(MSG_ARCHIVING_FAILED);
      return references;
    }

    task.succeed(MSG_READY);
    info!("Task {}: done", task_id);
    references
  }
}

async fn release(session: Box<dyn BrowseSession>, task: &TaskHandle) {
  if let Err(e) = session.close().await {
    warn!("Task {}: closing browser session failed: {:#}", task.id(), e);
  }
}

/// Starts `job` in the background and returns the freshly registered task as
/// soon as it exists; the job keeps running after this returns.
pub async fn start_scrape(scraper: Arc<Scraper>, job: ScrapeJob, store: TaskStore) -> Result<Task> {
  let (tx, rx) = oneshot::channel();
  tokio::spawn(async move {
    scraper
      .run(job, move |task| {
        store.insert(task.clone());
        let _ = tx.send(task.snapshot());
        task
      })
      .await;
  });
  rx.await.context("scrape job stopped before creating its task")
}
