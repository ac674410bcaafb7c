// Scripted browser and fetcher doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use imgharvest::archiver::Archiver;
use imgharvest::browser::{BrowseSession, BrowserLauncher, PageState};
use imgharvest::collector::CollectorSettings;
use imgharvest::fetcher::{FetchedImage, ImageFetcher};
use imgharvest::scraper::Scraper;

/// How the fake results page behaves.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
  /// Candidate count after the initial load and after each "load more".
  pub batches: Vec<usize>,
  /// Link per candidate. An empty string is never populated.
  pub links: Vec<String>,
  pub fail_launch: bool,
  pub fail_navigation: bool,
  /// The loading indicator never leaves its busy state.
  pub stuck_loading: bool,
  /// The page idles without a load-more control or an end marker.
  pub stalled: bool,
  /// Text of the "see more anyway" affordance, shown from the first load on.
  pub see_more_label: Option<String>,
}

impl FakePage {
  /// `count` candidates available at once, each linking to `https://img.test/<i>.jpg`.
  pub fn with_images(count: usize) -> Self {
    Self {
      batches: vec![count],
      links: (0..count).map(image_link).collect(),
      ..Default::default()
    }
  }
}

pub fn image_url(index: usize) -> String {
  format!("https://img.test/{}.jpg", index)
}

pub fn image_link(index: usize) -> String {
  format!("https://www.google.com/imgres?imgurl=https%3A%2F%2Fimg.test%2F{}.jpg&imgrefurl=x", index)
}

#[derive(Debug, Default)]
pub struct Counters {
  pub launches: AtomicUsize,
  pub navigations: AtomicUsize,
  pub load_more_clicks: AtomicUsize,
  pub closes: AtomicUsize,
}

impl Counters {
  pub fn closes(&self) -> usize {
    self.closes.load(Ordering::SeqCst)
  }
}

pub struct FakeLauncher {
  pub page: FakePage,
  pub counters: Arc<Counters>,
}

impl FakeLauncher {
  pub fn new(page: FakePage) -> Self {
    Self { page, counters: Arc::new(Counters::default()) }
  }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
  async fn launch(&self) -> Result<Box<dyn BrowseSession>> {
    if self.page.fail_launch {
      bail!("webdriver unreachable");
    }
    self.counters.launches.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(FakeSession::new(self.page.clone(), self.counters.clone())))
  }
}

pub struct FakeSession {
  page: FakePage,
  counters: Arc<Counters>,
  batch: usize,
  visible: usize,
  activated: Vec<bool>,
}

impl FakeSession {
  pub fn new(page: FakePage, counters: Arc<Counters>) -> Self {
    let activated = vec![false; page.links.len()];
    Self { page, counters, batch: 0, visible: 0, activated }
  }

  fn has_more(&self) -> bool {
    self.batch + 1 < self.page.batches.len()
  }
}

#[async_trait]
impl BrowseSession for FakeSession {
  async fn navigate(&mut self, _url: &str) -> Result<()> {
    self.counters.navigations.fetch_add(1, Ordering::SeqCst);
    if self.page.fail_navigation {
      bail!("net::ERR_NAME_NOT_RESOLVED");
    }
    Ok(())
  }

  async fn scan_candidates(&mut self) -> Result<usize> {
    self.visible = self.page.batches.get(self.batch).copied().unwrap_or(0);
    Ok(self.visible)
  }

  async fn scroll_to_bottom(&mut self) -> Result<()> {
    Ok(())
  }

  async fn page_state(&mut self) -> Result<PageState> {
    if self.page.stalled {
      return Ok(PageState::default());
    }
    Ok(PageState {
      loading: self.page.stuck_loading,
      load_more_actionable: !self.page.stuck_loading && self.has_more(),
      see_more_anyway: self.page.see_more_label.clone(),
      end_of_results: !self.page.stuck_loading && !self.has_more(),
    })
  }

  async fn click_load_more(&mut self) -> Result<bool> {
    if !self.has_more() {
      return Ok(false);
    }
    self.batch += 1;
    self.counters.load_more_clicks.fetch_add(1, Ordering::SeqCst);
    Ok(true)
  }

  async fn activate_candidate(&mut self, index: usize) -> Result<()> {
    if index >= self.visible {
      bail!("candidate {} is not on the page", index);
    }
    self.activated[index] = true;
    Ok(())
  }

  async fn candidate_link(&mut self, index: usize) -> Result<Option<String>> {
    if !self.activated.get(index).copied().unwrap_or(false) {
      return Ok(None);
    }
    Ok(self.page.links.get(index).cloned())
  }

  async fn close(self: Box<Self>) -> Result<()> {
    self.counters.closes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// Serves canned images; URLs without an entry fail. Optional per-URL delays.
#[derive(Default)]
pub struct FakeFetcher {
  pub images: HashMap<String, FetchedImage>,
  pub delays: HashMap<String, Duration>,
  pub calls: AtomicUsize,
}

impl FakeFetcher {
  pub fn serving(urls: impl IntoIterator<Item = String>) -> Self {
    let images = urls
      .into_iter()
      .map(|url| {
        let image = FetchedImage { content_type: Some("image/jpeg".into()), data: url.as_bytes().to_vec() };
        (url, image)
      })
      .collect();
    Self { images, ..Default::default() }
  }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
  async fn fetch(&self, url: &str) -> Result<FetchedImage> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delays.get(url) {
      tokio::time::sleep(*delay).await;
    }
    self.images.get(url).cloned().ok_or_else(|| anyhow!("404 Not Found for {}", url))
  }
}

pub fn fast_collector() -> CollectorSettings {
  CollectorSettings {
    load_wait_timeout: Duration::from_millis(100),
    link_wait_timeout: Duration::from_millis(40),
    poll_interval: Duration::from_millis(5),
  }
}

pub fn scraper(launcher: Arc<FakeLauncher>, fetcher: Arc<FakeFetcher>, output_dir: &Path) -> Scraper {
  Scraper::new(launcher, fetcher, Archiver::new(output_dir, Duration::from_secs(60)))
    .with_collector_settings(fast_collector())
}

/// Entry names and contents of a finished archive.
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
  let file = std::fs::File::open(path).unwrap();
  let mut zip = zip::ZipArchive::new(file).unwrap();
  (0..zip.len())
    .map(|i| {
      let mut entry = zip.by_index(i).unwrap();
      let mut data = Vec::new();
      entry.read_to_end(&mut data).unwrap();
      (entry.name().to_string(), data)
    })
    .collect()
}
