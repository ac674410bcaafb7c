use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde::Deserialize;
use serde_json::json;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info};

static MAX_RETRIES: usize = 3;
static DELAY_FACTOR: u64 = 100;
static MAX_DELAY: Duration = Duration::from_secs(2);

/// Delays between WebDriver connection attempts: 200ms, 400ms, 800ms.
pub fn connect_backoff() -> impl Iterator<Item = Duration> {
  ExponentialBackoff::from_millis(2)
    .factor(DELAY_FACTOR)
    .max_delay(MAX_DELAY)
    .take(MAX_RETRIES)
}

pub const SEE_MORE_ANYWAY_LABEL: &str = "See more anyway";

/// What the results page currently shows below the image grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
  /// The loading indicator still reads as busy.
  pub loading: bool,
  /// A "load more" control is visible and clickable.
  pub load_more_actionable: bool,
  /// Label of the "see more anyway" affordance, if one is shown.
  pub see_more_anyway: Option<String>,
  /// The page states that there are no further results.
  pub end_of_results: bool,
}

impl PageState {
  pub fn ready_for_more(&self) -> bool {
    self.load_more_actionable || self.see_more_anyway.is_some() || !self.loading
  }

  pub fn exhausted(&self) -> bool {
    self.end_of_results || self.see_more_anyway.as_deref() == Some(SEE_MORE_ANYWAY_LABEL)
  }
}

/// One automated browsing context. Candidate indexes refer to the most recent scan.
#[async_trait]
pub trait BrowseSession: Send {
  async fn navigate(&mut self, url: &str) -> Result<()>;
  async fn scan_candidates(&mut self) -> Result<usize>;
  async fn scroll_to_bottom(&mut self) -> Result<()>;
  async fn page_state(&mut self) -> Result<PageState>;
  /// Clicks the "load more" control if it is actionable; returns whether it clicked.
  async fn click_load_more(&mut self) -> Result<bool>;
  async fn activate_candidate(&mut self, index: usize) -> Result<()>;
  /// Current link of a candidate; `None` or empty until the page has populated it.
  async fn candidate_link(&mut self, index: usize) -> Result<Option<String>>;
  async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
  async fn launch(&self) -> Result<Box<dyn BrowseSession>>;
}

/// CSS selectors and indicator texts of the image results page.
#[derive(Debug, Clone)]
pub struct PageSelectors {
  pub candidate: String,
  pub status_text: String,
  pub load_more_button: String,
  pub see_more_anyway: String,
  pub busy_text: String,
  pub end_text: String,
}

impl Default for PageSelectors {
  fn default() -> Self {
    Self {
      candidate: "#islrg > div.islrc > div > a:nth-child(2)".into(),
      status_text: "#islmp .Bqq24e".into(),
      load_more_button: "#islmp input[type=button]".into(),
      see_more_anyway: "#islmp > div > div > div > div.WYR1I > span".into(),
      busy_text: "Wait while more content is being loaded".into(),
      end_text: "Looks like you've reached the end".into(),
    }
  }
}

pub struct WebDriverLauncher {
  webdriver_url: String,
  selectors: PageSelectors,
}

impl WebDriverLauncher {
  pub fn new(webdriver_url: impl Into<String>) -> Self {
    Self { webdriver_url: webdriver_url.into(), selectors: PageSelectors::default() }
  }

  pub fn with_selectors(mut self, selectors: PageSelectors) -> Self {
    self.selectors = selectors;
    self
  }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
  async fn launch(&self) -> Result<Box<dyn BrowseSession>> {
    let mut capabilities = serde_json::Map::new();
    capabilities.insert(
      "goog:chromeOptions".into(),
      json!({ "args": ["--headless", "--no-sandbox"] }),
    );

    let client = Retry::spawn(connect_backoff(), || {
      let mut builder = ClientBuilder::native();
      builder.capabilities(capabilities.clone());
      let url = self.webdriver_url.clone();
      async move { builder.connect(&url).await }
    })
      .await
      .with_context(|| format!("could not open WebDriver session at {}", self.webdriver_url))?;
    info!("WebDriver session opened at {}", self.webdriver_url);

    Ok(Box::new(WebDriverSession {
      client,
      selectors: self.selectors.clone(),
      candidates: Vec::new(),
    }))
  }
}

pub struct WebDriverSession {
  client: Client,
  selectors: PageSelectors,
  candidates: Vec<Element>,
}

impl WebDriverSession {
  fn candidate(&self, index: usize) -> Result<&Element> {
    self
      .candidates
      .get(index)
      .ok_or_else(|| anyhow!("candidate {} is out of range ({} scanned)", index, self.candidates.len()))
  }
}

#[async_trait]
impl BrowseSession for WebDriverSession {
  async fn navigate(&mut self, url: &str) -> Result<()> {
    self.client.goto(url).await?;
    Ok(())
  }

  async fn scan_candidates(&mut self) -> Result<usize> {
    self.candidates = self.client.find_all(Locator::Css(&self.selectors.candidate)).await?;
    debug!("Scanned {} candidates", self.candidates.len());
    Ok(self.candidates.len())
  }

  async fn scroll_to_bottom(&mut self) -> Result<()> {
    self
      .client
      .execute("window.scrollTo(0, document.body.scrollHeight); return null;", vec![])
      .await?;
    Ok(())
  }

  async fn page_state(&mut self) -> Result<PageState> {
    let script = r#"
      const [statusSel, seeMoreSel, buttonSel, busyText, endText] = arguments;
      const status = document.querySelector(statusSel);
      const text = status ? status.innerText : '';
      const seeMore = document.querySelector(seeMoreSel);
      const button = document.querySelector(buttonSel);
      return {
        loading: text === busyText,
        loadMoreActionable: !!button && !!button.parentElement && button.parentElement.style.display === '',
        seeMoreAnyway: seeMore ? seeMore.textContent : null,
        endOfResults: text === endText,
      };
    "#;
    let args = vec![
      json!(self.selectors.status_text),
      json!(self.selectors.see_more_anyway),
      json!(self.selectors.load_more_button),
      json!(self.selectors.busy_text),
      json!(self.selectors.end_text),
    ];
    let value = self.client.execute(script, args).await?;
    Ok(serde_json::from_value(value)?)
  }

  async fn click_load_more(&mut self) -> Result<bool> {
    let script = r#"
      const button = document.querySelector(arguments[0]);
      if (button && button.parentElement && button.parentElement.style.display === '') {
        button.click();
        return true;
      }
      return false;
    "#;
    let clicked = self
      .client
      .execute(script, vec![json!(self.selectors.load_more_button)])
      .await?;
    Ok(clicked.as_bool().unwrap_or(false))
  }

  async fn activate_candidate(&mut self, index: usize) -> Result<()> {
    self.candidate(index)?.click().await?;
    Ok(())
  }

  async fn candidate_link(&mut self, index: usize) -> Result<Option<String>> {
    Ok(self.candidate(index)?.prop("href").await?)
  }

  async fn close(self: Box<Self>) -> Result<()> {
    self.client.close().await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn connect_backoff_stays_short() {
    let delays: Vec<Duration> = connect_backoff().collect();
    assert_eq!(delays.len(), MAX_RETRIES);
    assert!(delays.iter().all(|d| *d <= MAX_DELAY));
    assert!(delays.iter().sum::<Duration>() < Duration::from_secs(5));
  }

  #[test]
  fn busy_page_is_not_ready() {
    let state = PageState { loading: true, ..Default::default() };
    assert!(!state.ready_for_more());
    assert!(!state.exhausted());
  }

  #[test]
  fn see_more_anyway_unblocks_and_ends() {
    let state = PageState {
      loading: true,
      see_more_anyway: Some(SEE_MORE_ANYWAY_LABEL.into()),
      ..Default::default()
    };
    assert!(state.ready_for_more());
    assert!(state.exhausted());

    let other_label = PageState { see_more_anyway: Some("Show similar".into()), ..state };
    assert!(other_label.ready_for_more());
    assert!(!other_label.exhausted());
  }

  #[test]
  fn page_state_parses_script_output() {
    let state: PageState = serde_json::from_value(json!({
      "loading": false,
      "loadMoreActionable": true,
      "seeMoreAnyway": null,
      "endOfResults": false
    }))
    .unwrap();
    assert!(state.load_more_actionable);
    assert!(state.ready_for_more());
  }
}
