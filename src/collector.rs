use std::time::Duration;

use reqwest::Url;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::browser::{BrowseSession, PageState};
use crate::error::ScrapeError;
use crate::models::TaskHandle;

/// Query parameter of a candidate's link that carries the full-resolution image URL.
const IMAGE_URL_PARAM: &str = "imgurl";

/// Consecutive load rounds without new candidates before collection settles for what it has.
const MAX_STALLED_ROUNDS: usize = 3;

#[derive(Debug, Clone)]
pub struct CollectorSettings {
  pub load_wait_timeout: Duration,
  pub link_wait_timeout: Duration,
  pub poll_interval: Duration,
}

impl Default for CollectorSettings {
  fn default() -> Self {
    Self {
      load_wait_timeout: Duration::from_secs(30),
      link_wait_timeout: Duration::from_secs(10),
      poll_interval: Duration::from_millis(250),
    }
  }
}

/// Accumulates up to `target` image URLs from the session's results page.
///
/// Progress is written to `task` as candidates are discovered and as links are
/// extracted. Failures on individual candidates are logged and skipped; only an
/// empty result page or a broken session is returned as an error.
pub async fn collect(
  session: &mut dyn BrowseSession,
  target: usize,
  task: &TaskHandle,
  settings: &CollectorSettings,
) -> Result<Vec<String>, ScrapeError> {
  let task_id = task.id();
  let mut found = session.scan_candidates().await.map_err(ScrapeError::session)?;
  if found == 0 {
    return Err(ScrapeError::NoResultsFound);
  }

  task.set_msg("Loading Images...");
  task.set_progress(format!("{} Images Found", found));

  let mut stalled_rounds = 0;
  while found < target {
    let Some(ready) = wait_for_more(session, settings).await? else {
      warn!("Task {}: page did not finish loading within {:?}, stopping at {} candidates", task_id, settings.load_wait_timeout, found);
      break;
    };

    if ready.load_more_actionable && session.click_load_more().await.map_err(ScrapeError::session)? {
      debug!("Task {}: clicked load more", task_id);
    }

    session.scroll_to_bottom().await.map_err(ScrapeError::session)?;
    let state = session.page_state().await.map_err(ScrapeError::session)?;

    let previous = found;
    found = session.scan_candidates().await.map_err(ScrapeError::session)?;
    if found == 0 {
      return Err(ScrapeError::NoResultsFound);
    }
    task.set_progress(format!("{} Images Found", found));

    if state.exhausted() {
      info!("Task {}: reached the end of results with {} candidates", task_id, found);
      break;
    }

    if found > previous {
      stalled_rounds = 0;
    } else {
      stalled_rounds += 1;
      if stalled_rounds >= MAX_STALLED_ROUNDS {
        warn!("Task {}: no new candidates after {} rounds, stopping at {}", task_id, stalled_rounds, found);
        break;
      }
      sleep(settings.poll_interval).await;
    }
  }

  let target = target.min(found);
  let mut results = Vec::with_capacity(target);
  task.set_msg("Getting Image Links...");
  task.set_progress(format!("{}/{} Images Loaded", results.len(), target));

  for index in 0..found {
    if results.len() >= target {
      break;
    }
    match extract_reference(session, index, settings).await {
      Ok(url) => {
        results.push(url);
        task.set_progress(format!("{}/{} Images Loaded", results.len(), target));
      }
      Err(e) => warn!("Task {}: {}", task_id, e),
    }
  }

  info!("Task {}: collected {} image links", task_id, results.len());
  Ok(results)
}

/// Scrolls and polls until the page can deliver more results. `None` means the
/// page stayed busy for the whole wait.
async fn wait_for_more(
  session: &mut dyn BrowseSession,
  settings: &CollectorSettings,
) -> Result<Option<PageState>, ScrapeError> {
  let poll = async {
    loop {
      session.scroll_to_bottom().await?;
      let state = session.page_state().await?;
      if state.ready_for_more() {
        return Ok::<_, anyhow::Error>(state);
      }
      sleep(settings.poll_interval).await;
    }
  };

  match timeout(settings.load_wait_timeout, poll).await {
    Ok(Ok(state)) => Ok(Some(state)),
    Ok(Err(e)) => Err(ScrapeError::session(e)),
    Err(_) => Ok(None),
  }
}

async fn extract_reference(
  session: &mut dyn BrowseSession,
  index: usize,
  settings: &CollectorSettings,
) -> Result<String, ScrapeError> {
  let failed = |reason: String| ScrapeError::Extraction { index, reason };

  session
    .activate_candidate(index)
    .await
    .map_err(|e| failed(format!("{:#}", e)))?;

  let poll = async {
    loop {
      match session.candidate_link(index).await? {
        Some(href) if !href.is_empty() => return Ok::<_, anyhow::Error>(href),
        _ => sleep(settings.poll_interval).await,
      }
    }
  };
  let href = timeout(settings.link_wait_timeout, poll)
    .await
    .map_err(|_| failed(format!("link was not populated within {:?}", settings.link_wait_timeout)))?
    .map_err(|e| failed(format!("{:#}", e)))?;

  image_url_from_link(&href).map_err(failed)
}

pub fn image_url_from_link(href: &str) -> Result<String, String> {
  let url = Url::parse(href).map_err(|e| format!("malformed link {:?}: {}", href, e))?;
  url
    .query_pairs()
    .find(|(key, _)| key == IMAGE_URL_PARAM)
    .map(|(_, value)| value.into_owned())
    .filter(|value| !value.is_empty())
    .ok_or_else(|| format!("link {:?} has no {} parameter", href, IMAGE_URL_PARAM))
}
