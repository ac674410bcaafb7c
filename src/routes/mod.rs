use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use warp::Filter;

use crate::scraper::Scraper;
use crate::task_store::TaskStore;

pub mod sse;
pub mod tasks;

const SSE_INTERVAL: Duration = Duration::from_secs(1);

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
  pub status: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  pub data: Value,
}

impl ApiResponse {
  pub fn success<T: Serialize>(data: &T) -> Self {
    Self {
      status: "success",
      message: None,
      data: serde_json::to_value(data).unwrap_or_default(),
    }
  }

  pub fn fail(message: impl Into<String>) -> Self {
    Self { status: "fail", message: Some(message.into()), data: Value::Object(Default::default()) }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self { status: "error", message: Some(message.into()), data: Value::Object(Default::default()) }
  }
}

pub fn routes(
  scraper: Arc<Scraper>,
  store: TaskStore,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  let output_dir = scraper.archiver().output_dir().to_path_buf();
  let cors = warp::cors()
    .allow_any_origin()
    .allow_methods(vec!["GET", "POST"])
    .allow_headers(vec!["content-type"]);

  tasks::health_route()
    .or(tasks::scrape_route(scraper, store.clone()))
    .or(tasks::progress_route(store.clone()))
    .or(tasks::download_route(output_dir))
    .or(sse::sse_route(store, SSE_INTERVAL))
    .with(cors)
}
