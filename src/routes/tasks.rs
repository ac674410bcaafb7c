use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderValue, LOCATION};
use warp::http::StatusCode;
use warp::filters::body::BodyDeserializeError;
use warp::reject::UnsupportedMediaType;
use warp::{Filter, Rejection, Reply};

use crate::routes::ApiResponse;
use crate::scraper::{ScrapeJob, Scraper, start_scrape};
use crate::search_filter::SearchFilter;
use crate::storage::find_archive;
use crate::task_store::TaskStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
  pub search: Option<String>,
  pub num_of_images: Option<usize>,
  #[serde(flatten)]
  pub filter: SearchFilter,
}

impl ScrapeRequest {
  fn into_job(self) -> Result<ScrapeJob, String> {
    let search = self.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let num_of_images = self.num_of_images.filter(|n| *n > 0);
    match (search, num_of_images) {
      (Some(search), Some(num_of_images)) => Ok(ScrapeJob { search, num_of_images, filter: self.filter }),
      _ => Err("search or numOfImages is not defined".into()),
    }
  }
}

fn with_store(store: TaskStore) -> impl Filter<Extract = (TaskStore,), Error = Infallible> + Clone {
  warp::any().map(move || store.clone())
}

fn with_scraper(scraper: Arc<Scraper>) -> impl Filter<Extract = (Arc<Scraper>,), Error = Infallible> + Clone {
  warp::any().map(move || scraper.clone())
}

pub fn health_route() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path::end()
    .and(warp::get())
    .map(|| "Server is up & running...")
}

pub fn scrape_route(scraper: Arc<Scraper>, store: TaskStore) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("scrape-google-images")
    .and(warp::path::end())
    .and(warp::post())
    .and(scrape_body())
    .and(warp::header::optional::<String>("host"))
    .and(warp::header::optional::<String>("x-forwarded-proto"))
    .and(with_scraper(scraper))
    .and(with_store(store))
    .and_then(handle_scrape)
    .recover(reject_body)
    .unify()
}

/// Accepts the request as JSON or as an urlencoded form.
fn scrape_body() -> impl Filter<Extract = (Value,), Error = Rejection> + Clone {
  warp::body::json::<Value>()
    .or(warp::body::form::<HashMap<String, String>>().map(form_to_json))
    .unify()
}

/// Form values arrive as strings; the image count is turned back into a number
/// so both encodings go through the same request parsing.
fn form_to_json(form: HashMap<String, String>) -> Value {
  let fields = form
    .into_iter()
    .map(|(key, value)| {
      let value = match (key.as_str(), value.trim().parse::<u64>()) {
        ("numOfImages", Ok(n)) => Value::from(n),
        _ => Value::String(value),
      };
      (key, value)
    })
    .collect();
  Value::Object(fields)
}

async fn reject_body(err: Rejection) -> Result<warp::reply::Response, Rejection> {
  let reason = if let Some(e) = err.find::<BodyDeserializeError>() {
    e.to_string()
  } else if let Some(e) = err.find::<UnsupportedMediaType>() {
    e.to_string()
  } else {
    return Err(err);
  };
  warn!("Rejected scrape body: {}", reason);
  let reply = warp::reply::json(&ApiResponse::fail(format!("Invalid request body: {}", reason)));
  Ok(warp::reply::with_status(reply, StatusCode::BAD_REQUEST).into_response())
}

pub fn progress_route(store: TaskStore) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("check-scraping-progress" / String)
    .and(warp::get())
    .and(with_store(store))
    .and_then(handle_progress)
}

pub fn download_route(output_dir: PathBuf) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("download-scraped-images" / String)
    .and(warp::get())
    .and(warp::any().map(move || output_dir.clone()))
    .and_then(handle_download)
}

async fn handle_scrape(
  body: Value,
  host: Option<String>,
  scheme: Option<String>,
  scraper: Arc<Scraper>,
  store: TaskStore,
) -> Result<warp::reply::Response, warp::Rejection> {
  let request: ScrapeRequest = match serde_json::from_value(body) {
    Ok(request) => request,
    Err(e) => {
      error!("Rejected scrape request: {}", e);
      return Ok(warp::reply::json(&ApiResponse::fail(format!("Invalid request: {}", e))).into_response());
    }
  };
  let job = match request.into_job() {
    Ok(job) => job,
    Err(message) => return Ok(warp::reply::json(&ApiResponse::fail(message)).into_response()),
  };

  let task = match start_scrape(scraper, job, store).await {
    Ok(task) => task,
    Err(e) => {
      error!("Failed to start scrape: {:#}", e);
      let reply = warp::reply::json(&ApiResponse::error("Could not start scraping"));
      return Ok(warp::reply::with_status(reply, StatusCode::INTERNAL_SERVER_ERROR).into_response());
    }
  };

  info!("Task {} accepted", task.task_id);
  let location = format!(
    "{}://{}/check-scraping-progress/{}",
    scheme.as_deref().unwrap_or("http"),
    host.as_deref().unwrap_or("localhost"),
    task.task_id
  );
  let reply = warp::reply::with_header(warp::reply::json(&ApiResponse::success(&task)), LOCATION, location);
  Ok(warp::reply::with_status(reply, StatusCode::ACCEPTED).into_response())
}

async fn handle_progress(task_id: String, store: TaskStore) -> Result<impl warp::Reply, warp::Rejection> {
  let response = match store.snapshot_str(&task_id) {
    Some(task) => ApiResponse::success(&task),
    None => ApiResponse::fail("Task does not exist, invalid taskId"),
  };
  Ok(warp::reply::json(&response))
}

async fn handle_download(task_id: String, output_dir: PathBuf) -> Result<warp::reply::Response, warp::Rejection> {
  let not_found = || warp::reply::json(&ApiResponse::fail("File Does Not Exist")).into_response();

  let Some(path) = find_archive(&output_dir, &task_id).await else {
    return Ok(not_found());
  };
  let bytes = match tokio::fs::read(&path).await {
    Ok(bytes) => bytes,
    Err(e) => {
      error!("Could not read archive {}: {}", path.display(), e);
      return Ok(not_found());
    }
  };

  let mut response = warp::reply::Response::new(bytes.into());
  let headers = response.headers_mut();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
  if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}.zip\"", task_id)) {
    headers.insert(CONTENT_DISPOSITION, value);
  }
  Ok(response)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(body: serde_json::Value) -> ScrapeRequest {
    serde_json::from_value(body).unwrap()
  }

  #[test]
  fn missing_fields_are_rejected() {
    let missing_count = request(serde_json::json!({ "search": "cats" }));
    assert_eq!(missing_count.into_job().unwrap_err(), "search or numOfImages is not defined");

    let blank_search = request(serde_json::json!({ "search": "  ", "numOfImages": 3 }));
    assert!(blank_search.into_job().is_err());

    let zero = request(serde_json::json!({ "search": "cats", "numOfImages": 0 }));
    assert!(zero.into_job().is_err());
  }

  #[test]
  fn form_fields_parse_like_json() {
    let form = HashMap::from([
      ("search".to_string(), "cats".to_string()),
      ("numOfImages".to_string(), "4".to_string()),
      ("color".to_string(), "gray".to_string()),
    ]);
    let job = request(form_to_json(form)).into_job().unwrap();
    assert_eq!(job.search, "cats");
    assert_eq!(job.num_of_images, 4);
  }

  #[test]
  fn non_numeric_form_count_stays_a_string() {
    let form = HashMap::from([("numOfImages".to_string(), "lots".to_string())]);
    assert_eq!(form_to_json(form)["numOfImages"], "lots");
  }

  #[test]
  fn filter_options_are_flattened_into_the_job() {
    let job = request(serde_json::json!({
      "search": "cats",
      "numOfImages": 3,
      "size": "l",
      "userRights": "cl"
    }))
    .into_job()
    .unwrap();
    assert_eq!(job.num_of_images, 3);
    assert_eq!(crate::search_filter::encode(&job.filter), "isz:l,il:cl");
  }
}
