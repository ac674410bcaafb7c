use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use futures::stream;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use warp::{Filter, Reply};

use crate::routes::ApiResponse;
use crate::task_store::TaskStore;

fn with_store(store: TaskStore) -> impl Filter<Extract = (TaskStore,), Error = Infallible> + Clone {
  warp::any().map(move || store.clone())
}

pub fn sse_route(store: TaskStore, interval: Duration) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("sse")
    .and(warp::path::end())
    .and(warp::get())
    .and(warp::query::<HashMap<String, String>>())
    .and(with_store(store))
    .and(warp::any().map(move || interval))
    .and_then(handle_sse)
}

/// Streams one snapshot per tick until the task reaches a terminal state.
async fn handle_sse(
  query: HashMap<String, String>,
  store: TaskStore,
  interval: Duration,
) -> Result<warp::reply::Response, warp::Rejection> {
  let handle = query
    .get("task_id")
    .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
    .and_then(|task_id| store.get(&task_id));
  let Some(handle) = handle else {
    return Ok(warp::reply::json(&ApiResponse::fail("Task does not exist, invalid taskId")).into_response());
  };

  let ticks = IntervalStream::new(tokio::time::interval(interval));
  let events = stream::unfold((ticks, Some(handle)), |(mut ticks, handle)| async move {
    let handle = handle?;
    ticks.next().await?;
    let task = handle.snapshot();
    let event = warp::sse::Event::default()
      .event("progress")
      .data(serde_json::to_string(&task).unwrap_or_default());
    let next = if task.status.is_terminal() { None } else { Some(handle) };
    Some((Ok::<_, Infallible>(event), (ticks, next)))
  });

  Ok(warp::sse::reply(warp::sse::keep_alive().stream(events)).into_response())
}
