use std::sync::Arc;

use imgharvest::{
  archiver::Archiver,
  browser::WebDriverLauncher,
  collector::CollectorSettings,
  config::Config,
  fetcher::HttpFetcher,
  routes::routes,
  scraper::Scraper,
  storage::setup_output_dir,
  task_store::TaskStore,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();
  let config = Config::from_env();
  setup_output_dir(&config.output_dir).await?;

  let launcher = Arc::new(WebDriverLauncher::new(config.webdriver_url.clone()));
  let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
  let archiver = Archiver::new(config.output_dir.clone(), config.archive_retention);
  let scraper = Scraper::new(launcher, fetcher, archiver)
    .with_search_base_url(config.search_base_url.clone())
    .with_collector_settings(CollectorSettings {
      load_wait_timeout: config.load_wait_timeout,
      link_wait_timeout: config.link_wait_timeout,
      ..CollectorSettings::default()
    });

  let api = routes(Arc::new(scraper), TaskStore::new());

  info!("Server is up & running on port {}", config.server_port);
  warp::serve(api)
    .run(([0, 0, 0, 0], config.server_port))
    .await;
  Ok(())
}
