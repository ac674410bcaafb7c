pub mod archiver;
pub mod browser;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod routes;
pub mod scraper;
pub mod search_filter;
pub mod storage;
pub mod task_store;
