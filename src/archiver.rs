use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::ScrapeError;
use crate::fetcher::{FetchedImage, ImageFetcher};
use crate::models::TaskHandle;
use crate::storage::{archive_path, partial_archive_path};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60);

static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9.+-]+$").unwrap());

/// Downloads image references concurrently and bundles the successes into
/// `<output_dir>/<task id>.zip`.
#[derive(Debug, Clone)]
pub struct Archiver {
  output_dir: PathBuf,
  retention: Duration,
}

impl Archiver {
  pub fn new(output_dir: impl Into<PathBuf>, retention: Duration) -> Self {
    Self { output_dir: output_dir.into(), retention }
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  pub async fn download_and_archive(
    &self,
    fetcher: &dyn ImageFetcher,
    references: &[String],
    task: &TaskHandle,
  ) -> Result<PathBuf> {
    let task_id = task.id();
    let total = references.len();
    let settled = AtomicUsize::new(0);
    task.set_msg("Downloading Images...");
    task.set_progress(format!("0/{} Images Downloaded", total));

    // Every fetch settles on its own; the counter tracks settlements, not successes.
    let outcomes = join_all(references.iter().map(|url| {
      let settled = &settled;
      async move {
        let outcome = fetcher.fetch(url).await.map_err(|e| ScrapeError::Download {
          url: url.clone(),
          reason: format!("{:#}", e),
        });
        let n = settled.fetch_add(1, Ordering::SeqCst) + 1;
        task.set_progress(format!("{}/{} Images Downloaded", n, total));
        outcome
      }
    }))
      .await;

    let images: Vec<FetchedImage> = outcomes
      .into_iter()
      .filter_map(|outcome| match outcome {
        Ok(image) => Some(image),
        Err(e) => {
          warn!("Task {}: {}", task_id, e);
          None
        }
      })
      .collect();

    let partial = partial_archive_path(&self.output_dir, &task_id);
    let path = archive_path(&self.output_dir, &task_id);
    let entries = images.len();
    let (from, to) = (partial.clone(), path.clone());
    tokio::task::spawn_blocking(move || -> Result<()> {
      let written = write_archive(&from, images).and_then(|_| {
        std::fs::rename(&from, &to).with_context(|| format!("could not move archive to {}", to.display()))
      });
      if written.is_err() {
        // A half-written staging file must not outlive the failed attempt.
        let _ = std::fs::remove_file(&from);
      }
      written
    })
      .await
      .context("archive writer panicked")??;

    info!("Task {}: archived {}/{} images to {}", task_id, entries, total, path.display());
    schedule_cleanup(path.clone(), self.retention);
    Ok(path)
  }
}

/// Writes every image into a fresh zip file at `path` using the strongest
/// deflate level. Returns the number of entries written.
pub fn write_archive(path: &Path, images: Vec<FetchedImage>) -> Result<usize> {
  let file = File::create(path).with_context(|| format!("could not create {}", path.display()))?;
  let mut zip = ZipWriter::new(file);
  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .compression_level(Some(9));

  let count = images.len();
  for image in images {
    let name = format!("{}.{}", Uuid::new_v4(), file_extension(image.content_type.as_deref()));
    zip.start_file(name, options)?;
    zip.write_all(&image.data)?;
  }
  zip.finish()?;
  Ok(count)
}

/// Extension for an archive entry, taken from the subtype of its content type.
pub fn file_extension(content_type: Option<&str>) -> String {
  content_type
    .and_then(|ct| ct.split(';').next())
    .and_then(|mime| mime.rsplit('/').next())
    .map(|ext| ext.trim().to_ascii_lowercase())
    .filter(|ext| EXTENSION.is_match(ext))
    .unwrap_or_else(|| "bin".to_string())
}

/// Deletes the archive once the retention window has passed. Pending deletions
/// do not survive a restart.
pub fn schedule_cleanup(path: PathBuf, retention: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    tokio::time::sleep(retention).await;
    if let Ok(true) = tokio::fs::try_exists(&path).await {
      match tokio::fs::remove_file(&path).await {
        Ok(()) => info!("Expired archive {} removed", path.display()),
        Err(e) => warn!("Could not remove expired archive {}: {}", path.display(), e),
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extension_comes_from_content_type() {
    assert_eq!(file_extension(Some("image/jpeg")), "jpeg");
    assert_eq!(file_extension(Some("image/PNG; charset=binary")), "png");
    assert_eq!(file_extension(Some("image/svg+xml")), "svg+xml");
  }

  #[test]
  fn odd_content_types_fall_back_to_bin() {
    assert_eq!(file_extension(None), "bin");
    assert_eq!(file_extension(Some("")), "bin");
    assert_eq!(file_extension(Some("image/x y")), "bin");
  }

  struct NoImages;

  #[async_trait::async_trait]
  impl ImageFetcher for NoImages {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
      anyhow::bail!("no image at {}", url)
    }
  }

  #[tokio::test]
  async fn failed_archive_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let task = TaskHandle::new(crate::models::Task::new());
    let task_id = task.id();
    // A non-empty directory in the final location makes the rename fail.
    let blocked = archive_path(dir.path(), &task_id);
    std::fs::create_dir(&blocked).unwrap();
    std::fs::write(blocked.join("occupied"), b"x").unwrap();

    let archiver = Archiver::new(dir.path(), Duration::from_secs(60));
    let references = vec!["https://img.test/0.jpg".to_string()];
    let result = archiver.download_and_archive(&NoImages, &references, &task).await;

    assert!(result.is_err());
    assert!(!partial_archive_path(dir.path(), &task_id).exists());
    assert!(blocked.is_dir());
  }

  #[tokio::test]
  async fn archive_is_moved_out_of_staging() {
    let dir = tempfile::tempdir().unwrap();
    let task = TaskHandle::new(crate::models::Task::new());
    let task_id = task.id();

    let archiver = Archiver::new(dir.path(), Duration::from_secs(60));
    let path = archiver.download_and_archive(&NoImages, &[], &task).await.unwrap();

    assert_eq!(path, archive_path(dir.path(), &task_id));
    assert!(path.is_file());
    assert!(!partial_archive_path(dir.path(), &task_id).exists());
  }

  #[tokio::test]
  async fn cleanup_removes_archive_after_retention() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expired.zip");
    tokio::fs::write(&path, b"zip").await.unwrap();

    schedule_cleanup(path.clone(), Duration::from_millis(20)).await.unwrap();
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn cleanup_tolerates_missing_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.zip");
    schedule_cleanup(path.clone(), Duration::from_millis(1)).await.unwrap();
    assert!(!path.exists());
  }
}
