use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

/// Empties the archive directory left over from a previous run and recreates it.
pub async fn setup_output_dir(output_dir: &Path) -> Result<()> {
  if tokio::fs::try_exists(output_dir).await? {
    tokio::fs::remove_dir_all(output_dir)
      .await
      .with_context(|| format!("could not clear {}", output_dir.display()))?;
  }
  tokio::fs::create_dir_all(output_dir)
    .await
    .with_context(|| format!("could not create {}", output_dir.display()))?;
  info!("Output directory {} ready", output_dir.display());
  Ok(())
}

pub fn archive_path(output_dir: &Path, task_id: &Uuid) -> PathBuf {
  output_dir.join(format!("{}.zip", task_id))
}

/// Where an archive is written before it is complete and may be served.
pub fn partial_archive_path(output_dir: &Path, task_id: &Uuid) -> PathBuf {
  output_dir.join(format!("{}.zip.part", task_id))
}

/// Finished archive for a task, if one currently exists.
pub async fn find_archive(output_dir: &Path, raw_id: &str) -> Option<PathBuf> {
  let task_id = Uuid::parse_str(raw_id).ok()?;
  let path = archive_path(output_dir, &task_id);
  match tokio::fs::try_exists(&path).await {
    Ok(true) => Some(path),
    _ => None,
  }
}
