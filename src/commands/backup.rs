//! Database and media backups.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::process::Command;
use tracing::info;

use crate::config::AppConfig;

/// Dump the database with `pg_dump` and copy the media root, both into
/// timestamped entries under `output_dir`.
pub async fn run(config: &AppConfig, output_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .context("Failed to create backup directory")?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");

    let dump_path = output_dir.join(format!("caudal_db_{stamp}.dump"));
    dump_database("pg_dump", &config.database.url, &dump_path).await?;
    info!(path = %dump_path.display(), "Database dump written");

    let media_src = &config.storage.media_root;
    if tokio::fs::try_exists(media_src).await.unwrap_or(false) {
        let media_dest = output_dir.join(format!("caudal_media_{stamp}"));
        let (src, dest) = (media_src.clone(), media_dest.clone());
        let copied = tokio::task::spawn_blocking(move || copy_dir(&src, &dest))
            .await
            .context("Media copy task failed")??;
        info!(path = %media_dest.display(), files = copied, "Media root copied");
    } else {
        info!(path = %media_src.display(), "Media root missing, skipping media backup");
    }

    Ok(())
}

/// Run `pg_dump` in custom format. The connection URL doubles as a libpq
/// conninfo argument, so no PGPASSWORD juggling is needed. The whole backup
/// runs over the URL alone; no application connection is ever opened, which
/// keeps schema sync away from the database being dumped.
async fn dump_database(
    pg_dump: impl AsRef<std::ffi::OsStr>,
    db_url: &str,
    dump_path: &Path,
) -> Result<()> {
    let status = Command::new(pg_dump)
        .arg("--format=custom")
        .arg("--no-owner")
        .arg("-f")
        .arg(dump_path)
        .arg(db_url)
        .status()
        .await
        .context("Failed to spawn pg_dump (is it installed?)")?;

    if !status.success() {
        bail!("pg_dump exited with {status}");
    }

    Ok(())
}

/// Recursive directory copy. Returns the number of files copied.
fn copy_dir(src: &PathBuf, dest: &PathBuf) -> Result<usize> {
    std::fs::create_dir_all(dest)?;
    let mut copied = 0usize;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}
