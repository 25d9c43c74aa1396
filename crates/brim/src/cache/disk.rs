//! # Disk Cache Policy

use anyhow::{Context, bail};
use burn::config::Config;
use burn::data::network::downloader;
use std::fs::{File, remove_file, rename};
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

/// Disk Cache Policy.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Key for the root cache directory.
    #[config(default = "\"brim\".to_string()")]
    pub root_cache_key: String,

    /// Override for the cache base directory; defaults to ``~/.cache``.
    #[config(default = "None")]
    pub cache_home: Option<PathBuf>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, does not create it.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let cache_home = match &self.cache_home {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .context("no home directory for the weight cache")?
                .join(".cache"),
        };
        Ok(cache_home.join(&self.root_cache_key))
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }
        Ok(path)
    }

    /// Fetch a Resource to the Cache.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing. The download is written to a
/// ``.part`` sibling and renamed into place.
///
/// # Returns
///
/// The cache path.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if cache_file_path.exists() {
        tracing::debug!(path = %cache_file_path.display(), "weight cache hit");
        return Ok(cache_file_path);
    }

    let file_name = cache_file_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());

    tracing::info!(%url, path = %cache_file_path.display(), "downloading weights");

    // The burn downloader panics on network and HTTP failures.
    let bytes = catch_unwind(AssertUnwindSafe(|| {
        downloader::download_file_as_bytes(url, &file_name)
    }))
    .map_err(|panic| anyhow::anyhow!("download failed: {}", panic_message(panic.as_ref())))?;

    let part_path = cache_file_path.with_extension("part");
    write_all_or_remove(&part_path, &bytes)?;
    rename(&part_path, &cache_file_path)
        .with_context(|| format!("moving {} into the cache", part_path.display()))?;

    Ok(cache_file_path)
}

fn write_all_or_remove(
    path: &Path,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let mut output_file = File::create(path)?;
    if let Err(err) = output_file.write_all(bytes) {
        remove_file(path)?;
        bail!("Failed to write the whole model weights file: {err}");
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error".to_string()
    }
}
