//! Bundler boundary
//!
//! The build engine itself lives outside devloop. This module defines the
//! [`Bundler`] seam the orchestrator drives, plus [`CommandBundler`], which
//! shells out to a configured build command.

pub mod command;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::discovery::INDEX_BASE_NAME;
use crate::error::{DevError, Result};

pub use command::{BundlerConfig, CommandBundler};

/// Options for a single bundle invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Human readable build identifier, also used for default output names
    pub build_name: String,
    /// Output file; bundler default when absent
    pub outfile: Option<PathBuf>,
    /// Entry module base name inside the source dir; `index` when absent
    pub entry_file: Option<String>,
}

impl BundleOptions {
    pub fn new(build_name: impl Into<String>) -> Self {
        Self {
            build_name: build_name.into(),
            outfile: None,
            entry_file: None,
        }
    }

    /// Set the output file
    pub fn outfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.outfile = Some(path.into());
        self
    }

    /// Set the entry module base name
    pub fn entry_file(mut self, name: impl Into<String>) -> Self {
        self.entry_file = Some(name.into());
        self
    }
}

/// Compiles a source entry point into one loadable module
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundle `source_dir` and return the written output path.
    ///
    /// No partial-output guarantee on failure.
    async fn bundle(&self, source_dir: &Path, options: &BundleOptions) -> Result<PathBuf>;

    /// Bundle the materialized server entry and return the executable path
    async fn bundle_server(&self, entry_path: &Path) -> Result<PathBuf>;
}

/// Find the entry module named `entry` in `source_dir`.
///
/// Matches directory entries by file stem. A matching directory resolves to
/// its own `index` module.
pub async fn resolve_entry(source_dir: &Path, entry: &str) -> Result<PathBuf> {
    let found = find_by_stem(source_dir, entry).await?;
    match found {
        Some(path) if path.is_dir() => {
            let index = find_by_stem(&path, INDEX_BASE_NAME).await?.filter(|p| p.is_file());
            index.ok_or_else(|| DevError::EntryNotFound {
                dir: path.clone(),
                entry: INDEX_BASE_NAME.to_string(),
            })
        }
        Some(path) => Ok(path),
        None => Err(DevError::EntryNotFound {
            dir: source_dir.to_path_buf(),
            entry: entry.to_string(),
        }),
    }
}

async fn find_by_stem(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut matches = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.file_stem().is_some_and(|s| s == stem) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}
