//! Bulletin file discovery.
//!
//! Lists files in the source directory whose names match the configured glob
//! pattern, optionally walking subdirectories. Paths come back sorted so that
//! merge order, and with it last-write-wins on duplicate dates, is stable.

use crate::error::{IdeamError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug)]
pub struct FileDiscovery {
    source_path: PathBuf,
    pattern: glob::Pattern,
    recursive: bool,
    file_count: usize,
}

impl FileDiscovery {
    pub fn new(source_path: PathBuf, pattern: &str, recursive: bool) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern).map_err(|e| IdeamError::Configuration {
            message: format!("invalid file pattern '{}': {}", pattern, e),
        })?;
        Ok(Self {
            source_path,
            pattern,
            recursive,
            file_count: 0,
        })
    }

    /// Number of files found by the last discovery
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub async fn discover_bulletin_files(&mut self) -> Result<Vec<PathBuf>> {
        if !fs::metadata(&self.source_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(IdeamError::SourceNotFound {
                path: self.source_path.clone(),
            });
        }

        debug!(
            "Searching for '{}' in {} (recursive: {})",
            self.pattern,
            self.source_path.display(),
            self.recursive
        );

        let mut files = if self.recursive {
            let root = self.source_path.clone();
            let pattern = self.pattern.clone();
            tokio::task::spawn_blocking(move || walk_tree(&root, &pattern))
                .await
                .map_err(|e| IdeamError::ProcessingFailed {
                    path: self.source_path.clone(),
                    reason: format!("directory walk panicked: {}", e),
                })??
        } else {
            self.list_directory().await?
        };

        files.sort();
        self.file_count = files.len();
        debug!("Found {} bulletin files", files.len());
        Ok(files)
    }

    async fn list_directory(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = fs::read_dir(&self.source_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && matches_pattern(&path, &self.pattern) {
                files.push(path);
            }
        }

        Ok(files)
    }
}

fn walk_tree(root: &Path, pattern: &glob::Pattern) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| IdeamError::ProcessingFailed {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() && matches_pattern(entry.path(), pattern) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn matches_pattern(path: &Path, pattern: &glob::Pattern) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| pattern.matches(name))
}
