//! Workspace manager - per-request scratch directories
//!
//! Every compile-and-run request stages its files into a fresh directory
//! named after the request id under the configured scratch root. The
//! directory is owned by a `Workspace` value and is removed when that value
//! is dropped, so every exit path (compile failure, run failure, success,
//! panic, cancelled request) cleans up exactly once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::WorkspaceSettings;
use crate::error::RequestError;

/// Longest accepted file name in bytes
const MAX_FILE_NAME_BYTES: usize = 255;

/// One submitted source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Check a file name is a single plain path component
pub fn validate_file_name(name: &str) -> Result<(), RequestError> {
    let invalid = |reason| {
        Err(RequestError::InvalidFileName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.len() > MAX_FILE_NAME_BYTES {
        return invalid("name is too long");
    }
    if name == "." || name == ".." {
        return invalid("name is a directory reference");
    }
    if name.contains(['/', '\\']) {
        return invalid("name contains a path separator");
    }
    if name.contains('\0') {
        return invalid("name contains a NUL byte");
    }
    // Compilers read these as options or argument files
    if name.starts_with(['-', '@']) {
        return invalid("name starts with '-' or '@'");
    }
    Ok(())
}

/// Check a whole submission before anything touches the disk
pub fn validate_files(files: &[SourceFile], settings: &WorkspaceSettings) -> Result<(), RequestError> {
    if files.is_empty() {
        return Err(RequestError::NoFiles);
    }
    if files.len() > settings.max_files {
        return Err(RequestError::TooManyFiles {
            count: files.len(),
            limit: settings.max_files,
        });
    }

    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        validate_file_name(&file.name)?;
        if file.content.len() > settings.max_file_bytes {
            return Err(RequestError::FileTooLarge {
                name: file.name.clone(),
                size: file.content.len(),
                limit: settings.max_file_bytes,
            });
        }
        if !seen.insert(file.name.as_str()) {
            return Err(RequestError::DuplicateFileName {
                name: file.name.clone(),
            });
        }
    }
    Ok(())
}

/// An exclusively owned scratch directory holding one request's files
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a unique directory under `settings.scratch_root` and write `files` into it
    pub async fn stage(
        request_id: &str,
        files: &[SourceFile],
        settings: &WorkspaceSettings,
    ) -> Result<Self, RequestError> {
        validate_files(files, settings)?;

        tokio::fs::create_dir_all(&settings.scratch_root)
            .await
            .map_err(RequestError::Staging)?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", request_id))
            .tempdir_in(&settings.scratch_root)
            .map_err(RequestError::Staging)?;
        let workspace = Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        };

        for file in files {
            workspace
                .write_file(&file.name, file.content.as_bytes())
                .await
                .map_err(RequestError::Staging)?;
        }

        debug!(
            "Staged {} file(s) into {}",
            files.len(),
            workspace.path.display()
        );
        Ok(workspace)
    }

    /// Path of the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, name: &str, content: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path.join(name))
            .await?;
        file.write_all(content).await?;
        file.flush().await
    }

    /// Names of the regular files currently in the workspace, sorted
    pub async fn file_names(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove the directory now, on the blocking pool
    ///
    /// Dropping the workspace also removes it, inline on the current thread.
    pub async fn cleanup(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => debug!("Removed workspace {}", path.display()),
            Ok(Err(e)) => warn!("Failed to remove workspace {}: {}", path.display(), e),
            Err(e) => warn!("Workspace removal task failed for {}: {}", path.display(), e),
        }
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {}", self.path.display()),
                Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
