//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::PilotError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), PilotError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), PilotError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Delete and recreate empty
    pub async fn recreate(&self) -> Result<(), PilotError> {
        self.delete().await?;
        self.create().await
    }

    /// List entry names, empty when the directory is missing
    pub async fn list_names(&self) -> Result<Vec<String>, PilotError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        names.sort();
        Ok(names)
    }

    /// List files in the directory with the given extension
    pub async fn list_files_with_ext(&self, ext: &str) -> Result<Vec<PathBuf>, PilotError> {
        let mut files = Vec::new();
        for name in self.list_names().await? {
            let path = self.path.join(&name);
            let matches = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false);
            if matches && fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Files with the extension anywhere below this directory, sorted
    pub async fn walk_files_with_ext(&self, ext: &str) -> Result<Vec<PathBuf>, PilotError> {
        let mut found = Vec::new();
        let mut pending = vec![self.path.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case(ext))
                    .unwrap_or(false)
                {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Remove every entry whose name is not in `keep`
    pub async fn clear_except(&self, keep: &[String]) -> Result<Vec<String>, PilotError> {
        let mut removed = Vec::new();
        for name in self.list_names().await? {
            if keep.iter().any(|k| k == &name) {
                continue;
            }
            remove_path(&self.path.join(&name)).await?;
            debug!(entry = %name, dir = %self.path.display(), "Removed entry");
            removed.push(name);
        }
        Ok(removed)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Create a temporary directory
    pub async fn create_temp_dir(prefix: &str) -> Result<Dir, PilotError> {
        let temp_dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir).await?;
        Ok(Dir::new(temp_dir))
    }
}

/// Remove a file or directory tree, ignoring entries that are already gone
pub async fn remove_path(path: &Path) -> Result<(), PilotError> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).await?;
    } else {
        fs::remove_file(path).await?;
    }
    Ok(())
}
