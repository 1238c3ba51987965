//! Tree synchronization
//!
//! Makes a target directory mirror a source directory: entries missing from
//! the source are deleted from the target, then every source entry is copied
//! over. With `restricted` set, target entries named in `preserve` survive
//! even when the source has no counterpart (compiled classes and libraries
//! staged separately from the web content).

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs;
use tracing::{debug, warn};

use crate::errors::PilotError;
use crate::filesys::dir::remove_path;

/// Directory names kept across restricted syncs
pub const DEFAULT_PRESERVED: &[&str] = &["classes", "lib"];

/// Sync options
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Keep target entries listed in `preserve` when absent from the source
    pub restricted: bool,

    /// Entry names protected by `restricted`
    pub preserve: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            restricted: false,
            preserve: DEFAULT_PRESERVED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SyncOptions {
    pub fn restricted() -> Self {
        Self {
            restricted: true,
            ..Default::default()
        }
    }

    fn is_preserved(&self, name: &str) -> bool {
        self.restricted && self.preserve.iter().any(|p| p == name)
    }
}

/// Counters collected during a sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub copied: usize,
    pub removed: usize,
    pub preserved: usize,
}

/// Synchronize `dest` with `src`.
pub async fn brutal_sync(
    src: &Path,
    dest: &Path,
    options: &SyncOptions,
) -> Result<SyncReport, PilotError> {
    if !fs::metadata(src).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(PilotError::NotFound(format!(
            "Source directory {} does not exist",
            src.display()
        )));
    }

    let mut report = SyncReport::default();
    sync_level(src.to_path_buf(), dest.to_path_buf(), options, &mut report).await?;
    debug!(
        src = %src.display(),
        dest = %dest.display(),
        copied = report.copied,
        removed = report.removed,
        preserved = report.preserved,
        "Tree synchronized"
    );
    Ok(report)
}

fn sync_level<'a>(
    src: PathBuf,
    dest: PathBuf,
    options: &'a SyncOptions,
    report: &'a mut SyncReport,
) -> Pin<Box<dyn Future<Output = Result<(), PilotError>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(&dest).await?;

        let source_entries = read_entries(&src).await?;
        let source_names: HashSet<&str> = source_entries.iter().map(|(n, _)| n.as_str()).collect();

        // Delete pass
        for (name, _) in read_entries(&dest).await? {
            if source_names.contains(name.as_str()) {
                continue;
            }
            if options.is_preserved(&name) {
                report.preserved += 1;
                continue;
            }
            remove_path(&dest.join(&name)).await?;
            report.removed += 1;
        }

        // Copy pass
        for (name, is_dir) in source_entries {
            let from = src.join(&name);
            let to = dest.join(&name);

            if is_dir {
                if fs::metadata(&to).await.map(|m| !m.is_dir()).unwrap_or(false) {
                    remove_path(&to).await?;
                }
                sync_level(from, to, options, report).await?;
            } else {
                if fs::metadata(&to).await.map(|m| m.is_dir()).unwrap_or(false) {
                    remove_path(&to).await?;
                }
                copy_file_forced(&from, &to).await?;
                report.copied += 1;
            }
        }

        Ok(())
    })
}

async fn read_entries(dir: &Path) -> Result<Vec<(String, bool)>, PilotError> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        out.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    out.sort();
    Ok(out)
}

/// Copy a file, retrying once after removing the destination.
///
/// Windows-style locks reject overwrites of open files but often allow the
/// delete-then-create sequence.
pub async fn copy_file_forced(from: &Path, to: &Path) -> Result<(), PilotError> {
    match fs::copy(from, to).await {
        Ok(_) => Ok(()),
        Err(first) => {
            warn!(
                dest = %to.display(),
                error = %first,
                "Copy failed, removing destination and retrying"
            );
            let _ = fs::remove_file(to).await;
            fs::copy(from, to).await.map(|_| ()).map_err(|e| {
                if crate::errors::is_busy_io(&e) {
                    PilotError::ResourceBusy(format!("{}: {}", to.display(), e))
                } else {
                    PilotError::IoError(e)
                }
            })
        }
    }
}

/// Copy a whole tree into `dest`, overwriting files but never deleting.
pub async fn copy_tree(src: &Path, dest: &Path) -> Result<usize, PilotError> {
    let mut report = SyncReport::default();
    copy_level(src.to_path_buf(), dest.to_path_buf(), &mut report).await?;
    Ok(report.copied)
}

fn copy_level<'a>(
    src: PathBuf,
    dest: PathBuf,
    report: &'a mut SyncReport,
) -> Pin<Box<dyn Future<Output = Result<(), PilotError>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(&dest).await?;
        for (name, is_dir) in read_entries(&src).await? {
            if is_dir {
                copy_level(src.join(&name), dest.join(&name), report).await?;
            } else {
                copy_file_forced(&src.join(&name), &dest.join(&name)).await?;
                report.copied += 1;
            }
        }
        Ok(())
    })
}
