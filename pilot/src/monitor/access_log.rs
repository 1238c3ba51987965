//! Rotating access log tailer
//!
//! Tomcat's `AccessLogValve` writes one file per day
//! (`localhost_access_log.2026-10-19.txt`). The newest name is the live file.
//! Only bytes appended since the last read are consumed; a partial trailing
//! line is carried until its newline arrives. On rotation the old file is
//! read to its end, carry included, before the new one is opened.

use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use crate::errors::PilotError;

/// Tails the newest access log in a directory
#[derive(Debug)]
pub struct AccessLogTailer {
    logs_dir: PathBuf,
    name_pattern: Regex,
    current: Option<PathBuf>,
    offset: u64,
    carry: Vec<u8>,
    drained: Vec<String>,
    first_scan: bool,
}

impl AccessLogTailer {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Result<Self, PilotError> {
        Ok(Self {
            logs_dir: logs_dir.into(),
            name_pattern: Regex::new(r"_access_log\.?.*\.(?:txt|log)$")?,
            current: None,
            offset: 0,
            carry: Vec::new(),
            drained: Vec::new(),
            first_scan: true,
        })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Newest access log by name
    pub async fn latest_file(&self) -> Result<Option<PathBuf>, PilotError> {
        let mut entries = match fs::read_dir(&self.logs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.name_pattern.is_match(&name) {
                continue;
            }
            if latest.as_ref().map(|l| name > *l).unwrap_or(true) {
                latest = Some(name);
            }
        }

        Ok(latest.map(|name| self.logs_dir.join(name)))
    }

    /// Switch to the newest file if it changed, returns the new path.
    ///
    /// The file found on the first scan is tailed from its end; files that
    /// appear later are read from the start. Whatever the old file still
    /// held is returned by the next [`read_new_lines`](Self::read_new_lines).
    pub async fn rescan(&mut self) -> Result<Option<PathBuf>, PilotError> {
        let latest = self.latest_file().await?;
        let first_scan = std::mem::replace(&mut self.first_scan, false);

        let Some(latest) = latest else {
            return Ok(None);
        };
        if self.current.as_ref() == Some(&latest) {
            return Ok(None);
        }

        if self.current.is_some() {
            let tail = self.read_appended().await?;
            self.drained.extend(tail);
            let rest = std::mem::take(&mut self.carry);
            self.drained.extend(split_lines(&rest));
        }

        self.offset = if first_scan {
            fs::metadata(&latest).await.map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        self.carry.clear();
        info!(file = %latest.display(), offset = self.offset, "Tailing access log");
        self.current = Some(latest.clone());
        Ok(Some(latest))
    }

    /// Read complete lines appended since the last call
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, PilotError> {
        let mut out = std::mem::take(&mut self.drained);
        out.extend(self.read_appended().await?);
        Ok(out)
    }

    async fn read_appended(&mut self) -> Result<Vec<String>, PilotError> {
        let Some(path) = self.current.clone() else {
            return Ok(Vec::new());
        };

        let size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if size < self.offset {
            debug!(file = %path.display(), "Access log shrank, rereading from start");
            self.offset = 0;
            self.carry.clear();
        }
        if size == self.offset {
            return Ok(Vec::new());
        }

        let mut file = fs::File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity((size - self.offset) as usize);
        let read = file.take(size - self.offset).read_to_end(&mut chunk).await?;
        self.offset += read as u64;

        self.carry.extend_from_slice(&chunk);
        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        Ok(split_lines(&complete))
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .filter(|l| !l.trim().is_empty())
        .collect()
}

/// Strips noise from access log lines before display
#[derive(Debug, Clone)]
pub struct AccessLineSanitizer {
    loopback: Regex,
    brackets: Regex,
    http_version: Regex,
    placeholders: Regex,
    spaces: Regex,
}

impl AccessLineSanitizer {
    pub fn new() -> Result<Self, PilotError> {
        Ok(Self {
            loopback: Regex::new(r"(?:^|\s)(?:127\.0\.0\.1|0:0:0:0:0:0:0:1|::1)(?:\s|$)")?,
            brackets: Regex::new(r"\[[^\]]*\]")?,
            http_version: Regex::new(r"\s*HTTP/\d(?:\.\d)?")?,
            placeholders: Regex::new(r"(?:^|\s)-\s+-(?:\s|$)")?,
            spaces: Regex::new(r"\s+")?,
        })
    }

    /// `None` when nothing is left after sanitizing
    pub fn sanitize(&self, line: &str) -> Option<String> {
        let s = self.loopback.replace_all(line, " ");
        let s = self.brackets.replace_all(&s, "");
        let s = self.http_version.replace_all(&s, "");
        let s = self.placeholders.replace_all(&s, " ");
        let s = self.spaces.replace_all(s.trim(), " ");
        if s.is_empty() {
            None
        } else {
            Some(s.into_owned())
        }
    }
}
