// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Document Store
//!
//! Backups and writes for the configuration documents.
//!
//! - A backup is a byte-identical copy named `{file}.bak.{YYYYMMDDTHHMMSSZ}`,
//!   written before the original is touched. An existing backup is never
//!   overwritten; a numeric suffix is appended instead.
//! - Writes go to a hidden temp sibling and are renamed over the original, so
//!   a reader never sees a half-written document.

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::provisioning::ProvisionError;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    backup_dir: Option<PathBuf>,
}

impl DocumentStore {
    /// `backup_dir` of `None` places each backup next to its document.
    pub fn new(backup_dir: Option<PathBuf>) -> Self {
        Self { backup_dir }
    }

    /// Copy `contents` (the document as read) to a fresh backup file.
    pub fn backup(&self, path: &Path, contents: &str) -> Result<PathBuf, ProvisionError> {
        let dir = match &self.backup_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| ProvisionError::io(dir, e))?;
                dir.clone()
            }
            None => parent_of(path),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let base = format!(
            "{}.bak.{}",
            file_name,
            Utc::now().format(BACKUP_TIMESTAMP_FORMAT)
        );

        let mut attempt = 0u32;
        loop {
            let candidate = if attempt == 0 {
                dir.join(&base)
            } else {
                dir.join(format!("{base}.{attempt}"))
            };
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes())
                        .and_then(|_| file.sync_all())
                        .map_err(|e| ProvisionError::io(&candidate, e))?;
                    info!(document = %path.display(), backup = %candidate.display(), "Backed up document");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(ProvisionError::io(&candidate, e)),
            }
        }
    }

    /// Replace `path` with `contents` via temp file and rename.
    pub fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), ProvisionError> {
        self.stage(path, contents)?.commit()
    }

    /// Write `contents` next to `path` without touching `path` yet.
    pub fn stage(&self, path: &Path, contents: &str) -> Result<StagedWrite, ProvisionError> {
        let temp = temp_sibling(path);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| ProvisionError::io(&temp, e))?;
        let staged = StagedWrite {
            target: path.to_path_buf(),
            temp: Some(temp),
        };
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| ProvisionError::io(path, e))?;

        // Keep the original's permissions on the replacement.
        if let Ok(meta) = fs::metadata(path) {
            if let Some(temp) = &staged.temp {
                fs::set_permissions(temp, meta.permissions())
                    .map_err(|e| ProvisionError::io(temp, e))?;
            }
        }

        debug!(document = %path.display(), "Staged document write");
        Ok(staged)
    }
}

/// A fully written temp file waiting to replace its target. Dropping it
/// without committing removes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    temp: Option<PathBuf>,
}

impl StagedWrite {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> Result<(), ProvisionError> {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = fs::rename(&temp, &self.target) {
                let _ = fs::remove_file(&temp);
                return Err(ProvisionError::io(&self.target, e));
            }
            debug!(document = %self.target.display(), "Committed document write");
        }
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            let _ = fs::remove_file(temp);
        }
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent_of(path).join(format!(".{}.tenancy-{}.tmp", name, std::process::id()))
}
