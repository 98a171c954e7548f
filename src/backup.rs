// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Removal backups.
//!
//! Before a removal deletes managed files from the working tree, every one of
//! them is relocated into a __backup session__: a fresh, timestamped directory
//! under `<state>/backups/<key>/`, outside the repository. Files keep their
//! project-relative layout inside the session, so restoring is a plain copy
//! back. Sessions are never reused; a clash on the same second gets a numeric
//! suffix.

use crate::path::{join_relative, RepositoryContext};

use chrono::{DateTime, Utc};
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Timestamp layout of session directory names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Derive backup sessions for one repository.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    backup_root: PathBuf,
}

impl BackupManager {
    /// Construct manager for the repository described by `ctx`.
    pub fn new(ctx: &RepositoryContext) -> Self {
        Self {
            root: ctx.root().to_path_buf(),
            backup_root: ctx.backup_root(),
        }
    }

    /// Directory holding every session of the repository.
    pub fn backup_root(&self) -> &Path {
        self.backup_root.as_path()
    }

    /// Derive session directory for `at` that does not exist yet.
    pub fn session_dir(&self, at: DateTime<Utc>) -> PathBuf {
        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        let base = self.backup_root.join(&stamp);
        if !base.exists() {
            return base;
        }

        (1..)
            .map(|n| self.backup_root.join(format!("{stamp}-{n}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(base)
    }

    /// Create fresh session directory for `at`.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::CreateSession`] if the directory cannot be
    ///   created.
    #[instrument(skip(self), level = "debug")]
    pub fn begin(&self, at: DateTime<Utc>) -> Result<BackupSession> {
        let create_error = |err: io::Error, path: &Path| BackupError::CreateSession {
            source: err,
            path: path.to_path_buf(),
        };

        mkdirp::mkdirp(&self.backup_root).map_err(|err| create_error(err, self.backup_root.as_path()))?;

        loop {
            let dir = self.session_dir(at);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!("backup session at {:?}", dir.display());
                    return Ok(BackupSession {
                        root: self.root.clone(),
                        dir,
                    });
                }
                // INVARIANT: Lost a race for this name, derive the next one.
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(create_error(err, dir.as_path())),
            }
        }
    }
}

/// One removal operation's backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSession {
    root: PathBuf,
    dir: PathBuf,
}

impl BackupSession {
    /// Session directory.
    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// Where a project-relative path lands inside the session.
    pub fn destination(&self, relative: &str) -> PathBuf {
        join_relative(&self.dir, relative)
    }

    /// Move project-relative file from the working tree into the session.
    ///
    /// Intermediate directories are created as needed. Falls back to copy and
    /// delete when a rename is not possible, e.g., across file systems.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Relocate`] if the file cannot be moved.
    pub fn relocate(&self, relative: &str) -> Result<PathBuf> {
        let source = join_relative(&self.root, relative);
        let destination = self.destination(relative);
        let relocate_error = |err: io::Error| BackupError::Relocate {
            source: err,
            path: source.clone(),
        };

        if let Some(parent) = destination.parent() {
            mkdirp::mkdirp(parent).map_err(relocate_error)?;
        }
        move_with_copy_fallback(&source, &destination).map_err(relocate_error)?;

        Ok(destination)
    }
}

fn move_with_copy_fallback(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(err),
        Err(err) => {
            warn!(
                "cannot rename {:?}, copying instead: {err}",
                source.display()
            );
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
    }
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Session directory cannot be created.
    #[error("failed to create backup session at {:?}", path.display())]
    CreateSession {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Managed file cannot be moved into the session.
    #[error("failed to back up {:?}", path.display())]
    Relocate {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
