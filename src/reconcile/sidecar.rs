// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sidecar artifacts and the conflict report.
//!
//! Codo never merges diverged content. When new pack content cannot safely
//! replace a live file, it lands in a __sidecar__ beside it, named by
//! appending a reserved suffix, and the sidecar path is appended to a report
//! file for later review.

use crate::path::RepositoryContext;

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Suffix of a pending-conflict sidecar.
pub const CONFLICT_SUFFIX: &str = ".codo.new";

/// Suffix of the advisory note left beside an orphaned, modified file.
pub const ORPHAN_SUFFIX: &str = ".codo.removed.suggested";

/// Content of the advisory note.
pub const ORPHAN_NOTE: &str = "Upstream removed this file, but you have local changes.\n\
                               Consider removing it manually if no longer needed.\n";

/// Project-relative path of the conflict sidecar for `path`.
pub fn conflict_sidecar(path: &str) -> String {
    format!("{path}{CONFLICT_SUFFIX}")
}

/// Project-relative path of the orphan note for `path`.
pub fn orphan_note(path: &str) -> String {
    format!("{path}{ORPHAN_SUFFIX}")
}

/// Append-only record of conflict sidecars.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    path: PathBuf,
}

impl ConflictReport {
    /// Construct report for the repository described by `ctx`.
    pub fn new(ctx: &RepositoryContext) -> Self {
        Self {
            path: ctx.report_path(),
        }
    }

    /// Path to the report file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Append one line to the report, creating it if needed.
    pub fn append(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            mkdirp::mkdirp(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}
