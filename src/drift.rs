// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Drift detection.
//!
//! __Drift__ is divergence between a managed file's live content and the
//! digest the manifest recorded for it. Computing drift is a pure read: the
//! same live-versus-manifest comparison the reconciler makes internally,
//! minus every write.

use crate::{
    digest::sha256_file,
    manifest::{Manifest, OpenedManifest},
    path::RepositoryContext,
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, instrument};

/// Kind of drift found on a managed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// Live file cannot be read.
    Missing,

    /// Live file digest differs from the recorded one.
    Modified,
}

/// Drift found on a managed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub path: String,
    pub kind: DriftKind,
}

impl Display for Drift {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            DriftKind::Missing => write!(fmt, "missing {}", self.path),
            DriftKind::Modified => write!(fmt, "~ {}", self.path),
        }
    }
}

/// Compute drift of every manifest entry, in manifest order.
#[instrument(skip(ctx, manifest), level = "debug")]
pub fn compute_drift(ctx: &RepositoryContext, manifest: &Manifest) -> Vec<Drift> {
    manifest
        .files
        .iter()
        .filter_map(|entry| {
            let kind = match sha256_file(ctx.resolve(&entry.path)) {
                Err(err) => {
                    debug!("cannot read {}: {err}", entry.path);
                    DriftKind::Missing
                }
                Ok(digest) if digest != entry.sha256 => DriftKind::Modified,
                Ok(_) => return None,
            };

            Some(Drift {
                path: entry.path.clone(),
                kind,
            })
        })
        .collect()
}

/// Status report of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub version: String,
    pub overlays: Vec<String>,
    pub migration_pending: bool,
    pub drift: Vec<Drift>,
}

impl StatusReport {
    /// Build status report from an opened manifest.
    pub fn new(ctx: &RepositoryContext, opened: &OpenedManifest) -> Self {
        Self {
            version: opened.manifest.version.clone(),
            overlays: opened.manifest.overlays.clone(),
            migration_pending: opened.migration_pending(),
            drift: compute_drift(ctx, &opened.manifest),
        }
    }

    /// No managed path has drifted.
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
    }

    /// Treat any drift as failure.
    ///
    /// # Errors
    ///
    /// - Return [`DriftError::Detected`] if at least one managed path drifted.
    pub fn strict(&self) -> Result<()> {
        if self.is_clean() {
            return Ok(());
        }

        Err(DriftError::Detected {
            count: self.drift.len(),
        })
    }
}

impl Display for StatusReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "Installed version: {}", self.version)?;
        if !self.overlays.is_empty() {
            writeln!(fmt, "Overlays: {}", self.overlays.join(", "))?;
        }
        if self.migration_pending {
            writeln!(fmt, "Manifest: legacy location, migrates on next write")?;
        }

        if self.drift.is_empty() {
            return writeln!(fmt, "No drift");
        }

        writeln!(fmt, "Drift:")?;
        for drift in &self.drift {
            writeln!(fmt, "  {drift}")?;
        }

        Ok(())
    }
}

/// Drift error types.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DriftError {
    /// Managed files diverged from the manifest.
    #[error("drift detected in {count} managed file(s)")]
    Detected { count: usize },
}

/// Friendly result alias :3
pub type Result<T, E = DriftError> = std::result::Result<T, E>;
