// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation manifest.
//!
//! The __manifest__ is Codo's record of what it last installed into a
//! repository: the pack version, the overlays used, and for every managed
//! path the SHA-256 digest of the file content __as Codo last left it on
//! disk__. Local edits are detected by comparing a live file's digest with
//! that recorded digest, without keeping any historical content around.
//!
//! # Storage
//!
//! One manifest exists per repository, stored as pretty JSON at
//! `<state>/manifests/<key>.json` (see [`RepositoryContext`]). Older releases
//! kept it inside the repository at `.claude/.codo-manifest.json`. That legacy
//! location is still read when the primary one is absent, and it is removed
//! the next time a manifest is written, which completes the migration.
//!
//! # Lifecycle
//!
//! Created by a successful install, rewritten wholesale by every successful
//! update, deleted by a successful removal. Never patched in place.

use crate::{
    digest::{sha256_file, sha256_hex},
    pack::{PackEntry, PackError},
    path::{is_safe_relative, join_relative, RepositoryContext},
};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Manifest layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Installed pack version label.
    pub version: String,

    /// Moment of the write, RFC 3339. May be empty in legacy manifests.
    #[serde(rename = "installedAt", alias = "installed_at", default)]
    pub installed_at: String,

    /// Overlays the pack was resolved with, in application order.
    #[serde(alias = "stacks", default)]
    pub overlays: Vec<String>,

    /// Managed paths.
    #[serde(default)]
    pub files: Vec<Entry>,
}

impl Manifest {
    /// Look up entry by path.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.files.iter().find(|entry| entry.path == path)
    }

    /// Set of every recorded path.
    pub fn paths(&self) -> BTreeSet<&str> {
        self.files.iter().map(|entry| entry.path.as_str()).collect()
    }
}

/// Managed path record.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Entry {
    /// Project-relative, slash-separated path.
    pub path: String,

    /// Lowercase hex SHA-256 of the content as last left on disk.
    pub sha256: String,

    /// File predates installation and is never overwritten or relocated.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unmanaged: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Where an opened manifest was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLocation {
    /// State directory.
    Primary,

    /// In-repository location of older releases.
    Legacy,
}

/// Manifest together with the location it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedManifest {
    pub manifest: Manifest,
    pub location: ManifestLocation,
}

impl OpenedManifest {
    /// Manifest still lives at the legacy location and migrates on next write.
    pub fn migration_pending(&self) -> bool {
        self.location == ManifestLocation::Legacy
    }
}

/// Read and write the manifest of one repository.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
    primary: PathBuf,
    legacy: PathBuf,
}

impl ManifestStore {
    /// Construct store for the repository described by `ctx`.
    pub fn new(ctx: &RepositoryContext) -> Self {
        Self {
            root: ctx.root().to_path_buf(),
            primary: ctx.manifest_path(),
            legacy: ctx.legacy_manifest_path(),
        }
    }

    /// Path of the primary manifest file.
    pub fn path(&self) -> &Path {
        self.primary.as_path()
    }

    /// Check if anything is installed.
    pub fn exists(&self) -> bool {
        self.primary.is_file() || self.legacy.is_file()
    }

    /// Open manifest, falling back to the legacy location.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::NotInstalled`] if neither location exists.
    /// - Return [`ManifestError::Read`] or [`ManifestError::Parse`] if the
    ///   manifest exists but cannot be loaded.
    #[instrument(skip(self), level = "debug")]
    pub fn open(&self) -> Result<OpenedManifest> {
        let primary = match read_manifest(&self.primary) {
            Ok(Some(manifest)) => {
                return Ok(OpenedManifest {
                    manifest,
                    location: ManifestLocation::Primary,
                })
            }
            Ok(None) => None,
            Err(err) => {
                warn!("cannot load manifest at {:?}: {err}", self.primary.display());
                Some(err)
            }
        };

        match read_manifest(&self.legacy) {
            Ok(Some(manifest)) => {
                info!("read legacy manifest at {:?}", self.legacy.display());
                Ok(OpenedManifest {
                    manifest,
                    location: ManifestLocation::Legacy,
                })
            }
            Ok(None) => Err(primary.unwrap_or(ManifestError::NotInstalled)),
            Err(err) => Err(primary.unwrap_or(err)),
        }
    }

    /// Write fresh manifest for resolved pack entries.
    ///
    /// Each entry's digest is taken from the live file at its destination if
    /// one exists, so a pre-existing identical file, or an untouched local
    /// original next to a conflict sidecar, is recorded with its real digest.
    /// Without a live file the pack content's digest is used. Removes the
    /// legacy manifest once the primary one is in place.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Hash`] if a live file exists but cannot be
    ///   read.
    /// - Return [`ManifestError::Pack`] if pack content has to be read and
    ///   cannot be.
    /// - Return [`ManifestError::Write`] if the manifest cannot be written.
    #[instrument(skip(self, entries, overlays, unmanaged), level = "debug")]
    pub fn write(
        &self,
        entries: &[PackEntry],
        version: &str,
        overlays: &[String],
        unmanaged: &BTreeSet<String>,
    ) -> Result<Manifest> {
        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let sha256 = self.live_or_pack_digest(entry)?;
            files.push(Entry {
                path: entry.path().to_string(),
                sha256,
                unmanaged: unmanaged.contains(entry.path()),
            });
        }

        let manifest = Manifest {
            version: version.to_string(),
            installed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            overlays: overlays.to_vec(),
            files,
        };
        self.save(&manifest)?;

        Ok(manifest)
    }

    /// Persist manifest as-is to the primary location.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Write`] if the manifest cannot be written.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let data = serde_json::to_vec_pretty(manifest).map_err(ManifestError::Serialize)?;
        write_atomic(&self.primary, &data)?;
        debug!(
            "wrote manifest with {} entries to {:?}",
            manifest.files.len(),
            self.primary.display()
        );

        remove_if_present(&self.legacy)?;

        Ok(())
    }

    /// Remove manifest from both locations.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Remove`] if an existing manifest cannot be
    ///   deleted.
    pub fn remove(&self) -> Result<()> {
        remove_if_present(&self.primary)?;
        remove_if_present(&self.legacy)?;

        Ok(())
    }

    fn live_or_pack_digest(&self, entry: &PackEntry) -> Result<String> {
        let live = join_relative(&self.root, entry.path());

        match sha256_file(&live) {
            Ok(digest) => Ok(digest),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(sha256_hex(entry.read()?)),
            Err(err) => Err(ManifestError::Hash {
                source: err,
                path: live,
            }),
        }
    }
}

fn read_manifest(path: &Path) -> Result<Option<Manifest>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ManifestError::Read {
                source: err,
                path: path.to_path_buf(),
            })
        }
    };

    let mut manifest: Manifest =
        serde_json::from_slice(&data).map_err(|err| ManifestError::Parse {
            source: err,
            path: path.to_path_buf(),
        })?;

    // INVARIANT: Managed paths stay inside the repository.
    manifest.files.retain(|entry| {
        let safe = is_safe_relative(&entry.path);
        if !safe {
            warn!(
                "ignore unsafe manifest entry {:?} in {:?}",
                entry.path,
                path.display()
            );
        }
        safe
    });

    Ok(Some(manifest))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let write_error = |err: std::io::Error| ManifestError::Write {
        source: err,
        path: path.to_path_buf(),
    };

    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(write_error)?;
    }

    // INVARIANT: Temporary file lives beside the target so rename stays on one
    // file system.
    let temp = path.with_extension(format!("json.{}.tmp", std::process::id()));
    fs::write(&temp, data).map_err(write_error)?;
    fs::rename(&temp, path).map_err(write_error)?;

    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed manifest at {:?}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ManifestError::Remove {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

/// Manifest store error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// No manifest exists where one is required.
    #[error("no manifest found, nothing is installed in this repository")]
    NotInstalled,

    /// Manifest file cannot be read.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest file is malformed.
    #[error("failed to parse manifest at {:?}", path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Manifest cannot be serialized.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// Manifest file cannot be written.
    #[error("failed to write manifest at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest file cannot be deleted.
    #[error("failed to remove manifest at {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Live file cannot be hashed.
    #[error("failed to hash {:?}", path.display())]
    Hash {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Pack content cannot be read.
    #[error(transparent)]
    Pack(#[from] PackError),
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;
