// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Safe installer for agent tooling packs.
//!
//! Codo installs a versioned __pack__ of template files (agent settings,
//! hooks, command definitions, documentation) into a repository, then keeps
//! that installation in sync as the pack evolves. It never destroys local
//! edits: whenever new pack content cannot safely replace a live file, the
//! new content lands in a sidecar beside it and the operator reconciles by
//! hand.
//!
//! # Moving Parts
//!
//! - [`path`]: which repository, and where its state lives.
//! - [`config`]: optional settings file.
//! - [`pack`]: pack trees, overlay resolution, and pack sources.
//! - [`manifest`]: record of what was installed, with per-file digests.
//! - [`reconcile`]: install, update, and removal engine.
//! - [`drift`]: read-only comparison of live files against the manifest.
//! - [`backup`]: removal backup sessions.

pub mod backup;
pub mod config;
pub mod digest;
pub mod drift;
pub mod manifest;
pub mod pack;
pub mod path;
pub mod reconcile;

pub use config::Settings;
pub use drift::{compute_drift, Drift, DriftError, DriftKind, StatusReport};
pub use manifest::{Manifest, ManifestStore};
pub use pack::{source::SourceChain, DirTree, MemoryTree, PackTree, ResolvedPack};
pub use path::RepositoryContext;
pub use reconcile::{Action, ActionKind, InstallOptions, Observer, Reconciler};
