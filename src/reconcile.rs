// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest-driven reconciliation.
//!
//! The reconciler decides, file by file, what to do with the working tree of a
//! repository given three views of it:
//!
//! 1. __Old state__: the manifest, recording the digest of each managed file
//!    as Codo last left it.
//! 2. __New state__: the freshly resolved pack.
//! 3. __Current state__: whatever is on disk right now, including any amount
//!    of uncontrolled local editing.
//!
//! The same classification runs for install, update, and remove. A dry run
//! makes every decision and reports it, but suppresses every mutation.
//!
//! # Install
//!
//! | Live file                 | Action      |
//! |---------------------------|-------------|
//! | missing                   | `create`    |
//! | equal to pack content     | `identical` |
//! | differs from pack content | `conflict`  |
//!
//! # Update
//!
//! | Manifest | Pack | Live file                 | Action        |
//! |----------|------|---------------------------|---------------|
//! | yes      | yes  | missing                   | `create`      |
//! | yes      | yes  | digest equals manifest    | `refresh`     |
//! | yes      | yes  | digest differs            | `conflict`    |
//! | yes      | no   | digest equals manifest    | `prune`       |
//! | yes      | no   | digest differs            | `orphan-warn` |
//! | no       | yes  | missing                   | `create`      |
//!
//! # Remove
//!
//! Managed files that are present move into a fresh backup session. Unmanaged
//! files are left alone. Afterwards the manifest is deleted.
//!
//! # Failure
//!
//! The first I/O error aborts the run. Actions already applied stay applied,
//! and the manifest is only rewritten after the whole file loop completes.

pub mod action;
pub mod sidecar;

pub use action::{Action, ActionKind};

use crate::{
    backup::{BackupError, BackupManager},
    digest::sha256_hex,
    manifest::{Entry, Manifest, ManifestError, ManifestStore},
    pack::{PackEntry, PackError, ResolvedPack},
    path::RepositoryContext,
    reconcile::sidecar::{conflict_sidecar, orphan_note, ConflictReport, ORPHAN_NOTE},
};

use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Receive actions as they are decided.
///
/// Observers see each action before it is applied, so an operator can always
/// tell what was about to happen when a run aborts.
pub trait Observer {
    fn observe(&mut self, action: &Action);
}

impl<F> Observer for F
where
    F: FnMut(&Action),
{
    fn observe(&mut self, action: &Action) {
        self(action)
    }
}

/// Install tuning.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Record pre-existing, differing files as unmanaged.
    pub leave_existing: bool,
}

/// Result of an install or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Every decision, in the order it was made.
    pub actions: Vec<Action>,

    /// Freshly written manifest. Absent on dry runs.
    pub manifest: Option<Manifest>,
}

impl Outcome {
    /// Number of actions that left a sidecar behind.
    pub fn attention_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| action.needs_attention())
            .count()
    }
}

/// Result of a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Every decision, in manifest order.
    pub actions: Vec<Action>,

    /// Backup session directory, or where it would have been on dry runs.
    pub backup_dir: PathBuf,
}

/// Reconcile a repository's working tree against a pack and its manifest.
#[derive(Debug)]
pub struct Reconciler<'ctx, O>
where
    O: Observer,
{
    ctx: &'ctx RepositoryContext,
    store: ManifestStore,
    report: ConflictReport,
    dry_run: bool,
    observer: O,
    actions: Vec<Action>,
}

impl<'ctx, O> Reconciler<'ctx, O>
where
    O: Observer,
{
    /// Construct new reconciler for the repository described by `ctx`.
    pub fn new(ctx: &'ctx RepositoryContext, observer: O) -> Self {
        Self {
            ctx,
            store: ManifestStore::new(ctx),
            report: ConflictReport::new(ctx),
            dry_run: false,
            observer,
            actions: Vec::new(),
        }
    }

    /// Only decide and report, never mutate anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Install resolved pack.
    ///
    /// Every pack entry ends up in the manifest, whichever way it was
    /// classified. A conflicting entry is recorded with the digest of the
    /// untouched live file, not of its sidecar.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Io`] if a live file cannot be read or
    ///   written.
    /// - Return [`ReconcileError::Pack`] if pack content cannot be read.
    /// - Return [`ReconcileError::Manifest`] if the manifest cannot be
    ///   written.
    #[instrument(skip(self, pack, options), level = "debug")]
    pub fn install(&mut self, pack: &ResolvedPack, options: &InstallOptions) -> Result<Outcome> {
        info!(
            "install {} pack into {:?}",
            pack.version(),
            self.ctx.root().display()
        );
        let mut unmanaged = BTreeSet::new();

        for entry in pack.entries() {
            let kind = self.place(entry, true)?;
            if options.leave_existing && matches!(kind, ActionKind::Conflict { .. }) {
                unmanaged.insert(entry.path().to_string());
            }
        }

        self.finish(pack, &unmanaged)
    }

    /// Update installation to resolved pack.
    ///
    /// Walks the union of paths known to `previous` and to `pack`, in path
    /// order. Unmanaged entries are never overwritten or pruned.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Io`] if a live file cannot be read, written,
    ///   or deleted.
    /// - Return [`ReconcileError::Pack`] if pack content cannot be read.
    /// - Return [`ReconcileError::Manifest`] if the manifest cannot be
    ///   written.
    #[instrument(skip(self, previous, pack), level = "debug")]
    pub fn update(&mut self, previous: &Manifest, pack: &ResolvedPack) -> Result<Outcome> {
        info!(
            "update {:?} from {} to {}",
            self.ctx.root().display(),
            previous.version,
            pack.version()
        );
        let known: BTreeMap<&str, &Entry> = previous
            .files
            .iter()
            .map(|entry| (entry.path.as_str(), entry))
            .collect();
        let union: BTreeSet<&str> = known
            .keys()
            .copied()
            .chain(pack.entries().iter().map(PackEntry::path))
            .collect();

        let mut unmanaged = BTreeSet::new();
        for path in union {
            match (known.get(path), pack.get(path)) {
                (Some(old), Some(new)) => {
                    if old.unmanaged {
                        // INVARIANT: Unmanaged files are never overwritten.
                        if self.place(new, false)? != ActionKind::Create {
                            unmanaged.insert(path.to_string());
                        }
                    } else {
                        self.refresh(old, new)?;
                    }
                }
                (Some(old), None) => self.retire(old)?,
                (None, Some(new)) => {
                    self.place(new, true)?;
                }
                (None, None) => unreachable!("path {path:?} came from neither side"),
            }
        }

        self.finish(pack, &unmanaged)
    }

    /// Remove installation described by `previous`.
    ///
    /// Present managed files move into a backup session derived from `at`,
    /// keeping their relative layout. Conflict sidecars of every entry are
    /// cleaned up. The manifest is deleted last.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Backup`] if the session cannot be created or
    ///   a file cannot be moved into it.
    /// - Return [`ReconcileError::Io`] if a sidecar cannot be deleted.
    /// - Return [`ReconcileError::Manifest`] if the manifest cannot be
    ///   deleted.
    #[instrument(skip(self, previous), level = "debug")]
    pub fn remove(&mut self, previous: &Manifest, at: DateTime<Utc>) -> Result<Removal> {
        let backups = BackupManager::new(self.ctx);
        let session = if self.dry_run {
            None
        } else {
            Some(backups.begin(at)?)
        };
        let backup_dir = match &session {
            Some(session) => session.dir().to_path_buf(),
            None => backups.session_dir(at),
        };
        info!("back up managed files to {:?}", backup_dir.display());

        for entry in &previous.files {
            if entry.unmanaged {
                self.record(Action::new(&entry.path, ActionKind::SkipUnmanaged));
                self.discard_sidecar(&entry.path)?;
                continue;
            }

            let live = self.ctx.resolve(&entry.path);
            if fs::symlink_metadata(&live).is_err() {
                debug!("{} already absent", entry.path);
                continue;
            }

            let destination = match &session {
                Some(session) => session.destination(&entry.path),
                None => backup_dir.join(&entry.path),
            };
            self.record(Action::new(&entry.path, ActionKind::Backup { destination }));
            if let Some(session) = &session {
                session.relocate(&entry.path)?;
            }
            self.discard_sidecar(&entry.path)?;
        }

        if !self.dry_run {
            self.store.remove()?;
        }

        Ok(Removal {
            actions: std::mem::take(&mut self.actions),
            backup_dir,
        })
    }

    /// Classify and place a pack entry without prior state.
    ///
    /// Files left `managed = false` are never touched when identical.
    fn place(&mut self, entry: &PackEntry, managed: bool) -> Result<ActionKind> {
        let content = entry.read()?;
        let live = self.ctx.resolve(entry.path());

        let kind = match read_live(&live)? {
            None => ActionKind::Create,
            Some(current) if current == content => ActionKind::Identical,
            Some(_) => ActionKind::Conflict {
                sidecar: conflict_sidecar(entry.path()),
            },
        };

        // INVARIANT: Unmanaged files keep their permissions.
        if !managed && kind == ActionKind::Identical {
            self.record(Action::new(entry.path(), kind.clone()));
        } else {
            self.apply(entry.path(), &kind, &content)?;
        }

        Ok(kind)
    }

    /// Classify and place a pack entry the manifest already tracks.
    fn refresh(&mut self, old: &Entry, entry: &PackEntry) -> Result<()> {
        let content = entry.read()?;
        let live = self.ctx.resolve(entry.path());

        let kind = match read_live(&live)? {
            None => ActionKind::Create,
            Some(current) if sha256_hex(&current) == old.sha256 => ActionKind::Refresh,
            Some(_) => ActionKind::Conflict {
                sidecar: conflict_sidecar(entry.path()),
            },
        };

        self.apply(entry.path(), &kind, &content)
    }

    /// Classify and retire a path the pack no longer ships.
    fn retire(&mut self, old: &Entry) -> Result<()> {
        let live = self.ctx.resolve(&old.path);
        let Some(current) = read_live(&live)? else {
            debug!("{} dropped upstream and already gone", old.path);
            return Ok(());
        };

        let kind = if old.unmanaged {
            ActionKind::SkipUnmanaged
        } else if sha256_hex(&current) == old.sha256 {
            ActionKind::Prune
        } else {
            ActionKind::OrphanWarn {
                note: orphan_note(&old.path),
            }
        };

        self.apply(&old.path, &kind, ORPHAN_NOTE.as_bytes())
    }

    /// Report action, then carry it out unless this is a dry run.
    fn apply(&mut self, path: &str, kind: &ActionKind, content: &[u8]) -> Result<()> {
        self.record(Action::new(path, kind.clone()));
        if self.dry_run {
            return Ok(());
        }

        let live = self.ctx.resolve(path);
        match kind {
            ActionKind::Create | ActionKind::Refresh => {
                write_file(&live, content)?;
                mark_hook_executable(path, &live)?;
            }
            ActionKind::Identical => mark_hook_executable(path, &live)?,
            ActionKind::Conflict { sidecar } => {
                write_file(&self.ctx.resolve(sidecar), content)?;
                self.report
                    .append(sidecar)
                    .map_err(|err| io_error("append to", self.report.path(), err))?;
            }
            ActionKind::Prune => {
                fs::remove_file(&live).map_err(|err| io_error("delete", &live, err))?;
            }
            ActionKind::OrphanWarn { note } => write_file(&self.ctx.resolve(note), content)?,
            ActionKind::Backup { .. } | ActionKind::SkipUnmanaged => {}
        }

        Ok(())
    }

    fn record(&mut self, action: Action) {
        self.observer.observe(&action);
        self.actions.push(action);
    }

    fn discard_sidecar(&self, path: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }

        let sidecar = self.ctx.resolve(&conflict_sidecar(path));
        match fs::remove_file(&sidecar) {
            Ok(()) => {
                debug!("removed sidecar {:?}", sidecar.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("delete", &sidecar, err)),
        }
    }

    fn finish(&mut self, pack: &ResolvedPack, unmanaged: &BTreeSet<String>) -> Result<Outcome> {
        let actions = std::mem::take(&mut self.actions);
        if self.dry_run {
            return Ok(Outcome {
                actions,
                manifest: None,
            });
        }

        let manifest = self
            .store
            .write(pack.entries(), pack.version(), pack.overlays(), unmanaged)?;

        Ok(Outcome {
            actions,
            manifest: Some(manifest),
        })
    }
}

fn read_live(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error("read", path, err)),
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(|err| io_error("create directory", parent, err))?;
    }

    fs::write(path, content).map_err(|err| io_error("write", path, err))
}

fn is_hook_script(path: &str) -> bool {
    path.starts_with(".claude/hooks/") && (path.ends_with(".py") || path.ends_with(".sh"))
}

#[cfg(unix)]
fn mark_hook_executable(relative: &str, live: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !is_hook_script(relative) {
        return Ok(());
    }

    fs::set_permissions(live, fs::Permissions::from_mode(0o755))
        .map_err(|err| io_error("mark executable", live, err))
}

#[cfg(not(unix))]
fn mark_hook_executable(_relative: &str, _live: &Path) -> Result<()> {
    Ok(())
}

fn io_error(operation: &'static str, path: &Path, source: io::Error) -> ReconcileError {
    ReconcileError::Io {
        source,
        operation,
        path: path.to_path_buf(),
    }
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// File operation on a specific path fails.
    #[error("failed to {operation} {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        operation: &'static str,
        path: PathBuf,
    },

    /// Manifest cannot be read, written, or removed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Pack content cannot be read.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// Backup session fails.
    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Friendly result alias :3
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
