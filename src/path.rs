// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where Codo keeps its own state, and which repository a command
//! is operating on.
//!
//! # State Directory
//!
//! Codo never stores its bookkeeping inside the repository it manages. All
//! manifests, backups, cached packs, and the settings file live in a single
//! process-wide __state directory__, keyed per repository through a short
//! identity hash of the repository's absolute root path. Keeping state out of
//! the working tree means that `.gitignore` rules, `git clean`, or a careless
//! `rm -rf .claude` cannot hide or corrupt it.
//!
//! The state directory is resolved in this order:
//!
//! 1. `$CODO_STATE_DIR` if set and non-empty.
//! 2. `$XDG_CONFIG_HOME/codo` (or the platform equivalent).
//! 3. `$XDG_CACHE_HOME/codo` (or the platform equivalent).
//! 4. `$HOME/.codo`.

use crate::digest::sha256_hex;

use git2::Repository;
use std::{
    env,
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Environment variable that overrides the default state directory.
pub const STATE_DIR_ENV: &str = "CODO_STATE_DIR";

/// Directory name used under the platform config, cache, or home directory.
const STATE_DIR_NAME: &str = "codo";

/// Length of the hex repository identity key.
const REPO_KEY_LEN: usize = 16;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to the state directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if no candidate location can be
///   determined.
pub fn default_state_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(STATE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(STATE_DIR_NAME));
    }

    if let Some(dir) = dirs::cache_dir() {
        return Ok(dir.join(STATE_DIR_NAME));
    }

    Ok(home_dir()?.join(format!(".{STATE_DIR_NAME}")))
}

/// Derive repository identity key from an absolute root path.
///
/// The key is the first sixteen hex digits of the SHA-256 digest of the
/// root's textual form. Callers are expected to pass a normalized path, see
/// [`normalize`].
pub fn repo_key(root: impl AsRef<Path>) -> String {
    let digest = sha256_hex(root.as_ref().to_string_lossy().as_bytes());
    digest[..REPO_KEY_LEN].to_string()
}

/// Make path absolute and strip redundant components.
///
/// Does not resolve symlinks. Trailing separators and `.` components are
/// dropped so that `/repo/` and `/repo` map to the same identity.
///
/// # Errors
///
/// - Return [`PathError::Absolute`] if the current directory is needed but
///   cannot be determined.
pub fn normalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let absolute = std::path::absolute(path.as_ref()).map_err(|err| PathError::Absolute {
        source: err,
        path: path.as_ref().to_path_buf(),
    })?;

    Ok(absolute
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect())
}

/// Explicit repository context.
///
/// Bundles the repository root together with its derived identity key and the
/// state directory that holds its manifest and backups. Every component that
/// needs to know "which repository" receives this value explicitly instead of
/// consulting the process working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryContext {
    root: PathBuf,
    key: String,
    state_dir: PathBuf,
}

impl RepositoryContext {
    /// Construct new repository context for an exact root.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::Absolute`] if either path cannot be made absolute.
    pub fn new(root: impl AsRef<Path>, state_dir: impl AsRef<Path>) -> Result<Self> {
        let root = normalize(root)?;
        let state_dir = normalize(state_dir)?;
        let key = repo_key(&root);

        Ok(Self {
            root,
            key,
            state_dir,
        })
    }

    /// Construct repository context by discovering the enclosing repository.
    ///
    /// Walks up from `start` looking for a git work tree. If one is found, its
    /// top-level directory becomes the root. Otherwise `start` itself is the
    /// root, so plain directories can be managed too.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::Absolute`] if either path cannot be made absolute.
    pub fn discover(start: impl AsRef<Path>, state_dir: impl AsRef<Path>) -> Result<Self> {
        let start = normalize(start)?;
        let root = match Repository::discover(&start) {
            Ok(repository) => match repository.workdir() {
                Some(workdir) => workdir.to_path_buf(),
                None => start,
            },
            Err(err) => {
                debug!("no git repository above {:?}: {}", start.display(), err.message());
                start
            }
        };

        Self::new(root, state_dir)
    }

    /// Absolute path to repository root.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Repository identity key.
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Absolute path to state directory.
    pub fn state_dir(&self) -> &Path {
        self.state_dir.as_path()
    }

    /// Path to this repository's manifest inside the state directory.
    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir
            .join("manifests")
            .join(format!("{}.json", self.key))
    }

    /// Path to the manifest location used by older releases.
    ///
    /// Still read for backward compatibility, and removed once state has been
    /// migrated.
    pub fn legacy_manifest_path(&self) -> PathBuf {
        self.root.join(".claude").join(".codo-manifest.json")
    }

    /// Directory under which every backup session of this repository lives.
    pub fn backup_root(&self) -> PathBuf {
        self.state_dir.join("backups").join(&self.key)
    }

    /// Directory holding cached copies of downloaded packs.
    pub fn pack_cache_dir(&self) -> PathBuf {
        self.state_dir.join("packs")
    }

    /// Path to the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.state_dir.join("config.toml")
    }

    /// Path to the append-only conflict report inside the repository.
    pub fn report_path(&self) -> PathBuf {
        self.root
            .join(".claude")
            .join(".codo-report")
            .join("conflicts.txt")
    }

    /// Resolve a pack-relative, slash-separated path against the root.
    ///
    /// Never leaves the root, see [`join_relative`].
    pub fn resolve(&self, relative: &str) -> PathBuf {
        join_relative(&self.root, relative)
    }
}

/// Check that a slash-separated path is relative and cannot climb out of
/// whatever directory it is joined onto.
pub fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

/// Join slash-separated relative path onto `base`.
///
/// Empty, `.`, and `..` components are dropped, so the result always lies
/// below `base`. Callers that need to reject such paths outright check
/// [`is_safe_relative`] first.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Path cannot be made absolute.
    #[error("cannot make {:?} absolute", path.display())]
    Absolute {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
