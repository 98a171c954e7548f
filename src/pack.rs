// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pack composition.
//!
//! A __pack__ is a versioned tree of template files that Codo installs into a
//! repository. The pack is handed to Codo by a collaborator (a development
//! checkout, a configured directory, or a download cache, see [`source`]) as
//! something that implements [`PackTree`]: a hierarchical file source that can
//! list files below a prefix and read the bytes of a single file.
//!
//! # Pack Layout
//!
//! ```text
//! <pack root>/
//!   .claude/base/**             -> .claude/**
//!   .claude/stacks/<overlay>/** -> .claude/**
//!   CLAUDE.md, docs/**, ...     -> installed as-is
//! ```
//!
//! The __base__ subtree is always installed. Each __overlay__ is an optional,
//! named subtree layered on top of it. Only overlays from the closed set in
//! [`ALLOWED_OVERLAYS`] are honored; unknown names are dropped without error
//! so a typo or a crafted name like `../../etc` never reaches the tree.
//!
//! # Overlay Precedence
//!
//! Resolution is a fold over an ordered layer list: base first, then each
//! overlay in the order the caller gave. Later layers overwrite earlier ones
//! for identical destination paths. Thus `["go", "python"]` is __not__ the
//! same as `["python", "go"]` whenever both define the same path. Whatever the
//! application order, the resolved entries come out sorted by destination
//! path so diffs and printed plans are reproducible.

pub mod embedded;
pub mod source;

use crate::path::{is_safe_relative, join_relative};

use ignore::WalkBuilder;
use std::{
    collections::BTreeMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, instrument, warn};

/// Closed set of overlay names that may be requested.
pub const ALLOWED_OVERLAYS: &[&str] = &[
    "cloudflare-workers",
    "supabase",
    "trigger.dev",
    "go",
    "typescript",
    "python",
    "flutter",
];

const CLAUDE_DIR: &str = ".claude";
const BASE_ROOT: &str = ".claude/base";
const STACKS_ROOT: &str = ".claude/stacks";

/// Hierarchical file source of a pack.
pub trait PackTree: Send + Sync {
    /// List every file below `prefix`.
    ///
    /// Returned paths are slash-separated and relative to the tree root, not
    /// to `prefix`. An empty prefix lists the whole tree. A prefix that does
    /// not exist may either yield an empty listing or an error of kind
    /// [`ErrorKind::NotFound`].
    fn walk(&self, prefix: &str) -> io::Result<Vec<String>>;

    /// Read content of a file by its tree-relative path.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Pack tree backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    /// Construct tree rooted exactly at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a pack directory, locating its canonical root.
    ///
    /// Extracted release archives nest the pack as `pack/dotclaude/` or
    /// `dotclaude/`, while a development checkout may point straight at the
    /// pack root. The first candidate that carries a `.claude` directory wins.
    ///
    /// # Errors
    ///
    /// - Return [`PackError::MissingRoot`] if `dir` is not a directory.
    /// - Return [`PackError::Layout`] if no candidate carries `.claude`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(PackError::MissingRoot {
                path: dir.to_path_buf(),
            });
        }

        let candidates = [
            dir.join("pack").join("dotclaude"),
            dir.join("dotclaude"),
            dir.to_path_buf(),
        ];
        for candidate in candidates {
            if candidate.join(CLAUDE_DIR).is_dir() {
                debug!("canonical pack root {:?}", candidate.display());
                return Ok(Self::new(candidate));
            }
        }

        Err(PackError::Layout {
            path: dir.to_path_buf(),
        })
    }

    /// Root directory of the tree.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn native(&self, path: &str) -> PathBuf {
        join_relative(&self.root, path)
    }
}

impl PackTree for DirTree {
    fn walk(&self, prefix: &str) -> io::Result<Vec<String>> {
        let start = self.native(prefix);
        if !start.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("{:?} is not a directory", start.display()),
            ));
        }

        let mut files = Vec::new();
        for entry in WalkBuilder::new(&start)
            .standard_filters(false)
            .follow_links(false)
            .build()
        {
            let entry = entry.map_err(walk_error)?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(io::Error::other)?;
            files.push(to_slash(relative));
        }
        files.sort();

        Ok(files)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.native(path))
    }
}

/// Pack tree held entirely in memory.
///
/// Handy for packs compiled into the binary, and for exercising resolution
/// without touching the file system.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryTree {
    /// Construct new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert file, replacing any previous content at the same path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    /// Builder-style [`MemoryTree::insert`].
    pub fn with(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }
}

impl<P, C> FromIterator<(P, C)> for MemoryTree
where
    P: Into<String>,
    C: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut tree = Self::new();
        for (path, content) in iter {
            tree.insert(path, content);
        }
        tree
    }
}

impl PackTree for MemoryTree {
    fn walk(&self, prefix: &str) -> io::Result<Vec<String>> {
        let prefix = prefix.trim_end_matches('/');
        Ok(self
            .files
            .keys()
            .filter(|path| {
                prefix.is_empty()
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .cloned()
            .collect())
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("{path:?} not in pack"))
        })
    }
}

/// Resolved pack file.
///
/// Pairs the project-relative destination path with a lazy accessor for the
/// content, which is only read when a file actually needs to be compared or
/// written.
#[derive(Clone)]
pub struct PackEntry {
    path: String,
    origin: String,
    tree: Arc<dyn PackTree>,
}

impl PackEntry {
    /// Project-relative, slash-separated destination path.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Tree-relative path the content comes from.
    pub fn origin(&self) -> &str {
        self.origin.as_str()
    }

    /// Read content.
    ///
    /// # Errors
    ///
    /// - Return [`PackError::Read`] if the pack tree cannot produce the file.
    pub fn read(&self) -> Result<Vec<u8>> {
        self.tree.read(&self.origin).map_err(|err| PackError::Read {
            source: err,
            path: self.origin.clone(),
        })
    }
}

impl Debug for PackEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("PackEntry")
            .field("path", &self.path)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Pack composed from base and overlays, labeled with its version.
#[derive(Debug, Clone)]
pub struct ResolvedPack {
    version: String,
    overlays: Vec<String>,
    entries: Vec<PackEntry>,
}

impl ResolvedPack {
    /// Resolve pack tree with requested overlays.
    ///
    /// # Errors
    ///
    /// - Return [`PackError::Walk`] if the tree cannot be traversed.
    pub fn resolve(
        tree: Arc<dyn PackTree>,
        version: impl Into<String>,
        overlays: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let overlays = allowed_overlays(overlays);
        let entries = resolve(tree, overlays.as_slice())?;

        Ok(Self {
            version: version.into(),
            overlays,
            entries,
        })
    }

    /// Version label of the pack.
    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Overlays that were actually applied, in application order.
    pub fn overlays(&self) -> &[String] {
        self.overlays.as_slice()
    }

    /// Resolved entries sorted by destination path.
    pub fn entries(&self) -> &[PackEntry] {
        self.entries.as_slice()
    }

    /// Look up entry by destination path.
    pub fn get(&self, path: &str) -> Option<&PackEntry> {
        self.entries
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.entries[index])
    }
}

/// Filter requested overlay names down to the allow-list.
///
/// Keeps request order. Repeated names keep their first position.
pub fn allowed_overlays(requested: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut allowed: Vec<String> = Vec::new();
    for name in requested {
        let name = name.as_ref().trim();
        if !ALLOWED_OVERLAYS.contains(&name) {
            if !name.is_empty() {
                debug!("drop unknown overlay {name:?}");
            }
            continue;
        }

        if !allowed.iter().any(|seen| seen == name) {
            allowed.push(name.to_string());
        }
    }

    allowed
}

/// Layer of the fold that composes a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layer {
    source: String,
    target: &'static str,
}

impl Layer {
    fn destination(&self, origin: &str) -> Option<String> {
        let rest = origin.strip_prefix(self.source.as_str())?.strip_prefix('/')?;
        Some(format!("{}/{}", self.target, rest))
    }
}

fn layers(overlays: &[String]) -> Vec<Layer> {
    std::iter::once(BASE_ROOT.to_string())
        .chain(overlays.iter().map(|name| format!("{STACKS_ROOT}/{name}")))
        .map(|source| Layer {
            source,
            target: CLAUDE_DIR,
        })
        .collect()
}

/// Resolve pack tree into flat, sorted list of entries.
///
/// Only names from [`ALLOWED_OVERLAYS`] are applied. Files that live outside
/// the `.claude` namespace of the tree are merged in unconditionally under
/// their own path.
///
/// # Errors
///
/// - Return [`PackError::Walk`] if a subtree exists but cannot be traversed.
#[instrument(skip(tree, overlays), level = "debug")]
pub fn resolve(
    tree: Arc<dyn PackTree>,
    overlays: &[impl AsRef<str>],
) -> Result<Vec<PackEntry>> {
    let overlays = allowed_overlays(overlays);

    // INVARIANT: Later layers overwrite earlier ones for identical paths.
    let mut index = layers(&overlays).iter().try_fold(
        BTreeMap::<String, String>::new(),
        |mut index, layer| -> Result<_> {
            for origin in walk_or_empty(tree.as_ref(), &layer.source)? {
                if let Some(destination) = layer.destination(&origin) {
                    index.insert(destination, origin);
                }
            }
            Ok(index)
        },
    )?;

    for origin in walk_or_empty(tree.as_ref(), "")? {
        if origin != CLAUDE_DIR && !origin.starts_with(&format!("{CLAUDE_DIR}/")) {
            index.insert(origin.clone(), origin);
        }
    }

    index.retain(|destination, _| {
        let safe = is_safe_relative(destination);
        if !safe {
            warn!("skip unsafe pack path {destination:?}");
        }
        safe
    });

    Ok(index
        .into_iter()
        .map(|(path, origin)| PackEntry {
            path,
            origin,
            tree: Arc::clone(&tree),
        })
        .collect())
}

fn walk_or_empty(tree: &dyn PackTree, prefix: &str) -> Result<Vec<String>> {
    match tree.walk(prefix) {
        Ok(files) => Ok(files),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("pack subtree {prefix:?} not present");
            Ok(Vec::new())
        }
        Err(err) => Err(PackError::Walk {
            source: err,
            path: prefix.to_string(),
        }),
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(err: ignore::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::other(message))
}

/// Pack composition error types.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Pack subtree cannot be traversed.
    #[error("failed to traverse pack subtree {path:?}")]
    Walk {
        #[source]
        source: io::Error,
        path: String,
    },

    /// Pack file cannot be read.
    #[error("failed to read pack file {path:?}")]
    Read {
        #[source]
        source: io::Error,
        path: String,
    },

    /// Pack directory does not exist.
    #[error("pack directory {:?} does not exist", path.display())]
    MissingRoot { path: PathBuf },

    /// Pack directory does not contain a recognizable pack.
    #[error("no .claude directory found in pack at {:?}", path.display())]
    Layout { path: PathBuf },

    /// Source was asked for but has nothing configured.
    #[error("pack source {name:?} is not configured")]
    NotConfigured { name: String },

    /// Every pack source failed.
    #[error("no pack source succeeded:{}", source::render_failures(failures))]
    Exhausted { failures: Vec<source::SourceFailure> },
}

/// Friendly result alias :3
pub type Result<T, E = PackError> = std::result::Result<T, E>;
