// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pack source strategies.
//!
//! A candidate pack can come from several places. Rather than a chain of
//! silent fallbacks, each place is a [`PackSource`] strategy with its own
//! structured failure. A [`SourceChain`] tries its strategies in order and
//! reports which one produced the pack, or every reason none of them did.
//!
//! Fetching and verifying release archives is left to an external
//! collaborator that populates the download cache read by [`Cache`]. The
//! [`embedded`] pack always closes the standard chain, so a fresh machine
//! without network access can still install the base.

use crate::{
    config::Settings,
    pack::{embedded, DirTree, PackError, PackTree, Result},
    path::RepositoryContext,
};

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::Arc,
};
use tracing::{debug, info, instrument};

/// Default tag looked up in the download cache.
pub const DEFAULT_TAG: &str = "latest";

/// Strategy that can produce a pack tree.
pub trait PackSource {
    /// Short name of the strategy, used in reports.
    fn name(&self) -> &str;

    /// Try to produce a pack tree.
    fn load(&self) -> Result<LoadedPack>;
}

/// Pack tree produced by a [`PackSource`].
#[derive(Clone)]
pub struct LoadedPack {
    /// Name of the source that produced the tree.
    pub source: String,

    /// Version label the source attaches to the tree.
    pub label: String,

    /// The tree itself.
    pub tree: Arc<dyn PackTree>,
}

impl Debug for LoadedPack {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("LoadedPack")
            .field("source", &self.source)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Development checkout of the pack inside the repository itself.
#[derive(Debug, Clone)]
pub struct LocalDir {
    dir: PathBuf,
}

impl LocalDir {
    /// Look for `pack/` under the repository root.
    pub fn new(ctx: &RepositoryContext) -> Self {
        Self {
            dir: ctx.root().join("pack"),
        }
    }
}

impl PackSource for LocalDir {
    fn name(&self) -> &str {
        "local"
    }

    fn load(&self) -> Result<LoadedPack> {
        let tree = DirTree::open(&self.dir)?;
        Ok(LoadedPack {
            source: self.name().into(),
            label: "local".into(),
            tree: Arc::new(tree),
        })
    }
}

/// Pack directory named in the settings file.
#[derive(Debug, Clone)]
pub struct ConfiguredDir {
    dir: Option<PathBuf>,
}

impl ConfiguredDir {
    /// Use `pack_dir` from settings, if any.
    pub fn new(settings: &Settings) -> Self {
        Self {
            dir: settings.pack_dir.clone(),
        }
    }
}

impl PackSource for ConfiguredDir {
    fn name(&self) -> &str {
        "configured"
    }

    fn load(&self) -> Result<LoadedPack> {
        let dir = self.dir.as_ref().ok_or_else(|| PackError::NotConfigured {
            name: self.name().into(),
        })?;
        let tree = DirTree::open(dir)?;

        Ok(LoadedPack {
            source: self.name().into(),
            label: "configured".into(),
            tree: Arc::new(tree),
        })
    }
}

/// Previously downloaded pack in the state directory.
///
/// Layout is `<state>/packs/<tag>/pack`, where slashes in the tag are
/// replaced by underscores.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
    tag: String,
}

impl Cache {
    /// Look up `tag` in the pack cache of the state directory.
    pub fn new(ctx: &RepositoryContext, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let dir = ctx
            .pack_cache_dir()
            .join(tag.replace('/', "_"))
            .join("pack");

        Self { dir, tag }
    }
}

impl PackSource for Cache {
    fn name(&self) -> &str {
        "cache"
    }

    fn load(&self) -> Result<LoadedPack> {
        let tree = DirTree::open(&self.dir)?;
        Ok(LoadedPack {
            source: self.name().into(),
            label: self.tag.clone(),
            tree: Arc::new(tree),
        })
    }
}

/// Fixed in-memory or pre-built tree.
pub struct Fixed {
    name: String,
    label: String,
    tree: Arc<dyn PackTree>,
}

impl Fixed {
    /// Construct source that always yields `tree`.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        tree: Arc<dyn PackTree>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            tree,
        }
    }
}

impl PackSource for Fixed {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn load(&self) -> Result<LoadedPack> {
        Ok(LoadedPack {
            source: self.name.clone(),
            label: self.label.clone(),
            tree: Arc::clone(&self.tree),
        })
    }
}

/// Reason a single source in a chain failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Name of the failed source.
    pub source: String,

    /// Rendered error of the failed source.
    pub reason: String,
}

impl Display for SourceFailure {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}: {}", self.source, self.reason)
    }
}

pub(crate) fn render_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  {failure}"))
        .collect()
}

/// Ordered list of pack sources.
#[derive(Default)]
pub struct SourceChain {
    sources: Vec<Box<dyn PackSource>>,
}

impl SourceChain {
    /// Construct new empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct the standard chain: local checkout, configured directory,
    /// download cache for `tag`, then the embedded base pack.
    pub fn standard(ctx: &RepositoryContext, settings: &Settings, tag: Option<&str>) -> Self {
        Self::new()
            .with(LocalDir::new(ctx))
            .with(ConfiguredDir::new(settings))
            .with(Cache::new(ctx, tag.unwrap_or(DEFAULT_TAG)))
            .with(embedded::source())
    }

    /// Construct chain that only consults the embedded base pack.
    pub fn offline() -> Self {
        Self::new().with(embedded::source())
    }

    /// Append source to the end of the chain.
    pub fn with(mut self, source: impl PackSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Load pack from the first source that succeeds.
    ///
    /// # Errors
    ///
    /// - Return [`PackError::Exhausted`] listing each failure if no source
    ///   succeeds.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<LoadedPack> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.load() {
                Ok(loaded) => {
                    info!("using {} pack ({})", loaded.source, loaded.label);
                    return Ok(loaded);
                }
                Err(err) => {
                    debug!("pack source {} failed: {err}", source.name());
                    failures.push(SourceFailure {
                        source: source.name().into(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        Err(PackError::Exhausted { failures })
    }
}
