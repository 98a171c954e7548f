// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Base pack compiled into the binary.
//!
//! Offline installs and the last link of the standard source chain use this
//! pack. It only carries the base subtree and top-level documentation, no
//! overlays.

use crate::pack::{
    source::{Fixed, PackSource},
    MemoryTree, PackTree,
};

use std::sync::Arc;

/// Name of the embedded source in chain reports.
pub const NAME: &str = "embedded";

/// Version label attached to the embedded pack.
pub const LABEL: &str = "embedded-base";

macro_rules! asset {
    ($path:literal) => {
        (
            $path,
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/dotclaude/", $path)),
        )
    };
}

/// Every file of the embedded pack, keyed by pack-relative path.
const FILES: &[(&str, &str)] = &[
    asset!(".claude/base/hooks/pre_tool_use.py"),
    asset!(".claude/base/settings.json"),
    asset!("CLAUDE.md"),
];

/// Build in-memory tree of the embedded pack.
pub fn tree() -> MemoryTree {
    FILES.iter().copied().collect()
}

/// Source that always yields the embedded pack.
pub fn source() -> impl PackSource {
    let tree: Arc<dyn PackTree> = Arc::new(tree());
    Fixed::new(NAME, LABEL, tree)
}
