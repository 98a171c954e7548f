// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-file reconciliation actions.
//!
//! Every decision the reconciler makes about a path is an [`Action`]. Actions
//! render as a single line led by a symbol, so an operator can scan what did
//! (or, on a dry run, would) happen:
//!
//! | Symbol | Meaning                                        |
//! |--------|------------------------------------------------|
//! | `+`    | file created                                   |
//! | `~`    | file refreshed, or unmanaged file skipped      |
//! | `=`    | file already identical                         |
//! | `!`    | conflict or orphan, sidecar written beside it  |
//! | `-`    | file pruned, or moved into a backup            |

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

/// What happens to a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// File was missing and gets written.
    Create,

    /// File was unmodified since last managed write and gets overwritten.
    Refresh,

    /// File content already equals pack content.
    Identical,

    /// File differs, new content goes to a sidecar instead.
    Conflict { sidecar: String },

    /// File dropped upstream and unmodified, gets deleted.
    Prune,

    /// File dropped upstream but modified locally, advisory note written.
    OrphanWarn { note: String },

    /// File moved into a backup session.
    Backup { destination: PathBuf },

    /// Unmanaged file left alone.
    SkipUnmanaged,
}

/// Decision made about a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Project-relative path.
    pub path: String,

    /// What happens to it.
    pub kind: ActionKind,
}

impl Action {
    /// Construct new action.
    pub fn new(path: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Leading symbol of the rendered line.
    pub fn symbol(&self) -> char {
        match self.kind {
            ActionKind::Create => '+',
            ActionKind::Refresh | ActionKind::SkipUnmanaged => '~',
            ActionKind::Identical => '=',
            ActionKind::Conflict { .. } | ActionKind::OrphanWarn { .. } => '!',
            ActionKind::Prune | ActionKind::Backup { .. } => '-',
        }
    }

    /// Action leaves a sidecar that needs operator attention.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self.kind,
            ActionKind::Conflict { .. } | ActionKind::OrphanWarn { .. }
        )
    }
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let symbol = self.symbol();
        match &self.kind {
            ActionKind::Conflict { sidecar } => write!(fmt, "{symbol} conflict -> {sidecar}"),
            ActionKind::OrphanWarn { note } => {
                write!(fmt, "{symbol} modified & removed upstream -> {note}")
            }
            ActionKind::SkipUnmanaged => write!(fmt, "{symbol} skip unmanaged {}", self.path),
            _ => write!(fmt, "{symbol} {}", self.path),
        }
    }
}
