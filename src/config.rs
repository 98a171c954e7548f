// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional settings file that Codo reads from its
//! state directory. Serialization and deserialization go through [`FromStr`]
//! and [`Display`], and [`Settings::load`] is a thin file-reading wrapper on
//! top of that.
//!
//! # General Layout
//!
//! ```toml
//! pack_dir = "$HOME/src/toolkit/pack"
//! default_overlays = ["go", "python"]
//! prompt = true
//! ```
//!
//! Every field is optional. A missing settings file is the same as an empty
//! one.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Tool settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Pack directory to install from instead of the download cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_dir: Option<PathBuf>,

    /// Overlays to install when none are given and prompting is off.
    pub default_overlays: Vec<String>,

    /// Whether install may ask for overlays interactively.
    pub prompt: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pack_dir: None,
            default_overlays: Vec::new(),
            prompt: true,
        }
    }
}

impl Settings {
    /// Load settings file from target path.
    ///
    /// Falls back to default settings if the file does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if settings file exists but cannot be
    ///   read.
    /// - Return [`ConfigError::Deserialize`] if settings file is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if pack directory cannot be
    ///   expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no settings at {:?}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on pack directory field.
        if let Some(pack_dir) = settings.pack_dir.take() {
            settings.pack_dir = Some(PathBuf::from(
                shellexpand::full(pack_dir.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Settings file exists but cannot be read.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
