//! Top-level error type for the `gitdeps` CLI.
//!
//! Each component owns its own error enum; this module gathers them so the
//! command layer can use `?` throughout and the binary can render one chain.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coordinator::CoordinatorError;
use crate::manifest::ManifestLoadError;

/// Errors that end a `gitdeps` command.
#[derive(Debug, Error)]
pub enum GitDepsError {
    /// The manifest could not be located, read, or decoded.
    #[error(transparent)]
    Load(#[from] ManifestLoadError),

    /// The configuration file or flag combination is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// One or more packs failed, or the run was cancelled.
    #[error(transparent)]
    Run(#[from] CoordinatorError),

    /// `download` has no CDN to talk to.
    #[error("manifest {manifest} has no BaseUrl; pass --base-url or set base_url in gitdeps.toml")]
    MissingBaseUrl {
        /// The manifest lacking a base URL.
        manifest: String,
    },

    /// Failed to write command output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl GitDepsError {
    /// Render the error and its causes on one line.
    #[must_use]
    pub fn chain(&self) -> String {
        crate::manifest::loader::error_chain(self)
    }
}

/// Result type alias using [`GitDepsError`].
pub type Result<T> = std::result::Result<T, GitDepsError>;
