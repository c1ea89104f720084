//! Fetch error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while acquiring dependencies.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no usable executable found (tried: {})", candidates.join(", "))]
    ToolNotFound { candidates: Vec<String> },

    #[error("invalid revision '{revision}' for dependency '{dependency}'\nDetails: {reason}")]
    InvalidRevision {
        dependency: String,
        revision: String,
        reason: String,
    },

    #[error("download failed: {url}\nDetails: {reason}")]
    Network { url: String, reason: String },

    #[error("not a valid compressed tar archive: {url}\nDetails: {reason}")]
    CorruptArchive { url: String, reason: String },

    #[error("nested bootstrap for '{dependency}' failed: {reason}")]
    NestedBootstrap { dependency: String, reason: String },

    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("invalid dependency '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },

    #[error("package manager failed: {0}")]
    PackageManager(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Build an `Io` error bound to the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run.
    ///
    /// A missing version-control client or a revision that does not resolve
    /// are manifest/environment defects; everything else is isolated to the
    /// dependency it happened on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound { .. } | Self::InvalidRevision { .. } | Self::InvalidSpec { .. }
        )
    }
}
