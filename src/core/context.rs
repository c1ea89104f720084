//! Run configuration shared by every fetch step.

use std::path::PathBuf;
use std::time::Duration;

/// Executable names probed, in order, for the version-control client.
pub const DEFAULT_GIT_CANDIDATES: &[&str] = &["git", "git.exe", "git.bat"];

/// Default vendor directory, relative to the working directory.
pub const DEFAULT_VENDOR_DIR: &str = "deps";

/// Configuration for one acquisition run.
///
/// Built once by the caller and passed by reference into the driver; nothing
/// in the crate keeps run state in globals.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Root of the vendor tree; one subdirectory per dependency
    pub vendor_root: PathBuf,
    /// Candidate names for the version-control client
    pub git_candidates: Vec<String>,
    /// Connect/read timeout for archive downloads (None = block indefinitely)
    pub http_timeout: Option<Duration>,
    /// Whether dependencies' own setup scripts are run after fetching
    pub run_nested_bootstrap: bool,
    /// Print subprocess invocations as they run
    pub verbose: bool,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self {
            vendor_root: PathBuf::from(DEFAULT_VENDOR_DIR),
            git_candidates: DEFAULT_GIT_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            http_timeout: None,
            run_nested_bootstrap: true,
            verbose: false,
        }
    }
}

impl FetchContext {
    /// Create a context rooted at the given vendor directory.
    pub fn with_vendor_root(root: impl Into<PathBuf>) -> Self {
        Self {
            vendor_root: root.into(),
            ..Default::default()
        }
    }

    /// Replace the version-control client candidates.
    pub fn git_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.git_candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Set the download timeout.
    pub fn http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Enable or disable nested bootstrap scripts.
    pub fn run_nested_bootstrap(mut self, enabled: bool) -> Self {
        self.run_nested_bootstrap = enabled;
        self
    }

    /// Set verbose mode.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Destination directory for a named dependency.
    pub fn dest_for(&self, name: &str) -> PathBuf {
        self.vendor_root.join(name)
    }
}
