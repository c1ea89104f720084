//! Pinned dependency fetcher for the DENG engine
//!
//! Materializes a reproducible vendor directory from a manifest of external
//! sources, each locked to an exact version or commit:
//!
//! - **archives** are downloaded over HTTP and unpacked into `<vendor>/<name>`
//! - **repositories** are cloned into `<vendor>/<name>` and checked out at the
//!   pinned commit
//!
//! The vendor directory is the only record of what has been fetched. Re-running
//! against a partially populated tree completes it; re-running against a
//! complete tree leaves every checkout where it is.
//!
//! Native binary packages can additionally be installed through vcpkg, see
//! [`packages`].
//!
//! # Example
//!
//! ```no_run
//! use deng_fetch::{DependencySpec, FetchContext, Manifest, driver};
//!
//! let manifest = Manifest::new(vec![
//!     DependencySpec::archive("foo", "https://example.com/foo-1.0.tar.gz", "1.0")?,
//!     DependencySpec::repository("bar", "https://example.com/bar.git", "abc1234")?,
//! ])?;
//! let report = driver::run(&FetchContext::with_vendor_root("deps"), &manifest)?;
//! assert!(report.is_complete());
//! # Ok::<(), deng_fetch::FetchError>(())
//! ```

pub mod acquire;
pub mod core;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod packages;

pub use crate::core::context::FetchContext;
pub use crate::core::output;
pub use driver::{DependencyState, DependencyStatus, RunReport};
pub use error::FetchError;
pub use manifest::{DependencyKind, DependencySpec, Manifest, NestedBootstrap, Pin};
pub use packages::{PackageManager, PackageOutcome, Platform};
