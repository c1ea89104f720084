//! Dependency acquisition
//!
//! The fetchers the driver composes:
//!
//! - **tool**: resolve an external executable from candidate names
//! - **download**: stream an HTTP resource into a scoped temp file
//! - **extract**: unpack a compressed tar stream safely
//! - **archive**: download + extract a release archive
//! - **git**: clone a repository and pin it to a revision

pub mod archive;
pub mod download;
pub mod extract;
pub mod git;
pub mod tool;

pub use archive::fetch_archive;
pub use git::{current_revision, fetch_at_revision};
pub use tool::{ToolHandle, locate};
