//! Repository acquisition pinned to an exact revision
//!
//! Two phases with different strictness:
//!
//! - **clone** is best-effort. On a re-run the destination already holds a
//!   checkout, git refuses to clone over it, and that is fine.
//! - **checkout** is authoritative. If the pinned revision does not resolve
//!   inside the destination the manifest is wrong, and the caller gets
//!   [`FetchError::InvalidRevision`] naming the dependency.
//!
//! After checkout, `HEAD` is compared against the pin so a revision that
//! resolved to something else (e.g. an ambiguous abbreviation) is caught too.

use std::path::Path;
use std::process::{Output, Stdio};

use super::tool::ToolHandle;
use crate::core::output::{self, ProgressGuard};
use crate::error::FetchError;

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn is_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Clone `repo_url` into `dest_dir` and check out `revision` there.
pub fn fetch_at_revision(
    tool: &ToolHandle,
    dependency: &str,
    repo_url: &str,
    revision: &str,
    dest_dir: &Path,
) -> Result<(), FetchError> {
    let invalid = |reason: String| FetchError::InvalidRevision {
        dependency: dependency.to_string(),
        revision: revision.to_string(),
        reason,
    };

    let existed = is_checkout(dest_dir);
    let clone_stderr = clone(tool, dependency, repo_url, dest_dir)?;

    if !is_checkout(dest_dir) {
        return Err(invalid(format!(
            "{} is not a git checkout{}",
            dest_dir.display(),
            clone_stderr
                .map(|s| format!(" (clone: {})", s))
                .unwrap_or_default()
        )));
    }

    // An older checkout may predate the pinned commit.
    if existed && !has_commit(tool, dest_dir, revision) {
        output::detail(&format!("{}: {} not present locally, fetching", dependency, revision));
        let fetched = tool
            .command()
            .args(["fetch", "--quiet", "origin"])
            .current_dir(dest_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| FetchError::io(dest_dir, e))?;
        if !fetched.status.success() {
            output::detail(&format!("git fetch failed: {}", stderr_of(&fetched)));
        }
    }

    output::sub_action(&format!("checkout {}", revision));
    let checkout = tool
        .command()
        .args(["checkout", "--quiet", revision])
        .current_dir(dest_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| FetchError::io(dest_dir, e))?;

    if !checkout.status.success() {
        return Err(invalid(stderr_of(&checkout)));
    }

    match current_revision(tool, dest_dir) {
        Some(head) if head.starts_with(revision) => Ok(()),
        Some(head) => Err(invalid(format!("HEAD resolved to {}", head))),
        None => Err(invalid("cannot read HEAD after checkout".to_string())),
    }
}

/// Best-effort clone. Returns git's stderr when the clone did not succeed.
fn clone(
    tool: &ToolHandle,
    dependency: &str,
    repo_url: &str,
    dest_dir: &Path,
) -> Result<Option<String>, FetchError> {
    if let Some(parent) = dest_dir.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
    }

    output::sub_action(&format!("clone {}", repo_url));
    let _guard = ProgressGuard::new(output::spinner(&format!("cloning {}", dependency)));

    let result = tool
        .command()
        .arg("clone")
        .arg("--quiet")
        .arg(repo_url)
        .arg(dest_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    match result {
        Ok(out) if out.status.success() => Ok(None),
        Ok(out) => {
            let stderr = stderr_of(&out);
            output::detail(&format!("clone skipped: {}", first_line(&stderr)));
            Ok(Some(stderr))
        }
        Err(e) => {
            output::detail(&format!("clone could not run: {}", e));
            Ok(Some(e.to_string()))
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

fn has_commit(tool: &ToolHandle, dir: &Path, revision: &str) -> bool {
    tool.command()
        .args(["cat-file", "-e", &format!("{}^{{commit}}", revision)])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// The commit id `HEAD` points at, or None if `dir` is not a usable checkout.
pub fn current_revision(tool: &ToolHandle, dir: &Path) -> Option<String> {
    if !is_checkout(dir) {
        return None;
    }
    let out = tool
        .command()
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let head = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!head.is_empty()).then_some(head)
}
