//! Acquisition driver
//!
//! Walks the manifest in declaration order and hands each dependency to the
//! matching fetcher. Failure policy:
//!
//! - a missing version-control client or a revision that does not resolve
//!   aborts the run immediately
//! - download and archive errors are reported and the run moves on to the
//!   next dependency
//! - nested bootstrap failures are logged as warnings
//!
//! Nothing is rolled back. Whatever reached the vendor directory stays there,
//! and re-running is how a partial run is completed.

use serde::Serialize;
use std::path::Path;
use std::process::Stdio;

use crate::acquire::{self, ToolHandle};
use crate::core::context::FetchContext;
use crate::core::output;
use crate::error::FetchError;
use crate::manifest::{DependencyKind, DependencySpec, Manifest, NestedBootstrap};

/// Outcome of a run that did not hit a fatal error.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Dependencies that reached their pinned state, in order
    pub acquired: Vec<String>,
    /// Isolated per-dependency failures
    pub failed: Vec<(String, FetchError)>,
    /// Nested bootstrap steps that failed
    pub bootstrap_failures: Vec<(String, FetchError)>,
}

impl RunReport {
    /// True when every dependency and every nested bootstrap succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.bootstrap_failures.is_empty()
    }
}

/// Version-control client, resolved on first use and reused for the run.
struct ToolCache<'a> {
    candidates: &'a [String],
    handle: Option<ToolHandle>,
}

impl<'a> ToolCache<'a> {
    fn new(candidates: &'a [String]) -> Self {
        Self {
            candidates,
            handle: None,
        }
    }

    fn get(&mut self) -> Result<&ToolHandle, FetchError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                let handle = acquire::locate(self.candidates)?;
                output::detail(&format!(
                    "using {} ({})",
                    handle.executable_name(),
                    handle.resolved_path().display()
                ));
                handle
            }
        };
        Ok(self.handle.insert(handle))
    }
}

/// Fetch every dependency of `manifest` into the vendor directory.
pub fn run(ctx: &FetchContext, manifest: &Manifest) -> Result<RunReport, FetchError> {
    let root = &ctx.vendor_root;
    std::fs::create_dir_all(root).map_err(|e| FetchError::io(root, e))?;

    output::action(&format!(
        "Fetching {} dependencies into {}",
        manifest.len(),
        root.display()
    ));

    let mut git = ToolCache::new(&ctx.git_candidates);
    let mut report = RunReport::default();
    let total = manifest.len();

    for (i, spec) in manifest.iter().enumerate() {
        output::action_numbered(
            i + 1,
            total,
            &format!("{} @ {}", spec.name(), spec.pin().as_str()),
        );

        let dest = ctx.dest_for(spec.name());
        if ctx.verbose {
            output::detail(&format!("{} -> {}", spec.url(), dest.display()));
        }
        let result = match spec.kind() {
            DependencyKind::Archive => acquire::fetch_archive(spec.url(), &dest, ctx.http_timeout),
            DependencyKind::Repository => {
                let tool = git.get()?;
                acquire::fetch_at_revision(
                    tool,
                    spec.name(),
                    spec.url(),
                    spec.pin().as_str(),
                    &dest,
                )
            }
        };

        match result {
            Ok(()) => report.acquired.push(spec.name().to_string()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                output::error(&format!("{}: {}", spec.name(), e));
                report.failed.push((spec.name().to_string(), e));
            }
        }
    }

    if ctx.run_nested_bootstrap {
        for spec in manifest.iter() {
            let Some(bootstrap) = spec.bootstrap() else {
                continue;
            };
            if !report.acquired.iter().any(|n| n == spec.name()) {
                output::skip(&format!("{} not acquired, skipping its bootstrap", spec.name()));
                continue;
            }
            if let Err(e) = run_nested_bootstrap(spec.name(), bootstrap, &ctx.dest_for(spec.name()))
            {
                output::warning(&e.to_string());
                report.bootstrap_failures.push((spec.name().to_string(), e));
            }
        }
    }

    if report.is_complete() {
        output::success(&format!("{} dependencies ready", report.acquired.len()));
    } else {
        output::warning(&format!(
            "{} of {} dependencies acquired",
            report.acquired.len(),
            total
        ));
    }

    Ok(report)
}

/// Run a dependency's own setup script inside its directory.
pub fn run_nested_bootstrap(
    dependency: &str,
    bootstrap: &NestedBootstrap,
    dir: &Path,
) -> Result<(), FetchError> {
    let fail = |reason: String| FetchError::NestedBootstrap {
        dependency: dependency.to_string(),
        reason,
    };

    let script = dir.join(&bootstrap.script);
    if !script.is_file() {
        return Err(fail(format!("script not found: {}", script.display())));
    }

    let interpreter = acquire::locate(bootstrap.interpreter.as_slice()).map_err(|e| fail(e.to_string()))?;

    output::sub_action(&format!(
        "bootstrap {} {}",
        interpreter.executable_name(),
        bootstrap.script.display()
    ));

    let status = interpreter
        .command()
        .arg(&bootstrap.script)
        .current_dir(dir)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| fail(format!("failed to start: {}", e)))?;

    if !status.success() {
        return Err(fail(format!("exit code: {:?}", status.code())));
    }
    Ok(())
}

/// On-disk state of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DependencyState {
    /// No directory under the vendor root
    Missing,
    /// Archive directory exists and is non-empty
    Present,
    /// Directory exists but is not a checkout (or is an empty archive dir)
    Incomplete,
    /// Checkout is at the pinned revision
    AtPin,
    /// Checkout is at some other revision
    Drifted { actual: String },
}

impl DependencyState {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Present | Self::AtPin)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Present => "present",
            Self::Incomplete => "incomplete",
            Self::AtPin => "at pin",
            Self::Drifted { .. } => "drifted",
        }
    }
}

/// Status row for `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub kind: DependencyKind,
    pub pin: String,
    #[serde(flatten)]
    pub state: DependencyState,
}

/// Compare the vendor directory against the manifest without changing it.
pub fn verify(ctx: &FetchContext, manifest: &Manifest) -> Result<Vec<DependencyStatus>, FetchError> {
    let mut git = ToolCache::new(&ctx.git_candidates);
    let mut statuses = Vec::with_capacity(manifest.len());

    for spec in manifest.iter() {
        let state = state_of(ctx, spec, &mut git)?;
        statuses.push(DependencyStatus {
            name: spec.name().to_string(),
            kind: spec.kind(),
            pin: spec.pin().as_str().to_string(),
            state,
        });
    }

    Ok(statuses)
}

fn state_of(
    ctx: &FetchContext,
    spec: &DependencySpec,
    git: &mut ToolCache<'_>,
) -> Result<DependencyState, FetchError> {
    let dest = ctx.dest_for(spec.name());
    if !dest.is_dir() {
        return Ok(DependencyState::Missing);
    }

    match spec.kind() {
        DependencyKind::Archive => {
            let populated = std::fs::read_dir(&dest)
                .map_err(|e| FetchError::io(&dest, e))?
                .next()
                .is_some();
            Ok(if populated {
                DependencyState::Present
            } else {
                DependencyState::Incomplete
            })
        }
        DependencyKind::Repository => {
            let tool = git.get()?;
            Ok(match acquire::current_revision(tool, &dest) {
                None => DependencyState::Incomplete,
                Some(head) if head.starts_with(spec.pin().as_str()) => DependencyState::AtPin,
                Some(head) => DependencyState::Drifted { actual: head },
            })
        }
    }
}
