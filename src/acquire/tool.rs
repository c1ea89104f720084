//! External executable discovery
//!
//! Resolves the version-control client (or a bootstrap interpreter) by probing
//! an ordered list of candidate names. The resulting [`ToolHandle`] is resolved
//! once per run and handed to every call site that needs the tool.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::output;
use crate::error::FetchError;

/// A resolved external executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolHandle {
    executable_name: String,
    resolved_path: PathBuf,
}

impl ToolHandle {
    /// Name of the candidate that was selected, e.g. "git.exe".
    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }

    /// Absolute path when it could be found on PATH, otherwise the bare name.
    pub fn resolved_path(&self) -> &Path {
        &self.resolved_path
    }

    /// Start a command for this tool.
    pub fn command(&self) -> Command {
        Command::new(&self.resolved_path)
    }
}

/// Pick the first candidate that can be spawned.
///
/// Each candidate is run with `--version`, all output discarded. The exit code
/// is not inspected: a tool that complains on stderr is still usable, only a
/// failure to start the process disqualifies it.
pub fn locate<S: AsRef<str>>(candidates: &[S]) -> Result<ToolHandle, FetchError> {
    for candidate in candidates {
        let name = candidate.as_ref();
        let probe = Command::new(name)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match probe {
            Ok(_) => {
                let resolved_path = which::which(name).unwrap_or_else(|_| PathBuf::from(name));
                return Ok(ToolHandle {
                    executable_name: name.to_string(),
                    resolved_path,
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                output::detail(&format!("{} unusable: {}", name, e));
                continue;
            }
        }
    }

    Err(FetchError::ToolNotFound {
        candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
    })
}
