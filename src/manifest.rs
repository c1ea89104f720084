//! Dependency manifest
//!
//! The manifest is an ordered list of dependencies, each pinned to an exact
//! release version (archives) or commit id (repositories). Specs are validated
//! when they are constructed, so a bad entry is rejected before any network or
//! process call is made.
//!
//! The built-in table is what `deng-fetch fetch` uses by default. A TOML file
//! with the same shape can replace it:
//!
//! ```toml
//! [[dependency]]
//! name = "imgui"
//! kind = "repository"
//! url = "https://github.com/ocornut/imgui"
//! pin = "eda7792b151d138e15df951578253b821ceed5a3"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::FetchError;

const IMGUI_COMMIT_HASH: &str = "eda7792b151d138e15df951578253b821ceed5a3";
const NEKOWIN_COMMIT_HASH: &str = "bb93c0ed5a9e007328ed18c59ec613deb04b5094";
const LIBDAS_COMMIT_HASH: &str = "d2d213f5744db13e1d052eff5d4f7464f0fac5f4";
const SHADERC_COMMIT_HASH: &str = "96b1dd72a827304817470274a470c4d3b2293451";

const IMGUI_GIT_URL: &str = "https://github.com/ocornut/imgui";
const NEKOWIN_GIT_URL: &str = "https://git.sadblog.xyz/nekowin";
const LIBDAS_GIT_URL: &str = "https://git.sadblog.xyz/libdas";
const SHADERC_GIT_URL: &str = "https://github.com/google/shaderc";

#[cfg(windows)]
const WIN32_TRUNK_VERSION: &str = "0.0.1";
#[cfg(windows)]
const WIN32_TRUNK_FETCH_URL: &str = "https://trunk.sadblog.xyz/win32/win32_0.0.1.tar.gz";

/// Interpreters probed for nested bootstrap scripts when none are given.
const DEFAULT_INTERPRETERS: &[&str] = &["python3", "python", "py"];

/// Pins that name a moving target rather than a fixed release.
const FLOATING_VERSIONS: &[&str] = &["latest", "*", "head", "master", "main", "trunk"];

/// Which fetcher acquires a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Archive,
    Repository,
}

/// Exact, non-floating identifier of a dependency's desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pin {
    /// Release version of an archive, e.g. "0.0.1"
    Version(String),
    /// Commit id inside a repository, lowercase hex
    Revision(String),
}

impl Pin {
    pub fn as_str(&self) -> &str {
        match self {
            Pin::Version(v) | Pin::Revision(v) => v,
        }
    }
}

/// A setup step shipped inside a fetched dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBootstrap {
    /// Script path, relative to the dependency's directory
    pub script: PathBuf,
    /// Interpreter candidates, probed in order
    #[serde(default = "default_interpreters")]
    pub interpreter: Vec<String>,
}

fn default_interpreters() -> Vec<String> {
    DEFAULT_INTERPRETERS.iter().map(|s| s.to_string()).collect()
}

impl NestedBootstrap {
    /// Bootstrap script run with the default interpreter candidates.
    pub fn script(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            interpreter: default_interpreters(),
        }
    }

    /// Replace the interpreter candidates.
    pub fn interpreter<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreter = candidates.into_iter().map(Into::into).collect();
        self
    }
}

/// One pinned external dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    name: String,
    url: String,
    pin: Pin,
    bootstrap: Option<NestedBootstrap>,
}

impl DependencySpec {
    /// A release archive fetched over HTTP and unpacked into `<vendor>/<name>`.
    pub fn archive(
        name: impl Into<String>,
        url: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let name = name.into();
        let url = url.into();
        let version = version.into();

        validate_name(&name)?;
        validate_url(&name, &url, DependencyKind::Archive)?;
        validate_version(&name, &version)?;

        Ok(Self {
            name,
            url,
            pin: Pin::Version(version),
            bootstrap: None,
        })
    }

    /// A repository cloned into `<vendor>/<name>` and checked out at `revision`.
    pub fn repository(
        name: impl Into<String>,
        url: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let name = name.into();
        let url = url.into();
        let revision = revision.into().to_ascii_lowercase();

        validate_name(&name)?;
        validate_url(&name, &url, DependencyKind::Repository)?;
        validate_revision(&name, &revision)?;

        Ok(Self {
            name,
            url,
            pin: Pin::Revision(revision),
            bootstrap: None,
        })
    }

    /// Attach a nested bootstrap step run after the whole manifest is fetched.
    pub fn with_bootstrap(mut self, bootstrap: NestedBootstrap) -> Result<Self, FetchError> {
        if !is_contained_relative(&bootstrap.script) {
            return Err(invalid(
                &self.name,
                format!(
                    "bootstrap script must be a relative path inside the dependency: {}",
                    bootstrap.script.display()
                ),
            ));
        }
        if bootstrap.interpreter.is_empty() {
            return Err(invalid(&self.name, "bootstrap interpreter list is empty"));
        }
        self.bootstrap = Some(bootstrap);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    pub fn kind(&self) -> DependencyKind {
        match self.pin {
            Pin::Version(_) => DependencyKind::Archive,
            Pin::Revision(_) => DependencyKind::Repository,
        }
    }

    pub fn bootstrap(&self) -> Option<&NestedBootstrap> {
        self.bootstrap.as_ref()
    }
}

/// Ordered, validated list of dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    deps: Vec<DependencySpec>,
}

impl Manifest {
    /// Build a manifest, rejecting duplicate names.
    pub fn new(deps: Vec<DependencySpec>) -> Result<Self, FetchError> {
        let mut seen = HashSet::new();
        for dep in &deps {
            if !seen.insert(dep.name()) {
                return Err(invalid(dep.name(), "declared more than once"));
            }
        }
        Ok(Self { deps })
    }

    /// The dependency table the engine build expects.
    pub fn builtin() -> Result<Self, FetchError> {
        #[allow(unused_mut)]
        let mut deps = vec![
            DependencySpec::repository("imgui", IMGUI_GIT_URL, IMGUI_COMMIT_HASH)?,
            DependencySpec::repository("nekowin", NEKOWIN_GIT_URL, NEKOWIN_COMMIT_HASH)?,
            DependencySpec::repository("libdas", LIBDAS_GIT_URL, LIBDAS_COMMIT_HASH)?,
            DependencySpec::repository("shaderc", SHADERC_GIT_URL, SHADERC_COMMIT_HASH)?
                .with_bootstrap(NestedBootstrap::script("utils/git-sync-deps"))?,
        ];

        #[cfg(windows)]
        deps.push(DependencySpec::archive(
            "win32",
            WIN32_TRUNK_FETCH_URL,
            WIN32_TRUNK_VERSION,
        )?);

        Self::new(deps)
    }

    /// Parse a TOML manifest.
    pub fn from_toml_str(content: &str) -> Result<Self, FetchError> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| FetchError::InvalidSpec {
            name: "<manifest>".to_string(),
            reason: e.to_string(),
        })?;

        let deps = raw
            .dependency
            .into_iter()
            .map(RawDependency::into_spec)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(deps)
    }

    /// Read and parse a TOML manifest file.
    pub fn load(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path).map_err(|e| FetchError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DependencySpec> {
        self.deps.iter()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DependencySpec> {
        self.deps.iter().find(|d| d.name() == name)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a DependencySpec;
    type IntoIter = std::slice::Iter<'a, DependencySpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    dependency: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
    name: String,
    kind: DependencyKind,
    url: String,
    pin: String,
    bootstrap: Option<NestedBootstrap>,
}

impl RawDependency {
    fn into_spec(self) -> Result<DependencySpec, FetchError> {
        let spec = match self.kind {
            DependencyKind::Archive => DependencySpec::archive(self.name, self.url, self.pin)?,
            DependencyKind::Repository => {
                DependencySpec::repository(self.name, self.url, self.pin)?
            }
        };
        match self.bootstrap {
            Some(bootstrap) => spec.with_bootstrap(bootstrap),
            None => Ok(spec),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn invalid(name: &str, reason: impl Into<String>) -> FetchError {
    FetchError::InvalidSpec {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Names become directory names under the vendor root.
fn validate_name(name: &str) -> Result<(), FetchError> {
    if name.is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    let mut components = Path::new(name).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if !single_normal || name.contains('/') || name.contains('\\') {
        return Err(invalid(name, "name must be a single directory name"));
    }
    Ok(())
}

fn validate_url(name: &str, url: &str, kind: DependencyKind) -> Result<(), FetchError> {
    let allowed: &[&str] = match kind {
        DependencyKind::Archive => &["https://", "http://"],
        DependencyKind::Repository => &["https://", "http://", "ssh://", "git@", "file://"],
    };

    let lower = url.to_lowercase();
    let rest = allowed
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .ok_or_else(|| {
            invalid(
                name,
                format!("URL must use one of {:?}, got: {}", allowed, url),
            )
        })?;

    if rest.trim_matches('/').is_empty() || url.chars().any(char::is_whitespace) {
        return Err(invalid(name, format!("malformed URL: {}", url)));
    }
    Ok(())
}

/// Shortest abbreviation git accepts for a commit id.
const MIN_REVISION_LEN: usize = 4;
/// Full sha256 object id.
const MAX_REVISION_LEN: usize = 64;

/// Commit ids only, from git's shortest abbreviation up to sha256 length.
fn validate_revision(name: &str, revision: &str) -> Result<(), FetchError> {
    let len_ok = (MIN_REVISION_LEN..=MAX_REVISION_LEN).contains(&revision.len());
    if !len_ok || !revision.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(
            name,
            format!(
                "pin '{}' is not a commit id (expected {}-{} hex characters)",
                revision, MIN_REVISION_LEN, MAX_REVISION_LEN
            ),
        ));
    }
    Ok(())
}

fn validate_version(name: &str, version: &str) -> Result<(), FetchError> {
    if version.is_empty() {
        return Err(invalid(name, "version pin is empty"));
    }
    if version.chars().any(char::is_whitespace) {
        return Err(invalid(name, format!("version '{}' contains whitespace", version)));
    }
    if FLOATING_VERSIONS.contains(&version.to_ascii_lowercase().as_str()) {
        return Err(invalid(
            name,
            format!("version '{}' is floating, pin an exact release", version),
        ));
    }
    Ok(())
}

fn is_contained_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
