//! Binary package installation through vcpkg
//!
//! Precompiled native packages are installed outside the vendor tree by a
//! vcpkg checkout. If the vcpkg executable has not been built yet, its own
//! bootstrap script is run first. All packages are then installed with a
//! single `install` call, each qualified with the host triplet
//! (`sdl2:x64-linux`), so vcpkg resolves shared dependencies once.
//!
//! An unsupported host is not an error: callers get
//! [`PackageOutcome::Unsupported`] and nothing is touched.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::output;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Windows,
    MacOs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    X86,
    Arm64,
}

/// Host platform, as vcpkg names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    /// Map Rust's `std::env::consts` names onto a supported platform.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, FetchError> {
        let unsupported = || FetchError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        let os_id = match os {
            "linux" => Os::Linux,
            "windows" => Os::Windows,
            "macos" => Os::MacOs,
            _ => return Err(unsupported()),
        };
        let arch_id = match arch {
            "x86_64" => Arch::X64,
            "x86" => Arch::X86,
            "aarch64" => Arch::Arm64,
            _ => return Err(unsupported()),
        };

        Ok(Self {
            os: os_id,
            arch: arch_id,
        })
    }

    /// vcpkg triplet, e.g. "x64-linux", "x64-windows", "arm64-osx".
    pub fn triplet(&self) -> String {
        let arch = match self.arch {
            Arch::X64 => "x64",
            Arch::X86 => "x86",
            Arch::Arm64 => "arm64",
        };
        let os = match self.os {
            Os::Linux => "linux",
            Os::Windows => "windows",
            Os::MacOs => "osx",
        };
        format!("{}-{}", arch, os)
    }
}

/// Result of [`PackageManager::ensure_binary_packages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Packages passed to vcpkg, qualified with the triplet
    Installed(Vec<String>),
    /// Host platform has no vcpkg triplet; nothing was done
    Unsupported { os: String, arch: String },
}

/// A vcpkg checkout rooted at `root`.
#[derive(Debug, Clone)]
pub struct PackageManager {
    root: PathBuf,
}

impl PackageManager {
    /// Commands run with the checkout as working directory, so a relative
    /// root is made absolute against the current directory up front.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the vcpkg executable for `platform`.
    pub fn executable(&self, platform: Platform) -> PathBuf {
        match platform.os {
            Os::Windows => self.root.join("vcpkg.exe"),
            _ => self.root.join("vcpkg"),
        }
    }

    fn bootstrap_script(&self, platform: Platform) -> PathBuf {
        match platform.os {
            Os::Windows => self.root.join("bootstrap-vcpkg.bat"),
            _ => self.root.join("bootstrap-vcpkg.sh"),
        }
    }

    fn bootstrap_command(&self, platform: Platform, script: &Path) -> Command {
        let mut cmd = match platform.os {
            Os::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(script);
                cmd
            }
            _ => {
                let mut cmd = Command::new("sh");
                cmd.arg(script);
                cmd
            }
        };
        cmd.arg("-disableMetrics").current_dir(&self.root);
        cmd
    }

    /// Install `names` for the host platform.
    pub fn ensure_binary_packages<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<PackageOutcome, FetchError> {
        self.ensure_binary_packages_on(std::env::consts::OS, std::env::consts::ARCH, names)
    }

    /// Install `names` for the host named by `os`/`arch` (`std::env::consts`
    /// spelling). A host without a triplet is reported, not an error.
    pub fn ensure_binary_packages_on<S: AsRef<str>>(
        &self,
        os: &str,
        arch: &str,
        names: &[S],
    ) -> Result<PackageOutcome, FetchError> {
        match Platform::from_parts(os, arch) {
            Ok(platform) => self.ensure_binary_packages_for(platform, names),
            Err(FetchError::UnsupportedPlatform { os, arch }) => {
                Ok(PackageOutcome::Unsupported { os, arch })
            }
            Err(e) => Err(e),
        }
    }

    /// Install `names` for a supported platform.
    pub fn ensure_binary_packages_for<S: AsRef<str>>(
        &self,
        platform: Platform,
        names: &[S],
    ) -> Result<PackageOutcome, FetchError> {
        let qualified = qualify(names, platform)?;
        if qualified.is_empty() {
            output::skip("no binary packages requested");
            return Ok(PackageOutcome::Installed(qualified));
        }

        let exe = self.executable(platform);
        if !exe.is_file() {
            self.bootstrap(platform)?;
            if !exe.is_file() {
                return Err(FetchError::PackageManager(format!(
                    "bootstrap finished but {} does not exist",
                    exe.display()
                )));
            }
        }

        output::action(&format!(
            "Installing {} package(s) for {}",
            qualified.len(),
            platform.triplet()
        ));
        output::detail(&format!("{} install {}", exe.display(), qualified.join(" ")));

        let status = Command::new(&exe)
            .arg("install")
            .args(&qualified)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| FetchError::io(&exe, e))?;

        if !status.success() {
            return Err(FetchError::PackageManager(format!(
                "install failed with exit code: {:?}",
                status.code()
            )));
        }

        output::success(&format!("{} package(s) installed", qualified.len()));
        Ok(PackageOutcome::Installed(qualified))
    }

    fn bootstrap(&self, platform: Platform) -> Result<(), FetchError> {
        let script = self.bootstrap_script(platform);
        if !script.is_file() {
            return Err(FetchError::PackageManager(format!(
                "{} not found; is {} a vcpkg checkout?",
                script.display(),
                self.root.display()
            )));
        }

        output::sub_action(&format!("bootstrapping vcpkg in {}", self.root.display()));
        let status = self
            .bootstrap_command(platform, &script)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| FetchError::io(&script, e))?;

        if !status.success() {
            return Err(FetchError::PackageManager(format!(
                "{} failed with exit code: {:?}",
                script.display(),
                status.code()
            )));
        }
        Ok(())
    }
}

/// Suffix every package name with the platform triplet.
pub fn qualify<S: AsRef<str>>(names: &[S], platform: Platform) -> Result<Vec<String>, FetchError> {
    let triplet = platform.triplet();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            if name.is_empty() || name.contains(':') || name.chars().any(char::is_whitespace) {
                return Err(FetchError::PackageManager(format!(
                    "invalid package name: {:?}",
                    name
                )));
            }
            Ok(format!("{}:{}", name, triplet))
        })
        .collect()
}
