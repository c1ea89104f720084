//! deng-fetch CLI - materialize the pinned vendor tree
//!
//! Usage:
//!   deng-fetch [fetch]                 Fetch every dependency into the vendor dir
//!   deng-fetch verify [--json]         Compare the vendor dir against the manifest
//!   deng-fetch list                    Show the manifest
//!   deng-fetch packages <name>...      Install binary packages through vcpkg

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deng_fetch::{
    DependencyKind, DependencyState, FetchContext, Manifest, PackageManager, PackageOutcome,
    driver, output,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "deng-fetch")]
#[command(about = "Fetch pinned third-party sources into a vendor directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Vendor directory (one subdirectory per dependency)
    #[arg(short = 'd', long, global = true, env = "DENG_VENDOR_DIR", default_value = "deps")]
    vendor_dir: PathBuf,

    /// TOML manifest replacing the built-in dependency table
    #[arg(short, long, global = true, env = "DENG_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Connect/read timeout for archive downloads, in seconds
    #[arg(long, global = true, env = "DENG_HTTP_TIMEOUT")]
    http_timeout: Option<u64>,

    /// Print more detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every dependency (default)
    Fetch {
        /// Do not run dependencies' own bootstrap scripts
        #[arg(long)]
        no_nested_bootstrap: bool,
    },

    /// Check the vendor directory against the manifest without changing it
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the manifest
    List,

    /// Install precompiled packages for this platform through vcpkg
    Packages {
        /// vcpkg checkout
        #[arg(long, env = "DENG_PACKAGE_MANAGER_ROOT", default_value = "vcpkg")]
        root: PathBuf,

        /// Package names, without triplet
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn load_manifest(path: Option<&PathBuf>) -> Result<Manifest> {
    match path {
        Some(path) => Manifest::load(path)
            .with_context(|| format!("Failed to load manifest: {}", path.display())),
        None => Manifest::builtin().context("Built-in manifest is invalid"),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let ctx = FetchContext::with_vendor_root(&cli.vendor_dir)
        .http_timeout(cli.http_timeout.map(Duration::from_secs))
        .verbose(cli.verbose);

    match cli.command.unwrap_or(Commands::Fetch {
        no_nested_bootstrap: false,
    }) {
        Commands::Fetch {
            no_nested_bootstrap,
        } => {
            let manifest = load_manifest(cli.manifest.as_ref())?;
            let ctx = ctx.run_nested_bootstrap(!no_nested_bootstrap);
            driver::run(&ctx, &manifest)?;
        }

        Commands::Verify { json } => {
            let manifest = load_manifest(cli.manifest.as_ref())?;
            let statuses = driver::verify(&ctx, &manifest)?;
            let all_ok = statuses.iter().all(|s| s.state.is_ok());

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&statuses).context("Failed to encode report")?
                );
            } else {
                output::action(&format!("Vendor directory {}", ctx.vendor_root.display()));
                for status in &statuses {
                    let detail = match &status.state {
                        DependencyState::Drifted { actual } => {
                            format!("drifted to {} (pinned {})", actual, status.pin)
                        }
                        state => format!("{} @ {}", state.label(), status.pin),
                    };
                    output::list_item(&status.name, &detail, status.state.is_ok());
                }
            }

            if !all_ok {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::List => {
            let manifest = load_manifest(cli.manifest.as_ref())?;
            for spec in &manifest {
                let kind = match spec.kind() {
                    DependencyKind::Archive => "archive",
                    DependencyKind::Repository => "repository",
                };
                output::info(&format!(
                    "{} ({}) {} @ {}",
                    spec.name(),
                    kind,
                    spec.url(),
                    spec.pin().as_str()
                ));
                if let Some(bootstrap) = spec.bootstrap() {
                    output::detail(&format!(
                        "bootstrap: {} via {}",
                        bootstrap.script.display(),
                        bootstrap.interpreter.join(" | ")
                    ));
                }
            }
        }

        Commands::Packages { root, names } => {
            match PackageManager::new(root).ensure_binary_packages(names.as_slice())? {
                PackageOutcome::Installed(_) => {}
                PackageOutcome::Unsupported { os, arch } => {
                    output::info(&format!(
                        "Binary packages are not available for {}/{}; nothing to do",
                        os, arch
                    ));
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
