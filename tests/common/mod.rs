//! Shared fixtures: scratch git repositories and in-memory archives.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn git_available() -> bool {
    which::which("git").is_ok()
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args([
            "-c",
            "user.name=deng-fetch",
            "-c",
            "user.email=deng-fetch@localhost",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// A local repository with one commit per `(file, content)` pair.
pub struct Origin {
    pub path: PathBuf,
    pub commits: Vec<String>,
}

impl Origin {
    pub fn create(parent: &Path, name: &str, files: &[(&str, &str)]) -> Self {
        let path = parent.join(name);
        std::fs::create_dir_all(&path).unwrap();
        git(&path, &["init", "--quiet"]);

        let mut commits = Vec::new();
        for (file, content) in files {
            let target = path.join(file);
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).unwrap();
            }
            std::fs::write(&target, content).unwrap();
            git(&path, &["add", "--all"]);
            git(&path, &["commit", "--quiet", "-m", file]);
            commits.push(git(&path, &["rev-parse", "HEAD"]));
        }
        Self { path, commits }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Gzipped tar holding the given files.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    let tar = builder.into_inner().unwrap();
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&tar).unwrap();
    enc.finish().unwrap()
}

pub fn head_of(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}
