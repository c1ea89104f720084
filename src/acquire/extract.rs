//! Compressed tar extraction
//!
//! The compression is sniffed from the leading bytes rather than taken from a
//! file name, since downloads land in anonymous temporary files. Every entry is
//! unpacked below the destination; entries that would escape it reject the
//! whole archive.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::core::output::{self, ProgressGuard};

/// Tar header magic, at offset 257 of the first block
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Compression wrapping a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Xz,
    Bzip2,
    Zstd,
    None,
}

/// Detect the compression of a tar stream from its first bytes.
pub fn sniff(header: &[u8]) -> Option<Compression> {
    if header.starts_with(&[0x1f, 0x8b]) {
        Some(Compression::Gzip)
    } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Some(Compression::Xz)
    } else if header.starts_with(b"BZh") {
        Some(Compression::Bzip2)
    } else if header.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        Some(Compression::Zstd)
    } else if header.len() >= USTAR_OFFSET + USTAR_MAGIC.len()
        && &header[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == USTAR_MAGIC
    {
        Some(Compression::None)
    } else {
        None
    }
}

/// Extract the archive at `archive_path` into `dest`.
///
/// The error string describes why the bytes are not a usable archive; the
/// caller attaches the source URL.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize, String> {
    let mut file = File::open(archive_path)
        .map_err(|e| format!("cannot open {}: {}", archive_path.display(), e))?;

    let mut header = Vec::with_capacity(512);
    (&mut file)
        .take(512)
        .read_to_end(&mut header)
        .map_err(|e| format!("cannot read {}: {}", archive_path.display(), e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| format!("cannot rewind {}: {}", archive_path.display(), e))?;

    if header.is_empty() {
        return Err("archive is empty".to_string());
    }
    let compression = sniff(&header)
        .ok_or_else(|| "unrecognized format (expected gzip, xz, bzip2, zstd or tar)".to_string())?;

    std::fs::create_dir_all(dest)
        .map_err(|e| format!("cannot create directory {}: {}", dest.display(), e))?;

    let _guard = ProgressGuard::new(output::spinner(&format!(
        "extracting into {}",
        dest.display()
    )));

    let reader = BufReader::new(file);
    match compression {
        Compression::Gzip => extract_tar(flate2::read::GzDecoder::new(reader), dest),
        Compression::Xz => extract_tar(xz2::read::XzDecoder::new(reader), dest),
        Compression::Bzip2 => extract_tar(bzip2::read::BzDecoder::new(reader), dest),
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| format!("zstd init error: {}", e))?;
            extract_tar(decoder, dest)
        }
        Compression::None => extract_tar(reader, dest),
    }
}

/// What a link entry's target is written relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkBase {
    /// Symlinks: the directory holding the link
    EntryDir,
    /// Hard links: the top of the archive
    ArchiveRoot,
}

/// Unpack every entry of a tar stream below `dest`, returning the entry count.
fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<usize, String> {
    let mut archive = tar::Archive::new(reader);
    let mut count = 0;

    for entry in archive
        .entries()
        .map_err(|e| format!("tar read error: {}", e))?
    {
        let mut entry = entry.map_err(|e| format!("tar entry error: {}", e))?;

        let path = entry
            .path()
            .map_err(|e| format!("tar path error: {}", e))?
            .into_owned();

        // Some archives contain a "." entry
        let Some(rel) = entry_relative(&path)? else {
            continue;
        };
        if let Some(parent) = rel.parent() {
            reject_symlinked_prefixes(dest, parent)?;
        }

        let full_path = dest.join(&rel);
        let parent = full_path.parent().unwrap_or(dest);

        // A link left by an earlier extraction of the same archive is replaced,
        // never written through.
        if std::fs::symlink_metadata(&full_path).is_ok_and(|md| md.file_type().is_symlink()) {
            std::fs::remove_file(&full_path)
                .map_err(|e| format!("cannot replace link {}: {}", full_path.display(), e))?;
        }

        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create directory {}: {}", parent.display(), e))?;

        match entry.header().entry_type() {
            tar::EntryType::Link => {
                let target = link_target(&entry, &path)?;
                let source = resolve_link(&rel, &target, LinkBase::ArchiveRoot)?;
                hard_link_entry(dest, &rel, &source)?;
            }
            kind => {
                if kind == tar::EntryType::Symlink {
                    let target = link_target(&entry, &path)?;
                    resolve_link(&rel, &target, LinkBase::EntryDir)?;
                }
                entry
                    .unpack(&full_path)
                    .map_err(|e| format!("unpack error for {}: {}", path.display(), e))?;
            }
        }
        count += 1;
    }

    if count == 0 {
        return Err("archive contains no entries".to_string());
    }
    Ok(count)
}

/// Entry path as plain relative components; None for the archive root itself.
fn entry_relative(path: &Path) -> Result<Option<PathBuf>, String> {
    let mut rel = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(seg) => rel.push(seg),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("tar contains unsafe path: {}", path.display()));
            }
        }
    }
    Ok((!rel.as_os_str().is_empty()).then_some(rel))
}

fn link_target<R: Read>(entry: &tar::Entry<'_, R>, path: &Path) -> Result<PathBuf, String> {
    entry
        .link_name()
        .map_err(|e| format!("tar link_name error: {}", e))?
        .map(|target| target.into_owned())
        .ok_or_else(|| format!("tar link without target: {}", path.display()))
}

/// Resolve a link target against its base, relative to the extraction root.
///
/// Fails as soon as the target climbs above the root, even if a later
/// component would come back down.
fn resolve_link(rel: &Path, target: &Path, base: LinkBase) -> Result<PathBuf, String> {
    let mut resolved: Vec<&OsStr> = match base {
        LinkBase::EntryDir => rel.parent().map(|p| p.iter().collect()).unwrap_or_default(),
        LinkBase::ArchiveRoot => Vec::new(),
    };

    for component in target.components() {
        match component {
            Component::Normal(seg) => resolved.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved.pop().is_none() {
                    return Err(format!(
                        "tar link escapes destination: {} -> {}",
                        rel.display(),
                        target.display()
                    ));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "tar link has absolute target: {} -> {}",
                    rel.display(),
                    target.display()
                ));
            }
        }
    }

    Ok(resolved.into_iter().collect())
}

/// Refuse to go through any symlink along `rel` below `dest`.
fn reject_symlinked_prefixes(dest: &Path, rel: &Path) -> Result<(), String> {
    let mut cur = dest.to_path_buf();
    for seg in rel.iter() {
        cur.push(seg);
        if std::fs::symlink_metadata(&cur).is_ok_and(|md| md.file_type().is_symlink()) {
            return Err(format!(
                "tar extraction blocked: {} is a symlink",
                cur.display()
            ));
        }
    }
    Ok(())
}

/// Create `dest/rel` as a hard link to an already extracted `dest/source`.
fn hard_link_entry(dest: &Path, rel: &Path, source: &Path) -> Result<(), String> {
    if source.as_os_str().is_empty() || source == rel {
        return Err(format!(
            "tar hard link has no usable target: {}",
            rel.display()
        ));
    }
    reject_symlinked_prefixes(dest, source)?;

    let source_path = dest.join(source);
    if !source_path.is_file() {
        return Err(format!(
            "tar hard link target missing: {} -> {}",
            rel.display(),
            source.display()
        ));
    }

    let link_path = dest.join(rel);
    if std::fs::symlink_metadata(&link_path).is_ok() {
        std::fs::remove_file(&link_path)
            .map_err(|e| format!("cannot replace {}: {}", link_path.display(), e))?;
    }
    std::fs::hard_link(&source_path, &link_path).map_err(|e| {
        format!(
            "cannot hard link {} to {}: {}",
            link_path.display(),
            source_path.display(),
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut enc = GzEncoder::new(Vec::new(), GzLevel::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(sniff(&[0x1f, 0x8b, 0x08]), Some(Compression::Gzip));
        assert_eq!(
            sniff(&[0xfd, b'7', b'z', b'X', b'Z', 0x00, 0x00]),
            Some(Compression::Xz)
        );
        assert_eq!(sniff(b"BZh91AY"), Some(Compression::Bzip2));
        assert_eq!(sniff(&[0x28, 0xb5, 0x2f, 0xfd, 0x00]), Some(Compression::Zstd));
        assert_eq!(sniff(b"<html>not found</html>"), None);

        let plain = tar_bytes(&[("a.txt", b"a")]);
        assert_eq!(sniff(&plain[..512]), Some(Compression::None));
    }

    #[test]
    fn test_extract_tar_gz_preserves_paths() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("foo.tar.gz");
        let data = gzip(&tar_bytes(&[
            ("foo-1.0/README", b"hello"),
            ("foo-1.0/src/lib.c", b"int x;"),
        ]));
        std::fs::write(&archive, data).unwrap();

        let dest = dir.path().join("vendor/foo");
        let count = extract_archive(&archive, &dest).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read_to_string(dest.join("foo-1.0/README")).unwrap(),
            "hello"
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("foo-1.0/src/lib.c")).unwrap(),
            "int x;"
        );
    }

    #[test]
    fn test_extract_xz_and_zstd() {
        use std::io::Write;
        let dir = TempDir::new().unwrap();
        let tar = tar_bytes(&[("inner/file", b"data")]);

        let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
        xz.write_all(&tar).unwrap();
        let xz_path = dir.path().join("a.tar.xz");
        std::fs::write(&xz_path, xz.finish().unwrap()).unwrap();
        extract_archive(&xz_path, &dir.path().join("xz")).unwrap();
        assert!(dir.path().join("xz/inner/file").exists());

        let zst = zstd::stream::encode_all(&tar[..], 3).unwrap();
        let zst_path = dir.path().join("a.tar.zst");
        std::fs::write(&zst_path, zst).unwrap();
        extract_archive(&zst_path, &dir.path().join("zst")).unwrap();
        assert!(dir.path().join("zst/inner/file").exists());
    }

    #[test]
    fn test_reextract_over_existing_tree() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("foo.tar.gz");
        std::fs::write(&archive, gzip(&tar_bytes(&[("foo/a.txt", b"v1")]))).unwrap();

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();
        std::fs::write(&archive, gzip(&tar_bytes(&[("foo/a.txt", b"v2")]))).unwrap();
        extract_archive(&archive, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("foo/a.txt")).unwrap(), "v2");
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad");
        std::fs::write(&archive, b"<html>503 Service Unavailable</html>").unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.contains("unrecognized format"));
    }

    #[test]
    fn test_extract_rejects_truncated_gzip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("trunc.tar.gz");
        // Incompressible payload so the cut lands inside the entry data
        let mut seed = 0x2545_f491_u32;
        let payload: Vec<u8> = (0..16384)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                seed as u8
            })
            .collect();
        let data = gzip(&tar_bytes(&[("a.bin", &payload)]));
        std::fs::write(&archive, &data[..data.len() / 2]).unwrap();

        assert!(extract_archive(&archive, &dir.path().join("out")).is_err());
    }

    #[test]
    fn test_extract_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty");
        std::fs::write(&archive, b"").unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_extract_rejects_escaping_symlink() {
        let dir = TempDir::new().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "evil", "../../outside")
            .unwrap();
        let archive = dir.path().join("evil.tar.gz");
        std::fs::write(&archive, gzip(&builder.into_inner().unwrap())).unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.contains("escapes destination"));
    }

    #[test]
    fn test_extract_rejects_entryless_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("none.tar.gz");
        std::fs::write(&archive, gzip(&tar_bytes(&[]))).unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.contains("no entries"));
    }

    fn link_tar(links: &[(tar::EntryType, &str, &str)], files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        for (kind, name, target) in links {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(*kind);
            header.set_size(0);
            header.set_mode(0o644);
            builder.append_link(&mut header, name, target).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_extract_hard_link_from_archive_root() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        let data = gzip(&link_tar(
            &[(tar::EntryType::Link, "pkg/b.txt", "pkg/a.txt")],
            &[("pkg/a.txt", b"shared")],
        ));
        std::fs::write(&archive, data).unwrap();

        let dest = dir.path().join("out");
        assert_eq!(extract_archive(&archive, &dest).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(dest.join("pkg/b.txt")).unwrap(), "shared");

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let a = std::fs::metadata(dest.join("pkg/a.txt")).unwrap();
            let b = std::fs::metadata(dest.join("pkg/b.txt")).unwrap();
            assert_eq!(a.ino(), b.ino());
        }

        // Re-extracting replaces the existing link
        assert_eq!(extract_archive(&archive, &dest).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(dest.join("pkg/b.txt")).unwrap(), "shared");
    }

    #[test]
    fn test_hard_link_never_resolves_outside_dest() {
        // Cargo.toml exists in the working directory of the test process
        assert!(Path::new("Cargo.toml").exists());

        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("sneaky.tar.gz");
        let data = gzip(&link_tar(&[(tar::EntryType::Link, "copy", "Cargo.toml")], &[]));
        std::fs::write(&archive, data).unwrap();

        let dest = dir.path().join("out");
        let err = extract_archive(&archive, &dest).unwrap_err();
        assert!(err.contains("target missing"), "{}", err);
        assert!(!dest.join("copy").exists());
    }

    #[test]
    fn test_hard_link_escaping_root_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        let data = gzip(&link_tar(
            &[(tar::EntryType::Link, "pkg/b", "../outside")],
            &[("pkg/a", b"a")],
        ));
        std::fs::write(&archive, data).unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.contains("escapes destination"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_symlink_inside_tree() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("links.tar.gz");
        let data = gzip(&link_tar(
            &[(tar::EntryType::Symlink, "pkg/lib/current", "../a.txt")],
            &[("pkg/a.txt", b"a")],
        ));
        std::fs::write(&archive, data).unwrap();

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();
        assert_eq!(
            std::fs::read_link(dest.join("pkg/lib/current")).unwrap(),
            PathBuf::from("../a.txt")
        );
        assert_eq!(std::fs::read_to_string(dest.join("pkg/lib/current")).unwrap(), "a");
    }

    #[test]
    fn test_resolve_link_bases() {
        let rel = Path::new("pkg/lib/current");
        assert_eq!(
            resolve_link(rel, Path::new("../a.txt"), LinkBase::EntryDir).unwrap(),
            PathBuf::from("pkg/a.txt")
        );
        assert_eq!(
            resolve_link(rel, Path::new("pkg/./a.txt"), LinkBase::ArchiveRoot).unwrap(),
            PathBuf::from("pkg/a.txt")
        );
        assert!(resolve_link(rel, Path::new("../a.txt"), LinkBase::ArchiveRoot).is_err());
        assert!(resolve_link(rel, Path::new("/etc/passwd"), LinkBase::EntryDir).is_err());
        assert!(resolve_link(Path::new("x"), Path::new("../y/../x"), LinkBase::EntryDir).is_err());
    }

    #[test]
    fn test_entry_relative() {
        assert_eq!(
            entry_relative(Path::new("./a/./b")).unwrap(),
            Some(PathBuf::from("a/b"))
        );
        assert_eq!(entry_relative(Path::new(".")).unwrap(), None);
        assert!(entry_relative(Path::new("a/../../b")).is_err());
    }
}
