//! Release archive acquisition: download, then unpack into the destination.

use std::path::Path;
use std::time::Duration;

use super::download::download_to_temp;
use super::extract::extract_archive;
use crate::core::output;
use crate::error::FetchError;

/// Download the compressed tar at `url` and unpack it into `dest_dir`.
///
/// Entries keep their archive-internal paths below `dest_dir`. The temporary
/// download is removed when this returns, whether extraction succeeded or not.
/// An existing `dest_dir` is extracted over; skipping is the caller's call.
pub fn fetch_archive(
    url: &str,
    dest_dir: &Path,
    timeout: Option<Duration>,
) -> Result<(), FetchError> {
    output::detail(&format!("GET {}", url));
    let (archive, total_bytes) = download_to_temp(url, timeout)?;
    output::detail(&format!("downloaded {} bytes", total_bytes));

    let entries =
        extract_archive(archive.path(), dest_dir).map_err(|reason| FetchError::CorruptArchive {
            url: url.to_string(),
            reason,
        })?;

    output::detail(&format!(
        "extracted {} entries to {}",
        entries,
        dest_dir.display()
    ));
    Ok(())
}
