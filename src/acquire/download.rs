//! Streaming HTTP download into a scoped temporary file
//!
//! The payload is copied in fixed-size chunks, so archives of any size are
//! never held in memory. The returned [`NamedTempFile`] deletes itself when
//! dropped, on success and on every error path.

use std::io::{Read, Write};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::core::output::{self, ProgressGuard};
use crate::error::FetchError;

/// Chunk size for streaming downloads
const CHUNK_SIZE: usize = 8192;

fn agent(timeout: Option<Duration>) -> ureq::Agent {
    let builder = ureq::AgentBuilder::new().redirects(5);
    match timeout {
        Some(t) => builder.timeout_connect(t).timeout_read(t).build(),
        None => builder.build(),
    }
}

fn network(url: &str, reason: impl Into<String>) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Download `url` into a new temporary file.
///
/// Returns the temporary file together with the number of bytes written.
pub fn download_to_temp(
    url: &str,
    timeout: Option<Duration>,
) -> Result<(NamedTempFile, u64), FetchError> {
    let mut file = tempfile::Builder::new()
        .prefix("deng-fetch-")
        .suffix(".download")
        .tempfile()
        .map_err(|e| FetchError::io(std::env::temp_dir(), e))?;

    let guard = ProgressGuard::new(output::spinner(&format!(
        "downloading {}",
        display_name(url)
    )));

    let response = agent(timeout).get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => network(url, format!("HTTP status {}", code)),
        ureq::Error::Transport(t) => network(url, t.to_string()),
    })?;

    if let Some(len) = response
        .header("content-length")
        .and_then(|s| s.parse().ok())
    {
        output::upgrade_to_bytes(guard.bar(), len);
    }

    let mut reader = response.into_reader();
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| network(url, format!("read error: {}", e)))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| FetchError::io(file.path(), e))?;

        total_bytes += bytes_read as u64;
        guard.bar().set_position(total_bytes);
    }

    file.flush().map_err(|e| FetchError::io(file.path(), e))?;
    Ok((file, total_bytes))
}

/// Last path segment of a URL, for progress messages.
fn display_name(url: &str) -> &str {
    let clean = url.split(['?', '#']).next().unwrap_or(url);
    clean
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("https://x/foo-1.0.tar.gz"), "foo-1.0.tar.gz");
        assert_eq!(display_name("https://x/foo.tar.gz?token=1"), "foo.tar.gz");
        assert_eq!(display_name("https://x/dir/"), "dir");
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        // Port 9 on localhost is the discard port; nothing listens there in CI.
        let result = download_to_temp(
            "http://127.0.0.1:9/foo.tar.gz",
            Some(Duration::from_secs(5)),
        );
        assert!(matches!(result, Err(FetchError::Network { .. })));
    }

    mod mock_tests {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_download_streams_body() {
            let mock_server = MockServer::start().await;
            let body = vec![7u8; CHUNK_SIZE * 3 + 17];

            Mock::given(method("GET"))
                .and(path("/big.bin"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
                .mount(&mock_server)
                .await;

            let url = format!("{}/big.bin", mock_server.uri());
            let (file, total) = download_to_temp(&url, None).unwrap();

            assert_eq!(total, body.len() as u64);
            assert_eq!(std::fs::read(file.path()).unwrap(), body);
        }

        #[tokio::test]
        async fn test_download_follows_redirect() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/old.tar.gz"))
                .respond_with(
                    ResponseTemplate::new(302)
                        .insert_header("Location", format!("{}/new.tar.gz", mock_server.uri())),
                )
                .mount(&mock_server)
                .await;
            Mock::given(method("GET"))
                .and(path("/new.tar.gz"))
                .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
                .mount(&mock_server)
                .await;

            let url = format!("{}/old.tar.gz", mock_server.uri());
            let (file, _) = download_to_temp(&url, None).unwrap();
            assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "payload");
        }

        #[tokio::test]
        async fn test_download_404_is_network_error() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/missing.tar.gz"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&mock_server)
                .await;

            let url = format!("{}/missing.tar.gz", mock_server.uri());
            let err = download_to_temp(&url, None).unwrap_err();
            match err {
                FetchError::Network { reason, .. } => assert!(reason.contains("404")),
                other => panic!("expected Network, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_temp_file_removed_on_drop() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/a.bin"))
                .respond_with(ResponseTemplate::new(200).set_body_string("x"))
                .mount(&mock_server)
                .await;

            let url = format!("{}/a.bin", mock_server.uri());
            let (file, _) = download_to_temp(&url, None).unwrap();
            let temp_path = file.path().to_path_buf();
            assert!(temp_path.exists());
            drop(file);
            assert!(!temp_path.exists());
        }
    }
}
