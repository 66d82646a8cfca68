use std::fs::{File, create_dir_all, remove_file};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::danbooru::image;

/// Timeout for a single asset download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Size of the chunks streamed to disk.
const CHUNK_SIZE: usize = 8192;

/// Errors raised while fetching an asset. Every failure path removes any
/// partially written file, so a returned error means nothing was left behind.
#[derive(Debug, Error)]
pub(crate) enum DownloadError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server returned {0:?} instead of an image")]
    UnexpectedContentType(String),
    #[error("downloaded file failed image integrity verification")]
    CorruptArtifact,
    #[error("failed writing artifact to disk: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams remote assets to local files, guarding both ends: the declared
/// content type before a byte is written, and the decoded image structure
/// after the stream completes.
pub(crate) struct Downloader {
    client: Client,
}

impl Downloader {
    /// Creates a downloader on top of an existing HTTP client (shared with
    /// the search client).
    pub(crate) fn new(client: Client) -> Self {
        Downloader { client }
    }

    /// Fetches `url` into `dest`. On success exactly one verified image file
    /// exists at `dest`; on any failure the partial file is removed
    /// (best-effort) and the cause returned.
    pub(crate) fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let mut response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .map_err(|err| DownloadError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Transport(format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("image") && !content_type.contains("octet-stream") {
            warn!("server sent {:?} instead of an image, refusing to write", content_type);
            return Err(DownloadError::UnexpectedContentType(content_type));
        }

        if let Err(err) = stream_body(&mut response, dest) {
            discard_partial(dest);
            return Err(err);
        }

        if !image::verify_integrity(dest) {
            warn!("downloaded file is corrupt or not an image, removing it");
            discard_partial(dest);
            return Err(DownloadError::CorruptArtifact);
        }

        Ok(())
    }
}

/// Writes the response body to `dest` in fixed-size chunks. The file handle
/// is dropped before the caller decides whether to delete the result.
fn stream_body(response: &mut Response, dest: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = dest.parent() {
        create_dir_all(parent)?;
    }

    let mut file = File::create(dest)?;
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = response
            .read(&mut buffer)
            .map_err(|err| DownloadError::Transport(err.to_string()))?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])?;
    }

    file.flush()?;
    Ok(())
}

/// Best-effort removal of a partial or corrupt artifact; a failed delete is
/// logged, never escalated.
fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(err) = remove_file(path) {
            warn!("failed to remove partial artifact {}: {}", path.display(), err);
        }
    }
}
