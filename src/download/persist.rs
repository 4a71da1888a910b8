//! Atomic file persistence.
//!
//! Bytes go to `<dest>.part` first. The part file is checked (non-empty,
//! FLAC marker, announced length) and only then renamed into place, so a
//! destination path either holds a complete file or nothing. Every failure
//! path removes the part file.

use std::io::Read;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::AttemptError;
use crate::model::FailureKind;
use crate::services::StreamHandle;

/// Every FLAC stream starts with these bytes
pub const FLAC_MAGIC: &[u8; 4] = b"fLaC";

/// Temporary path used while a download is in flight.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Whether `dest` already holds a FLAC file from an earlier run.
pub fn is_present(dest: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(dest) else {
        return false;
    };
    let mut head = [0u8; 4];
    file.read_exact(&mut head).is_ok() && &head == FLAC_MAGIC
}

fn io_failure(context: &str, path: &Path, e: std::io::Error) -> AttemptError {
    tracing::warn!("{} {:?}: {}", context, path, e);
    AttemptError::Failed(FailureKind::Corrupt)
}

/// Stream a handle into the part file for `dest`.
///
/// Returns the part file path and the number of bytes written. On any
/// failure or cancellation the part file is gone when this returns.
pub async fn write_part(
    handle: StreamHandle,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<(PathBuf, u64), AttemptError> {
    let part = part_path(dest);
    match stream_into(handle, &part, cancel).await {
        Ok(written) => Ok((part, written)),
        Err(e) => {
            discard(&part).await;
            Err(e)
        }
    }
}

async fn stream_into(mut handle: StreamHandle, part: &Path, cancel: &CancellationToken) -> Result<u64, AttemptError> {
    if let Some(dir) = part.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_failure("Failed to create directory", dir, e))?;
    }

    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| io_failure("Failed to create", part, e))?;

    let mut head: Vec<u8> = Vec::with_capacity(FLAC_MAGIC.len());
    let mut written: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            chunk = handle.source.next_chunk() => chunk?,
        };
        let Some(chunk) = chunk else { break };

        if head.len() < FLAC_MAGIC.len() {
            let take = (FLAC_MAGIC.len() - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            if !FLAC_MAGIC.starts_with(&head) {
                tracing::debug!("Stream from {} is not FLAC", handle.service);
                return Err(FailureKind::Corrupt.into());
            }
        }

        file.write_all(&chunk)
            .await
            .map_err(|e| io_failure("Failed to write", part, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| io_failure("Failed to flush", part, e))?;

    if written < FLAC_MAGIC.len() as u64 {
        tracing::debug!("Stream from {} ended after {} bytes", handle.service, written);
        return Err(FailureKind::Corrupt.into());
    }
    if let Some(expected) = handle.expected_len
        && expected != written
    {
        tracing::debug!("Stream from {} truncated: {} of {} bytes", handle.service, written, expected);
        return Err(FailureKind::Corrupt.into());
    }

    Ok(written)
}

/// Move a finished part file into place.
pub async fn commit(part: &Path, dest: &Path) -> Result<(), AttemptError> {
    if let Err(e) = tokio::fs::rename(part, dest).await {
        discard(part).await;
        return Err(io_failure("Failed to move file into place at", dest, e));
    }
    Ok(())
}

/// Remove a part file, ignoring errors.
pub async fn discard(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("Failed to remove partial file {:?}: {}", part, e);
    }
}
