use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info};

use super::dataurl::ArchiveBlob;
use crate::domain::FileBundle;
use crate::error::{Result, SiteError};
use crate::policy::UploadPolicy;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestProgress {
    /// Archive members looked at so far, directories included.
    pub processed: usize,
    pub total: usize,
    pub current: Option<String>,
}

impl IngestProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed * 100) / self.total) as u8
    }
}

/// Unpack a ZIP archive into a bundle. The whole archive is decoded before
/// this returns; nothing touches the filesystem.
pub async fn unpack(blob: ArchiveBlob, bundle_id: &str, source_file_name: &str) -> Result<FileBundle> {
    let limit = UploadPolicy::default().max_extracted_bytes;
    unpack_with_progress(blob, bundle_id, source_file_name, limit, None).await
}

pub async fn unpack_with_progress(
    blob: ArchiveBlob,
    bundle_id: &str,
    source_file_name: &str,
    max_extracted_bytes: u64,
    progress: Option<watch::Sender<IngestProgress>>,
) -> Result<FileBundle> {
    let bundle_id = bundle_id.to_string();
    let source_file_name = source_file_name.to_string();
    tokio::task::spawn_blocking(move || {
        unpack_blocking(
            blob.bytes(),
            &bundle_id,
            &source_file_name,
            max_extracted_bytes,
            progress.as_ref(),
        )
    })
    .await
    .map_err(|e| SiteError::Io(std::io::Error::other(e)))?
}

pub fn unpack_blocking(
    bytes: &[u8],
    bundle_id: &str,
    source_file_name: &str,
    max_extracted_bytes: u64,
    progress: Option<&watch::Sender<IngestProgress>>,
) -> Result<FileBundle> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(format_err)?;
    let total = archive.len();
    debug!(bundle_id, total, "archive opened");

    let mut files = BTreeMap::new();
    let mut extracted = 0u64;
    for i in 0..total {
        let mut entry = archive.by_index(i).map_err(format_err)?;
        let name = entry.name().to_string();
        if !entry.is_dir() {
            let path = normalize_entry_path(&name);
            if !path.is_empty() {
                // Declared sizes are untrusted; read at most one byte past the cap.
                let remaining = max_extracted_bytes - extracted;
                let mut raw = Vec::with_capacity(entry.size().min(remaining) as usize);
                entry
                    .by_ref()
                    .take(remaining.saturating_add(1))
                    .read_to_end(&mut raw)
                    .map_err(|e| SiteError::ArchiveFormat(format!("{name}: {e}")))?;
                extracted += raw.len() as u64;
                if extracted > max_extracted_bytes {
                    return Err(SiteError::Rejected(format!(
                        "archive expands past {max_extracted_bytes} bytes at {name}"
                    )));
                }
                debug!(path = %path, bytes = raw.len(), "extracted");
                files.insert(path, String::from_utf8_lossy(&raw).into_owned());
            }
        }
        if let Some(tx) = progress {
            tx.send_replace(IngestProgress {
                processed: i + 1,
                total,
                current: Some(name),
            });
        }
    }

    info!(bundle_id, files = files.len(), "archive unpacked");
    Ok(FileBundle::new(
        bundle_id,
        source_file_name,
        files,
        OffsetDateTime::now_utc(),
    ))
}

/// Forward slashes, no leading `/`. `./` prefixes stay as stored.
pub fn normalize_entry_path(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

fn format_err(e: zip::result::ZipError) -> SiteError {
    SiteError::ArchiveFormat(e.to_string())
}
