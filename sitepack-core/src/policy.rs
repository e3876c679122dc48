use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Largest accepted website archive, in decoded bytes.
    pub max_archive_bytes: u64,
    /// Required (case-insensitive) suffix of the archive file name.
    pub archive_extension: String,
    /// Cap on the total size of all unpacked entries. Compressed size says
    /// little about what an archive expands to.
    pub max_extracted_bytes: u64,
    /// Largest accepted app/game binary, in decoded bytes.
    pub max_app_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_archive_bytes: 100 * MIB,
            archive_extension: ".zip".to_string(),
            max_extracted_bytes: 512 * MIB,
            max_app_bytes: 500 * MIB,
        }
    }
}

impl UploadPolicy {
    pub fn check_archive_name(&self, file_name: &str) -> Result<()> {
        let ext = self.archive_extension.to_ascii_lowercase();
        if !file_name.to_ascii_lowercase().ends_with(&ext) {
            return Err(SiteError::Rejected(format!(
                "{file_name}: expected a {ext} archive"
            )));
        }
        Ok(())
    }

    pub fn check_archive_size(&self, size: u64) -> Result<()> {
        check_size("archive", size, self.max_archive_bytes)
    }

    pub fn check_app_size(&self, size: u64) -> Result<()> {
        check_size("app file", size, self.max_app_bytes)
    }
}

fn check_size(what: &str, size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(SiteError::Rejected(format!(
            "{what} is {size} bytes, limit is {limit}"
        )));
    }
    Ok(())
}
