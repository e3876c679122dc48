// sitepack_core/src/domain.rs
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::SiteError;

/// An unpacked website: relative path -> text content.
///
/// Immutable once built. `file_count` is always `files.len()`; records whose
/// stored count disagrees are rejected when deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BundleRecord", into = "BundleRecord")]
pub struct FileBundle {
    bundle_id: String,
    source_file_name: String,
    files: BTreeMap<String, String>,
    created_at: OffsetDateTime,
}

impl FileBundle {
    pub fn new(
        bundle_id: impl Into<String>,
        source_file_name: impl Into<String>,
        files: BTreeMap<String, String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            source_file_name: source_file_name.into(),
            files,
            created_at,
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn source_file_name(&self) -> &str {
        &self.source_file_name
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

/// Wire form of a bundle, camelCase. The id is written as `bundleId`; records
/// from the upload page that carry it as `projectId` still load.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleRecord {
    #[serde(alias = "projectId")]
    bundle_id: String,
    file_name: String,
    files: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    extracted_at: OffsetDateTime,
    file_count: usize,
}

impl From<FileBundle> for BundleRecord {
    fn from(b: FileBundle) -> Self {
        let file_count = b.files.len();
        Self {
            bundle_id: b.bundle_id,
            file_name: b.source_file_name,
            files: b.files,
            extracted_at: b.created_at,
            file_count,
        }
    }
}

impl TryFrom<BundleRecord> for FileBundle {
    type Error = SiteError;

    fn try_from(r: BundleRecord) -> Result<Self, Self::Error> {
        if r.file_count != r.files.len() {
            return Err(SiteError::Corrupt(format!(
                "bundle {}: fileCount {} but {} files",
                r.bundle_id,
                r.file_count,
                r.files.len()
            )));
        }
        Ok(Self {
            bundle_id: r.bundle_id,
            source_file_name: r.file_name,
            files: r.files,
            created_at: r.extracted_at,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Primary => f.write_str("primary"),
            Tier::Secondary => f.write_str("secondary"),
        }
    }
}

/// Where a saved value ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRecord {
    pub bundle_id: String,
    pub key: String,
    pub tier: Tier,
    pub bytes: u64,
    /// Hex BLAKE3 of the serialized value.
    pub digest: String,
}

/// Key namespace. Each kind owns a prefix in the flat key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BundleKind {
    Website,
    AppFile,
}

impl BundleKind {
    pub const ALL: [BundleKind; 2] = [BundleKind::Website, BundleKind::AppFile];

    pub fn prefix(self) -> &'static str {
        match self {
            BundleKind::Website => "website_",
            BundleKind::AppFile => "app_",
        }
    }

    pub fn key(self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }

    /// Inverse of [`BundleKind::key`].
    pub fn strip<'a>(self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix())
    }
}

/// An uploaded app/game binary, kept as the data URL it arrived in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub data_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

impl AppFile {
    pub fn storage_id(project_id: &str, file_name: &str) -> String {
        format!("{project_id}_{file_name}")
    }
}
