//! Upload flows: website archives and app binaries.

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{AppFile, BundleKind, StorageRecord};
use crate::error::{Result, SiteError};
use crate::ingest::{ArchiveBlob, generate_bundle_id, unpack_with_progress};
use crate::policy::UploadPolicy;
use crate::store::{BundleStore, TieredStore};

#[derive(Clone, Debug)]
pub struct UploadReceipt {
    pub bundle_id: String,
    pub file_count: usize,
    /// Where the site is served from once saved.
    pub url: String,
    pub record: StorageRecord,
}

/// Validate, unpack and store a website archive under a fresh bundle id.
pub async fn upload_website<S: BundleStore + ?Sized>(
    store: &S,
    cfg: &Config,
    data_url: &str,
    title: &str,
    file_name: &str,
) -> Result<UploadReceipt> {
    cfg.upload.check_archive_name(file_name)?;
    let blob = ArchiveBlob::from_data_url(data_url)?;
    cfg.upload.check_archive_size(blob.len())?;

    let bundle_id = generate_bundle_id(title, OffsetDateTime::now_utc());
    info!(bundle_id = %bundle_id, file_name, bytes = blob.len(), "upload accepted");

    let bundle =
        unpack_with_progress(blob, &bundle_id, file_name, cfg.upload.max_extracted_bytes, None)
            .await?;
    if bundle.file_count() == 0 {
        warn!(bundle_id = %bundle_id, "archive holds no files");
    }
    let record = store.save(&bundle_id, &bundle).await?;

    Ok(UploadReceipt {
        url: cfg.site_url(&bundle_id),
        file_count: bundle.file_count(),
        bundle_id,
        record,
    })
}

/// Store an app/game binary for `project_id`, keeping its data URL as sent.
pub async fn upload_app_file(
    store: &TieredStore,
    policy: &UploadPolicy,
    project_id: &str,
    file_name: &str,
    mime_type: &str,
    data_url: &str,
) -> Result<StorageRecord> {
    let size = ArchiveBlob::from_data_url(data_url)?.len();
    policy.check_app_size(size)?;

    let app = AppFile {
        name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        size,
        data_url: data_url.to_string(),
        uploaded_at: OffsetDateTime::now_utc(),
    };
    let json = serde_json::to_string(&app)?;
    let id = AppFile::storage_id(project_id, file_name);
    store.put_value(BundleKind::AppFile, &id, &json).await
}

pub async fn load_app_file(
    store: &TieredStore,
    project_id: &str,
    file_name: &str,
) -> Result<Option<AppFile>> {
    let id = AppFile::storage_id(project_id, file_name);
    match store.get_value(BundleKind::AppFile, &id).await? {
        Some((json, tier)) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| SiteError::Corrupt(format!("app file {id} in {tier} tier: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use crate::tier::{MemoryKeyValue, MemoryObjectStore};

    fn store() -> TieredStore {
        TieredStore::new(MemoryKeyValue::new(256), MemoryObjectStore::new(1 << 20))
    }

    #[tokio::test]
    async fn wrong_extension_is_rejected_before_decoding() {
        let err = upload_website(&store(), &Config::default(), "%%%", "Demo", "demo.rar")
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Rejected(_)));
    }

    #[tokio::test]
    async fn oversized_archive_is_rejected() {
        let mut cfg = Config::default();
        cfg.upload.max_archive_bytes = 4;
        let url = ArchiveBlob::from_bytes(vec![0; 5]).to_data_url();
        let err = upload_website(&store(), &cfg, &url, "Demo", "demo.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Rejected(_)));
    }

    #[tokio::test]
    async fn archive_expanding_past_the_cap_is_rejected() {
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        w.start_file("index.html", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut w, &vec![b' '; 64 * 1024]).unwrap();
        let zipped = w.finish().unwrap().into_inner();

        let mut cfg = Config::default();
        cfg.upload.max_extracted_bytes = 1024;
        let url = ArchiveBlob::from_bytes(zipped).to_data_url();
        let err = upload_website(&store(), &cfg, &url, "Bomb", "bomb.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Rejected(_)));
        assert_eq!(err.remediation(), crate::error::Remediation::FixInput);
    }

    #[tokio::test]
    async fn garbage_archive_is_a_format_error() {
        let url = ArchiveBlob::from_bytes(b"not a zip".to_vec()).to_data_url();
        let err = upload_website(&store(), &Config::default(), &url, "Demo", "demo.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::ArchiveFormat(_)));
    }

    #[tokio::test]
    async fn app_file_round_trips_and_spills_to_secondary() {
        let s = store();
        let url = ArchiveBlob::from_bytes(vec![7; 1024])
            .with_mime_type("application/vnd.android.package-archive")
            .to_data_url();
        let rec = upload_app_file(
            &s,
            &UploadPolicy::default(),
            "p-1",
            "game.apk",
            "application/vnd.android.package-archive",
            &url,
        )
        .await
        .unwrap();
        assert_eq!(rec.key, "app_p-1_game.apk");
        assert_eq!(rec.tier, Tier::Secondary);

        let app = load_app_file(&s, "p-1", "game.apk").await.unwrap().unwrap();
        assert_eq!(app.size, 1024);
        assert_eq!(app.data_url, url);
        assert_eq!(load_app_file(&s, "p-1", "other.apk").await.unwrap(), None);
    }

    #[tokio::test]
    async fn app_file_over_limit_is_rejected() {
        let policy = UploadPolicy {
            max_app_bytes: 3,
            ..Default::default()
        };
        let url = ArchiveBlob::from_bytes(vec![1; 4]).to_data_url();
        let err = upload_app_file(&store(), &policy, "p", "a.bin", "x/y", &url)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Rejected(_)));
    }
}
