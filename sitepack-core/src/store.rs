// sitepack_core/src/store.rs
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::{BundleKind, FileBundle, StorageRecord, Tier};
use crate::error::{Result, SiteError};
use crate::tier::{
    KeyValueBackend, ObjectStore, PrimaryTier, SecondaryTier, StorageTier, TierError,
};

const EVENT_CAPACITY: usize = 64;

/// What callers need from bundle storage, independent of how many tiers
/// sit behind it.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// `bundle_id` must be the bundle's own id.
    async fn save(&self, bundle_id: &str, bundle: &FileBundle) -> Result<StorageRecord>;

    /// `Ok(None)` means the bundle is in no tier; that is not an error.
    async fn load(&self, bundle_id: &str) -> Result<Option<FileBundle>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Saved { key: String, tier: Tier },
    Removed { key: String },
}

/// Primary tier first, secondary only when the primary is out of room.
///
/// A key lives in exactly one tier after a successful write: the copy in the
/// other tier, if any, is dropped.
pub struct TieredStore {
    primary: Box<dyn StorageTier>,
    secondary: Box<dyn StorageTier>,
    events: broadcast::Sender<StoreEvent>,
}

impl TieredStore {
    pub fn new<B, S>(primary: B, secondary: S) -> Self
    where
        B: KeyValueBackend + 'static,
        S: ObjectStore + 'static,
    {
        Self::with_tiers(
            Box::new(PrimaryTier::new(primary)),
            Box::new(SecondaryTier::new(secondary)),
        )
    }

    pub fn with_tiers(primary: Box<dyn StorageTier>, secondary: Box<dyn StorageTier>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            primary,
            secondary,
            events,
        }
    }

    /// Change notifications for UI refresh; replaces polling the tiers.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn chain(&self) -> [&dyn StorageTier; 2] {
        [self.primary.as_ref(), self.secondary.as_ref()]
    }

    fn tier_error(tier: Tier, e: TierError) -> SiteError {
        match tier {
            Tier::Primary => SiteError::PrimaryTier(e),
            Tier::Secondary => SiteError::SecondaryTier(e),
        }
    }

    /// Store a serialized value under `kind`/`id`.
    pub async fn put_value(&self, kind: BundleKind, id: &str, value: &str) -> Result<StorageRecord> {
        let key = kind.key(id);
        let chain = self.chain();
        let mut written = None;
        for (i, tier) in chain.iter().enumerate() {
            match tier.put(&key, value).await {
                Ok(()) => {
                    written = Some(i);
                    break;
                }
                Err(e) if e.is_capacity() && i + 1 < chain.len() => {
                    warn!(key = %key, tier = %tier.tier(), error = %e, "tier full, falling back");
                }
                Err(e) => return Err(Self::tier_error(tier.tier(), e)),
            }
        }
        let Some(idx) = written else {
            return Err(SiteError::SecondaryTier(TierError::Unavailable(
                "no tier accepted the write".into(),
            )));
        };
        self.drop_stale_copies(&key, idx).await?;

        let tier = chain[idx].tier();
        info!(key = %key, tier = %tier, bytes = value.len(), "saved");
        let _ = self.events.send(StoreEvent::Saved {
            key: key.clone(),
            tier,
        });
        Ok(StorageRecord {
            bundle_id: id.to_string(),
            key,
            tier,
            bytes: value.len() as u64,
            digest: blake3::hash(value.as_bytes()).to_hex().to_string(),
        })
    }

    /// A leftover primary copy would shadow the new value on load, so failing
    /// to drop it fails the save. Leftover secondary copies are never read
    /// while the primary holds the key.
    async fn drop_stale_copies(&self, key: &str, written: usize) -> Result<()> {
        for (i, tier) in self.chain().iter().enumerate() {
            if i == written {
                continue;
            }
            match tier.remove(key).await {
                Ok(true) => debug!(key, tier = %tier.tier(), "dropped stale copy"),
                Ok(false) => {}
                Err(e) if tier.tier() == Tier::Primary => {
                    return Err(SiteError::PrimaryTier(e));
                }
                Err(e) => warn!(key, tier = %tier.tier(), error = %e, "could not drop stale copy"),
            }
        }
        Ok(())
    }

    /// Value and holding tier, looking at the primary tier first.
    pub async fn get_value(&self, kind: BundleKind, id: &str) -> Result<Option<(String, Tier)>> {
        let key = kind.key(id);
        for tier in self.chain() {
            if let Some(v) = tier
                .get(&key)
                .await
                .map_err(|e| Self::tier_error(tier.tier(), e))?
            {
                debug!(key = %key, tier = %tier.tier(), "found");
                return Ok(Some((v, tier.tier())));
            }
        }
        debug!(key = %key, "not found in any tier");
        Ok(None)
    }

    /// Remove `kind`/`id` from every tier. Returns whether any tier held it.
    pub async fn remove(&self, kind: BundleKind, id: &str) -> Result<bool> {
        let key = kind.key(id);
        let mut found = false;
        for tier in self.chain() {
            found |= tier
                .remove(&key)
                .await
                .map_err(|e| Self::tier_error(tier.tier(), e))?;
        }
        if found {
            info!(key = %key, "removed");
            let _ = self.events.send(StoreEvent::Removed { key });
        }
        Ok(found)
    }

    /// Ids of `kind` and the tier holding each, sorted by id.
    pub async fn list(&self, kind: BundleKind) -> Result<Vec<(String, Tier)>> {
        let mut out = Vec::new();
        for tier in self.chain() {
            let keys = tier
                .keys()
                .await
                .map_err(|e| Self::tier_error(tier.tier(), e))?;
            for key in keys {
                if let Some(id) = kind.strip(&key) {
                    if !out.iter().any(|(seen, _): &(String, Tier)| seen == id) {
                        out.push((id.to_string(), tier.tier()));
                    }
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    pub async fn locate(&self, kind: BundleKind, id: &str) -> Result<Option<Tier>> {
        Ok(self.get_value(kind, id).await?.map(|(_, tier)| tier))
    }
}

#[async_trait]
impl BundleStore for TieredStore {
    async fn save(&self, bundle_id: &str, bundle: &FileBundle) -> Result<StorageRecord> {
        if bundle_id != bundle.bundle_id() {
            return Err(SiteError::Rejected(format!(
                "bundle {} cannot be saved as {bundle_id}",
                bundle.bundle_id()
            )));
        }
        let json = serde_json::to_string(bundle)?;
        self.put_value(BundleKind::Website, bundle_id, &json).await
    }

    async fn load(&self, bundle_id: &str) -> Result<Option<FileBundle>> {
        match self.get_value(BundleKind::Website, bundle_id).await? {
            Some((json, tier)) => {
                let bundle: FileBundle = serde_json::from_str(&json).map_err(|e| {
                    SiteError::Corrupt(format!("{bundle_id} in {tier} tier: {e}"))
                })?;
                Ok(Some(bundle))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{MemoryKeyValue, MemoryObjectStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn bundle(id: &str, files: &[(&str, &str)]) -> FileBundle {
        let files: BTreeMap<String, String> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        FileBundle::new(id, "site.zip", files, OffsetDateTime::now_utc())
    }

    fn store(primary_quota: u64) -> TieredStore {
        TieredStore::new(
            MemoryKeyValue::new(primary_quota),
            MemoryObjectStore::new(1 << 20),
        )
    }

    /// Primary tier whose writes fail for a reason other than capacity.
    struct BrokenPrimary;

    #[async_trait]
    impl StorageTier for BrokenPrimary {
        fn tier(&self) -> Tier {
            Tier::Primary
        }
        async fn put(&self, _: &str, _: &str) -> std::result::Result<(), TierError> {
            Err(TierError::Unavailable("security policy".into()))
        }
        async fn get(&self, _: &str) -> std::result::Result<Option<String>, TierError> {
            Ok(None)
        }
        async fn remove(&self, _: &str) -> std::result::Result<bool, TierError> {
            Ok(false)
        }
        async fn keys(&self) -> std::result::Result<Vec<String>, TierError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn small_bundle_lands_in_primary() {
        let s = store(1 << 20);
        let b = bundle("demo-1", &[("index.html", "<h1>Hi</h1>")]);
        let rec = s.save("demo-1", &b).await.unwrap();
        assert_eq!(rec.tier, Tier::Primary);
        assert_eq!(rec.key, "website_demo-1");
        assert_eq!(s.load("demo-1").await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn oversized_bundle_falls_back_to_secondary() {
        let s = store(64);
        let big = "x".repeat(4096);
        let b = bundle("big-1", &[("index.html", &big)]);
        let rec = s.save("big-1", &b).await.unwrap();
        assert_eq!(rec.tier, Tier::Secondary);
        assert_eq!(s.load("big-1").await.unwrap(), Some(b));
        assert_eq!(
            s.locate(BundleKind::Website, "big-1").await.unwrap(),
            Some(Tier::Secondary)
        );
    }

    #[tokio::test]
    async fn save_under_a_different_id_is_rejected() {
        let s = store(1 << 20);
        let err = s
            .save("other-1", &bundle("demo-1", &[("index.html", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Rejected(_)));
        assert_eq!(s.load("other-1").await.unwrap(), None);
        assert!(s.list(BundleKind::Website).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_bundle_is_none() {
        let s = store(1 << 20);
        assert_eq!(s.load("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_capacity_primary_failure_does_not_fall_back() {
        let secondary = Arc::new(MemoryObjectStore::new(1 << 20));
        let s = TieredStore::with_tiers(
            Box::new(BrokenPrimary),
            Box::new(SecondaryTier::new(SharedObjects(secondary.clone()))),
        );
        let err = s
            .save("a-1", &bundle("a-1", &[("index.html", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::PrimaryTier(TierError::Unavailable(_))));
        assert_eq!(secondary.used().await, 0);
    }

    #[tokio::test]
    async fn secondary_failure_is_terminal() {
        let secondary = Arc::new(MemoryObjectStore::new(1 << 20));
        secondary.close();
        let s = TieredStore::with_tiers(
            Box::new(PrimaryTier::new(MemoryKeyValue::new(16))),
            Box::new(SecondaryTier::new(SharedObjects(secondary))),
        );
        let b = bundle("big-1", &[("index.html", &"x".repeat(256))]);
        let err = s.save("big-1", &b).await.unwrap_err();
        assert!(matches!(err, SiteError::SecondaryTier(TierError::Unavailable(_))));
    }

    #[tokio::test]
    async fn resave_replaces_content_even_when_tier_changes() {
        let s = store(512);
        let small = bundle("site-1", &[("index.html", "v1"), ("old.css", "a{}")]);
        assert_eq!(s.save("site-1", &small).await.unwrap().tier, Tier::Primary);

        let big = bundle("site-1", &[("index.html", &"v2".repeat(1024))]);
        let rec = s.save("site-1", &big).await.unwrap();
        assert_eq!(rec.tier, Tier::Secondary);

        let loaded = s.load("site-1").await.unwrap().unwrap();
        assert_eq!(loaded.files(), big.files());
        assert_eq!(loaded.get("old.css"), None);
        assert_eq!(
            s.list(BundleKind::Website).await.unwrap(),
            vec![("site-1".to_string(), Tier::Secondary)]
        );

        let small_again = bundle("site-1", &[("index.html", "v3")]);
        assert_eq!(s.save("site-1", &small_again).await.unwrap().tier, Tier::Primary);
        assert_eq!(
            s.list(BundleKind::Website).await.unwrap(),
            vec![("site-1".to_string(), Tier::Primary)]
        );
    }

    #[tokio::test]
    async fn subscribers_see_saves_and_removals() {
        let s = store(1 << 20);
        let mut rx = s.subscribe();
        s.save("demo-1", &bundle("demo-1", &[])).await.unwrap();
        assert!(s.remove(BundleKind::Website, "demo-1").await.unwrap());
        assert!(!s.remove(BundleKind::Website, "demo-1").await.unwrap());

        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::Saved {
                key: "website_demo-1".into(),
                tier: Tier::Primary
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::Removed {
                key: "website_demo-1".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn listing_is_per_kind() {
        let s = store(1 << 20);
        s.save("w-1", &bundle("w-1", &[])).await.unwrap();
        s.put_value(BundleKind::AppFile, "p-1_game.apk", "{}")
            .await
            .unwrap();
        let sites = s.list(BundleKind::Website).await.unwrap();
        let apps = s.list(BundleKind::AppFile).await.unwrap();
        assert_eq!(sites, vec![("w-1".to_string(), Tier::Primary)]);
        assert_eq!(apps, vec![("p-1_game.apk".to_string(), Tier::Primary)]);
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let s = store(1 << 20);
        s.put_value(BundleKind::Website, "bad-1", "{not json")
            .await
            .unwrap();
        assert!(matches!(s.load("bad-1").await, Err(SiteError::Corrupt(_))));
    }

    struct SharedObjects(Arc<MemoryObjectStore>);

    impl ObjectStore for SharedObjects {
        fn transaction(
            &self,
            mode: crate::tier::TxMode,
        ) -> std::result::Result<Box<dyn crate::tier::Transaction + '_>, TierError> {
            self.0.transaction(mode)
        }
    }
}
