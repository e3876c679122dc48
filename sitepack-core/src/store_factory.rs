use crate::config::Config;
use crate::error::{Result, SiteError};
use crate::store::TieredStore;
use crate::tier::{FsKeyValue, FsObjectStore, MemoryKeyValue, MemoryObjectStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Process-local; everything is gone when the store is dropped.
    Memory,
    Fs,
}

pub fn open_store(backend: Backend, cfg: &Config) -> Result<TieredStore> {
    match backend {
        Backend::Memory => Ok(TieredStore::new(
            MemoryKeyValue::new(cfg.primary_quota),
            MemoryObjectStore::new(cfg.secondary_quota),
        )),
        Backend::Fs => {
            let primary = FsKeyValue::open(&cfg.primary_dir(), cfg.primary_quota)
                .map_err(SiteError::PrimaryTier)?;
            let secondary = FsObjectStore::open(&cfg.secondary_dir(), cfg.secondary_quota)
                .map_err(SiteError::SecondaryTier)?;
            Ok(TieredStore::new(primary, secondary))
        }
    }
}
