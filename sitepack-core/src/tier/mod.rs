//! Storage tiers.
//!
//! Two backend shapes are consumed here: a synchronous, quota-limited
//! key-value store ([`KeyValueBackend`]) and a larger transactional object
//! store ([`ObjectStore`]). Both are wrapped into the uniform async
//! [`StorageTier`] so the tiered store can chain them without caring which
//! one it is talking to.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Tier;

pub mod kv;
pub mod object;

pub use kv::{FsKeyValue, KeyValueBackend, MemoryKeyValue};
pub use object::{FsObjectStore, MemoryObjectStore, ObjectStore, Transaction, TxMode};

#[derive(Error, Debug)]
pub enum TierError {
    #[error("capacity exceeded: write needs {needed} bytes, {available} available")]
    CapacityExceeded { needed: u64, available: u64 },

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TierError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, TierError::CapacityExceeded { .. })
    }
}

#[async_trait]
pub trait StorageTier: Send + Sync {
    fn tier(&self) -> Tier;

    async fn put(&self, key: &str, value: &str) -> Result<(), TierError>;

    async fn get(&self, key: &str) -> Result<Option<String>, TierError>;

    /// Returns whether the key was present.
    async fn remove(&self, key: &str) -> Result<bool, TierError>;

    async fn keys(&self) -> Result<Vec<String>, TierError>;
}

/// Fast tier over a key-value backend. Calls complete without suspending.
pub struct PrimaryTier<B> {
    backend: B,
}

impl<B: KeyValueBackend> PrimaryTier<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: KeyValueBackend> StorageTier for PrimaryTier<B> {
    fn tier(&self) -> Tier {
        Tier::Primary
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), TierError> {
        self.backend.set_item(key, value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        self.backend.get_item(key)
    }

    async fn remove(&self, key: &str) -> Result<bool, TierError> {
        let present = self.backend.get_item(key)?.is_some();
        if present {
            self.backend.remove_item(key)?;
        }
        Ok(present)
    }

    async fn keys(&self) -> Result<Vec<String>, TierError> {
        self.backend.keys()
    }
}

/// Large tier over a transactional object store; every call is one transaction.
pub struct SecondaryTier<S> {
    store: S,
}

impl<S: ObjectStore> SecondaryTier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: ObjectStore> StorageTier for SecondaryTier<S> {
    fn tier(&self) -> Tier {
        Tier::Secondary
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), TierError> {
        let mut tx = self.store.transaction(TxMode::ReadWrite)?;
        tx.put(key, value.to_string())?;
        tx.commit().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        let mut tx = self.store.transaction(TxMode::ReadOnly)?;
        tx.get(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, TierError> {
        let mut tx = self.store.transaction(TxMode::ReadWrite)?;
        if tx.get(key).await?.is_none() {
            return Ok(false);
        }
        tx.delete(key)?;
        tx.commit().await?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, TierError> {
        let mut tx = self.store.transaction(TxMode::ReadOnly)?;
        tx.keys().await
    }
}
