use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use super::TierError;
use super::kv::{check_quota, decode_entry_for, encode_entry, entry_size, key_file_name, stored_keys};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// A transactional store: open a transaction, stage puts/deletes, commit.
pub trait ObjectStore: Send + Sync {
    fn transaction(&self, mode: TxMode) -> Result<Box<dyn Transaction + '_>, TierError>;
}

/// Reads see the transaction's own staged writes. `commit` applies every
/// staged operation or none of them; dropping without commit discards them.
/// On disk, a failed commit undoes what it already applied; a process crash
/// part-way through can still leave some keys applied.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>, TierError>;

    async fn keys(&mut self) -> Result<Vec<String>, TierError>;

    fn put(&mut self, key: &str, value: String) -> Result<(), TierError>;

    fn delete(&mut self, key: &str) -> Result<(), TierError>;

    async fn commit(self: Box<Self>) -> Result<(), TierError>;
}

/// Last staged operation per key; `None` is a delete.
struct Staged {
    mode: TxMode,
    ops: BTreeMap<String, Option<String>>,
}

impl Staged {
    fn new(mode: TxMode) -> Self {
        Self {
            mode,
            ops: BTreeMap::new(),
        }
    }

    fn stage(&mut self, key: &str, op: Option<String>) -> Result<(), TierError> {
        if self.mode == TxMode::ReadOnly {
            return Err(TierError::ReadOnly);
        }
        self.ops.insert(key.to_string(), op);
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<Option<String>> {
        self.ops.get(key).cloned()
    }

    fn overlay_keys(&self, committed: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut keys: BTreeSet<String> = committed.into_iter().collect();
        for (k, op) in &self.ops {
            match op {
                Some(_) => keys.insert(k.clone()),
                None => keys.remove(k),
            };
        }
        keys.into_iter().collect()
    }

    /// `(bytes freed by overwritten/deleted keys, bytes written)`.
    fn footprint(&self, existing: impl Fn(&str) -> u64) -> (u64, u64) {
        let replaced = self.ops.keys().map(|k| existing(k)).sum();
        let needed = self
            .ops
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| entry_size(k, v)))
            .sum();
        (replaced, needed)
    }
}

#[derive(Default)]
struct ObjectState {
    items: HashMap<String, String>,
    used: u64,
}

pub struct MemoryObjectStore {
    state: Arc<RwLock<ObjectState>>,
    quota: u64,
    closed: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(quota: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(ObjectState::default())),
            quota,
            closed: AtomicBool::new(false),
        }
    }

    /// Simulates the database being closed underneath us: every later
    /// transaction fails with [`TierError::Unavailable`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn used(&self) -> u64 {
        self.state.read().await.used
    }
}

impl ObjectStore for MemoryObjectStore {
    fn transaction(&self, mode: TxMode) -> Result<Box<dyn Transaction + '_>, TierError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TierError::Unavailable("object store is closed".into()));
        }
        Ok(Box::new(MemoryTx {
            store: self,
            staged: Staged::new(mode),
        }))
    }
}

struct MemoryTx<'a> {
    store: &'a MemoryObjectStore,
    staged: Staged,
}

#[async_trait]
impl<'a> Transaction for MemoryTx<'a> {
    async fn get(&mut self, key: &str) -> Result<Option<String>, TierError> {
        if let Some(op) = self.staged.lookup(key) {
            return Ok(op);
        }
        Ok(self.store.state.read().await.items.get(key).cloned())
    }

    async fn keys(&mut self) -> Result<Vec<String>, TierError> {
        let committed: Vec<String> = {
            let st = self.store.state.read().await;
            st.items.keys().cloned().collect()
        };
        Ok(self.staged.overlay_keys(committed))
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), TierError> {
        self.staged.stage(key, Some(value))
    }

    fn delete(&mut self, key: &str) -> Result<(), TierError> {
        self.staged.stage(key, None)
    }

    async fn commit(self: Box<Self>) -> Result<(), TierError> {
        if self.staged.ops.is_empty() {
            return Ok(());
        }
        let store = self.store;
        let mut st = store.state.write().await;
        let (replaced, needed) = self
            .staged
            .footprint(|k| st.items.get(k).map(|v| entry_size(k, v)).unwrap_or(0));
        check_quota(st.used, replaced, needed, store.quota)?;

        st.used = st.used - replaced + needed;
        for (k, op) in self.staged.ops {
            match op {
                Some(v) => st.items.insert(k, v),
                None => st.items.remove(&k),
            };
        }
        Ok(())
    }
}

/// One file per key under `dir`. Commits stage every value in a temp file
/// before any of them is moved into place.
pub struct FsObjectStore {
    dir: PathBuf,
    quota: u64,
}

impl FsObjectStore {
    pub fn open(dir: &Path, quota: u64) -> Result<Self, TierError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            quota,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ObjectStore for FsObjectStore {
    fn transaction(&self, mode: TxMode) -> Result<Box<dyn Transaction + '_>, TierError> {
        if !self.dir.is_dir() {
            return Err(TierError::Unavailable(format!(
                "{} is missing",
                self.dir.display()
            )));
        }
        Ok(Box::new(FsTx {
            store: self,
            staged: Staged::new(mode),
        }))
    }
}

struct FsTx<'a> {
    store: &'a FsObjectStore,
    staged: Staged,
}

#[async_trait]
impl<'a> Transaction for FsTx<'a> {
    async fn get(&mut self, key: &str) -> Result<Option<String>, TierError> {
        if let Some(op) = self.staged.lookup(key) {
            return Ok(op);
        }
        match tokio::fs::read(self.store.dir.join(key_file_name(key))).await {
            Ok(raw) => decode_entry_for(key, raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&mut self) -> Result<Vec<String>, TierError> {
        let dir = self.store.dir.clone();
        let committed = tokio::task::spawn_blocking(move || stored_keys(&dir))
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))??;
        Ok(self
            .staged
            .overlay_keys(committed.into_iter().map(|e| e.key)))
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), TierError> {
        self.staged.stage(key, Some(value))
    }

    fn delete(&mut self, key: &str) -> Result<(), TierError> {
        self.staged.stage(key, None)
    }

    async fn commit(self: Box<Self>) -> Result<(), TierError> {
        if self.staged.ops.is_empty() {
            return Ok(());
        }
        let dir = self.store.dir.clone();
        let quota = self.store.quota;
        let staged = self.staged;
        tokio::task::spawn_blocking(move || commit_fs(&dir, quota, &staged))
            .await
            .map_err(|e| TierError::Unavailable(e.to_string()))?
    }
}

fn commit_fs(dir: &Path, quota: u64, staged: &Staged) -> Result<(), TierError> {
    let existing: HashMap<String, u64> = stored_keys(dir)?
        .into_iter()
        .map(|e| (e.key, e.size))
        .collect();
    let used = existing.values().sum();
    let (replaced, needed) = staged.footprint(|k| existing.get(k).copied().unwrap_or(0));
    check_quota(used, replaced, needed, quota)?;

    // Nothing is visible until every value is on disk; dropped temps clean up.
    let mut pending = Vec::new();
    for (k, op) in &staged.ops {
        if let Some(v) = op {
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(&encode_entry(k, v)?)?;
            tmp.as_file().sync_all()?;
            pending.push((tmp, dir.join(key_file_name(k))));
        }
    }

    let mut prior = HashMap::new();
    for k in staged.ops.keys() {
        let path = dir.join(key_file_name(k));
        let before = if path.is_file() {
            Some(fs::read(&path)?)
        } else {
            None
        };
        prior.insert(path, before);
    }

    let mut applied = Vec::new();
    if let Err(e) = apply_fs(dir, pending, staged, &mut applied) {
        roll_back(&prior, &applied);
        return Err(e);
    }
    Ok(())
}

fn apply_fs(
    dir: &Path,
    pending: Vec<(tempfile::NamedTempFile, PathBuf)>,
    staged: &Staged,
    applied: &mut Vec<PathBuf>,
) -> Result<(), TierError> {
    for (tmp, path) in pending {
        tmp.persist(&path).map_err(|e| TierError::Io(e.error))?;
        applied.push(path);
    }
    for (k, op) in &staged.ops {
        if op.is_none() {
            let path = dir.join(key_file_name(k));
            match fs::remove_file(&path) {
                Ok(()) => applied.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

/// Put every applied path back to its content before the commit.
fn roll_back(prior: &HashMap<PathBuf, Option<Vec<u8>>>, applied: &[PathBuf]) {
    for path in applied.iter().rev() {
        let restored = match prior.get(path) {
            Some(Some(bytes)) => fs::write(path, bytes),
            _ => fs::remove_file(path),
        };
        if let Err(e) = restored {
            warn!(path = %path.display(), error = %e, "rollback incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = MemoryObjectStore::new(1024);
        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.put("k", "v".into()).unwrap();
        assert_eq!(tx.get("k").await.unwrap().as_deref(), Some("v"));

        let mut other = store.transaction(TxMode::ReadOnly).unwrap();
        assert_eq!(other.get("k").await.unwrap(), None);

        tx.commit().await.unwrap();
        let mut after = store.transaction(TxMode::ReadOnly).unwrap();
        assert_eq!(after.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn over_quota_commit_applies_nothing() {
        let store = MemoryObjectStore::new(8);
        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.put("a", "123".into()).unwrap();
        tx.put("b", "123456".into()).unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(store.used().await, 0);
        let mut r = store.transaction(TxMode::ReadOnly).unwrap();
        assert!(r.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_transactions_reject_writes() {
        let store = MemoryObjectStore::new(8);
        let mut tx = store.transaction(TxMode::ReadOnly).unwrap();
        assert!(matches!(tx.put("a", "1".into()), Err(TierError::ReadOnly)));
        assert!(matches!(tx.delete("a"), Err(TierError::ReadOnly)));
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = MemoryObjectStore::new(8);
        store.close();
        assert!(matches!(
            store.transaction(TxMode::ReadOnly),
            Err(TierError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_commits_puts_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path(), 1024).unwrap();

        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.put("website_a", "A".into()).unwrap();
        tx.put("website_b", "B".into()).unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.delete("website_a").unwrap();
        assert_eq!(tx.keys().await.unwrap(), vec!["website_b".to_string()]);
        tx.commit().await.unwrap();

        let reopened = FsObjectStore::open(dir.path(), 1024).unwrap();
        let mut r = reopened.transaction(TxMode::ReadOnly).unwrap();
        assert_eq!(r.get("website_a").await.unwrap(), None);
        assert_eq!(r.get("website_b").await.unwrap().as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn fs_failed_commit_restores_earlier_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path(), 1024).unwrap();
        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.put("a", "old".into()).unwrap();
        tx.commit().await.unwrap();

        // A directory where "b" lives makes its delete fail after the puts land.
        fs::create_dir(dir.path().join(key_file_name("b"))).unwrap();
        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.put("a", "new".into()).unwrap();
        tx.put("c", "fresh".into()).unwrap();
        tx.delete("b").unwrap();
        assert!(tx.commit().await.is_err());

        let mut check = store.transaction(TxMode::ReadOnly).unwrap();
        assert_eq!(check.get("a").await.unwrap().as_deref(), Some("old"));
        assert_eq!(check.get("c").await.unwrap(), None);
        assert_eq!(check.keys().await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn fs_store_over_quota_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path(), 4).unwrap();
        let mut tx = store.transaction(TxMode::ReadWrite).unwrap();
        tx.put("big", "too large".into()).unwrap();
        assert!(tx.commit().await.unwrap_err().is_capacity());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
