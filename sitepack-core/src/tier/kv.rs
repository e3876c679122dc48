use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use super::TierError;

/// `setItem`/`getItem` storage with a hard quota. A rejected write leaves the
/// previous value for that key untouched.
pub trait KeyValueBackend: Send + Sync {
    fn set_item(&self, key: &str, value: &str) -> Result<(), TierError>;

    fn get_item(&self, key: &str) -> Result<Option<String>, TierError>;

    /// Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), TierError>;

    fn keys(&self) -> Result<Vec<String>, TierError>;
}

pub(crate) fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

pub(crate) fn check_quota(
    used: u64,
    replaced: u64,
    needed: u64,
    quota: u64,
) -> Result<(), TierError> {
    let base = used.saturating_sub(replaced);
    if base + needed > quota {
        return Err(TierError::CapacityExceeded {
            needed,
            available: quota.saturating_sub(base),
        });
    }
    Ok(())
}

#[derive(Default)]
struct KvState {
    items: HashMap<String, String>,
    used: u64,
}

pub struct MemoryKeyValue {
    state: Mutex<KvState>,
    quota: u64,
}

impl MemoryKeyValue {
    pub fn new(quota: u64) -> Self {
        Self {
            state: Mutex::new(KvState::default()),
            quota,
        }
    }

    pub fn used(&self) -> u64 {
        self.lock().map(|s| s.used).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, KvState>, TierError> {
        self.state
            .lock()
            .map_err(|e| TierError::Unavailable(e.to_string()))
    }
}

impl KeyValueBackend for MemoryKeyValue {
    fn set_item(&self, key: &str, value: &str) -> Result<(), TierError> {
        let mut st = self.lock()?;
        let replaced = st.items.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
        let needed = entry_size(key, value);
        check_quota(st.used, replaced, needed, self.quota)?;
        st.used = st.used - replaced + needed;
        st.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, TierError> {
        Ok(self.lock()?.items.get(key).cloned())
    }

    fn remove_item(&self, key: &str) -> Result<(), TierError> {
        let mut st = self.lock()?;
        if let Some(v) = st.items.remove(key) {
            st.used -= entry_size(key, &v);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, TierError> {
        Ok(self.lock()?.items.keys().cloned().collect())
    }
}

/// One file per key under `dir`; usage is recomputed from disk on each write.
pub struct FsKeyValue {
    dir: PathBuf,
    quota: u64,
}

impl FsKeyValue {
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

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key_file_name(key))
    }

    fn used(&self) -> Result<u64, TierError> {
        Ok(stored_keys(&self.dir)?.iter().map(|e| e.size).sum())
    }
}

impl KeyValueBackend for FsKeyValue {
    fn set_item(&self, key: &str, value: &str) -> Result<(), TierError> {
        let path = self.path_for(key);
        let replaced = match fs::metadata(&path) {
            Ok(md) => md.len().saturating_sub(HEADER_LEN),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        check_quota(self.used()?, replaced, entry_size(key, value), self.quota)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&encode_entry(key, value)?)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| TierError::Io(e.error))?;
        Ok(())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, TierError> {
        match fs::read(self.path_for(key)) {
            Ok(raw) => Ok(decode_entry_for(key, raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_item(&self, key: &str) -> Result<(), TierError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, TierError> {
        Ok(stored_keys(&self.dir)?.into_iter().map(|e| e.key).collect())
    }
}

// Entry files hold `<u32 LE key length><key><value>` and are named by the
// BLAKE3 of the key, so file names have a fixed length whatever the key.
const HEADER_LEN: u64 = 4;
const FILE_NAME_LEN: usize = 64;

pub(crate) fn key_file_name(key: &str) -> String {
    hex::encode(blake3::hash(key.as_bytes()).as_bytes())
}

fn is_entry_file_name(name: &str) -> bool {
    name.len() == FILE_NAME_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn invalid(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(ErrorKind::InvalidData, msg.into())
}

pub(crate) fn encode_entry(key: &str, value: &str) -> Result<Vec<u8>, TierError> {
    let key_len = u32::try_from(key.len()).map_err(|_| invalid("key too long"))?;
    let mut out = Vec::with_capacity(HEADER_LEN as usize + key.len() + value.len());
    out.extend_from_slice(&key_len.to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(out)
}

/// Value stored in `raw` if its header names `key`. A different key means a
/// digest collision and is treated as absent.
pub(crate) fn decode_entry_for(key: &str, raw: Vec<u8>) -> Result<Option<String>, TierError> {
    let (stored, value_at) = split_header(&raw)?;
    if stored != key {
        return Ok(None);
    }
    let value = String::from_utf8(raw[value_at..].to_vec())
        .map_err(|e| invalid(format!("value of {key}: {e}")))?;
    Ok(Some(value))
}

fn split_header(raw: &[u8]) -> std::io::Result<(&str, usize)> {
    let header = raw
        .get(..HEADER_LEN as usize)
        .ok_or_else(|| invalid("truncated entry header"))?;
    let mut len = [0u8; 4];
    len.copy_from_slice(header);
    let end = HEADER_LEN as usize + u32::from_le_bytes(len) as usize;
    let key = raw
        .get(HEADER_LEN as usize..end)
        .ok_or_else(|| invalid("truncated entry key"))?;
    let key = std::str::from_utf8(key).map_err(|e| invalid(e.to_string()))?;
    Ok((key, end))
}

fn read_entry_key(path: &Path) -> std::io::Result<String> {
    let mut f = fs::File::open(path)?;
    let mut len = [0u8; 4];
    f.read_exact(&mut len)?;
    let mut key = vec![0u8; u32::from_le_bytes(len) as usize];
    f.read_exact(&mut key)?;
    String::from_utf8(key).map_err(|e| invalid(e.to_string()))
}

pub(crate) struct StoredEntry {
    pub key: String,
    /// Key bytes + value bytes, the unit quotas are counted in.
    pub size: u64,
}

/// Every stored entry; temp files, strays and unreadable entries are skipped.
pub(crate) fn stored_keys(dir: &Path) -> std::io::Result<Vec<StoredEntry>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let md = entry.metadata()?;
        if !md.is_file() || !entry.file_name().to_str().is_some_and(is_entry_file_name) {
            continue;
        }
        let path = entry.path();
        match read_entry_key(&path) {
            Ok(key) => out.push(StoredEntry {
                key,
                size: md.len().saturating_sub(HEADER_LEN),
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable entry"),
        }
    }
    Ok(out)
}
