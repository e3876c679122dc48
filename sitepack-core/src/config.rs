use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SiteError};
use crate::policy::UploadPolicy;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the filesystem tiers (`primary/`, `secondary/`).
    pub root: PathBuf,
    /// Total bytes the primary tier accepts before raising a capacity error.
    pub primary_quota: u64,
    pub secondary_quota: u64,
    /// Prefix for the URL a served website is reachable under.
    pub site_base_url: String,
    pub upload: UploadPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".sitepack"),
            primary_quota: 5 * MIB,
            secondary_quota: 1024 * MIB,
            site_base_url: "./websites".to_string(),
            upload: UploadPolicy::default(),
        }
    }
}

impl Config {
    /// Defaults, then the JSON file at `path` (if any), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SiteError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| SiteError::Config(format!("{}: {e}", path.display())))
    }

    pub fn apply_env(&mut self) {
        if let Some(root) = try_env::<PathBuf>("SITEPACK_ROOT") {
            self.root = root;
        }
        if let Some(q) = try_env::<u64>("SITEPACK_PRIMARY_QUOTA") {
            self.primary_quota = q;
        }
        if let Some(q) = try_env::<u64>("SITEPACK_SECONDARY_QUOTA") {
            self.secondary_quota = q;
        }
    }

    pub fn primary_dir(&self) -> PathBuf {
        self.root.join("primary")
    }

    pub fn secondary_dir(&self) -> PathBuf {
        self.root.join("secondary")
    }

    pub fn site_url(&self, bundle_id: &str) -> String {
        format!("{}/{bundle_id}/", self.site_base_url.trim_end_matches('/'))
    }
}

fn try_env<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => {
            info!("{key} set from environment");
            Some(v)
        }
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, ignoring");
            None
        }
    }
}
