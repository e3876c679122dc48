//! Serving files out of a stored bundle.

use tracing::debug;

use crate::domain::FileBundle;
use crate::error::Result;
use crate::store::BundleStore;

const INDEX_CANDIDATES: [&str; 2] = ["index.html", "./index.html"];

/// Content for `path`, by exact key. The site root (`""`, `"/"`, `"./"`)
/// falls back to `index.html`, then `./index.html`.
pub fn resolve<'a>(bundle: &'a FileBundle, path: &str) -> Option<&'a str> {
    if let Some(content) = bundle.get(path) {
        return Some(content);
    }
    if matches!(path, "" | "/" | "./") {
        return INDEX_CANDIDATES.iter().find_map(|p| bundle.get(p));
    }
    None
}

/// A website bound to one bundle id. Every call reloads the bundle, so a
/// re-upload under the same id is visible immediately.
pub struct WebsiteServer<'a, S: BundleStore + ?Sized> {
    store: &'a S,
    bundle_id: String,
}

impl<'a, S: BundleStore + ?Sized> WebsiteServer<'a, S> {
    pub fn new(store: &'a S, bundle_id: impl Into<String>) -> Self {
        Self {
            store,
            bundle_id: bundle_id.into(),
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub async fn get_file(&self, path: &str) -> Result<Option<String>> {
        let Some(bundle) = self.store.load(&self.bundle_id).await? else {
            debug!(bundle_id = %self.bundle_id, "bundle not found");
            return Ok(None);
        };
        Ok(resolve(&bundle, path).map(str::to_string))
    }

    /// Empty when the bundle does not exist.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .load(&self.bundle_id)
            .await?
            .map(|b| b.paths().map(str::to_string).collect())
            .unwrap_or_default())
    }
}
