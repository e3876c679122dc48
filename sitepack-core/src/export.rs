use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::domain::FileBundle;
use crate::error::{Result, SiteError};

/// Write every file of `bundle` below `dest`. Returns the number written.
pub fn export_bundle(bundle: &FileBundle, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let mut written = 0;
    for (rel, content) in bundle.files() {
        let out = safe_join(dest, rel)?;
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out, content)?;
        debug!(path = %rel, bytes = content.len(), "exported");
        written += 1;
    }
    info!(bundle_id = bundle.bundle_id(), files = written, dest = %dest.display(), "export done");
    Ok(written)
}

/// Archive paths come from untrusted uploads; keep them under `root`.
fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);
    let mut out = root.to_path_buf();
    for comp in p.components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SiteError::Rejected(format!("unsafe path: {rel}")));
            }
        }
    }
    if out == root {
        return Err(SiteError::Rejected(format!("empty path: {rel:?}")));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use time::OffsetDateTime;

    fn bundle(files: &[(&str, &str)]) -> FileBundle {
        let files: BTreeMap<String, String> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        FileBundle::new("site-1", "site.zip", files, OffsetDateTime::now_utc())
    }

    #[test]
    fn writes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle(&[("index.html", "home"), ("./css/a.css", "a{}")]);
        assert_eq!(export_bundle(&b, dir.path()).unwrap(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("index.html")).unwrap(), "home");
        assert_eq!(fs::read_to_string(dir.path().join("css/a.css")).unwrap(), "a{}");
    }

    #[test]
    fn refuses_to_escape_dest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        let b = bundle(&[("../evil.txt", "x")]);
        assert!(matches!(export_bundle(&b, &dest), Err(SiteError::Rejected(_))));
        assert!(!dir.path().join("evil.txt").exists());
        assert!(safe_join(&dest, "a/../../b").is_err());
        assert!(safe_join(&dest, ".").is_err());
    }
}
