use std::io::Write;
use std::path::{Path, PathBuf};

use sitepack_core::error::{Result, SiteError};
use sitepack_core::{
    ArchiveBlob, BundleKind, BundleStore, Config, TieredStore, WebsiteServer, export_bundle,
    load_app_file, upload_app_file, upload_website,
};

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| SiteError::Rejected(format!("{}: not a file name", path.display())))
}

pub async fn handle_upload(
    store: &TieredStore,
    cfg: &Config,
    archive: PathBuf,
    title: Option<String>,
) -> Result<()> {
    let file_name = file_name_of(&archive)?;
    let title = title.unwrap_or_else(|| {
        archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let bytes = tokio::fs::read(&archive).await?;
    let data_url = ArchiveBlob::from_bytes(bytes)
        .with_mime_type("application/zip")
        .to_data_url();

    let receipt = upload_website(store, cfg, &data_url, &title, &file_name).await?;
    eprintln!(
        "uploaded {} files to {} tier ({} bytes)",
        receipt.file_count, receipt.record.tier, receipt.record.bytes
    );
    println!("{}\t{}", receipt.bundle_id, receipt.url);
    Ok(())
}

pub async fn handle_upload_app(
    store: &TieredStore,
    cfg: &Config,
    project: String,
    file: PathBuf,
    mime: String,
) -> Result<()> {
    let name = file_name_of(&file)?;
    let bytes = tokio::fs::read(&file).await?;
    let data_url = ArchiveBlob::from_bytes(bytes)
        .with_mime_type(mime.clone())
        .to_data_url();
    let rec = upload_app_file(store, &cfg.upload, &project, &name, &mime, &data_url).await?;
    println!("{}\t{}\t{}", rec.key, rec.tier, rec.digest);
    Ok(())
}

pub async fn handle_get_app(
    store: &TieredStore,
    project: String,
    name: String,
    out: PathBuf,
) -> Result<()> {
    let Some(app) = load_app_file(store, &project, &name).await? else {
        eprintln!("no app file {name} for project {project}");
        return Ok(());
    };
    let blob = ArchiveBlob::from_data_url(&app.data_url)?;
    tokio::fs::write(&out, blob.bytes()).await?;
    eprintln!("wrote {} bytes ({}) to {}", app.size, app.mime_type, out.display());
    Ok(())
}

pub async fn handle_ls(store: &TieredStore, apps: bool) -> Result<()> {
    let kind = if apps {
        BundleKind::AppFile
    } else {
        BundleKind::Website
    };
    let entries = store.list(kind).await?;
    if entries.is_empty() {
        eprintln!("(empty)");
    }
    for (id, tier) in entries {
        println!("{id:<48} {tier}");
    }
    Ok(())
}

pub async fn handle_files(store: &TieredStore, bundle_id: String) -> Result<()> {
    let Some(bundle) = store.load(&bundle_id).await? else {
        eprintln!("bundle not found: {bundle_id}");
        return Ok(());
    };
    for (path, content) in bundle.files() {
        println!("{:>10}  {path}", content.len());
    }
    eprintln!(
        "{} files from {} (extracted {})",
        bundle.file_count(),
        bundle.source_file_name(),
        bundle.created_at()
    );
    Ok(())
}

pub async fn handle_cat(store: &TieredStore, bundle_id: String, path: String) -> Result<()> {
    let server = WebsiteServer::new(store, bundle_id);
    match server.get_file(&path).await? {
        Some(content) => {
            let mut out = std::io::stdout().lock();
            out.write_all(content.as_bytes())?;
            out.flush()?;
        }
        None => eprintln!("not found: {}:{path:?}", server.bundle_id()),
    }
    Ok(())
}

pub async fn handle_export(store: &TieredStore, bundle_id: String, dest: PathBuf) -> Result<()> {
    let Some(bundle) = store.load(&bundle_id).await? else {
        eprintln!("bundle not found: {bundle_id}");
        return Ok(());
    };
    let n = tokio::task::spawn_blocking(move || export_bundle(&bundle, &dest))
        .await
        .map_err(|e| SiteError::Io(std::io::Error::other(e)))??;
    eprintln!("export: wrote {n} files");
    Ok(())
}

pub async fn handle_rm(store: &TieredStore, id: String, app: bool) -> Result<()> {
    let kind = if app {
        BundleKind::AppFile
    } else {
        BundleKind::Website
    };
    if store.remove(kind, &id).await? {
        eprintln!("removed {}", kind.key(&id));
    } else {
        eprintln!("not found: {id}");
    }
    Ok(())
}
