pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use sitepack_core::error::Result;
use sitepack_core::{Backend, Config, open_store};
use tracing::debug;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        cfg.root = root;
    }
    let store = open_store(Backend::Fs, &cfg)?;
    debug!(root = %cfg.root.display(), "store opened");

    match cli.command {
        Commands::Upload { archive, title } => {
            handlers::handle_upload(&store, &cfg, archive, title).await
        }
        Commands::UploadApp {
            project,
            file,
            mime,
        } => handlers::handle_upload_app(&store, &cfg, project, file, mime).await,
        Commands::GetApp { project, name, out } => {
            handlers::handle_get_app(&store, project, name, out).await
        }
        Commands::Ls { apps } => handlers::handle_ls(&store, apps).await,
        Commands::Files { bundle_id } => handlers::handle_files(&store, bundle_id).await,
        Commands::Cat { bundle_id, path } => handlers::handle_cat(&store, bundle_id, path).await,
        Commands::Export { bundle_id, dest } => {
            handlers::handle_export(&store, bundle_id, dest).await
        }
        Commands::Rm { id, app } => handlers::handle_rm(&store, id, app).await,
    }
}
