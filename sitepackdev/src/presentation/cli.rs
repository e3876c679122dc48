use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "sitepack CLI: upload, store and serve static sites", long_about = None)]
pub struct Cli {
    /// JSON config file; environment and flags override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root directory (overrides config and SITEPACK_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Unpack a .zip website archive and store it under a new bundle id
    Upload {
        archive: PathBuf,
        /// Title the bundle id is derived from (defaults to the file stem)
        #[arg(long)]
        title: Option<String>,
    },

    /// Store an app/game binary for a project
    UploadApp {
        project: String,
        file: PathBuf,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },

    /// Write a stored app/game binary back to disk
    GetApp {
        project: String,
        name: String,
        out: PathBuf,
    },

    /// List stored bundles and the tier holding each
    Ls {
        /// list app files instead of websites
        #[arg(long)]
        apps: bool,
    },

    /// List the files of one bundle
    Files { bundle_id: String },

    /// Print one file of a bundle ("" or "/" serves index.html)
    Cat {
        bundle_id: String,
        #[arg(default_value = "")]
        path: String,
    },

    /// Write every file of a bundle below a directory
    Export { bundle_id: String, dest: PathBuf },

    /// Delete a bundle (or, with --app, an app file key) from both tiers
    Rm {
        id: String,
        #[arg(long)]
        app: bool,
    },
}
