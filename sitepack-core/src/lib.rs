#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod ingest;
pub mod policy;
pub mod resolve;
pub mod store;
pub mod store_factory;
pub mod tier;
pub mod upload;

// Re-exports: stable API surface
pub use config::Config;
pub use domain::{AppFile, BundleKind, FileBundle, StorageRecord, Tier};
pub use error::{Remediation, Result, SiteError};
pub use export::export_bundle;
pub use ingest::{ArchiveBlob, IngestProgress, generate_bundle_id, unpack, unpack_with_progress};
pub use resolve::{WebsiteServer, resolve};
pub use store::{BundleStore, StoreEvent, TieredStore};
pub use store_factory::{Backend, open_store};
pub use upload::{UploadReceipt, load_app_file, upload_app_file, upload_website};
