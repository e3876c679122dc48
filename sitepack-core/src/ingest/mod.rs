//! Archive ingestion: data URL -> bytes -> in-memory [`FileBundle`](crate::domain::FileBundle).

pub mod bundle_id;
pub mod dataurl;
pub mod unpack;

pub use bundle_id::generate_bundle_id;
pub use dataurl::ArchiveBlob;
pub use unpack::{IngestProgress, unpack, unpack_blocking, unpack_with_progress};
