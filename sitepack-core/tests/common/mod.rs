use std::io::{Cursor, Write};

use sitepack_core::ArchiveBlob;
use zip::write::SimpleFileOptions;

/// Build a zip in memory. Entries ending in `/` become directories.
pub fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();
    for (name, body) in entries {
        if name.ends_with('/') {
            w.add_directory(*name, opts).unwrap();
        } else {
            w.start_file(*name, opts).unwrap();
            w.write_all(body.as_bytes()).unwrap();
        }
    }
    w.finish().unwrap().into_inner()
}

pub fn zip_data_url(entries: &[(&str, &str)]) -> String {
    ArchiveBlob::from_bytes(zip_of(entries))
        .with_mime_type("application/zip")
        .to_data_url()
}
