//! Zip archive entries as record sources.

use super::LineSource;
use crate::error::{Result, SourceError};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use tracing::{error, info};
use zip::result::ZipError;
use zip::ZipArchive;

/// Open the entry `entry_name` inside the zip archive at `container`.
///
/// The entry is decompressed into an anonymous temporary file and served
/// line by line from there, so memory use does not grow with entry size.
///
/// # Errors
/// - `SourceError::ArchiveOpen` if the archive is missing or not a zip file
/// - `SourceError::EntryNotFound` if the archive has no such entry
/// - `SourceError::Read` if decompression or the spill file fails
pub fn open_named_entry(container: &Path, entry_name: &str) -> Result<LineSource> {
    let archive_open = |message: String| SourceError::ArchiveOpen {
        path: container.display().to_string(),
        message,
    };

    let file = File::open(container).map_err(|e| {
        error!(path = %container.display(), error = %e, "Could not open archive");
        archive_open(e.to_string())
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        error!(path = %container.display(), error = %e, "Not a readable zip archive");
        archive_open(e.to_string())
    })?;
    info!(path = %container.display(), entries = archive.len(), "Archive opened");

    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            error!(path = %container.display(), entry = %entry_name, "Entry not found in archive");
            return Err(SourceError::EntryNotFound {
                container: container.display().to_string(),
                entry: entry_name.to_string(),
            }
            .into());
        }
        Err(e) => return Err(SourceError::from(e).into()),
    };

    let read_error = |e: std::io::Error| {
        error!(entry = %entry_name, error = %e, "Could not decompress entry");
        SourceError::Read(format!("{entry_name}: {e}"))
    };

    let mut spill = tempfile::tempfile().map_err(read_error)?;
    let bytes = std::io::copy(&mut entry, &mut spill).map_err(read_error)?;
    spill.seek(SeekFrom::Start(0)).map_err(read_error)?;
    info!(entry = %entry_name, bytes, "Entry opened");

    Ok(LineSource::new(
        BufReader::new(spill),
        format!("{}!{}", container.display(), entry_name),
    ))
}
