//! Zip container encoding for dataset archives.
//!
//! # Responsibility
//! - Write a snapshot as `data.json` plus one `photos/` entry per photo.
//! - Open containers and hand back the parsed document and raw assets.
//!
//! # Invariants
//! - Exported student documents drop their inline photo only when the photo
//!   was written as a binary entry; everything else stays inline.
//! - A binary entry always decodes back to the photo it replaced.
//! - Opening never touches the store.

use super::document::{
    snapshot, ArchiveDocument, ARCHIVE_FORMAT, ARCHIVE_VERSION, DOCUMENT_ENTRY, PHOTOS_DIR,
};
use super::photo::{
    decode_entry, entry_name, extension_for_mime, is_entry_safe, parse_data_url,
};
use super::{ArchiveError, ArchiveResult};
use crate::db::Store;
use crate::model::roster::Student;
use log::{info, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::Instant;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// What one export wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub classrooms: usize,
    pub students: usize,
    pub sessions: usize,
    /// Photos written as binary entries.
    pub photo_entries: usize,
    /// Photos left inline in the document.
    pub inline_photos: usize,
}

/// Binary entry read from the container's photo directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAsset {
    pub entry_name: String,
    pub bytes: Vec<u8>,
}

/// Fully read container contents.
#[derive(Debug, Clone)]
pub struct UnpackedArchive {
    pub document: ArchiveDocument,
    pub assets: Vec<RawAsset>,
}

/// Opened archive container.
pub struct Container<R: Read + Seek> {
    zip: ZipArchive<R>,
}

/// Snapshots `store` and writes it as an archive into `writer`.
pub fn export_archive<W: Write + Seek>(store: &Store, writer: W) -> ArchiveResult<ExportSummary> {
    let started_at = Instant::now();
    let result = write_archive(store, writer);
    match &result {
        Ok(summary) => info!(
            "event=archive_export module=archive status=ok students={} sessions={} photo_entries={} inline_photos={} duration_ms={}",
            summary.students,
            summary.sessions,
            summary.photo_entries,
            summary.inline_photos,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=archive_export module=archive status=error error_code={} error={}",
            err.code(),
            err
        ),
    }
    result
}

/// Writes an archive file at `path`, creating parent directories.
pub fn export_to_path(store: &Store, path: &Path) -> ArchiveResult<ExportSummary> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    export_archive(store, file)
}

/// Opens a zip container; anything that is not a zip is a format error.
pub fn open_container<R: Read + Seek>(reader: R) -> ArchiveResult<Container<R>> {
    let zip = ZipArchive::new(reader)
        .map_err(|err| ArchiveError::Format(format!("not a zip container: {err}")))?;
    Ok(Container { zip })
}

/// Opens a container and reads its document and every photo entry.
pub fn unpack_archive<R: Read + Seek>(reader: R) -> ArchiveResult<UnpackedArchive> {
    let mut container = open_container(reader)?;
    let document = container.read_document()?;
    let assets = container.read_assets()?;
    Ok(UnpackedArchive { document, assets })
}

impl<R: Read + Seek> Container<R> {
    /// Reads and validates `data.json`.
    pub fn read_document(&mut self) -> ArchiveResult<ArchiveDocument> {
        let mut text = String::new();
        match self.zip.by_name(DOCUMENT_ENTRY) {
            Ok(mut entry) => {
                entry.read_to_string(&mut text).map_err(|err| {
                    ArchiveError::Format(format!("{DOCUMENT_ENTRY} is unreadable: {err}"))
                })?;
            }
            Err(ZipError::FileNotFound) => {
                return Err(ArchiveError::Format(format!("missing {DOCUMENT_ENTRY}")));
            }
            Err(err) => {
                return Err(ArchiveError::Format(format!(
                    "{DOCUMENT_ENTRY} is unreadable: {err}"
                )));
            }
        }

        let document: ArchiveDocument = serde_json::from_str(&text).map_err(|err| {
            ArchiveError::Format(format!("{DOCUMENT_ENTRY} is not a valid document: {err}"))
        })?;
        validate_header(&document)?;
        if let Some(collection) = document.first_keyless_collection() {
            return Err(ArchiveError::Format(format!(
                "{collection} holds a record without an id"
            )));
        }
        Ok(document)
    }

    /// Reads every file entry under `photos/`.
    pub fn read_assets(&mut self) -> ArchiveResult<Vec<RawAsset>> {
        let mut assets = Vec::new();
        for index in 0..self.zip.len() {
            let mut entry = self.zip.by_index(index).map_err(|err| ArchiveError::AssetDecode {
                entry: format!("#{index}"),
                reason: err.to_string(),
            })?;
            if entry.is_dir() || !entry.name().starts_with(PHOTOS_DIR) {
                continue;
            }
            let entry_name = entry.name().to_string();
            // The declared size comes from the archive; do not trust it.
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|err| ArchiveError::AssetDecode {
                    entry: entry_name.clone(),
                    reason: err.to_string(),
                })?;
            assets.push(RawAsset { entry_name, bytes });
        }
        Ok(assets)
    }
}

fn validate_header(document: &ArchiveDocument) -> ArchiveResult<()> {
    if let Some(format) = document.format.as_deref() {
        if format != ARCHIVE_FORMAT {
            return Err(ArchiveError::Format(format!(
                "unsupported archive format: {format}"
            )));
        }
    }
    if let Some(version) = document.version {
        if version > ARCHIVE_VERSION {
            return Err(ArchiveError::Format(format!(
                "archive version {version} is newer than supported version {ARCHIVE_VERSION}"
            )));
        }
    }
    Ok(())
}

fn write_archive<W: Write + Seek>(store: &Store, writer: W) -> ArchiveResult<ExportSummary> {
    let mut document = snapshot(store)?;
    let (photos, inline_photos) = extract_photos(&mut document.students);

    let mut zip = ZipWriter::new(writer);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let body = serde_json::to_vec_pretty(&document)
        .map_err(|err| ArchiveError::Format(format!("failed to encode document: {err}")))?;
    zip.start_file(DOCUMENT_ENTRY, opts).map_err(zip_io)?;
    zip.write_all(&body)?;

    // Image bytes are already compressed.
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in &photos {
        zip.start_file(name.as_str(), stored).map_err(zip_io)?;
        zip.write_all(bytes)?;
    }
    zip.finish().map_err(zip_io)?;

    Ok(ExportSummary {
        classrooms: document.classrooms.len(),
        students: document.students.len(),
        sessions: document.sessions.len(),
        photo_entries: photos.len(),
        inline_photos,
    })
}

/// Moves photos of students with a usable national id out of the document.
///
/// A photo becomes a binary entry only when decoding that entry on import
/// yields the exact same data URL. Returns the binary entries and how many
/// photos stayed inline.
fn extract_photos(students: &mut [Student]) -> (Vec<(String, Vec<u8>)>, usize) {
    let mut entries = Vec::new();
    let mut used = HashSet::new();
    let mut inline = 0;

    for student in students.iter_mut() {
        let Some(photo) = student.photo.as_deref() else {
            continue;
        };
        let target = student
            .national_id
            .as_deref()
            .filter(|id| is_entry_safe(id) && !used.contains(*id))
            .and_then(|id| {
                let parsed = parse_data_url(photo)?;
                let extension = extension_for_mime(&parsed.mime)?;
                let name = entry_name(id, extension);
                match decode_entry(&name, &parsed.bytes) {
                    Ok((_, restored)) if restored == photo => {
                        Some((id.to_string(), name, parsed.bytes))
                    }
                    _ => None,
                }
            });

        match target {
            Some((id, name, bytes)) => {
                used.insert(id);
                entries.push((name, bytes));
                student.photo = None;
            }
            None => inline += 1,
        }
    }
    (entries, inline)
}

fn zip_io(err: ZipError) -> ArchiveError {
    match err {
        ZipError::Io(err) => ArchiveError::Io(err),
        other => ArchiveError::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
    }
}
