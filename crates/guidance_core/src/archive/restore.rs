//! Archive import pipeline.
//!
//! # Responsibility
//! - Read a container, decode its photo assets concurrently, reconcile the
//!   archived settings and replace the live dataset.
//! - Report progress through a caller-supplied callback.
//!
//! # Invariants
//! - The store is untouched until every stage before commit succeeded.
//! - The commit clears and refills every collection in one transaction.
//! - Stages are reported in order, each once, after they complete.

use super::codec::{open_container, RawAsset};
use super::document::ArchiveDocument;
use super::photo::decode_entry;
use super::reconcile::{reconcile, ReconciledDataset};
use super::{ArchiveError, ArchiveResult};
use crate::db::{Collection, Record, Store, StoreResult, Tx};
use crate::model::settings::AppSettings;
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;
use std::time::Instant;

/// Import pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    ReadContainer,
    ParseDocument,
    DecodeAssets,
    Reconcile,
    Commit,
}

impl ImportStage {
    pub const ALL: [ImportStage; 5] = [
        Self::ReadContainer,
        Self::ParseDocument,
        Self::DecodeAssets,
        Self::Reconcile,
        Self::Commit,
    ];

    /// Overall completion once this stage has finished.
    pub fn percent(self) -> u8 {
        match self {
            Self::ReadContainer => 10,
            Self::ParseDocument => 30,
            Self::DecodeAssets => 55,
            Self::Reconcile => 80,
            Self::Commit => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadContainer => "read_container",
            Self::ParseDocument => "parse_document",
            Self::DecodeAssets => "decode_assets",
            Self::Reconcile => "reconcile",
            Self::Commit => "commit",
        }
    }
}

/// What one import committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub classrooms: usize,
    pub students: usize,
    pub sessions: usize,
    pub session_types: usize,
    pub flags: usize,
    pub assets_decoded: usize,
    pub photos_restored: usize,
    pub working_days_restored: bool,
}

/// Replaces the dataset in `store` with the archive read from `reader`.
///
/// `defaults` are the running settings that archived settings are merged
/// onto. `progress` receives each completed stage with its percentage.
pub fn import_archive<R, P>(
    store: &Store,
    reader: R,
    defaults: &AppSettings,
    mut progress: P,
) -> ArchiveResult<ImportSummary>
where
    R: Read + Seek,
    P: FnMut(ImportStage, u8),
{
    let started_at = Instant::now();
    let mut completed: Option<ImportStage> = None;
    let result = run_import(store, reader, defaults, |done| {
        completed = Some(done);
        info!(
            "event=archive_import module=archive status=ok stage={} percent={}",
            done.name(),
            done.percent()
        );
        progress(done, done.percent());
    });

    match &result {
        Ok(summary) => info!(
            "event=archive_import module=archive status=ok stage=done students={} sessions={} photos={} duration_ms={}",
            summary.students,
            summary.sessions,
            summary.photos_restored,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=archive_import module=archive status=error after_stage={} error_code={} error={}",
            completed.map_or("none", ImportStage::name),
            err.code(),
            err
        ),
    }
    result
}

/// Imports the archive file at `path`.
pub fn import_from_path<P>(
    store: &Store,
    path: &Path,
    defaults: &AppSettings,
    progress: P,
) -> ArchiveResult<ImportSummary>
where
    P: FnMut(ImportStage, u8),
{
    let file = File::open(path)?;
    import_archive(store, BufReader::new(file), defaults, progress)
}

fn run_import<R, F>(
    store: &Store,
    reader: R,
    defaults: &AppSettings,
    mut report: F,
) -> ArchiveResult<ImportSummary>
where
    R: Read + Seek,
    F: FnMut(ImportStage),
{
    let mut container = open_container(reader)?;
    let raw_assets = container.read_assets()?;
    report(ImportStage::ReadContainer);

    let document = container.read_document()?;
    report(ImportStage::ParseDocument);

    let assets = decode_assets(&raw_assets)?;
    report(ImportStage::DecodeAssets);

    let dataset = reconcile(document, &assets, defaults)?;
    report(ImportStage::Reconcile);

    store.transaction(&Collection::ALL, |tx| commit(tx, &dataset))?;
    report(ImportStage::Commit);

    Ok(summarize(&dataset, assets.len()))
}

/// Decodes photo entries on scoped worker threads.
///
/// Returns data URLs keyed by identifier. When several entries share an
/// identifier the first one in container order wins. The first failing
/// entry in container order is reported.
fn decode_assets(assets: &[RawAsset]) -> ArchiveResult<HashMap<String, String>> {
    if assets.is_empty() {
        return Ok(HashMap::new());
    }
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(assets.len());
    let chunk_size = assets.len().div_ceil(workers);

    let chunks: Vec<ArchiveResult<Vec<(String, String)>>> = thread::scope(|scope| {
        let handles: Vec<_> = assets
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|asset| decode_entry(&asset.entry_name, &asset.bytes))
                        .collect::<ArchiveResult<Vec<_>>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(ArchiveError::AssetDecode {
                        entry: "<worker>".to_string(),
                        reason: "decoder thread panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut decoded = HashMap::with_capacity(assets.len());
    for chunk in chunks {
        for (identifier, data_url) in chunk? {
            decoded.entry(identifier).or_insert(data_url);
        }
    }
    Ok(decoded)
}

fn commit(tx: &mut Tx<'_>, dataset: &ReconciledDataset) -> StoreResult<()> {
    for collection in Collection::ALL {
        tx.clear(collection)?;
    }

    let document = &dataset.document;
    put_all(tx, &document.classrooms)?;
    put_all(tx, &document.students)?;
    put_all(tx, &document.sessions)?;
    put_all(tx, &document.session_types)?;
    put_all(tx, &document.special_student_info)?;
    put_all(tx, &document.counseling_needed_info)?;

    tx.put_singleton(&dataset.settings)?;
    if let Some(working_days) = &document.working_days {
        tx.put_singleton(working_days)?;
    }
    Ok(())
}

fn put_all<R: Record>(tx: &mut Tx<'_>, records: &[R]) -> StoreResult<()> {
    for record in records {
        tx.put(record)?;
    }
    Ok(())
}

fn summarize(dataset: &ReconciledDataset, assets_decoded: usize) -> ImportSummary {
    let document: &ArchiveDocument = &dataset.document;
    ImportSummary {
        classrooms: document.classrooms.len(),
        students: document.students.len(),
        sessions: document.sessions.len(),
        session_types: document.session_types.len(),
        flags: document.special_student_info.len() + document.counseling_needed_info.len(),
        assets_decoded,
        photos_restored: dataset.photos_restored,
        working_days_restored: document.working_days.is_some(),
    }
}
