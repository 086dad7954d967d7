use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::record::{is_supported, ImageRecord};
use super::table::{MetadataTable, TableEvent};
use crate::error::BrowserError;

/// A folder of images and the metadata table projected from it.
///
/// The record list and the table are derived from `directory`: both are
/// rebuilt by [`refresh`](Self::refresh), which also runs when the
/// directory is reassigned. Scan results are patched into the table in
/// place, without a rebuild, so a live view can repaint a single row.
///
/// The folder is not safe for concurrent writers. Scan results reach it
/// only through [`update_face_count`](Self::update_face_count) on the
/// thread that owns it.
#[derive(Debug)]
pub struct ImageFolder {
    directory: PathBuf,
    records: Vec<ImageRecord>,
    table: MetadataTable,
    events: VecDeque<TableEvent>,
}

impl ImageFolder {
    /// Open a folder. Fails unless `directory` names an existing
    /// directory.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, BrowserError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(BrowserError::InvalidDirectory(directory));
        }
        let mut folder = Self {
            directory,
            records: Vec::new(),
            table: MetadataTable::default(),
            events: VecDeque::new(),
        };
        folder.refresh();
        Ok(folder)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Point the folder somewhere else. Re-lists and rebuilds the table.
    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) -> Result<(), BrowserError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(BrowserError::InvalidDirectory(directory));
        }
        self.directory = directory;
        self.refresh();
        Ok(())
    }

    /// Re-list supported files directly inside the directory (no
    /// recursion) and rebuild the table. Unreadable entries are skipped.
    pub fn refresh(&mut self) {
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_supported(path))
            .collect();
        // Listing order is filesystem-dependent; sort so the row order
        // is stable across refreshes.
        paths.sort();

        self.records = paths.into_iter().map(ImageRecord::new).collect();
        self.rebuild_table();
        log::info!(
            "{}: listed {} images",
            self.directory.display(),
            self.records.len()
        );
    }

    fn rebuild_table(&mut self) {
        let entries: Vec<_> = self
            .records
            .iter_mut()
            .map(|record| (record.file_name(), record.metadata().clone()))
            .collect();
        self.table = MetadataTable::build(entries);
        self.events.push_back(TableEvent::Rebuilt);
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn record_mut(&mut self, index: usize) -> Option<&mut ImageRecord> {
        self.records.get_mut(index)
    }

    pub fn table(&self) -> &MetadataTable {
        &self.table
    }

    /// Paths of the current records, in table order. Scans snapshot this
    /// so a refresh mid-job cannot shift what the worker iterates.
    pub fn record_paths(&self) -> Vec<PathBuf> {
        self.records
            .iter()
            .map(|record| record.path().to_path_buf())
            .collect()
    }

    /// Patch one face-count cell. Returns `false` when the row no longer
    /// exists, which can happen when a scan snapshot outlives a refresh.
    pub fn update_face_count(&mut self, row: usize, count: usize) -> bool {
        let updated = self.table.set_face_count(row, count);
        if updated {
            self.events.push_back(TableEvent::FaceCountUpdated { row });
        } else {
            log::warn!("dropping face count for vanished row {row}");
        }
        updated
    }

    /// Drain pending table-change notifications, oldest first.
    pub fn take_events(&mut self) -> Vec<TableEvent> {
        self.events.drain(..).collect()
    }
}
