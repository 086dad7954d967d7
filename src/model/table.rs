use std::collections::{BTreeMap, BTreeSet};

/// Tabular projection of a folder: one row per record in record order,
/// with a filename column, a face-count column, and one column per EXIF
/// key observed anywhere in the folder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    metadata_columns: Vec<String>,
    rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub filename: String,
    /// Detected face count. `None` until a scan has reported this row.
    pub face_count: Option<usize>,
    /// Cell values aligned with [`MetadataTable::metadata_columns`];
    /// empty where the record lacks the tag.
    pub values: Vec<String>,
}

/// Change notification for a live table view: either the whole table was
/// rebuilt, or a single face-count cell was patched in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEvent {
    Rebuilt,
    FaceCountUpdated { row: usize },
}

impl MetadataTable {
    /// Build the projection from `(filename, tags)` pairs, one per
    /// record, in record order.
    pub fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, BTreeMap<String, String>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();

        let mut columns = BTreeSet::new();
        for (_, tags) in &entries {
            columns.extend(tags.keys().cloned());
        }
        let metadata_columns: Vec<String> = columns.into_iter().collect();

        let rows = entries
            .into_iter()
            .map(|(filename, mut tags)| TableRow {
                filename,
                face_count: None,
                values: metadata_columns
                    .iter()
                    .map(|column| tags.remove(column).unwrap_or_default())
                    .collect(),
            })
            .collect();

        Self {
            metadata_columns,
            rows,
        }
    }

    pub fn metadata_columns(&self) -> &[String] {
        &self.metadata_columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Patch one face-count cell in place. Returns `false` when the row
    /// does not exist.
    pub(crate) fn set_face_count(&mut self, row: usize, count: usize) -> bool {
        match self.rows.get_mut(row) {
            Some(row) => {
                row.face_count = Some(count);
                true
            }
            None => false,
        }
    }
}
