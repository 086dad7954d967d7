/// Data model module
///
/// This module holds everything the browser knows about a folder of
/// photos:
/// - Single image files with lazy pixel/EXIF caches (record.rs)
/// - The folder of records and its refresh logic (folder.rs)
/// - The tabular projection used for display (table.rs)

pub mod folder;
pub mod record;
pub mod table;

pub use folder::ImageFolder;
pub use record::{is_supported, ImageRecord, SUPPORTED_EXTENSIONS};
pub use table::{MetadataTable, TableEvent, TableRow};
