use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use exif::In;
use image::DynamicImage;

use crate::error::BrowserError;

/// File extensions the browser knows how to decode (case-insensitive).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Returns `true` if `path` names a file the browser can decode.
pub fn is_supported(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// One image file: its path plus pixel data and EXIF metadata derived
/// from it.
///
/// Both derived values are computed on first access and cached until the
/// path is reassigned. A record pointing at an empty path, an
/// unsupported extension, or a file that fails to decode yields an empty
/// (0x0) image and an empty metadata map rather than an error.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    path: PathBuf,
    pixels: Option<DynamicImage>,
    metadata: Option<BTreeMap<String, String>>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pixels: None,
            metadata: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filename portion of the path, for table display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Point the record at a different file. Drops both caches.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
        self.pixels = None;
        self.metadata = None;
    }

    /// Decoded pixel data for the current path.
    pub fn pixel_data(&mut self) -> &DynamicImage {
        let path = &self.path;
        self.pixels.get_or_insert_with(|| {
            decode_pixels(path).unwrap_or_else(|e| {
                log::debug!("no pixel data for {}: {e}", path.display());
                DynamicImage::new_rgb8(0, 0)
            })
        })
    }

    /// EXIF tags for the current path, keyed by tag name.
    pub fn metadata(&mut self) -> &BTreeMap<String, String> {
        let path = &self.path;
        self.metadata.get_or_insert_with(|| {
            read_exif_tags(path).unwrap_or_else(|e| {
                log::debug!("no EXIF metadata for {}: {e}", path.display());
                BTreeMap::new()
            })
        })
    }
}

fn decode_pixels(path: &Path) -> Result<DynamicImage, BrowserError> {
    if !is_supported(path) {
        return Err(BrowserError::UnsupportedFormat(path.to_path_buf()));
    }
    image::open(path).map_err(|e| BrowserError::Decode(e.to_string()))
}

fn read_exif_tags(path: &Path) -> Result<BTreeMap<String, String>, BrowserError> {
    if !is_supported(path) {
        return Err(BrowserError::UnsupportedFormat(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| BrowserError::Decode(e.to_string()))?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| BrowserError::Decode(e.to_string()))?;

    let mut tags = BTreeMap::new();
    for field in exif.fields() {
        // Thumbnail IFD repeats primary tags with thumbnail values.
        if field.ifd_num != In::PRIMARY {
            continue;
        }
        tags.insert(
            field.tag.to_string(),
            field.display_value().with_unit(&exif).to_string(),
        );
    }
    Ok(tags)
}
