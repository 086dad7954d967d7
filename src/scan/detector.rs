use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::BrowserError;
use crate::model::ImageRecord;

/// Bounding box of a detected face, in pixel coordinates of the source
/// image. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Detection confidence score.
    pub confidence: f64,
}

/// Tuning knobs for a detection pass.
///
/// Serialized to JSON with the rest of the app settings so tuned values
/// survive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectParams {
    /// Pyramid scale factor between detection scales, in (0, 1).
    pub scale_factor: f32,
    /// Sliding-window step in pixels, applied on both axes.
    pub window_step: u32,
    /// Smallest face edge considered, in pixels.
    pub min_face_size: u32,
    /// Largest face edge reported, in pixels. 0 disables the cap.
    pub max_face_size: u32,
    /// Minimum detector score for a candidate to count as a face.
    pub score_threshold: f64,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: 0.8,
            window_step: 4,
            min_face_size: 20,
            max_face_size: 0,
            score_threshold: 2.0,
        }
    }
}

impl DetectParams {
    /// Convert to JSON for settings storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON settings storage.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Pluggable face detection backend.
///
/// Implementations are stateless per call and shareable with the scan
/// worker thread. Given identical input and an identical trained model,
/// `detect` returns identical results.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale image.
    fn detect(&self, gray: &GrayImage, params: &DetectParams)
        -> Result<Vec<FaceBounds>, BrowserError>;
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
pub struct SeetaFaceDetector {
    model: rustface::Model,
}

impl SeetaFaceDetector {
    /// Load a SeetaFace model file from disk.
    pub fn from_model_file(path: &Path) -> Result<Self, BrowserError> {
        let file = File::open(path)
            .map_err(|e| BrowserError::ModelLoad(format!("{}: {e}", path.display())))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| BrowserError::ModelLoad(format!("{}: {e}", path.display())))?;
        Ok(Self { model })
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(
        &self,
        gray: &GrayImage,
        params: &DetectParams,
    ) -> Result<Vec<FaceBounds>, BrowserError> {
        let (width, height) = gray.dimensions();

        // rustface detectors are stateful across calls; building a fresh
        // one per detection keeps `&self` shareable between scans.
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(params.min_face_size);
        detector.set_score_thresh(params.score_threshold);
        detector.set_pyramid_scale_factor(params.scale_factor);
        detector.set_slide_window_step(params.window_step, params.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        let mut bounds: Vec<FaceBounds> = faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBounds {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                    confidence: face.score(),
                }
            })
            .collect();

        // The engine exposes no upper size knob, so the cap is applied
        // to its output.
        if params.max_face_size > 0 {
            bounds.retain(|b| {
                b.width <= params.max_face_size && b.height <= params.max_face_size
            });
        }
        Ok(bounds)
    }
}

/// Run the detector over a single record's pixels.
///
/// A record with no pixel data (missing file, unsupported format) reports
/// no faces without invoking the backend; a detector error propagates.
pub fn detect_record_faces(
    record: &mut ImageRecord,
    detector: &dyn FaceDetector,
    params: &DetectParams,
) -> Result<Vec<FaceBounds>, BrowserError> {
    let gray = record.pixel_data().to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Ok(Vec::new());
    }
    detector.detect(&gray, params)
}
