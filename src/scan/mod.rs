/// Background face scanning module
///
/// This module runs the face detector over a folder without blocking
/// the interactive thread:
/// - The detector boundary and tuning parameters (detector.rs)
/// - The explicitly owned execution context (executor.rs)
/// - The one-job-at-a-time scan state machine (coordinator.rs)

pub mod coordinator;
pub mod detector;
pub mod executor;

pub use coordinator::{ScanCoordinator, ScanState};
pub use detector::{detect_record_faces, DetectParams, FaceBounds, FaceDetector, SeetaFaceDetector};
pub use executor::BackgroundExecutor;
