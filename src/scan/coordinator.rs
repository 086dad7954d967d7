use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};

use crate::error::BrowserError;
use crate::model::{ImageFolder, ImageRecord};
use crate::scan::detector::{detect_record_faces, DetectParams, FaceDetector};
use crate::scan::executor::BackgroundExecutor;

/// Where the current (or last) scan job stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    CancelRequested,
    Completed,
    Cancelled,
    Failed,
}

/// Messages sent from the scan worker to the interactive thread.
///
/// The worker never touches the folder. Progress reaches the table only
/// when the owner calls [`ScanCoordinator::pump`] on its own thread, so
/// the table keeps a single writer.
#[derive(Debug)]
enum ScanMessage {
    /// One record was processed; `row` indexes the snapshot taken at
    /// `start`, which equals table order.
    FaceCount { row: usize, count: usize },
    /// Every record was processed.
    Finished,
    /// Cancellation was honored; no further rows will arrive.
    Stopped,
    /// The detector failed; remaining records were abandoned.
    Failed(BrowserError),
}

/// Runs the face detector over every record of a folder on a background
/// worker, one job at a time.
///
/// `start` snapshots the folder's record paths and returns immediately.
/// The worker decodes and scans the snapshot in table order, streaming
/// one message per record; each already-published result stays applied
/// no matter how the job ends. A second `start` while a job is live is
/// rejected, never queued.
pub struct ScanCoordinator {
    state: ScanState,
    cancel: Arc<AtomicBool>,
    messages: Option<Receiver<ScanMessage>>,
    face_counts: BTreeMap<usize, usize>,
    target_count: usize,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for ScanCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            messages: None,
            face_counts: BTreeMap::new(),
            target_count: 0,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Kick off a scan of `folder` on the executor.
    ///
    /// Fails with [`BrowserError::ScanAlreadyRunning`] while a job is
    /// live; a finished job never blocks a new one.
    pub fn start(
        &mut self,
        folder: &ImageFolder,
        detector: Arc<dyn FaceDetector>,
        params: DetectParams,
        executor: &BackgroundExecutor,
    ) -> Result<(), BrowserError> {
        if !self.is_idle() {
            return Err(BrowserError::ScanAlreadyRunning);
        }

        let paths = folder.record_paths();
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));

        self.state = ScanState::Running;
        self.cancel = Arc::clone(&cancel);
        self.messages = Some(rx);
        self.face_counts.clear();
        self.target_count = paths.len();
        self.error = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;

        log::info!("scanning {} images for faces", paths.len());
        // The job is detached; completion arrives over the channel.
        let _ = executor.spawn_blocking(move || scan_worker(paths, detector, params, cancel, tx));
        Ok(())
    }

    /// Ask the running job to stop. The in-flight record finishes and is
    /// still delivered; later records are never dispatched. Results that
    /// already reached the table stay there.
    pub fn cancel(&mut self) {
        match self.state {
            ScanState::Running => {
                self.cancel.store(true, Ordering::SeqCst);
                self.state = ScanState::CancelRequested;
                log::info!("scan cancellation requested");
            }
            ScanState::CancelRequested => {}
            _ => log::debug!("cancel ignored: no scan is running"),
        }
    }

    /// Apply pending worker messages to the folder's table.
    ///
    /// Call from the thread that owns the folder. Each processed record
    /// is applied exactly once, in the order the worker produced them.
    /// Returns `true` when anything changed.
    pub fn pump(&mut self, folder: &mut ImageFolder) -> bool {
        let Some(messages) = self.messages.clone() else {
            return false;
        };

        let mut changed = false;
        while let Ok(message) = messages.try_recv() {
            changed = true;
            match message {
                ScanMessage::FaceCount { row, count } => {
                    // A refresh may have shrunk the table since the
                    // snapshot; stale rows are dropped by the folder.
                    if folder.update_face_count(row, count) {
                        self.face_counts.insert(row, count);
                    }
                }
                ScanMessage::Finished => self.finish(ScanState::Completed),
                ScanMessage::Stopped => self.finish(ScanState::Cancelled),
                ScanMessage::Failed(e) => {
                    log::error!("face scan failed: {e}");
                    self.error = Some(e.to_string());
                    self.finish(ScanState::Failed);
                }
            }
        }
        changed
    }

    fn finish(&mut self, state: ScanState) {
        self.state = state;
        self.messages = None;
        self.finished_at = Some(Utc::now());
        log::info!(
            "scan finished: {:?}, {} of {} images processed",
            state,
            self.face_counts.len(),
            self.target_count
        );
    }

    /// `true` when no scan occupies the coordinator, so a new one may
    /// start and destructive actions (closing the view, refreshing the
    /// folder) are safe.
    pub fn is_idle(&self) -> bool {
        matches!(
            self.state,
            ScanState::Idle | ScanState::Completed | ScanState::Cancelled | ScanState::Failed
        )
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Per-row face counts delivered so far for the current or last job.
    pub fn face_counts(&self) -> &BTreeMap<usize, usize> {
        &self.face_counts
    }

    /// Number of records processed so far.
    pub fn scanned_count(&self) -> usize {
        self.face_counts.len()
    }

    /// Number of records the current or last job set out to scan.
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Total faces found so far.
    pub fn faces_found(&self) -> usize {
        self.face_counts.values().sum()
    }

    /// Failure message of the last job, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Wall-clock duration of the last job once it reached a terminal
    /// state.
    pub fn last_duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// Blocking decode-and-detect loop, run on the executor.
fn scan_worker(
    paths: Vec<PathBuf>,
    detector: Arc<dyn FaceDetector>,
    params: DetectParams,
    cancel: Arc<AtomicBool>,
    tx: Sender<ScanMessage>,
) {
    for (row, path) in paths.into_iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            let _ = tx.send(ScanMessage::Stopped);
            return;
        }
        let mut record = ImageRecord::new(path);
        match detect_record_faces(&mut record, detector.as_ref(), &params) {
            Ok(faces) => {
                let count = faces.len();
                log::debug!("row {row}: {count} faces");
                if tx.send(ScanMessage::FaceCount { row, count }).is_err() {
                    // The coordinator is gone; nobody is listening.
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(ScanMessage::Failed(e));
                return;
            }
        }
    }
    let _ = tx.send(ScanMessage::Finished);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use image::GrayImage;

    use crate::scan::detector::FaceBounds;

    /// Test detector scripted with one outcome per call. An optional
    /// gate channel blocks each call until the test releases it, which
    /// pins down the ordering of cancellation races.
    struct ScriptedDetector {
        script: Vec<Result<usize, String>>,
        calls: AtomicUsize,
        gate: Option<Receiver<()>>,
    }

    impl ScriptedDetector {
        fn new(script: Vec<Result<usize, String>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(script: Vec<Result<usize, String>>, gate: Receiver<()>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                gate: Some(gate),
            }
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(
            &self,
            _gray: &GrayImage,
            _params: &DetectParams,
        ) -> Result<Vec<FaceBounds>, BrowserError> {
            if let Some(gate) = &self.gate {
                // A dropped sender releases every remaining call.
                let _ = gate.recv();
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script[call.min(self.script.len() - 1)] {
                Ok(count) => Ok(vec![
                    FaceBounds {
                        x: 0,
                        y: 0,
                        width: 10,
                        height: 10,
                        confidence: 1.0,
                    };
                    *count
                ]),
                Err(message) => Err(BrowserError::Detection(message.clone())),
            }
        }
    }

    fn image_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            let img = image::RgbImage::from_pixel(8, 8, image::Rgb([120, 100, 80]));
            img.save(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn pump_until_idle(coordinator: &mut ScanCoordinator, folder: &mut ImageFolder) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !coordinator.is_idle() {
            assert!(Instant::now() < deadline, "scan did not settle in time");
            coordinator.pump(folder);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn pump_until(
        coordinator: &mut ScanCoordinator,
        folder: &mut ImageFolder,
        predicate: impl Fn(&ImageFolder) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate(folder) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            coordinator.pump(folder);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn face_count(folder: &ImageFolder, row: usize) -> Option<usize> {
        folder.table().rows()[row].face_count
    }

    #[test]
    fn scan_fills_every_row_and_completes() {
        let dir = image_dir(&["a.png", "b.png"]);
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        folder.take_events();
        let executor = BackgroundExecutor::new().unwrap();
        let detector = Arc::new(ScriptedDetector::new(vec![Ok(2), Ok(0)]));

        let mut coordinator = ScanCoordinator::new();
        assert!(coordinator.is_idle());
        coordinator
            .start(&folder, detector, DetectParams::default(), &executor)
            .unwrap();
        assert!(!coordinator.is_idle());
        assert_eq!(coordinator.state(), ScanState::Running);

        pump_until_idle(&mut coordinator, &mut folder);

        assert_eq!(coordinator.state(), ScanState::Completed);
        assert_eq!(face_count(&folder, 0), Some(2));
        assert_eq!(face_count(&folder, 1), Some(0));
        assert_eq!(coordinator.faces_found(), 2);
        assert_eq!(coordinator.scanned_count(), 2);
        assert!(coordinator.last_duration().is_some());

        // Rows were patched in order, exactly once each.
        assert_eq!(
            folder.take_events(),
            [
                crate::model::TableEvent::FaceCountUpdated { row: 0 },
                crate::model::TableEvent::FaceCountUpdated { row: 1 },
            ]
        );
        executor.shutdown();
    }

    #[test]
    fn empty_folder_completes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        let executor = BackgroundExecutor::new().unwrap();
        let detector = Arc::new(ScriptedDetector::new(vec![Ok(0)]));

        let mut coordinator = ScanCoordinator::new();
        coordinator
            .start(&folder, detector, DetectParams::default(), &executor)
            .unwrap();
        pump_until_idle(&mut coordinator, &mut folder);

        assert_eq!(coordinator.state(), ScanState::Completed);
        assert_eq!(coordinator.scanned_count(), 0);
        executor.shutdown();
    }

    #[test]
    fn second_start_is_rejected_and_leaves_the_job_alone() {
        let dir = image_dir(&["a.png", "b.png"]);
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        let executor = BackgroundExecutor::new().unwrap();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let detector = Arc::new(ScriptedDetector::gated(vec![Ok(1), Ok(3)], gate_rx));

        let mut coordinator = ScanCoordinator::new();
        coordinator
            .start(&folder, Arc::clone(&detector) as Arc<dyn FaceDetector>, DetectParams::default(), &executor)
            .unwrap();

        let err = coordinator
            .start(&folder, detector, DetectParams::default(), &executor)
            .unwrap_err();
        assert!(matches!(err, BrowserError::ScanAlreadyRunning));

        // Release the worker; the original job still runs to completion.
        drop(gate_tx);
        pump_until_idle(&mut coordinator, &mut folder);
        assert_eq!(coordinator.state(), ScanState::Completed);
        assert_eq!(face_count(&folder, 0), Some(1));
        assert_eq!(face_count(&folder, 1), Some(3));
        executor.shutdown();
    }

    #[test]
    fn cancel_stops_after_the_inflight_record() {
        let dir = image_dir(&["a.png", "b.png", "c.png"]);
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        let executor = BackgroundExecutor::new().unwrap();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let detector = Arc::new(ScriptedDetector::gated(vec![Ok(1), Ok(1), Ok(1)], gate_rx));

        let mut coordinator = ScanCoordinator::new();
        coordinator
            .start(&folder, detector, DetectParams::default(), &executor)
            .unwrap();

        // Let the first record through and wait for its result.
        gate_tx.send(()).unwrap();
        pump_until(&mut coordinator, &mut folder, |f| {
            f.table().rows()[0].face_count.is_some()
        });

        // Cancel while the second record is (at most) in flight, then
        // release everything.
        coordinator.cancel();
        assert_eq!(coordinator.state(), ScanState::CancelRequested);
        assert!(!coordinator.is_idle());
        drop(gate_tx);

        pump_until_idle(&mut coordinator, &mut folder);
        assert_eq!(coordinator.state(), ScanState::Cancelled);
        assert!(coordinator.is_idle());

        // The third record was never dispatched: the cancel flag was set
        // while the second was still gated.
        assert_eq!(face_count(&folder, 2), None);

        // No further updates arrive after the terminal state.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!coordinator.pump(&mut folder));
        assert_eq!(face_count(&folder, 2), None);
        executor.shutdown();
    }

    #[test]
    fn cancel_before_any_scan_is_a_no_op() {
        let mut coordinator = ScanCoordinator::new();
        coordinator.cancel();
        assert_eq!(coordinator.state(), ScanState::Idle);
        assert!(coordinator.is_idle());
    }

    #[test]
    fn detector_failure_keeps_earlier_rows_and_fails_the_job() {
        let dir = image_dir(&["a.png", "b.png", "c.png"]);
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        let executor = BackgroundExecutor::new().unwrap();
        let detector = Arc::new(ScriptedDetector::new(vec![
            Ok(4),
            Err("cascade exploded".to_string()),
            Ok(1),
        ]));

        let mut coordinator = ScanCoordinator::new();
        coordinator
            .start(&folder, detector, DetectParams::default(), &executor)
            .unwrap();
        pump_until_idle(&mut coordinator, &mut folder);

        assert_eq!(coordinator.state(), ScanState::Failed);
        assert_eq!(face_count(&folder, 0), Some(4));
        assert_eq!(face_count(&folder, 1), None);
        assert_eq!(face_count(&folder, 2), None);
        assert!(coordinator.last_error().unwrap().contains("cascade exploded"));
        executor.shutdown();
    }

    #[test]
    fn a_finished_job_does_not_block_the_next_one() {
        let dir = image_dir(&["a.png"]);
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        let executor = BackgroundExecutor::new().unwrap();

        let mut coordinator = ScanCoordinator::new();
        coordinator
            .start(
                &folder,
                Arc::new(ScriptedDetector::new(vec![Ok(1)])),
                DetectParams::default(),
                &executor,
            )
            .unwrap();
        pump_until_idle(&mut coordinator, &mut folder);
        assert_eq!(coordinator.state(), ScanState::Completed);

        coordinator
            .start(
                &folder,
                Arc::new(ScriptedDetector::new(vec![Ok(5)])),
                DetectParams::default(),
                &executor,
            )
            .unwrap();
        pump_until_idle(&mut coordinator, &mut folder);
        assert_eq!(coordinator.state(), ScanState::Completed);
        assert_eq!(face_count(&folder, 0), Some(5));
        assert_eq!(coordinator.faces_found(), 5);
        executor.shutdown();
    }

    #[test]
    fn results_for_rows_lost_to_a_refresh_are_dropped() {
        let dir = image_dir(&["a.png", "b.png"]);
        let mut folder = ImageFolder::open(dir.path()).unwrap();
        let executor = BackgroundExecutor::new().unwrap();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let detector = Arc::new(ScriptedDetector::gated(vec![Ok(2), Ok(2)], gate_rx));

        let mut coordinator = ScanCoordinator::new();
        coordinator
            .start(&folder, detector, DetectParams::default(), &executor)
            .unwrap();

        // The folder shrinks to one row while the job holds a two-row
        // snapshot.
        std::fs::remove_file(dir.path().join("b.png")).unwrap();
        folder.refresh();
        assert_eq!(folder.table().len(), 1);

        drop(gate_tx);
        pump_until_idle(&mut coordinator, &mut folder);

        assert_eq!(coordinator.state(), ScanState::Completed);
        assert_eq!(face_count(&folder, 0), Some(2));
        // Only the surviving row was recorded.
        assert_eq!(coordinator.scanned_count(), 1);
        executor.shutdown();
    }
}
