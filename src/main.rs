use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use iced::widget::{button, column, container, row, scrollable, text, Column, Row};
use iced::{Alignment, Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;

use face_browser::config::AppConfig;
use face_browser::model::{ImageFolder, MetadataTable};
use face_browser::scan::{
    BackgroundExecutor, DetectParams, FaceDetector, ScanCoordinator, ScanState, SeetaFaceDetector,
};

const FILE_COL_WIDTH: f32 = 220.0;
const FACES_COL_WIDTH: f32 = 70.0;
const META_COL_WIDTH: f32 = 170.0;

/// How often scan progress is pumped into the table while a job is live.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Main application state
struct FaceBrowser {
    /// The folder currently being browsed, if any
    folder: Option<ImageFolder>,
    /// The background scan state machine
    coordinator: ScanCoordinator,
    /// Owned execution context for scan jobs
    executor: Option<BackgroundExecutor>,
    /// Face detection backend; absent when no model is configured
    detector: Option<Arc<dyn FaceDetector>>,
    /// Detector tuning loaded from the config file
    params: DetectParams,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked the "Open Folder" button
    OpenFolder,
    /// User clicked the "Refresh" button
    Refresh,
    /// User clicked the "Scan Faces" button
    StartScan,
    /// User clicked the "Cancel" button
    CancelScan,
    /// Periodic pump of scan progress into the table
    Tick,
}

impl FaceBrowser {
    /// Create a new instance of the application
    fn new() -> (Self, Task<Message>) {
        let config = AppConfig::default_path()
            .map(|path| AppConfig::load(&path))
            .unwrap_or_default();

        // The app cannot function without its background executor.
        let executor =
            BackgroundExecutor::new().expect("Failed to start the background executor");

        let (detector, status) = match config.model_path.as_deref() {
            Some(path) => match SeetaFaceDetector::from_model_file(path) {
                Ok(detector) => (
                    Some(Arc::new(detector) as Arc<dyn FaceDetector>),
                    String::from("Ready. Open a folder to browse its photos."),
                ),
                Err(e) => {
                    log::warn!("{e}");
                    (None, format!("Face scanning disabled: {e}"))
                }
            },
            None => (
                None,
                String::from(
                    "Face scanning disabled: set model_path in the config file to enable it.",
                ),
            ),
        };

        (
            FaceBrowser {
                folder: None,
                coordinator: ScanCoordinator::new(),
                executor: Some(executor),
                detector,
                params: config.detect,
                status,
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::OpenFolder => {
                // Folder changes are gated on idleness: a running scan
                // holds a snapshot keyed to the current table.
                if !self.coordinator.is_idle() {
                    return Task::none();
                }
                let picked = FileDialog::new()
                    .set_title("Select a folder of photos")
                    .set_directory(dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
                    .pick_folder();
                if let Some(path) = picked {
                    match ImageFolder::open(&path) {
                        Ok(folder) => {
                            self.status = format!(
                                "{}: {} images.",
                                path.display(),
                                folder.records().len()
                            );
                            self.folder = Some(folder);
                        }
                        Err(e) => self.status = format!("Could not open folder: {e}"),
                    }
                }
                Task::none()
            }
            Message::Refresh => {
                if !self.coordinator.is_idle() {
                    return Task::none();
                }
                if let Some(folder) = &mut self.folder {
                    folder.refresh();
                    self.status = format!(
                        "{}: {} images.",
                        folder.directory().display(),
                        folder.records().len()
                    );
                }
                Task::none()
            }
            Message::StartScan => {
                let (Some(folder), Some(detector), Some(executor)) =
                    (&self.folder, &self.detector, &self.executor)
                else {
                    return Task::none();
                };
                match self
                    .coordinator
                    .start(folder, Arc::clone(detector), self.params, executor)
                {
                    Ok(()) => self.status = String::from("Scanning for faces..."),
                    Err(e) => self.status = format!("{e}"),
                }
                Task::none()
            }
            Message::CancelScan => {
                self.coordinator.cancel();
                self.status = String::from("Cancelling...");
                Task::none()
            }
            Message::Tick => {
                let before = self.coordinator.state();
                if let Some(folder) = &mut self.folder {
                    if self.coordinator.pump(folder) {
                        // The view repaints from the table itself; the
                        // event queue only matters to consumers that
                        // patch rather than rebuild.
                        let _ = folder.take_events();
                    }
                }
                self.refresh_scan_status(before);
                Task::none()
            }
        }
    }

    /// Update the status line when the scan makes progress or settles.
    fn refresh_scan_status(&mut self, before: ScanState) {
        let after = self.coordinator.state();
        match after {
            ScanState::Running => {
                self.status = format!(
                    "Scanning for faces... {}/{}",
                    self.coordinator.scanned_count(),
                    self.coordinator.target_count()
                );
            }
            ScanState::Completed if before != after => {
                self.status = format!(
                    "Scan complete: {} faces across {} images{}",
                    self.coordinator.faces_found(),
                    self.coordinator.scanned_count(),
                    duration_suffix(&self.coordinator)
                );
            }
            ScanState::Cancelled if before != after => {
                self.status = format!(
                    "Scan cancelled after {} of {} images.",
                    self.coordinator.scanned_count(),
                    self.coordinator.target_count()
                );
            }
            ScanState::Failed if before != after => {
                self.status = format!(
                    "Scan failed: {}",
                    self.coordinator.last_error().unwrap_or("unknown error")
                );
            }
            _ => {}
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let scanning = !self.coordinator.is_idle();
        let can_scan = self.folder.is_some() && self.detector.is_some() && !scanning;

        let toolbar = row![
            button("Open Folder...")
                .on_press_maybe((!scanning).then_some(Message::OpenFolder))
                .padding(10),
            button("Refresh")
                .on_press_maybe(
                    (self.folder.is_some() && !scanning).then_some(Message::Refresh)
                )
                .padding(10),
            button("Scan Faces")
                .on_press_maybe(can_scan.then_some(Message::StartScan))
                .padding(10),
            button("Cancel")
                .on_press_maybe(
                    matches!(self.coordinator.state(), ScanState::Running)
                        .then_some(Message::CancelScan)
                )
                .padding(10),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let body: Element<Message> = match &self.folder {
            Some(folder) => table_view(folder.table()),
            None => container(text("Open a folder to browse its photos.").size(20))
                .width(Length::Fill)
                .height(Length::Fill)
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        column![toolbar, body, text(&self.status).size(14)]
            .spacing(10)
            .padding(10)
            .into()
    }

    /// Pump scan progress while a job is live; otherwise stay quiet.
    fn subscription(&self) -> Subscription<Message> {
        if self.coordinator.is_idle() {
            Subscription::none()
        } else {
            iced::time::every(PROGRESS_INTERVAL).map(|_| Message::Tick)
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

impl Drop for FaceBrowser {
    fn drop(&mut self) {
        // Explicit executor shutdown on exit; cancelling first stops the
        // worker from grinding through a long snapshot.
        self.coordinator.cancel();
        if let Some(executor) = self.executor.take() {
            executor.shutdown();
        }
    }
}

/// Render the metadata table: filename and face count first, then one
/// column per EXIF key seen in the folder.
fn table_view(table: &MetadataTable) -> Element<'_, Message> {
    let mut header = Row::new()
        .spacing(8)
        .push(text("File").width(Length::Fixed(FILE_COL_WIDTH)))
        .push(text("Faces").width(Length::Fixed(FACES_COL_WIDTH)));
    for column_name in table.metadata_columns() {
        header = header.push(text(column_name.as_str()).width(Length::Fixed(META_COL_WIDTH)));
    }

    let mut grid = Column::new().spacing(4).push(header);
    for table_row in table.rows() {
        let faces = table_row
            .face_count
            .map_or_else(|| String::from("?"), |count| count.to_string());
        let mut line = Row::new()
            .spacing(8)
            .push(
                text(table_row.filename.clone())
                    .size(14)
                    .width(Length::Fixed(FILE_COL_WIDTH)),
            )
            .push(text(faces).size(14).width(Length::Fixed(FACES_COL_WIDTH)));
        for value in &table_row.values {
            line = line.push(
                text(value.clone())
                    .size(14)
                    .width(Length::Fixed(META_COL_WIDTH)),
            );
        }
        grid = grid.push(line);
    }

    scrollable(grid)
        .direction(scrollable::Direction::Both {
            vertical: scrollable::Scrollbar::new(),
            horizontal: scrollable::Scrollbar::new(),
        })
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn duration_suffix(coordinator: &ScanCoordinator) -> String {
    match coordinator.last_duration() {
        Some(elapsed) => format!(" in {:.1}s.", elapsed.num_milliseconds() as f64 / 1000.0),
        None => String::from("."),
    }
}

fn main() -> iced::Result {
    env_logger::init();

    iced::application("Face Browser", FaceBrowser::update, FaceBrowser::view)
        .subscription(FaceBrowser::subscription)
        .theme(FaceBrowser::theme)
        .centered()
        .run_with(FaceBrowser::new)
}
