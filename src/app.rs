use std::{path::Path, sync::Arc};

use crate::{
    client::DetectionService,
    config::{AnalyzeEndpoint, Settings},
    notify::{Level, Notifier},
    pipeline::capture::CameraSource,
    render::render_results,
    session::{CaptureSession, SessionOptions},
    types::{Analysis, Mode},
    upload::UploadPanel,
};

#[derive(Debug, Default)]
pub struct ResultsPanel {
    html: Option<String>,
    analysis: Option<Analysis>,
}

impl ResultsPanel {
    fn show(&mut self, analysis: Analysis) {
        self.html = Some(render_results(analysis.image.as_deref(), &analysis.detections));
        self.analysis = Some(analysis);
    }

    fn close(&mut self) {
        self.html = None;
        self.analysis = None;
    }

    #[cfg(test)]
    pub fn is_visible(&self) -> bool {
        self.html.is_some()
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }
}

/// The two-mode client: file upload or live camera, never both.
pub struct App {
    mode: Mode,
    service: Arc<dyn DetectionService>,
    endpoint: AnalyzeEndpoint,
    session: CaptureSession,
    uploads: UploadPanel,
    results: ResultsPanel,
    notifier: Notifier,
}

impl App {
    pub fn new(
        settings: &Settings,
        service: Arc<dyn DetectionService>,
        camera: Arc<dyn CameraSource>,
    ) -> Self {
        Self {
            mode: Mode::Upload,
            session: CaptureSession::new(camera, service.clone(), SessionOptions::from(settings)),
            service,
            endpoint: settings.analyze_endpoint,
            uploads: UploadPanel::new(settings.max_upload_bytes),
            results: ResultsPanel::default(),
            notifier: Notifier::new(settings.notification_duration()),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CaptureSession {
        &mut self.session
    }

    pub fn uploads(&self) -> &UploadPanel {
        &self.uploads
    }

    pub fn results(&self) -> &ResultsPanel {
        &self.results
    }

    pub fn notifier(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    /// Warn while the server is still loading its model or face cascade.
    pub fn check_system_status(&mut self) {
        match self.service.model_status() {
            Ok(status) if !status.is_ready() => {
                self.notifier
                    .push(Level::Warning, "System initialization in progress...");
            }
            Ok(_) => log::info!("detection server ready"),
            Err(err) => log::error!("status check failed: {err}"),
        }
    }

    /// Tear down both modes, then activate `mode`.
    pub fn switch_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            log::info!("switching mode {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        self.session.stop();
        self.uploads.clear();
        self.results.close();
    }

    pub fn select_file(&mut self, path: &Path) -> bool {
        match self.uploads.select(path) {
            Ok(_) => true,
            Err(err) => {
                log::debug!("rejected {} ({})", path.display(), err.kind());
                self.notifier.push(Level::Error, err.to_string());
                false
            }
        }
    }

    pub fn clear_upload(&mut self) {
        self.uploads.clear();
        self.results.close();
    }

    pub fn analyze_image(&mut self) -> bool {
        let Some(upload) = self.uploads.pending() else {
            self.notifier
                .push(Level::Error, "Please select an image first");
            return false;
        };

        match self.service.analyze(self.endpoint, &upload.payload) {
            Ok(analysis) => {
                log::info!(
                    "{} face(s) detected via {}",
                    analysis.detections.len(),
                    self.endpoint.path()
                );
                self.results.show(analysis);
                self.notifier.push(Level::Success, "Analysis complete!");
                true
            }
            Err(err) => {
                log::debug!("analysis failed ({})", err.kind());
                self.notifier
                    .push(Level::Error, format!("Analysis failed: {err}"));
                false
            }
        }
    }

    pub fn start_camera(&mut self) -> bool {
        match self.session.start() {
            Ok(()) => true,
            Err(err) => {
                self.notifier
                    .push(Level::Error, format!("Camera error: {err}"));
                false
            }
        }
    }

    /// Surface a stream that died while live. Returns whether the camera
    /// failed since the last check.
    pub fn poll_camera(&mut self) -> bool {
        match self.session.poll() {
            Some(err) => {
                self.notifier
                    .push(Level::Error, format!("Camera error: {err}"));
                true
            }
            None => false,
        }
    }

    pub fn stop_camera(&mut self) {
        self.session.stop();
    }

    /// Space-bar shortcut: only meaningful in camera mode.
    pub fn toggle_camera(&mut self) -> bool {
        if self.mode != Mode::Camera {
            return false;
        }
        self.poll_camera();
        if self.session.is_streaming() {
            self.stop_camera();
            true
        } else {
            self.start_camera()
        }
    }

    /// Escape shortcut.
    pub fn close_results(&mut self) {
        self.results.close();
    }
}
