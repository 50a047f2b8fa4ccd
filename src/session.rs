use std::{fmt, sync::Arc, time::Duration};

use crate::{
    client::DetectionService,
    config::Settings,
    error::CameraError,
    pipeline::{
        capture::{CameraSource, DeviceHandle},
        ticker::{FrameDispatcher, FrameOutcome, FrameTicker, Overlay, TickSnapshot, TickStats},
    },
    types::Resolution,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    /// Start failed; the payload is the short reason (`permission-denied`, ...).
    Error(&'static str),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Error(reason) => write!(f, "error ({reason})"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub realtime: bool,
    pub frame_interval: Duration,
    pub ready_timeout: Duration,
    pub jpeg_quality: u8,
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            realtime: settings.realtime,
            frame_interval: settings.frame_interval(),
            ready_timeout: settings.ready_timeout(),
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

/// One camera at a time: the device, the capture canvas, and the optional
/// frame ticker. Device and ticker never outlive the `Active` state.
pub struct CaptureSession {
    state: SessionState,
    source: Arc<dyn CameraSource>,
    service: Arc<dyn DetectionService>,
    options: SessionOptions,
    device: Option<Box<dyn DeviceHandle>>,
    ticker: Option<FrameTicker>,
    canvas: Option<Resolution>,
    overlay: Overlay,
    generation: u64,
    stats: Arc<TickStats>,
    status: &'static str,
}

impl CaptureSession {
    pub fn new(
        source: Arc<dyn CameraSource>,
        service: Arc<dyn DetectionService>,
        options: SessionOptions,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            source,
            service,
            options,
            device: None,
            ticker: None,
            canvas: None,
            overlay: Overlay::default(),
            generation: 0,
            stats: Arc::new(TickStats::default()),
            status: "Ready",
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Active
    }

    #[cfg(test)]
    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    #[cfg(test)]
    pub fn has_ticker(&self) -> bool {
        self.ticker.is_some()
    }

    /// Resolution of the capture canvas while `Active`.
    pub fn canvas(&self) -> Option<Resolution> {
        self.canvas
    }

    pub fn status_text(&self) -> &'static str {
        self.status
    }

    pub fn realtime(&self) -> bool {
        self.options.realtime
    }

    pub fn latest_overlay(&self) -> Option<FrameOutcome> {
        self.overlay.latest()
    }

    pub fn tick_stats(&self) -> TickSnapshot {
        self.stats.snapshot()
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    /// `Idle → Starting → Active`. On failure the session ends in `Error`
    /// with every acquired resource released.
    pub fn start(&mut self) -> Result<(), CameraError> {
        match self.state {
            SessionState::Starting | SessionState::Active => {
                log::debug!("camera session already {}", self.state);
                return Ok(());
            }
            SessionState::Error(_) => self.teardown(),
            SessionState::Idle => {}
        }

        self.state = SessionState::Starting;
        self.status = "Starting camera...";
        log::info!("starting {}", self.source.describe());

        let device = match self.source.open() {
            Ok(device) => device,
            Err(err) => return Err(self.fail(err, "Camera failed to start")),
        };
        let device = self.device.insert(device);

        match device.wait_ready(self.options.ready_timeout) {
            Ok(resolution) => {
                self.activate(resolution);
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Camera failed to start")),
        }
    }

    /// Check an `Active` device for a stream failure. A failed stream moves
    /// the session to `Error` with the device and ticker released, and the
    /// error is returned once.
    pub fn poll(&mut self) -> Option<CameraError> {
        if self.state != SessionState::Active {
            return None;
        }
        let err = self.device.as_mut()?.failure()?;
        Some(self.fail(err, "Camera stream lost"))
    }

    /// `Starting → Active`: size the canvas and start ticking if enabled.
    fn activate(&mut self, resolution: Resolution) {
        self.canvas = Some(resolution);
        self.generation = self.overlay.attach();
        self.state = SessionState::Active;
        self.status = "Live streaming...";
        log::info!("camera active at {resolution}");

        if self.options.realtime {
            self.start_ticker();
        }
    }

    fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let Some(device) = self.device.as_ref() else {
            return;
        };

        let dispatcher = FrameDispatcher::new(
            self.service.clone(),
            self.overlay.clone(),
            self.generation,
            self.options.jpeg_quality,
            self.stats.clone(),
        );
        match FrameTicker::start(self.options.frame_interval, device.frames(), dispatcher) {
            Ok(ticker) => {
                log::info!(
                    "real-time detection every {} ms",
                    self.options.frame_interval.as_millis()
                );
                self.ticker = Some(ticker);
            }
            Err(err) => log::error!("failed to start frame ticker: {err}"),
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Toggle real-time detection; takes effect immediately while `Active`.
    pub fn set_realtime(&mut self, enabled: bool) {
        self.options.realtime = enabled;
        if self.state != SessionState::Active {
            return;
        }
        if enabled {
            self.start_ticker();
        } else {
            self.stop_ticker();
        }
    }

    /// Return to `Idle` from any state. Idempotent.
    pub fn stop(&mut self) {
        if self.state != SessionState::Idle {
            log::info!("stopping camera session ({})", self.state);
        }
        self.teardown();
    }

    /// Cancel the ticker, release the device, reset the canvas and overlay.
    /// Each step tolerates a resource that was never acquired.
    fn teardown(&mut self) {
        self.stop_ticker();
        self.release_device();
        self.overlay.detach();
        self.state = SessionState::Idle;
        self.status = "Ready";
    }

    fn release_device(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
        }
        self.canvas = None;
    }

    fn fail(&mut self, err: CameraError, status: &'static str) -> CameraError {
        log::error!("{}: {err}", status.to_ascii_lowercase());
        self.stop_ticker();
        self.release_device();
        self.overlay.detach();
        self.state = SessionState::Error(err.reason());
        self.status = status;
        err
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
