//! Test doubles for the detection server and camera devices.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, bounded};

use crate::{
    client::{DetectionService, ImagePayload},
    config::AnalyzeEndpoint,
    error::{CameraError, ServiceError},
    pipeline::capture::{CameraSource, CaptureThread, DeviceHandle, FrameSlot},
    types::{Analysis, CameraStatus, Detection, Frame, ModelStatus},
};

pub fn solid_frame(width: u32, height: u32) -> Frame {
    Frame {
        rgba: vec![128; (width * height * 4) as usize],
        width,
        height,
        timestamp: Instant::now(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameMode {
    Immediate,
    Gated,
    Failing,
}

pub struct FakeService {
    camera_available: bool,
    model_status: ModelStatus,
    analysis: Result<Analysis, String>,
    frame_mode: FrameMode,
    frame_arrivals: AtomicUsize,
    frame_gates: Mutex<HashMap<usize, Sender<Vec<Detection>>>>,
    analyze_calls: Mutex<Vec<AnalyzeEndpoint>>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            camera_available: true,
            model_status: ModelStatus {
                model_loaded: true,
                cascade_loaded: true,
            },
            analysis: Ok(Analysis {
                image: Some("/static/result.jpg".to_string()),
                detections: vec![Detection::new("Masked", 97.2)],
            }),
            frame_mode: FrameMode::Immediate,
            frame_arrivals: AtomicUsize::new(0),
            frame_gates: Mutex::new(HashMap::new()),
            analyze_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeService {
    pub fn with_camera_available(mut self, available: bool) -> Self {
        self.camera_available = available;
        self
    }

    pub fn with_model_status(mut self, model_loaded: bool, cascade_loaded: bool) -> Self {
        self.model_status = ModelStatus {
            model_loaded,
            cascade_loaded,
        };
        self
    }

    pub fn with_analysis(mut self, analysis: Result<Analysis, String>) -> Self {
        self.analysis = analysis;
        self
    }

    /// Each frame request blocks until `release_frame` is called for its
    /// arrival index.
    pub fn gated_frames(mut self) -> Self {
        self.frame_mode = FrameMode::Gated;
        self
    }

    pub fn failing_frames(mut self) -> Self {
        self.frame_mode = FrameMode::Failing;
        self
    }

    pub fn wait_for_frame_requests(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.frame_arrivals.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} frame requests");
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn release_frame(&self, arrival: usize, detections: Vec<Detection>) {
        let gate = self.frame_gates.lock().unwrap().remove(&arrival);
        gate.expect("no pending frame request at that index")
            .send(detections)
            .unwrap();
    }

    pub fn analyze_calls(&self) -> Vec<AnalyzeEndpoint> {
        self.analyze_calls.lock().unwrap().clone()
    }
}

impl DetectionService for FakeService {
    fn model_status(&self) -> Result<ModelStatus, ServiceError> {
        Ok(self.model_status)
    }

    fn camera_status(&self) -> Result<CameraStatus, ServiceError> {
        Ok(CameraStatus {
            available: self.camera_available,
        })
    }

    fn analyze(
        &self,
        endpoint: AnalyzeEndpoint,
        _image: &ImagePayload,
    ) -> Result<Analysis, ServiceError> {
        self.analyze_calls.lock().unwrap().push(endpoint);
        self.analysis.clone().map_err(ServiceError::ServerReported)
    }

    fn process_frame(&self, jpeg: Vec<u8>) -> Result<Vec<Detection>, ServiceError> {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        match self.frame_mode {
            FrameMode::Immediate => {
                self.frame_arrivals.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Detection::new("Masked", 90.0)])
            }
            FrameMode::Failing => {
                self.frame_arrivals.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::ServerReported("model not loaded".to_string()))
            }
            FrameMode::Gated => {
                let (tx, rx) = bounded(1);
                {
                    let mut gates = self.frame_gates.lock().unwrap();
                    let arrival = self.frame_arrivals.load(Ordering::SeqCst);
                    gates.insert(arrival, tx);
                    self.frame_arrivals.store(arrival + 1, Ordering::SeqCst);
                }
                rx.recv()
                    .map_err(|_| ServiceError::ServerReported("gate dropped".to_string()))
            }
        }
    }

    fn video_feed_url(&self, timestamp_ms: u128) -> String {
        format!("http://fake/video_feed?t={timestamp_ms}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CameraBehaviour {
    Streaming,
    Denied,
    Silent,
    Dying,
}

/// Camera source producing solid frames, or failing the way real devices do.
pub struct FakeCamera {
    behaviour: CameraBehaviour,
    width: u32,
    height: u32,
    opened: AtomicUsize,
    last_slot: Mutex<Option<FrameSlot>>,
}

impl FakeCamera {
    fn with(behaviour: CameraBehaviour) -> Self {
        Self {
            behaviour,
            width: 64,
            height: 48,
            opened: AtomicUsize::new(0),
            last_slot: Mutex::new(None),
        }
    }

    pub fn streaming() -> Self {
        Self::with(CameraBehaviour::Streaming)
    }

    pub fn denied() -> Self {
        Self::with(CameraBehaviour::Denied)
    }

    /// Opens but never delivers a frame.
    pub fn silent() -> Self {
        Self::with(CameraBehaviour::Silent)
    }

    /// Delivers one frame, then the stream fails.
    pub fn dying() -> Self {
        Self::with(CameraBehaviour::Dying)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_slot(&self) -> Option<FrameSlot> {
        self.last_slot.lock().unwrap().clone()
    }
}

impl CameraSource for FakeCamera {
    fn describe(&self) -> String {
        format!("fake camera ({:?})", self.behaviour)
    }

    fn open(&self) -> Result<Box<dyn DeviceHandle>, CameraError> {
        if self.behaviour == CameraBehaviour::Denied {
            return Err(CameraError::PermissionDenied("Permission denied".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (width, height, behaviour) = (self.width, self.height, self.behaviour);
        let capture = CaptureThread::spawn("fake", move |mut ctx| {
            if behaviour == CameraBehaviour::Dying {
                ctx.publish(solid_frame(width, height));
                thread::sleep(Duration::from_millis(20));
                ctx.fail(CameraError::StreamFailed("video stream ended".to_string()));
                return;
            }
            while !ctx.should_stop() {
                if behaviour == CameraBehaviour::Streaming {
                    ctx.publish(solid_frame(width, height));
                }
                thread::sleep(Duration::from_millis(5));
            }
        })?;
        *self.last_slot.lock().unwrap() = Some(capture.frames());
        Ok(Box::new(capture))
    }
}
