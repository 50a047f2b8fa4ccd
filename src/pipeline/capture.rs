use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::{
    error::CameraError,
    types::{Frame, Resolution},
};

/// Something that can hand out an exclusive camera device.
pub trait CameraSource: Send + Sync {
    fn describe(&self) -> String;

    fn open(&self) -> Result<Box<dyn DeviceHandle>, CameraError>;
}

/// Exclusive ownership of an open camera stream.
pub trait DeviceHandle: Send {
    /// Block until the first frame arrives and report its resolution.
    fn wait_ready(&mut self, timeout: Duration) -> Result<Resolution, CameraError>;

    /// Shared view of the most recent frame.
    fn frames(&self) -> FrameSlot;

    /// A failure reported after the stream went live, if any. Each failure is
    /// returned once.
    fn failure(&mut self) -> Option<CameraError>;

    /// Stop the stream. Safe to call more than once.
    fn release(&mut self);
}

#[derive(Debug, Default)]
struct SlotInner {
    frame: Option<Frame>,
    live: bool,
}

/// Latest-frame slot shared between the capture thread and its readers.
#[derive(Clone, Debug, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl FrameSlot {
    pub fn store(&self, frame: Frame) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.frame = Some(frame);
            inner.live = true;
        }
    }

    /// The latest frame, only while the device is still delivering.
    pub fn ready_frame(&self) -> Option<Frame> {
        let inner = self.inner.lock().ok()?;
        if inner.live { inner.frame.clone() } else { None }
    }

    #[cfg(test)]
    pub fn is_live(&self) -> bool {
        self.inner.lock().map(|inner| inner.live).unwrap_or(false)
    }

    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.frame = None;
            inner.live = false;
        }
    }
}

/// Handed to a capture loop so it can publish frames and observe stop requests.
pub struct CaptureContext {
    stop: Arc<AtomicBool>,
    slot: FrameSlot,
    ready_tx: Option<Sender<Result<Resolution, CameraError>>>,
    failure_tx: Sender<CameraError>,
}

impl CaptureContext {
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn publish(&mut self, frame: Frame) {
        if self.should_stop() {
            return;
        }
        let resolution = frame.resolution();
        self.slot.store(frame);
        if let Some(tx) = self.ready_tx.take() {
            let _ = tx.try_send(Ok(resolution));
        }
    }

    /// Report a fatal error. Before the first frame this fails `wait_ready`;
    /// afterwards it is surfaced through `DeviceHandle::failure`.
    pub fn fail(&mut self, err: CameraError) {
        log::error!("capture stopped: {err}");
        self.slot.close();
        match self.ready_tx.take() {
            Some(tx) => {
                let _ = tx.try_send(Err(err));
            }
            None => {
                let _ = self.failure_tx.try_send(err);
            }
        }
    }
}

impl Drop for CaptureContext {
    fn drop(&mut self) {
        self.slot.close();
    }
}

/// A capture loop on its own thread, stopped through a shared flag.
#[derive(Debug)]
pub struct CaptureThread {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    slot: FrameSlot,
    ready_rx: Receiver<Result<Resolution, CameraError>>,
    failure_rx: Receiver<CameraError>,
    join_on_release: bool,
}

impl CaptureThread {
    pub fn spawn<F>(name: &str, run: F) -> Result<Self, CameraError>
    where
        F: FnOnce(CaptureContext) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let slot = FrameSlot::default();
        let (ready_tx, ready_rx) = bounded(1);
        let (failure_tx, failure_rx) = bounded(1);
        let context = CaptureContext {
            stop: stop.clone(),
            slot: slot.clone(),
            ready_tx: Some(ready_tx),
            failure_tx,
        };

        let handle = thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || run(context))
            .map_err(|err| {
                CameraError::StreamFailed(format!("failed to spawn capture thread: {err}"))
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
            slot,
            ready_rx,
            failure_rx,
            join_on_release: true,
        })
    }

    /// Do not wait for the loop on release; used when the loop may sit in a
    /// blocking read. The loop still exits at its next stop check.
    pub fn detach_on_release(mut self) -> Self {
        self.join_on_release = false;
        self
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.slot.close();
        if let Some(handle) = self.handle.take() {
            if self.join_on_release {
                let _ = handle.join();
            }
        }
    }
}

impl DeviceHandle for CaptureThread {
    fn wait_ready(&mut self, timeout: Duration) -> Result<Resolution, CameraError> {
        match self.ready_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CameraError::StreamFailed(format!(
                "no frame within {} ms",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(CameraError::StreamFailed(
                "capture ended before the first frame".to_string(),
            )),
        }
    }

    fn frames(&self) -> FrameSlot {
        self.slot.clone()
    }

    fn failure(&mut self) -> Option<CameraError> {
        self.failure_rx.try_recv().ok()
    }

    fn release(&mut self) {
        self.shutdown();
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solid_frame;

    #[test]
    fn first_frame_reports_resolution() {
        let mut capture = CaptureThread::spawn("test", |mut ctx| {
            while !ctx.should_stop() {
                ctx.publish(solid_frame(4, 3));
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        let resolution = capture.wait_ready(Duration::from_secs(2)).unwrap();
        assert_eq!(resolution, Resolution { width: 4, height: 3 });
        assert!(capture.frames().ready_frame().is_some());

        capture.release();
        assert!(!capture.frames().is_live());
        assert!(capture.frames().ready_frame().is_none());
        capture.release();
    }

    #[test]
    fn failure_before_first_frame_fails_wait() {
        let mut capture = CaptureThread::spawn("test", |mut ctx| {
            ctx.fail(CameraError::PermissionDenied("blocked".to_string()));
        })
        .unwrap();
        let err = capture.wait_ready(Duration::from_secs(2)).unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied("blocked".to_string()));
    }

    #[test]
    fn failure_after_first_frame_is_reported_once() {
        let mut capture = CaptureThread::spawn("test", |mut ctx| {
            ctx.publish(solid_frame(2, 2));
            ctx.fail(CameraError::StreamFailed("video stream ended".to_string()));
        })
        .unwrap();
        capture.wait_ready(Duration::from_secs(2)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut reported = None;
        while reported.is_none() && std::time::Instant::now() < deadline {
            reported = capture.failure();
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(
            reported,
            Some(CameraError::StreamFailed("video stream ended".to_string()))
        );
        assert!(capture.failure().is_none());
        assert!(!capture.frames().is_live());
    }

    #[test]
    fn silent_loop_times_out() {
        let mut capture = CaptureThread::spawn("test", |ctx| {
            while !ctx.should_stop() {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        let err = capture.wait_ready(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, CameraError::StreamFailed(_)));
    }

    #[test]
    fn loop_exit_closes_slot() {
        let mut capture = CaptureThread::spawn("test", |mut ctx| {
            ctx.publish(solid_frame(2, 2));
        })
        .unwrap();
        capture.wait_ready(Duration::from_secs(2)).unwrap();
        let slot = capture.frames();
        capture.release();
        assert!(!slot.is_live());
    }
}
