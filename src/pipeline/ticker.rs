use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Sender, bounded, select, tick};

use crate::{
    client::DetectionService,
    pipeline::{capture::FrameSlot, encoder::encode_jpeg},
    render::render_overlay,
    types::{Detection, Frame},
};

/// The response of one frame tick as shown over the camera view.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutcome {
    /// Dispatch order of the request that produced this outcome.
    pub seq: u64,
    pub detections: Vec<Detection>,
    pub html: String,
}

#[derive(Debug, Default)]
struct OverlayInner {
    generation: u64,
    attached: bool,
    latest: Option<FrameOutcome>,
}

/// Live detection overlay. Completions are applied in the order they finish;
/// a completion from an older generation or after detach is ignored.
#[derive(Clone, Debug, Default)]
pub struct Overlay {
    inner: Arc<Mutex<OverlayInner>>,
}

impl Overlay {
    /// Start a fresh generation and clear the previous outcome.
    pub fn attach(&self) -> u64 {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        inner.generation += 1;
        inner.attached = true;
        inner.latest = None;
        inner.generation
    }

    pub fn detach(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.attached = false;
            inner.latest = None;
        }
    }

    /// Returns whether the outcome was applied.
    pub fn publish(&self, generation: u64, seq: u64, detections: Vec<Detection>) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if !inner.attached || inner.generation != generation {
            return false;
        }
        let html = render_overlay(&detections);
        inner.latest = Some(FrameOutcome {
            seq,
            detections,
            html,
        });
        true
    }

    pub fn latest(&self) -> Option<FrameOutcome> {
        self.inner.lock().ok()?.latest.clone()
    }
}

#[derive(Debug, Default)]
pub struct TickStats {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSnapshot {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
}

impl TickStats {
    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Sends frames to `/process_frame` without waiting for earlier requests.
#[derive(Clone)]
pub struct FrameDispatcher {
    service: Arc<dyn DetectionService>,
    overlay: Overlay,
    generation: u64,
    jpeg_quality: u8,
    stats: Arc<TickStats>,
    next_seq: Arc<AtomicU64>,
}

impl FrameDispatcher {
    pub fn new(
        service: Arc<dyn DetectionService>,
        overlay: Overlay,
        generation: u64,
        jpeg_quality: u8,
        stats: Arc<TickStats>,
    ) -> Self {
        Self {
            service,
            overlay,
            generation,
            jpeg_quality,
            stats,
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Encode `frame` and submit it on a detached thread. The handle is only
    /// useful to tests; the ticker drops it.
    pub fn dispatch(&self, frame: &Frame) -> Option<thread::JoinHandle<()>> {
        let jpeg = match encode_jpeg(frame, self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                log::warn!("skipping frame tick: {err:?}");
                return None;
            }
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let service = self.service.clone();
        let overlay = self.overlay.clone();
        let stats = self.stats.clone();
        let generation = self.generation;
        let spawned = thread::Builder::new()
            .name(format!("frame-{seq}"))
            .spawn(move || match service.process_frame(jpeg) {
                Ok(detections) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    let count = detections.len();
                    if overlay.publish(generation, seq, detections) {
                        log::debug!("frame {seq}: {count} detection(s)");
                    } else {
                        log::debug!("frame {seq} completed after its session ended");
                    }
                }
                Err(err) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("frame {seq} failed: {err}");
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("failed to spawn frame request: {err}");
                None
            }
        }
    }
}

/// Cancellable periodic capture. Dropping or cancelling it stops future ticks;
/// requests already dispatched run to completion.
#[derive(Debug)]
pub struct FrameTicker {
    cancel: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameTicker {
    pub fn start(
        interval: Duration,
        frames: FrameSlot,
        dispatcher: FrameDispatcher,
    ) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("frame-ticker".to_string())
            .spawn(move || {
                let ticks = tick(interval);
                loop {
                    select! {
                        recv(cancel_rx) -> _ => break,
                        recv(ticks) -> _ => {
                            if let Some(frame) = frames.ready_frame() {
                                let _ = dispatcher.dispatch(&frame);
                            }
                        }
                    }
                }
                log::debug!("frame ticker stopped");
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes the ticker's select.
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
