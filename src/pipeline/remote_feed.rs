use std::{io::Read, sync::Arc, time::Instant};

use image::ImageFormat;
use reqwest::blocking::Client;

use crate::{
    client::{DetectionService, unix_millis},
    error::CameraError,
    pipeline::capture::{CameraSource, CaptureContext, CaptureThread, DeviceHandle},
    types::Frame,
};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 16 * 1024;
// A multipart stream that never closes a JPEG is not a camera feed.
const MAX_PENDING_BYTES: usize = 8 * 1024 * 1024;

/// Cuts a `multipart/x-mixed-replace` JPEG stream into whole images by
/// scanning for start/end-of-image markers; part headers are skipped.
#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buffer: Vec<u8>,
}

impl MjpegSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut images = Vec::new();

        loop {
            let Some(start) = find(&self.buffer, &SOI, 0) else {
                // Keep a trailing 0xFF in case the marker straddles chunks.
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                self.buffer.drain(..self.buffer.len() - keep);
                break;
            };
            let Some(end) = find(&self.buffer, &EOI, start + SOI.len()) else {
                self.buffer.drain(..start);
                break;
            };
            let stop = end + EOI.len();
            images.push(self.buffer[start..stop].to_vec());
            self.buffer.drain(..stop);
        }

        images
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn decode_jpeg(bytes: &[u8]) -> Result<Frame, image::ImageError> {
    let rgba = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame {
        rgba: rgba.into_raw(),
        width,
        height,
        timestamp: Instant::now(),
    })
}

/// The detection server's own camera, read from `/video_feed`.
pub struct RemoteCamera {
    service: Arc<dyn DetectionService>,
}

impl RemoteCamera {
    pub fn new(service: Arc<dyn DetectionService>) -> Self {
        Self { service }
    }
}

impl CameraSource for RemoteCamera {
    fn describe(&self) -> String {
        "server camera".to_string()
    }

    fn open(&self) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let status = self
            .service
            .camera_status()
            .map_err(|err| CameraError::StreamFailed(err.to_string()))?;
        if !status.available {
            return Err(CameraError::NotFound("Camera not available".to_string()));
        }

        let url = self.service.video_feed_url(unix_millis());
        log::info!("opening server camera feed {url}");
        let capture = CaptureThread::spawn("remote", move |ctx| run_feed(&url, ctx))?;
        Ok(Box::new(capture.detach_on_release()))
    }
}

fn run_feed(url: &str, mut ctx: CaptureContext) {
    // The feed never ends, so the request must not carry a total timeout.
    let client = match Client::builder().timeout(None).build() {
        Ok(client) => client,
        Err(err) => {
            ctx.fail(CameraError::Unsupported(err.to_string()));
            return;
        }
    };
    let mut response = match client.get(url).send().and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(err) => {
            ctx.fail(CameraError::StreamFailed(format!("Failed to load video stream: {err}")));
            return;
        }
    };

    let mut splitter = MjpegSplitter::default();
    let mut chunk = vec![0u8; READ_CHUNK];
    while !ctx.should_stop() {
        let read = match response.read(&mut chunk) {
            Ok(0) => {
                ctx.fail(CameraError::StreamFailed("video stream ended".to_string()));
                return;
            }
            Ok(read) => read,
            Err(err) => {
                ctx.fail(CameraError::StreamFailed(err.to_string()));
                return;
            }
        };

        for jpeg in splitter.push(&chunk[..read]) {
            match decode_jpeg(&jpeg) {
                Ok(frame) => ctx.publish(frame),
                Err(err) => log::warn!("failed to decode feed frame: {err}"),
            }
        }

        if splitter.pending() > MAX_PENDING_BYTES {
            ctx.fail(CameraError::StreamFailed(
                "video stream is not a JPEG feed".to_string(),
            ));
            return;
        }
    }
}
