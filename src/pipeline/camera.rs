use crate::error::CameraError;
#[cfg(feature = "camera-nokhwa")]
use crate::pipeline::capture::CaptureThread;
use crate::pipeline::capture::{CameraSource, DeviceHandle};

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

/// A camera attached to this machine.
#[derive(Clone, Debug)]
pub struct LocalCamera {
    index: u32,
}

impl LocalCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

#[cfg(feature = "camera-nokhwa")]
mod native {
    use std::time::Instant;

    use nokhwa::{
        Camera, NokhwaError,
        pixel_format::RgbFormat,
        query,
        utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    };

    use super::CameraDevice;
    use crate::{error::CameraError, pipeline::capture::CaptureContext, types::Frame};

    // Uncompressed formats first; some built-in webcams advertise YUYV but fail
    // to open with it.
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    // Give up on a stream that keeps failing instead of spinning forever.
    const MAX_CONSECUTIVE_READ_FAILURES: u32 = 50;

    fn requested_formats() -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    fn to_camera_error(err: NokhwaError) -> CameraError {
        match err {
            NokhwaError::UnsupportedOperationError(backend) => {
                CameraError::Unsupported(format!("operation not supported by {backend:?}"))
            }
            NokhwaError::NotImplementedError(what) => CameraError::Unsupported(what),
            other => CameraError::classify(other.to_string()),
        }
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>, CameraError> {
        let cameras = query(ApiBackend::Auto).map_err(to_camera_error)?;
        Ok(cameras
            .into_iter()
            .enumerate()
            .map(|(position, info)| CameraDevice {
                index: match info.index() {
                    CameraIndex::Index(index) => *index,
                    CameraIndex::String(_) => position as u32,
                },
                label: info.human_name(),
            })
            .collect())
    }

    pub fn build_camera(index: u32) -> Result<Camera, CameraError> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(CameraIndex::Index(index), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(to_camera_error(err)),
                },
                Err(err) => last_err = Some(to_camera_error(err)),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            CameraError::Unsupported("failed to open camera with any supported format".to_string())
        }))
    }

    pub fn run_capture(index: u32, mut ctx: CaptureContext) {
        let mut camera = match build_camera(index) {
            Ok(cam) => cam,
            Err(err) => {
                ctx.fail(err);
                return;
            }
        };

        let mut failures = 0;
        while !ctx.should_stop() {
            let frame_start = Instant::now();
            let decoded = match camera.frame().and_then(|frame| frame.decode_image::<RgbFormat>()) {
                Ok(img) => img,
                Err(err) => {
                    failures += 1;
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        frame_start.elapsed()
                    );
                    if failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        ctx.fail(CameraError::StreamFailed(err.to_string()));
                        break;
                    }
                    continue;
                }
            };
            failures = 0;

            let (width, height) = decoded.dimensions();
            let rgb = decoded.into_raw();
            if rgb.is_empty() {
                continue;
            }

            let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
            for chunk in rgb.chunks_exact(3) {
                rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
            }

            ctx.publish(Frame {
                rgba,
                width,
                height,
                timestamp: Instant::now(),
            });
        }

        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}

#[cfg(feature = "camera-nokhwa")]
pub fn available_cameras() -> Result<Vec<CameraDevice>, CameraError> {
    native::available_cameras()
}

#[cfg(not(feature = "camera-nokhwa"))]
pub fn available_cameras() -> Result<Vec<CameraDevice>, CameraError> {
    Err(CameraError::Unsupported(
        "built without the camera-nokhwa feature".to_string(),
    ))
}

impl CameraSource for LocalCamera {
    fn describe(&self) -> String {
        format!("local camera #{}", self.index)
    }

    #[cfg(feature = "camera-nokhwa")]
    fn open(&self) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let index = self.index;
        // Fail fast with a classified error before spawning the capture thread.
        drop(native::build_camera(index)?);

        let capture = CaptureThread::spawn("local", move |ctx| native::run_capture(index, ctx))?;
        Ok(Box::new(capture))
    }

    #[cfg(not(feature = "camera-nokhwa"))]
    fn open(&self) -> Result<Box<dyn DeviceHandle>, CameraError> {
        Err(CameraError::Unsupported(format!(
            "{} requires the camera-nokhwa feature",
            self.describe()
        )))
    }
}
