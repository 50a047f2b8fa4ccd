pub mod camera;
pub mod capture;
pub mod encoder;
pub mod remote_feed;
pub mod ticker;

// Re-exports for convenience
pub use camera::{LocalCamera, available_cameras};
pub use capture::CameraSource;
pub use remote_feed::RemoteCamera;
