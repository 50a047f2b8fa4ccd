use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_NOTIFICATION_MS: u64 = 4_000;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Which endpoint analyses still images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzeEndpoint {
    #[default]
    Upload,
    Detect,
}

impl AnalyzeEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            AnalyzeEndpoint::Upload => "/upload",
            AnalyzeEndpoint::Detect => "/detect",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// A camera attached to this machine.
    #[default]
    Local,
    /// The detection server's own camera, read from `/video_feed`.
    Remote,
}

impl fmt::Display for CameraBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraBackend::Local => write!(f, "local"),
            CameraBackend::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub analyze_endpoint: AnalyzeEndpoint,
    pub camera_backend: CameraBackend,
    pub camera_index: u32,
    pub realtime: bool,
    pub frame_interval_ms: u64,
    pub ready_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub jpeg_quality: u8,
    pub notification_ms: u64,
    pub max_upload_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            analyze_endpoint: AnalyzeEndpoint::Upload,
            camera_backend: CameraBackend::Local,
            camera_index: 0,
            realtime: true,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            ready_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            jpeg_quality: 80,
            notification_ms: DEFAULT_NOTIFICATION_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mask-watch").join("settings.json"))
    }

    /// Load settings from `path`, or from the default location when `path` is
    /// `None`. A missing default file yields defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        settings.validate()?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "server_url",
                reason: format!("`{}` is not an http(s) URL", self.server_url),
            });
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "jpeg_quality",
                reason: format!("{} is outside 1-100", self.jpeg_quality),
            });
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}
