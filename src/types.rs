use std::{fmt, time::Instant};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

impl Frame {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One face returned by the detection server. `confidence` is a percentage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i32; 4]>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self.label.as_str(), "Masked" | "Mask")
    }
}

/// Result of analysing a still image, normalized across `/upload` and `/detect`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Analysis {
    /// Processed image as returned by `/upload` (data URL or server path).
    pub image: Option<String>,
    pub detections: Vec<Detection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub cascade_loaded: bool,
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        self.model_loaded && self.cascade_loaded
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    pub available: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Upload,
    Camera,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Upload => "upload",
            Mode::Camera => "camera",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(Mode::Upload),
            "camera" => Ok(Mode::Camera),
            other => Err(format!("unknown mode `{other}` (expected upload or camera)")),
        }
    }
}
