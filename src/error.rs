use std::{fmt, path::PathBuf};

use thiserror::Error;

/// User-facing classification of every recoverable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    CameraPermissionDenied,
    CameraNotFound,
    CameraUnsupported,
    CameraStreamFailed,
    InvalidFileType,
    FileTooLarge,
    NetworkFailure,
    ServerReportedFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CameraPermissionDenied => "camera-permission-denied",
            ErrorKind::CameraNotFound => "camera-not-found",
            ErrorKind::CameraUnsupported => "camera-unsupported",
            ErrorKind::CameraStreamFailed => "camera-stream-failed",
            ErrorKind::InvalidFileType => "invalid-file-type",
            ErrorKind::FileTooLarge => "file-too-large",
            ErrorKind::NetworkFailure => "network-failure",
            ErrorKind::ServerReportedFailure => "server-reported-failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera found: {0}")]
    NotFound(String),
    #[error("camera unsupported: {0}")]
    Unsupported(String),
    #[error("camera stream failed: {0}")]
    StreamFailed(String),
}

impl CameraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::PermissionDenied(_) => ErrorKind::CameraPermissionDenied,
            CameraError::NotFound(_) => ErrorKind::CameraNotFound,
            CameraError::Unsupported(_) => ErrorKind::CameraUnsupported,
            CameraError::StreamFailed(_) => ErrorKind::CameraStreamFailed,
        }
    }

    /// Short reason used as the payload of `SessionState::Error`.
    pub fn reason(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => "permission-denied",
            CameraError::NotFound(_) => "not-found",
            CameraError::Unsupported(_) => "unsupported",
            CameraError::StreamFailed(_) => "stream-failed",
        }
    }

    /// Classify a platform error message. Backends report denial and absence
    /// only through their message text.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("permission")
            || lower.contains("denied")
            || lower.contains("not authorized")
        {
            CameraError::PermissionDenied(message)
        } else if lower.contains("not found")
            || lower.contains("no device")
            || lower.contains("no such")
            || lower.contains("out of range")
        {
            CameraError::NotFound(message)
        } else if lower.contains("unsupported") || lower.contains("not implemented") {
            CameraError::Unsupported(message)
        } else {
            CameraError::StreamFailed(message)
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Please select a valid image file ({0})")]
    InvalidFileType(String),
    #[error(
        "Image size must be less than {limit_mib}MB (got {size} bytes)",
        limit_mib = .limit / (1024 * 1024)
    )]
    FileTooLarge { size: u64, limit: u64 },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::InvalidFileType(_) | UploadError::Read { .. } => {
                ErrorKind::InvalidFileType
            }
            UploadError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    ServerReported(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Network { .. } | ServiceError::Decode { .. } => ErrorKind::NetworkFailure,
            ServiceError::ServerReported(_) => ErrorKind::ServerReportedFailure,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::denied("Permission denied (os error 13)", ErrorKind::CameraPermissionDenied)]
    #[case::not_authorized(
        "User not authorized to access camera",
        ErrorKind::CameraPermissionDenied
    )]
    #[case::missing("Device not found: index 3", ErrorKind::CameraNotFound)]
    #[case::unsupported("Unsupported operation on backend", ErrorKind::CameraUnsupported)]
    #[case::other("Could not capture frame", ErrorKind::CameraStreamFailed)]
    fn classify_camera_messages(#[case] message: &str, #[case] expected: ErrorKind) {
        assert_eq!(CameraError::classify(message).kind(), expected);
    }

    #[test]
    fn too_large_message_reports_limit_in_mib() {
        let err = UploadError::FileTooLarge {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        assert!(err.to_string().starts_with("Image size must be less than 10MB"));
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
    }

    #[test]
    fn kinds_render_kebab_case() {
        assert_eq!(ErrorKind::ServerReportedFailure.to_string(), "server-reported-failure");
        assert_eq!(CameraError::NotFound(String::new()).reason(), "not-found");
    }
}
