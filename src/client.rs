use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::{Client, Response, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{
    config::{AnalyzeEndpoint, Settings},
    error::ServiceError,
    types::{Analysis, CameraStatus, Detection, ModelStatus},
};

/// Image file ready to be posted as a multipart part.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Everything the client needs from the detection server.
pub trait DetectionService: Send + Sync {
    fn model_status(&self) -> Result<ModelStatus, ServiceError>;

    fn camera_status(&self) -> Result<CameraStatus, ServiceError>;

    /// Analyse a still image with the given endpoint.
    fn analyze(
        &self,
        endpoint: AnalyzeEndpoint,
        image: &ImagePayload,
    ) -> Result<Analysis, ServiceError>;

    /// Submit one JPEG-encoded camera frame.
    fn process_frame(&self, jpeg: Vec<u8>) -> Result<Vec<Detection>, ServiceError>;

    /// URL of the server camera stream, cache-busted with `timestamp_ms`.
    fn video_feed_url(&self, timestamp_ms: u128) -> String;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    image: Option<String>,
    #[serde(default)]
    detections: Vec<Detection>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    results: Vec<Detection>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    detections: Vec<Detection>,
    error: Option<String>,
}

impl UploadResponse {
    fn into_analysis(self) -> Result<Analysis, ServiceError> {
        if !self.success {
            return Err(ServiceError::ServerReported(
                self.error.unwrap_or_else(|| "Analysis failed".to_string()),
            ));
        }
        Ok(Analysis {
            image: self.image,
            detections: self.detections,
        })
    }
}

impl DetectResponse {
    fn into_analysis(self) -> Result<Analysis, ServiceError> {
        if let Some(error) = self.error {
            return Err(ServiceError::ServerReported(error));
        }
        // `/detect` reports confidence as a 0-1 fraction.
        let detections = self
            .results
            .into_iter()
            .map(|mut detection| {
                if detection.confidence <= 1.0 {
                    detection.confidence *= 100.0;
                }
                detection
            })
            .collect();
        Ok(Analysis {
            image: None,
            detections,
        })
    }
}

impl FrameResponse {
    fn into_detections(self) -> Result<Vec<Detection>, ServiceError> {
        if !self.success {
            return Err(ServiceError::ServerReported(
                self.error.unwrap_or_else(|| "Frame processing failed".to_string()),
            ));
        }
        Ok(self.detections)
    }
}

pub struct HttpDetectionService {
    base_url: String,
    client: Client,
}

impl HttpDetectionService {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            base_url: settings.server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .map_err(|source| network(path, source))?;
        read_json(path, response)
    }

    fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .map_err(|source| network(path, source))?;
        read_json(path, response)
    }
}

impl DetectionService for HttpDetectionService {
    fn model_status(&self) -> Result<ModelStatus, ServiceError> {
        self.get_json("/model_status")
    }

    fn camera_status(&self) -> Result<CameraStatus, ServiceError> {
        self.get_json("/camera_status")
    }

    fn analyze(
        &self,
        endpoint: AnalyzeEndpoint,
        image: &ImagePayload,
    ) -> Result<Analysis, ServiceError> {
        let path = endpoint.path();
        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime)
            .map_err(|source| network(path, source))?;
        let form = multipart::Form::new().part("file", part);

        match endpoint {
            AnalyzeEndpoint::Upload => {
                self.post_form::<UploadResponse>(path, form)?.into_analysis()
            }
            AnalyzeEndpoint::Detect => {
                self.post_form::<DetectResponse>(path, form)?.into_analysis()
            }
        }
    }

    fn process_frame(&self, jpeg: Vec<u8>) -> Result<Vec<Detection>, ServiceError> {
        let path = "/process_frame";
        let part = multipart::Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|source| network(path, source))?;
        let form = multipart::Form::new().part("frame", part);
        self.post_form::<FrameResponse>(path, form)?.into_detections()
    }

    fn video_feed_url(&self, timestamp_ms: u128) -> String {
        format!("{}?t={timestamp_ms}", self.url("/video_feed"))
    }
}

fn network(endpoint: &str, source: reqwest::Error) -> ServiceError {
    ServiceError::Network {
        endpoint: endpoint.to_string(),
        source,
    }
}

/// The server answers errors with a JSON body and a 4xx status, so the body is
/// decoded before the status is consulted.
fn read_json<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.text().map_err(|source| network(endpoint, source))?;
    decode_body(endpoint, status.is_success(), status.as_u16(), &body)
}

fn decode_body<T: DeserializeOwned>(
    endpoint: &str,
    success: bool,
    status: u16,
    body: &str,
) -> Result<T, ServiceError> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(_) if !success => Err(ServiceError::ServerReported(format!(
            "{endpoint} returned HTTP {status}"
        ))),
        Err(source) => Err(ServiceError::Decode {
            endpoint: endpoint.to_string(),
            source,
        }),
    }
}

pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
}
