use crate::config::DetectionServiceConfig;
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use std::fmt;
use thiserror::Error;
use tracing::instrument;

const UPLOAD_FILE_NAME: &str = "image.jpg";

#[derive(Error, Debug)]
pub enum DetectionClientError {
    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),
    #[error("Detection service unreachable: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Detection service returned {status}: {body}")]
    Server { status: StatusCode, body: String },
    #[error("Malformed detection response: {0}")]
    MalformedResponse(String),
}

impl DetectionClientError {
    pub fn describe(&self) -> String {
        match self {
            DetectionClientError::InvalidRequest(_) => {
                "The upload could not be forwarded to the detection service.".to_string()
            }
            DetectionClientError::Network(_) => {
                "The detection service could not be reached.".to_string()
            }
            DetectionClientError::Server { status, .. } => {
                format!("The detection service answered with status {}.", status)
            }
            DetectionClientError::MalformedResponse(_) => {
                "The detection service returned an unexpected response.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub probability: f64,
}

/// Keeps entries in the order the service wrote them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detections(pub Vec<Detection>);

impl<'de> Deserialize<'de> for Detections {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DetectionsVisitor;

        impl<'de> Visitor<'de> for DetectionsVisitor {
            type Value = Detections;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of class label to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Detections, A::Error> {
                let mut detections = Vec::with_capacity(access.size_hint().unwrap_or(5));
                while let Some((label, probability)) = access.next_entry::<String, f64>()? {
                    detections.push(Detection { label, probability });
                }
                Ok(Detections(detections))
            }
        }

        deserializer.deserialize_map(DetectionsVisitor)
    }
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    detections: Detections,
}

pub struct DetectionClient {
    http: reqwest::Client,
    url: String,
}

impl DetectionClient {
    pub fn new(config: &DetectionServiceConfig) -> Result<Self, DetectionClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DetectionClientError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn detect(
        &self,
        image_data: Vec<u8>,
        mime_type: &str,
    ) -> Result<Detections, DetectionClientError> {
        let part = Part::bytes(image_data)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(mime_type)
            .map_err(|e| DetectionClientError::InvalidRequest(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(DetectionClientError::Network)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Detection service returned {}: {}", status, body);
            return Err(DetectionClientError::Server { status, body });
        }

        let body = response
            .bytes()
            .await
            .map_err(DetectionClientError::Network)?;
        let parsed: DetectionResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Could not parse detection response: {}", e);
            DetectionClientError::MalformedResponse(e.to_string())
        })?;

        tracing::debug!("Received {} detections", parsed.detections.0.len());
        Ok(parsed.detections)
    }
}
