// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP client for the FrameShift analysis service

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::options::AnalysisConfig;
use crate::result::AnalysisResult;
use crate::upload::{Slot, UploadedImage};
use crate::{FrameShiftError, Result};

/// Anything that can compare two images. The HTTP client is the real
/// implementation; tests substitute their own.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(
        &self,
        image1: &UploadedImage,
        image2: &UploadedImage,
        config: &AnalysisConfig,
    ) -> Result<AnalysisResult>;
}

/// Greeting returned by the service root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// FrameShift API client
pub struct AnalysisClient {
    client: Client,
    endpoint: Url,
}

impl AnalysisClient {
    /// Create a client posting to `endpoint`. No request timeout is set;
    /// a call waits until the transport resolves or fails.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("frameshift/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ask the service root whether it is up
    pub async fn status(&self) -> Result<ServiceStatus> {
        let url = self
            .endpoint
            .join("/")
            .map_err(|e| FrameShiftError::Config(format!("Invalid endpoint: {}", e)))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FrameShiftError::Service(response.status()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn image_part(slot: Slot, image: &UploadedImage) -> Result<Part> {
        debug!(
            "Attaching {} as {} ({} bytes, {})",
            image.file_name,
            slot.field_name(),
            image.size_bytes(),
            image.mime_type
        );
        Ok(Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime_type)?)
    }

    /// Build the multipart body: `image1`, `image2` and `config` as JSON text
    pub fn build_form(
        image1: &UploadedImage,
        image2: &UploadedImage,
        config: &AnalysisConfig,
    ) -> Result<Form> {
        Ok(Form::new()
            .part(Slot::Before.field_name(), Self::image_part(Slot::Before, image1)?)
            .part(Slot::After.field_name(), Self::image_part(Slot::After, image2)?)
            .text("config", config.to_json()?))
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn analyze(
        &self,
        image1: &UploadedImage,
        image2: &UploadedImage,
        config: &AnalysisConfig,
    ) -> Result<AnalysisResult> {
        let form = Self::build_form(image1, image2, config)?;

        debug!("POST {} with config {:?}", self.endpoint, config);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Body is kept out of the user-facing error; it only goes to the log.
            if let Ok(text) = response.text().await {
                debug!("Analysis service error body: {}", text);
            }
            return Err(FrameShiftError::Service(status));
        }

        let body = response.bytes().await?;
        let result = AnalysisResult::from_json(&body)?;

        if result.reported_failure() {
            let detail = result.error.clone().unwrap_or_else(|| "unspecified".to_string());
            warn!("Analysis service reported failure: {}", detail);
            return Err(FrameShiftError::ServiceReported(detail));
        }

        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upload::tests::png_bytes;
    use axum::extract::{Multipart, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    /// What the fake service saw in one request
    #[derive(Debug, Default, Clone)]
    pub(crate) struct Received {
        pub fields: Vec<(String, Option<String>, usize)>,
        pub config: Option<serde_json::Value>,
    }

    #[derive(Clone)]
    pub(crate) struct FakeService {
        pub status: StatusCode,
        pub body: String,
        pub requests: Arc<Mutex<Vec<Received>>>,
    }

    async fn fake_analyze(
        State(fake): State<FakeService>,
        mut multipart: Multipart,
    ) -> (StatusCode, String) {
        let mut received = Received::default();
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.unwrap_or_default();
            if name == "config" {
                received.config = serde_json::from_slice(&data).ok();
            }
            received.fields.push((name, file_name, data.len()));
        }
        fake.requests.lock().unwrap().push(received);
        (fake.status, fake.body.clone())
    }

    async fn fake_root() -> Json<ServiceStatus> {
        Json(ServiceStatus {
            message: "FrameShift API v1.1".into(),
            status: "ready".into(),
        })
    }

    /// Serve a canned response on an ephemeral port
    pub(crate) async fn spawn_fake(status: StatusCode, body: &str) -> (Url, FakeService) {
        let fake = FakeService {
            status,
            body: body.to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/", get(fake_root))
            .route("/api/analyze", post(fake_analyze))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{}/api/analyze", addr)).unwrap();
        (url, fake)
    }

    pub(crate) fn sample_images() -> (UploadedImage, UploadedImage) {
        (
            UploadedImage::decode("before.png", png_bytes(16, 16), 8).unwrap(),
            UploadedImage::decode("after.png", png_bytes(16, 16), 8).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_posts_three_multipart_fields() {
        let (url, fake) = spawn_fake(StatusCode::OK, r#"{"changes_count": 0, "ssim_score": 1.0}"#).await;
        let client = AnalysisClient::new(url).unwrap();
        let (before, after) = sample_images();

        let result = client
            .analyze(&before, &after, &AnalysisConfig::default())
            .await
            .unwrap();
        assert_eq!(result.changes_count, Some(0));

        let requests = fake.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let names: Vec<&str> = requests[0].fields.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["image1", "image2", "config"]);
        assert_eq!(requests[0].fields[0].1.as_deref(), Some("before.png"));
        assert_eq!(requests[0].fields[0].2, before.bytes.len());

        let config = requests[0].config.as_ref().unwrap();
        assert_eq!(config["sensitivity"], 0.15);
        assert_eq!(config["use_roi"], false);
    }

    #[tokio::test]
    async fn test_non_success_status_is_service_error() {
        let (url, _fake) = spawn_fake(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"success": false, "error": "bad image"}"#,
        )
        .await;
        let client = AnalysisClient::new(url).unwrap();
        let (before, after) = sample_images();

        let err = client
            .analyze(&before, &after, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameShiftError::Service(s) if s == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let (url, _fake) = spawn_fake(StatusCode::OK, "not json").await;
        let client = AnalysisClient::new(url).unwrap();
        let (before, after) = sample_images();

        let err = client
            .analyze(&before, &after, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameShiftError::Decode(_)));
    }

    #[tokio::test]
    async fn test_success_false_is_reported_failure() {
        let (url, _fake) = spawn_fake(StatusCode::OK, r#"{"success": false, "error": "oops"}"#).await;
        let client = AnalysisClient::new(url).unwrap();
        let (before, after) = sample_images();

        let err = client
            .analyze(&before, &after, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameShiftError::ServiceReported(ref d) if d == "oops"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/api/analyze", addr)).unwrap();
        let client = AnalysisClient::new(url).unwrap();
        let (before, after) = sample_images();

        let err = client
            .analyze(&before, &after, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameShiftError::Transport(_)));
    }

    #[tokio::test]
    async fn test_status_reads_root() {
        let (url, _fake) = spawn_fake(StatusCode::OK, "{}").await;
        let client = AnalysisClient::new(url).unwrap();
        let status = client.status().await.unwrap();
        assert_eq!(status.status, "ready");
    }
}
