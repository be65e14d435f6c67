use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use studybuddy_core::{ChatRequest, ProgressSnapshot};
use studybuddy_logging::{sb_debug, sb_info};
use url::Url;

use crate::{ClientError, DocumentListing, FailureKind, HealthStatus, UploadReceipt};

/// Raw chunks of a streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: Url,
    pub connect_timeout: Duration,
    /// Whole-request limit for one-shot requests (upload, status, listing).
    pub request_timeout: Duration,
    /// Whole-request limit for a streamed chat answer.
    pub chat_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8000/").expect("static url"),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            chat_timeout: Duration::from_secs(300),
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(base_url)
            .map_err(|err| ClientError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::new(
                FailureKind::InvalidUrl,
                format!("{base_url} cannot be a base url"),
            ));
        }
        self.base_url = url;
        Ok(self)
    }
}

/// Backend operations the poller, the chat decoder and the engine rely on.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<UploadReceipt, ClientError>;

    async fn fetch_status(&self, task_id: &str) -> Result<ProgressSnapshot, ClientError>;

    /// Opens the chat stream. A non-2xx status is an error; the body is
    /// returned unparsed.
    async fn open_chat(&self, request: &ChatRequest) -> Result<ByteStream, ClientError>;

    async fn list_documents(&self) -> Result<DocumentListing, ClientError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), ClientError>;

    async fn health(&self) -> Result<HealthStatus, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ClientError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    /// Resolves `segments` below the base URL, escaping each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.settings.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::new(
                    FailureKind::InvalidUrl,
                    format!("{} cannot be a base url", self.settings.base_url),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::new(FailureKind::MalformedResponse, err.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn upload(&self, path: &Path) -> Result<UploadReceipt, ClientError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::new(FailureKind::UnsupportedFile, "path has no file name"))?;
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(ClientError::new(
                FailureKind::UnsupportedFile,
                format!("only PDF files are supported: {filename}"),
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ClientError::new(FailureKind::Io, format!("{}: {err}", path.display())))?;
        sb_info!("Uploading {} ({} bytes)", filename, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")
            .map_err(map_reqwest_error)?;
        let form = Form::new().part("file", part);
        let url = self.endpoint(&["api", "documents", "upload"])?;
        self.send_json(self.client.post(url).multipart(form)).await
    }

    async fn fetch_status(&self, task_id: &str) -> Result<ProgressSnapshot, ClientError> {
        let url = self.endpoint(&["api", "documents", "status", task_id])?;
        let snapshot: ProgressSnapshot = self.send_json(self.client.get(url)).await?;
        sb_debug!(
            "Task {} status={:?} progress={} stage={}",
            task_id,
            snapshot.status,
            snapshot.progress,
            snapshot.current_stage
        );
        Ok(snapshot)
    }

    async fn open_chat(&self, request: &ChatRequest) -> Result<ByteStream, ClientError> {
        let url = self.endpoint(&["api", "chat"])?;
        let response = self
            .client
            .post(url)
            .timeout(self.settings.chat_timeout)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        if response.content_length() == Some(0) {
            return Err(ClientError::new(FailureKind::MissingBody, "chat response has no body"));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }

    async fn list_documents(&self) -> Result<DocumentListing, ClientError> {
        let url = self.endpoint(&["api", "documents"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["api", "documents", document_id])?;
        let _: serde_json::Value = self.send_json(self.client.delete(url)).await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        let url = self.endpoint(&[])?;
        self.send_json(self.client.get(url)).await
    }
}

/// Maps a non-2xx response to `HttpStatus`, using the backend's `detail`
/// text when it sent one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    Err(ClientError::new(FailureKind::HttpStatus(status.as_u16()), message))
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ClientError::new(FailureKind::MalformedResponse, err.to_string());
    }
    ClientError::new(FailureKind::Network, err.to_string())
}
