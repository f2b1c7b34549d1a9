use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn read(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidUpload(format!("no file name in {}", path.display())))?
            .to_string();
        let bytes = fs::read(path)?;
        Ok(Self { filename, bytes })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobAccepted {
    #[serde(rename = "docId", default)]
    pub doc_id: Option<String>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn upload_document(&self, token: &str, file: UploadFile) -> Result<JobAccepted>;

    async fn export_brief(&self, token: &str, doc_id: &str) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    // Each segment is percent-encoded, so ids cannot alter the path or query.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| ClientError::Endpoint(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Endpoint(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl Gateway for ApiClient {
    async fn upload_document(&self, token: &str, file: UploadFile) -> Result<JobAccepted> {
        let size = file.bytes.len();
        let part = Part::bytes(file.bytes)
            .file_name(file.filename.clone())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);

        tracing::info!(filename = %file.filename, size, "uploading document");
        let response = self
            .client
            .post(self.url(&["process", "document"])?)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let body = check(response).await?.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn export_brief(&self, token: &str, doc_id: &str) -> Result<Vec<u8>> {
        tracing::info!(doc_id, "exporting brief");
        let response = self
            .client
            .get(self.url(&["export", doc_id])?)
            .bearer_auth(token)
            .send()
            .await?;
        let bytes = check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Http {
        status,
        message: error_detail(&body),
    })
}

// The backend reports failures as `{"detail": "..."}`.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub fn export_filename(doc_id: &str) -> String {
    format!("brief_{doc_id}.docx")
}

pub fn save_export(dir: &Path, doc_id: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(doc_id));
    fs::write(&path, bytes)?;
    tracing::info!(path = %path.display(), "saved exported brief");
    Ok(path)
}
