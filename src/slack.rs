use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use reqwest::multipart::{Form, Part};
use reqwest::{header::AUTHORIZATION, Client, Url};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::Error;

/// Ephemeral state handed out by the slot request and consumed by the two
/// later phases. One session covers exactly one file; the upload URL is
/// single-use.
struct UploadSession {
    upload_url: String,
    file_id: String,
}

#[derive(Deserialize)]
struct UploadSlotResponse {
    ok: bool,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct CompleteUploadResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FileUploader: Send + Sync + 'static {
    /// Publishes one local file to the configured channel with a
    /// human-readable comment. A blank comment falls back to the filename.
    async fn upload_file(&self, path: &Path, comment: &str) -> Result<(), Error>;
}

/// Drives Slack's three-phase external upload: request an upload slot,
/// transfer the bytes, then attach the uploaded blob to the channel.
///
/// Any rejected phase fails the whole upload; there is no retry or
/// resumption, and a failed upload restarts from the slot request.
pub struct SlackClient {
    client: Client,
    base_url: Url,
    token: String,
    channel: String,
}

impl SlackClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_base_url(
            &config.slack_base_url,
            &config.slack_token,
            &config.slack_channel,
        )
    }

    /// Creates a client against a custom base URL (for tests against a
    /// mock server).
    pub fn with_base_url(base_url: &str, token: &str, channel: &str) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;

        Ok(SlackClient {
            client,
            base_url,
            token: token.to_string(),
            channel: channel.to_string(),
        })
    }

    fn api_url(&self, api_method: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(&format!("api/{api_method}"))?)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn request_upload_slot(
        &self,
        filename: &str,
        length: u64,
    ) -> Result<UploadSession, Error> {
        let length = length.to_string();
        let resp = self
            .client
            .post(self.api_url("files.getUploadURLExternal")?)
            .header(AUTHORIZATION, self.bearer())
            .form(&[("filename", filename), ("length", length.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let slot: UploadSlotResponse = resp.json().await?;
        if !slot.ok {
            return Err(slack_error("files.getUploadURLExternal", slot.error));
        }

        let upload_url = slot
            .upload_url
            .ok_or_else(|| slack_error("files.getUploadURLExternal", None))?;
        let file_id = slot
            .file_id
            .ok_or_else(|| slack_error("files.getUploadURLExternal", None))?;

        Ok(UploadSession {
            upload_url,
            file_id,
        })
    }

    async fn transfer_bytes(
        &self,
        session: &UploadSession,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), Error> {
        let content_type = detect_content_type(filename);
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(&content_type)?;

        self.client
            .post(&session.upload_url)
            .multipart(Form::new().part("file", part))
            .timeout(Duration::from_secs(60))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn finalize(
        &self,
        session: &UploadSession,
        filename: &str,
        comment: &str,
    ) -> Result<(), Error> {
        let body = json!({
            "files": [{"id": session.file_id, "title": filename}],
            "channel_id": self.channel,
            "initial_comment": if comment.is_empty() { filename } else { comment },
        });

        let resp = self
            .client
            .post(self.api_url("files.completeUploadExternal")?)
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let done: CompleteUploadResponse = resp.json().await?;
        if !done.ok {
            return Err(slack_error("files.completeUploadExternal", done.error));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl FileUploader for SlackClient {
    async fn upload_file(&self, path: &Path, comment: &str) -> Result<(), Error> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::BadFilePath {
                path: path.display().to_string(),
            })?;
        let length = fs::metadata(path)?.len();

        let session = self.request_upload_slot(filename, length).await?;
        info!(
            "requested upload slot for {filename} ({length} bytes), file id {}",
            session.file_id
        );

        let bytes = fs::read(path)?;
        self.transfer_bytes(&session, filename, bytes).await?;
        info!("transferred {filename} to the file store");

        self.finalize(&session, filename, comment).await?;
        info!("shared {filename} in channel {}", self.channel);

        Ok(())
    }
}

fn detect_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

fn slack_error(api_method: &str, code: Option<String>) -> Error {
    Error::SlackApi {
        method: api_method.to_string(),
        code: code.unwrap_or_else(|| "unknown error".to_string()),
    }
}
