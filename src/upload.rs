// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::watch;

use crate::endpoints::Endpoints;
use crate::error::UploadError;
use crate::http::{HttpClient, MultipartFile};
use crate::library::{LibraryStore, PodcastRecord};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Multipart field the server reads the PDF from
pub const UPLOAD_FIELD: &str = "pdf_file";

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A file selected for conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    /// Filename reported to the server
    pub name: String,
    pub mime_type: String,
}

impl UploadFile {
    /// A PDF named after the last component of its path
    pub fn pdf(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file.pdf".to_string());

        Self {
            path,
            name,
            mime_type: PDF_MIME_TYPE.to_string(),
        }
    }
}

/// Body of a successful `/upload-pdf` response
#[derive(Debug, Clone, Deserialize)]
struct UploadResponse {
    podcast_filename: Option<String>,
    message: Option<String>,
    /// Name of the uploaded PDF as saved by the server
    filename: Option<String>,
    generated_dialogue: Option<String>,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// The record added to the library
    pub record: PodcastRecord,
    pub message: Option<String>,
    pub source_filename: Option<String>,
    /// Dialogue script the podcast was voiced from
    pub generated_dialogue: Option<String>,
}

/// Sends PDFs to the conversion server and registers the resulting podcasts
pub struct UploadController<C: HttpClient> {
    client: C,
    endpoints: Endpoints,
    library: LibraryStore,
    reporter: SharedProgressReporter,
    in_flight: watch::Sender<bool>,
}

/// Clears the in-flight flag however the upload ends
struct InFlightGuard<'a>(&'a watch::Sender<bool>);

impl<'a> InFlightGuard<'a> {
    fn raise(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl<C: HttpClient> UploadController<C> {
    pub fn new(
        client: C,
        endpoints: Endpoints,
        library: LibraryStore,
        reporter: SharedProgressReporter,
    ) -> Self {
        let (in_flight, _) = watch::channel(false);
        Self {
            client,
            endpoints,
            library,
            reporter,
            in_flight,
        }
    }

    /// Whether an upload request is pending
    pub fn is_in_flight(&self) -> bool {
        *self.in_flight.borrow()
    }

    pub fn subscribe_in_flight(&self) -> watch::Receiver<bool> {
        self.in_flight.subscribe()
    }

    /// Upload a file for conversion.
    ///
    /// Sends exactly one request. On success the produced podcast is added to
    /// the library; on any failure the library is left untouched.
    pub async fn upload(&self, file: &UploadFile) -> Result<UploadOutcome, UploadError> {
        let _guard = InFlightGuard::raise(&self.in_flight);

        self.reporter.report(ProgressEvent::UploadStarted {
            file_name: file.name.clone(),
        });

        let result = self.send(file).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    file = %file.name,
                    podcast = %outcome.record.filename,
                    "Upload succeeded"
                );
                self.reporter.report(ProgressEvent::UploadSucceeded {
                    file_name: file.name.clone(),
                    podcast_filename: outcome.record.filename.clone(),
                    message: outcome.message.clone(),
                });
            }
            Err(e) => {
                tracing::error!(file = %file.name, error = %e, "Upload failed");
                self.reporter.report(ProgressEvent::UploadFailed {
                    file_name: file.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        result
    }

    async fn send(&self, file: &UploadFile) -> Result<UploadOutcome, UploadError> {
        let data = read_file(&file.path).await?;
        let url = self.endpoints.upload_url()?;

        tracing::debug!(url = %url, file = %file.name, bytes = data.len(), "Uploading PDF");

        let response = self
            .client
            .post_multipart(
                url.as_str(),
                MultipartFile {
                    field: UPLOAD_FIELD.to_string(),
                    file_name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    data,
                },
            )
            .await
            .map_err(UploadError::Failed)?;

        if !response.is_success() {
            return Err(UploadError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        let parsed = parse_response(&response.body)?;
        let podcast_filename = parsed
            .podcast_filename
            .ok_or(UploadError::MissingArtifactIdentifier)?;

        let record = self.library.add(podcast_filename);

        Ok(UploadOutcome {
            record,
            message: parsed.message,
            source_filename: parsed.filename,
            generated_dialogue: parsed.generated_dialogue,
        })
    }
}

async fn read_file(path: &Path) -> Result<Bytes, UploadError> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| UploadError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Parse a success body, treating unusable payloads as a missing identifier
fn parse_response(body: &str) -> Result<UploadResponse, UploadError> {
    let mut parsed: UploadResponse = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, "Upload response is not valid JSON");
        UploadError::MissingArtifactIdentifier
    })?;

    parsed.podcast_filename = parsed
        .podcast_filename
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    Ok(parsed)
}
