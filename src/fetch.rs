// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::endpoints::Endpoints;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub path: PathBuf,
    pub bytes_downloaded: u64,
    /// Content hash in "sha256:hex" format
    pub content_hash: String,
}

/// Download a generated podcast into `output_dir`
///
/// Streams the response body to a `.partial` file, reporting progress through
/// the reporter, and renames it once complete so an interrupted download
/// never looks finished.
pub async fn fetch_podcast<C: HttpClient>(
    client: &C,
    endpoints: &Endpoints,
    filename: &str,
    output_dir: &Path,
    reporter: &SharedProgressReporter,
) -> Result<FetchResult, FetchError> {
    let url = endpoints.podcast_url(filename)?;
    let url = url.as_str();

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| FetchError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !(200..300).contains(&response.status) {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::FetchStarting {
        filename: filename.to_string(),
        content_length: response.content_length,
    });

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| FetchError::FileCreateFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    let output_path = output_dir.join(local_name(filename));
    let partial_path = output_path.with_extension(partial_extension(&output_path));

    let mut file = File::create(&partial_path)
        .await
        .map_err(|e| FetchError::FileCreateFailed {
            path: partial_path.clone(),
            source: e,
        })?;

    let mut hasher = Sha256::new();
    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial_path).await;
                return Err(FetchError::StreamFailed {
                    url: url.to_string(),
                    source: e,
                });
            }
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::FileWriteFailed {
                path: partial_path.clone(),
                source: e,
            })?;
        hasher.update(&chunk);

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::FetchProgress {
            filename: filename.to_string(),
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    // Ensure all data is flushed to disk
    file.flush()
        .await
        .map_err(|e| FetchError::FileWriteFailed {
            path: partial_path.clone(),
            source: e,
        })?;
    drop(file);

    tokio::fs::rename(&partial_path, &output_path)
        .await
        .map_err(|e| FetchError::FileWriteFailed {
            path: output_path.clone(),
            source: e,
        })?;

    let content_hash = format!("sha256:{:x}", hasher.finalize());

    tracing::info!(
        filename,
        path = %output_path.display(),
        bytes = bytes_downloaded,
        "Podcast fetched"
    );
    reporter.report(ProgressEvent::FetchCompleted {
        filename: filename.to_string(),
        bytes_downloaded,
        hash: content_hash.clone(),
    });

    Ok(FetchResult {
        path: output_path,
        bytes_downloaded,
        content_hash,
    })
}

/// Keep only the final path component of a server-issued name
fn local_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("podcast.mp3")
}

fn partial_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.partial", ext.to_string_lossy()),
        None => "partial".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, HttpResponse, MultipartFile, TextResponse};
    use crate::progress::{NoopReporter, RecordingReporter};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct MockHttpClient {
        response_data: Vec<u8>,
        status: u16,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from(self.response_data.clone()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            let data = self.response_data.clone();
            let len = data.len() as u64;

            let stream: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

            Ok(HttpResponse {
                status: self.status,
                content_length: Some(len),
                body: stream,
            })
        }

        async fn post_multipart(
            &self,
            _url: &str,
            _file: MultipartFile,
        ) -> Result<TextResponse, reqwest::Error> {
            unreachable!("fetch never uploads")
        }
    }

    fn endpoints() -> Endpoints {
        Endpoints::parse("http://localhost:5000").unwrap()
    }

    #[tokio::test]
    async fn fetch_writes_file() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient {
            response_data: b"test audio content".to_vec(),
            status: 200,
        };
        let recorder = RecordingReporter::shared();
        let reporter: SharedProgressReporter = recorder.clone();

        let result = fetch_podcast(&client, &endpoints(), "podcast_1.mp3", dir.path(), &reporter)
            .await
            .unwrap();

        assert_eq!(result.bytes_downloaded, 18); // "test audio content".len()
        assert_eq!(result.path, dir.path().join("podcast_1.mp3"));
        assert!(result.content_hash.starts_with("sha256:"));
        assert_eq!(result.content_hash.len(), "sha256:".len() + 64);

        let content = std::fs::read(&result.path).unwrap();
        assert_eq!(content, b"test audio content");
        assert!(!dir.path().join("podcast_1.mp3.partial").exists());

        assert!(matches!(
            recorder.events().last(),
            Some(ProgressEvent::FetchCompleted { bytes_downloaded: 18, .. })
        ));
    }

    #[tokio::test]
    async fn fetch_fails_on_http_error() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient {
            response_data: b"Not Found".to_vec(),
            status: 404,
        };
        let reporter: SharedProgressReporter = Arc::new(NoopReporter);

        let result =
            fetch_podcast(&client, &endpoints(), "missing.mp3", dir.path(), &reporter).await;

        match result.unwrap_err() {
            FetchError::HttpStatus { status, url } => {
                assert_eq!(status, 404);
                assert_eq!(url, "http://localhost:5000/podcast_generated/missing.mp3");
            }
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
        assert!(!dir.path().join("missing.mp3").exists());
    }

    #[test]
    fn local_name_strips_directories() {
        assert_eq!(local_name("podcast_1.mp3"), "podcast_1.mp3");
        assert_eq!(local_name("../../etc/passwd"), "passwd");
        assert_eq!(local_name("a\\b.mp3"), "b.mp3");
        assert_eq!(local_name(".."), "podcast.mp3");
    }

    #[test]
    fn partial_extension_appends_suffix() {
        assert_eq!(partial_extension(Path::new("a.mp3")), "mp3.partial");
        assert_eq!(partial_extension(Path::new("a")), "partial");
    }
}
