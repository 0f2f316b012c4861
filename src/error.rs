// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid server URL '{url}': {source}")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Server URL '{0}' cannot carry a path")]
    NotABaseUrl(String),

    #[error("No data directory could be determined; pass --data-dir")]
    NoDataDir,
}

/// Errors raised by a persisted key/value storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse stored library: {0}")]
    JsonParseFailed(#[source] serde_json::Error),

    #[error("Failed to serialize library: {0}")]
    JsonSerializeFailed(#[source] serde_json::Error),
}

/// Errors that can occur while uploading a PDF for conversion
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Upload failed: {0}")]
    Failed(#[source] reqwest::Error),

    #[error("Server response did not contain a podcast filename")]
    MissingArtifactIdentifier,

    #[error("Invalid upload URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors that can occur while loading or controlling playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Playback failed: could not fetch {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Playback failed: HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Playback failed: {url} is not a supported audio format: {source}")]
    UnsupportedFormat {
        url: String,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("Playback failed: {0}")]
    Backend(String),

    #[error("Playback failed: invalid podcast URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors that can occur when fetching a generated podcast to disk
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid podcast URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
