// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::{ParseError, Url};

use crate::error::ConfigError;

const UPLOAD_PATH: &str = "upload-pdf";
const PODCAST_DIR: &str = "podcast_generated";

/// URLs of the conversion server, all derived from one base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse and validate a server base URL such as `http://localhost:5000`
    pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url).map_err(|e| ConfigError::InvalidServerUrl {
            url: base_url.to_string(),
            source: e,
        })?;
        Self::new(base)
    }

    pub fn new(base: Url) -> Result<Self, ConfigError> {
        if base.cannot_be_a_base() {
            return Err(ConfigError::NotABaseUrl(base.to_string()));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Liveness endpoint (`GET {base}/`)
    pub fn root_url(&self) -> Url {
        self.base.clone()
    }

    /// `POST {base}/upload-pdf`
    pub fn upload_url(&self) -> Result<Url, ParseError> {
        self.with_segments(&[UPLOAD_PATH])
    }

    /// `GET {base}/podcast_generated/{filename}`, with the filename encoded as
    /// a single path segment
    pub fn podcast_url(&self, filename: &str) -> Result<Url, ParseError> {
        self.with_segments(&[PODCAST_DIR, filename])
    }

    fn with_segments(&self, segments: &[&str]) -> Result<Url, ParseError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
