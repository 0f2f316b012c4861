// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::endpoints::Endpoints;
use crate::error::ConfigError;

pub const DEFAULT_SERVER: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const APP_DIR: &str = "pdfcast";
const CWD_CONFIG: &str = "pdfcast.toml";

/// Settings read from a TOML config file. Every key is optional.
#[derive(Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub server: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Settings given on the command line; they win over the config file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub server: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Endpoints,
    /// Directory holding the persisted library
    pub data_dir: PathBuf,
    pub timeout: Duration,
}

impl Config {
    /// Merge command line, config file and defaults, in that order
    pub fn resolve(file: Option<FileConfig>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();

        let server = overrides
            .server
            .clone()
            .or(file.server)
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let endpoints = Endpoints::parse(server.trim())?;

        let data_dir = match overrides.data_dir.clone().or(file.data_dir) {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Config {
            endpoints,
            data_dir,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(ConfigError::NoDataDir)
}

/// Locate the config file: an explicit path, then `./pdfcast.toml`, then
/// `<config dir>/pdfcast/config.toml`
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let cwd_config = PathBuf::from(CWD_CONFIG);
    if cwd_config.exists() {
        return Some(cwd_config);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let user_config = config_dir.join(APP_DIR).join("config.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
