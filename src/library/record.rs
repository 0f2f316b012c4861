use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::title::display_title;

/// A podcast produced by the conversion server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastRecord {
    /// Server-issued artifact name, e.g. `podcast_20240101120000.mp3`
    pub filename: String,
    /// When the podcast was registered; absent in lists written by older clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl PodcastRecord {
    /// Create a record stamped with the current time
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            added_at: Some(Utc::now()),
        }
    }

    pub fn title(&self) -> String {
        display_title(&self.filename)
    }
}
