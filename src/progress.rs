use std::sync::Arc;
use std::time::Duration;

/// User-facing events emitted by the upload, playback and fetch flows
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A PDF is being sent to the conversion server
    UploadStarted { file_name: String },

    /// The server produced a podcast and it was added to the library
    UploadSucceeded {
        file_name: String,
        podcast_filename: String,
        /// Human-readable message returned by the server, if any
        message: Option<String>,
    },

    /// The upload did not produce a podcast
    UploadFailed { file_name: String, error: String },

    /// A podcast is being loaded for playback
    PlaybackLoading { filename: String },

    /// Playback started
    PlaybackStarted {
        filename: String,
        duration: Option<Duration>,
    },

    PlaybackPaused { filename: String },

    PlaybackResumed { filename: String },

    /// Playback was stopped by the user
    PlaybackStopped { filename: String },

    /// The podcast played to its end
    PlaybackFinished { filename: String },

    /// Loading or playing failed; the session was torn down
    PlaybackFailed { filename: String, error: String },

    /// A podcast download to disk is starting
    FetchStarting {
        filename: String,
        content_length: Option<u64>,
    },

    /// Download progress update
    FetchProgress {
        filename: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A podcast download completed
    FetchCompleted {
        filename: String,
        bytes_downloaded: u64,
        hash: String,
    },
}

/// Trait for reporting user-facing events.
///
/// Implementations can use this to show alerts, draw progress bars,
/// or collect events in tests.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Reporter that records every event, for inspection in tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingReporter {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
