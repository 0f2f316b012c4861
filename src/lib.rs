pub mod config;
pub mod endpoints;
pub mod error;
pub mod fetch;
pub mod http;
pub mod library;
pub mod logging;
pub mod playback;
pub mod progress;
pub mod title;
pub mod upload;

// Re-export main types for convenience
pub use config::{Config, FileConfig, Overrides, find_config_file, load_config};
pub use endpoints::Endpoints;
pub use error::{ConfigError, FetchError, PlaybackError, StorageError, UploadError};
pub use fetch::{FetchResult, fetch_podcast};
pub use http::{HttpClient, HttpResponse, MultipartFile, ReqwestClient, TextResponse};
pub use library::{FileStorage, KeyValueStorage, LibraryState, LibraryStore, MemoryStorage, PodcastRecord};
pub use logging::init_logging;
pub use playback::{
    AudioBackend, AudioResource, BufferedBackend, PlayOutcome, PlaybackController,
    PlaybackSnapshot, PlaybackState,
};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use title::display_title;
pub use upload::{UploadController, UploadFile, UploadOutcome};
