// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod backend;
mod buffered;
mod controller;
mod format;

pub use backend::{AudioBackend, AudioResource, PlaybackStatus, StatusSink, StatusUpdate};
pub use buffered::{BufferedBackend, BufferedResource};
pub use controller::{PlayOutcome, PlaybackController, PlaybackSnapshot, PlaybackState};
pub use format::{AudioInfo, FALLBACK_BITRATE, probe_audio};
