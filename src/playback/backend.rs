// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::PlaybackError;

/// Status reported by a loaded audio resource
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    /// Current position, and the total duration when the resource knows it
    Progress {
        position: Duration,
        duration: Option<Duration>,
    },
    /// Playback reached the end of the media
    Finished,
    /// The resource failed while playing
    Error(String),
}

/// A status tagged with the session that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub generation: u64,
    pub status: PlaybackStatus,
}

/// Channel a resource uses to report its status to the owning controller.
///
/// Every update carries the generation of the session the resource was
/// loaded for, so updates from superseded sessions can be told apart.
#[derive(Debug, Clone)]
pub struct StatusSink {
    generation: u64,
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl StatusSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        Self { generation, tx }
    }

    /// A sink paired with its own receiver, for driving a backend directly
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(generation, tx), rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Send a status; returns false once the controller is gone
    pub fn send(&self, status: PlaybackStatus) -> bool {
        self.tx
            .send(StatusUpdate {
                generation: self.generation,
                status,
            })
            .is_ok()
    }
}

/// Loads remote audio into playable resources
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    type Resource: AudioResource;

    /// Load the audio at `url`. The returned resource is paused at position
    /// zero and reports its status through `sink`.
    async fn load(&self, url: &Url, sink: StatusSink) -> Result<Self::Resource, PlaybackError>;
}

/// A loaded, playable audio resource.
///
/// The holder owns it exclusively. `unload` releases it; implementations
/// must also release everything on drop.
#[async_trait]
pub trait AudioResource: Send + 'static {
    /// Total duration, when known
    fn duration(&self) -> Option<Duration>;

    async fn play(&mut self) -> Result<(), PlaybackError>;

    async fn pause(&mut self) -> Result<(), PlaybackError>;

    async fn resume(&mut self) -> Result<(), PlaybackError>;

    /// Stop playback and rewind to the start
    async fn stop(&mut self) -> Result<(), PlaybackError>;

    async fn unload(&mut self);
}
