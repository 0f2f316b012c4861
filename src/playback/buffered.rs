// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::error::PlaybackError;
use crate::http::HttpClient;

use super::backend::{AudioBackend, AudioResource, PlaybackStatus, StatusSink};
use super::format::{AudioInfo, probe_audio};

const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// Headless backend: downloads the whole artifact into memory and drives a
/// playback clock over it.
///
/// Hosts with an audio device wrap [`BufferedResource::data`] with their
/// output; the clock then provides position, duration and completion.
pub struct BufferedBackend<C: HttpClient> {
    client: C,
    tick: Duration,
}

impl<C: HttpClient> BufferedBackend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            tick: DEFAULT_TICK,
        }
    }

    /// Report progress every `tick` instead of every 250ms
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    async fn download(&self, url: &Url) -> Result<Bytes, PlaybackError> {
        let response = self
            .client
            .get_stream(url.as_str())
            .await
            .map_err(|e| PlaybackError::FetchFailed {
                url: url.to_string(),
                source: e,
            })?;

        if !(200..300).contains(&response.status) {
            return Err(PlaybackError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        let capacity = response.content_length.unwrap_or(0).min(64 * 1024 * 1024) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut stream = response.body;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| PlaybackError::FetchFailed {
                url: url.to_string(),
                source: e,
            })?;
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }
}

#[async_trait]
impl<C: HttpClient + 'static> AudioBackend for BufferedBackend<C> {
    type Resource = BufferedResource;

    async fn load(&self, url: &Url, sink: StatusSink) -> Result<BufferedResource, PlaybackError> {
        let data = self.download(url).await?;

        // Demuxing the whole artifact is CPU bound
        let extension = url_extension(url);
        let buffered = data.clone();
        let probed = tokio::task::spawn_blocking(move || {
            probe_audio(buffered, extension.as_deref())
        })
        .await
        .map_err(|e| PlaybackError::Backend(format!("audio probe panicked: {e}")))?;

        let info = probed.map_err(|e| PlaybackError::UnsupportedFormat {
            url: url.to_string(),
            source: e,
        })?;

        tracing::debug!(
            url = %url,
            bytes = data.len(),
            codec = info.codec,
            duration = ?info.duration,
            "Podcast buffered"
        );

        Ok(BufferedResource {
            data: Some(data),
            duration: info.duration,
            info,
            tick: self.tick,
            sink,
            position: Duration::ZERO,
            clock: None,
        })
    }
}

/// Extension of the last path segment, used as a probe hint
fn url_extension(url: &Url) -> Option<String> {
    let name = url.path_segments()?.next_back()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

struct Clock {
    handle: JoinHandle<()>,
    started_at: Instant,
    from: Duration,
}

/// An artifact held in memory with a running playback clock
pub struct BufferedResource {
    data: Option<Bytes>,
    info: AudioInfo,
    duration: Duration,
    tick: Duration,
    sink: StatusSink,
    /// Position when the clock last stopped
    position: Duration,
    clock: Option<Clock>,
}

impl BufferedResource {
    /// The audio bytes, until unloaded
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Codec, sample rate and duration found when loading
    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    /// Current playback position
    pub fn position(&self) -> Duration {
        match &self.clock {
            Some(clock) => (clock.from + clock.started_at.elapsed()).min(self.duration),
            None => self.position,
        }
    }

    fn start_clock(&mut self) {
        if self.clock.is_some() {
            return;
        }
        let from = self.position;
        let handle = tokio::spawn(run_clock(self.sink.clone(), from, self.duration, self.tick));
        self.clock = Some(Clock {
            handle,
            started_at: Instant::now(),
            from,
        });
    }

    fn halt_clock(&mut self) {
        let position = self.position();
        if let Some(clock) = self.clock.take() {
            clock.handle.abort();
            self.position = position;
        }
    }

    fn ensure_loaded(&self) -> Result<(), PlaybackError> {
        match self.data {
            Some(_) => Ok(()),
            None => Err(PlaybackError::Backend("podcast was unloaded".to_string())),
        }
    }
}

#[async_trait]
impl AudioResource for BufferedResource {
    fn duration(&self) -> Option<Duration> {
        Some(self.duration)
    }

    async fn play(&mut self) -> Result<(), PlaybackError> {
        self.ensure_loaded()?;
        self.start_clock();
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        self.ensure_loaded()?;
        self.halt_clock();
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlaybackError> {
        self.play().await
    }

    async fn stop(&mut self) -> Result<(), PlaybackError> {
        self.halt_clock();
        self.position = Duration::ZERO;
        Ok(())
    }

    async fn unload(&mut self) {
        self.halt_clock();
        self.position = Duration::ZERO;
        self.data = None;
    }
}

impl Drop for BufferedResource {
    fn drop(&mut self) {
        if let Some(clock) = self.clock.take() {
            clock.handle.abort();
        }
    }
}

async fn run_clock(sink: StatusSink, from: Duration, duration: Duration, tick: Duration) {
    let started_at = Instant::now();
    let mut interval = tokio::time::interval_at(started_at + tick, tick);

    loop {
        interval.tick().await;
        let position = (from + started_at.elapsed()).min(duration);

        let delivered = sink.send(PlaybackStatus::Progress {
            position,
            duration: Some(duration),
        });
        if !delivered {
            return;
        }

        if position >= duration {
            sink.send(PlaybackStatus::Finished);
            return;
        }
    }
}
