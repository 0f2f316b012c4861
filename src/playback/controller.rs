// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};

use crate::endpoints::Endpoints;
use crate::error::PlaybackError;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::backend::{AudioBackend, AudioResource, PlaybackStatus, StatusSink, StatusUpdate};

/// Lifecycle state of the playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
}

/// What the UI renders: state, current podcast and progress
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub filename: Option<String>,
    /// Never exceeds `duration`; zero whenever no resource is playing
    pub position: Duration,
    pub duration: Option<Duration>,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            filename: None,
            position: Duration::ZERO,
            duration: None,
        }
    }
}

/// Result of a `play` request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The podcast was loaded and is playing
    Started,
    /// The podcast was already loading or playing
    AlreadyActive,
    /// The podcast was paused and has been resumed
    Resumed,
    /// A later request replaced this one before its load finished
    Superseded,
}

struct Session<R> {
    /// Bumped whenever the session is replaced or torn down
    generation: u64,
    state: PlaybackState,
    filename: Option<String>,
    resource: Option<R>,
    position: Duration,
    duration: Option<Duration>,
}

impl<R> Session<R> {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            filename: self.filename.clone(),
            position: self.position,
            duration: self.duration,
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
    }

    /// End the session, returning the resource for the caller to release
    fn end(&mut self, state: PlaybackState) -> Option<R> {
        self.generation += 1;
        self.state = state;
        self.filename = None;
        self.position = Duration::ZERO;
        self.duration = None;
        self.resource.take()
    }
}

/// Owns the single audio resource being played.
///
/// Cloning yields another handle to the same controller. At most one
/// resource is loaded at any time: a new podcast is only loaded after the
/// previous one has been released, and a load that was superseded while in
/// flight is unloaded as soon as it completes.
pub struct PlaybackController<B: AudioBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: AudioBackend> Clone for PlaybackController<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<B: AudioBackend> {
    backend: B,
    endpoints: Endpoints,
    reporter: SharedProgressReporter,
    session: Mutex<Session<B::Resource>>,
    /// Serializes loads so two resources never coexist
    load_lock: Mutex<()>,
    snapshot: watch::Sender<PlaybackSnapshot>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl<B: AudioBackend> PlaybackController<B> {
    /// Create an idle controller.
    ///
    /// Must be called within a Tokio runtime; the status listener is spawned
    /// here and ends when the controller is dropped.
    pub fn new(backend: B, endpoints: Endpoints, reporter: SharedProgressReporter) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(PlaybackSnapshot::default());

        let shared = Arc::new(Shared {
            backend,
            endpoints,
            reporter,
            session: Mutex::new(Session {
                generation: 0,
                state: PlaybackState::Idle,
                filename: None,
                resource: None,
                position: Duration::ZERO,
                duration: None,
            }),
            load_lock: Mutex::new(()),
            snapshot,
            status_tx,
        });

        tokio::spawn(listen(Arc::downgrade(&shared), status_rx));

        Self { shared }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.snapshot.borrow().state
    }

    /// Observe state and progress changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Play a generated podcast, replacing whatever is currently loaded
    pub async fn play(&self, filename: &str) -> Result<PlayOutcome, PlaybackError> {
        let shared = &self.shared;
        let url = shared.endpoints.podcast_url(filename)?;

        let generation = {
            let mut session = shared.session.lock().await;

            if session.filename.as_deref() == Some(filename) {
                match session.state {
                    PlaybackState::Loading | PlaybackState::Playing => {
                        tracing::debug!(filename, "Podcast already active, ignoring play");
                        return Ok(PlayOutcome::AlreadyActive);
                    }
                    PlaybackState::Paused => {
                        shared.resume_locked(&mut session).await?;
                        return Ok(PlayOutcome::Resumed);
                    }
                    PlaybackState::Idle | PlaybackState::Stopped => {}
                }
            }

            // Invalidate the previous session; its resource is released below
            session.generation += 1;
            session.state = PlaybackState::Loading;
            session.filename = Some(filename.to_string());
            session.position = Duration::ZERO;
            session.duration = None;
            shared.publish(&session);
            session.generation
        };

        shared.reporter.report(ProgressEvent::PlaybackLoading {
            filename: filename.to_string(),
        });

        let _loading = shared.load_lock.lock().await;

        {
            let mut session = shared.session.lock().await;
            if let Some(mut previous) = session.resource.take() {
                tracing::debug!("Releasing previous podcast before loading");
                release(&mut previous).await;
            }
            if session.generation != generation {
                return Ok(PlayOutcome::Superseded);
            }
        }

        tracing::info!(filename, url = %url, "Loading podcast");
        let sink = StatusSink::new(generation, shared.status_tx.clone());
        let loaded = shared.backend.load(&url, sink).await;

        let mut session = shared.session.lock().await;

        if session.generation != generation {
            tracing::debug!(filename, "Discarding superseded load");
            if let Ok(mut stale) = loaded {
                stale.unload().await;
            }
            return Ok(PlayOutcome::Superseded);
        }

        let mut resource = match loaded {
            Ok(resource) => resource,
            Err(e) => {
                shared.fail(&mut session, None, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = resource.play().await {
            shared.fail(&mut session, Some(resource), &e).await;
            return Err(e);
        }

        session.duration = resource.duration();
        session.resource = Some(resource);
        session.state = PlaybackState::Playing;
        shared.publish(&session);

        tracing::info!(filename, duration = ?session.duration, "Playback started");
        shared.reporter.report(ProgressEvent::PlaybackStarted {
            filename: filename.to_string(),
            duration: session.duration,
        });

        Ok(PlayOutcome::Started)
    }

    /// Pause playback; returns false when nothing was playing
    pub async fn pause(&self) -> Result<bool, PlaybackError> {
        let shared = &self.shared;
        let mut session = shared.session.lock().await;

        if session.state != PlaybackState::Playing {
            tracing::debug!(state = ?session.state, "Nothing playing, ignoring pause");
            return Ok(false);
        }

        let result = match session.resource.as_mut() {
            Some(resource) => resource.pause().await,
            None => return Ok(false),
        };

        if let Err(e) = result {
            let resource = session.resource.take();
            shared.fail(&mut session, resource, &e).await;
            return Err(e);
        }

        session.state = PlaybackState::Paused;
        shared.publish(&session);
        if let Some(filename) = session.filename.clone() {
            shared
                .reporter
                .report(ProgressEvent::PlaybackPaused { filename });
        }
        Ok(true)
    }

    /// Resume paused playback; returns false when nothing was paused
    pub async fn resume(&self) -> Result<bool, PlaybackError> {
        let mut session = self.shared.session.lock().await;

        if session.state != PlaybackState::Paused {
            tracing::debug!(state = ?session.state, "Nothing paused, ignoring resume");
            return Ok(false);
        }

        self.shared.resume_locked(&mut session).await?;
        Ok(true)
    }

    /// Stop playback and release the resource; returns false when idle.
    ///
    /// Stopping while a podcast is loading discards that load.
    pub async fn stop(&self) -> bool {
        let shared = &self.shared;
        let mut session = shared.session.lock().await;

        if !matches!(
            session.state,
            PlaybackState::Loading | PlaybackState::Playing | PlaybackState::Paused
        ) {
            return false;
        }

        let filename = session.filename.clone();
        if let Some(mut resource) = session.end(PlaybackState::Stopped) {
            release(&mut resource).await;
        }
        shared.publish(&session);

        if let Some(filename) = filename {
            tracing::info!(filename = %filename, "Playback stopped");
            shared
                .reporter
                .report(ProgressEvent::PlaybackStopped { filename });
        }
        true
    }

    /// Release everything before the host goes away
    pub async fn shutdown(&self) {
        self.stop().await;
    }
}

impl<B: AudioBackend> Shared<B> {
    fn publish(&self, session: &Session<B::Resource>) {
        self.snapshot.send_replace(session.snapshot());
    }

    async fn resume_locked(
        &self,
        session: &mut Session<B::Resource>,
    ) -> Result<(), PlaybackError> {
        let result = match session.resource.as_mut() {
            Some(resource) => resource.resume().await,
            None => return Ok(()),
        };

        if let Err(e) = result {
            let resource = session.resource.take();
            self.fail(session, resource, &e).await;
            return Err(e);
        }

        session.state = PlaybackState::Playing;
        self.publish(session);
        if let Some(filename) = session.filename.clone() {
            self.reporter
                .report(ProgressEvent::PlaybackResumed { filename });
        }
        Ok(())
    }

    /// Tear the session down after a load or playback error
    async fn fail(
        &self,
        session: &mut Session<B::Resource>,
        failed: Option<B::Resource>,
        error: &PlaybackError,
    ) {
        let filename = session.filename.clone().unwrap_or_default();
        tracing::error!(filename = %filename, error = %error, "Playback failed");

        if let Some(mut resource) = failed {
            resource.unload().await;
        }
        if let Some(mut resource) = session.end(PlaybackState::Idle) {
            resource.unload().await;
        }
        self.publish(session);

        self.reporter.report(ProgressEvent::PlaybackFailed {
            filename,
            error: error.to_string(),
        });
    }

    async fn on_status(&self, update: StatusUpdate) {
        let mut session = self.session.lock().await;

        if update.generation != session.generation || !session.is_active() {
            tracing::trace!(
                generation = update.generation,
                current = session.generation,
                "Ignoring stale playback status"
            );
            return;
        }

        match update.status {
            PlaybackStatus::Progress { position, duration } => {
                if duration.is_some() {
                    session.duration = duration;
                }
                session.position = match session.duration {
                    Some(total) => position.min(total),
                    None => position,
                };
                self.publish(&session);
            }
            PlaybackStatus::Finished => {
                let filename = session.filename.clone().unwrap_or_default();
                if let Some(mut resource) = session.end(PlaybackState::Stopped) {
                    resource.unload().await;
                }
                self.publish(&session);

                tracing::info!(filename = %filename, "Playback finished");
                self.reporter
                    .report(ProgressEvent::PlaybackFinished { filename });
            }
            PlaybackStatus::Error(message) => {
                let resource = session.resource.take();
                self.fail(&mut session, resource, &PlaybackError::Backend(message))
                    .await;
            }
        }
    }
}

/// Stop and unload a resource, logging stop failures
async fn release<R: AudioResource>(resource: &mut R) {
    if let Err(e) = resource.stop().await {
        tracing::warn!(error = %e, "Failed to stop podcast before unloading");
    }
    resource.unload().await;
}

async fn listen<B: AudioBackend>(
    shared: Weak<Shared<B>>,
    mut updates: mpsc::UnboundedReceiver<StatusUpdate>,
) {
    while let Some(update) = updates.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.on_status(update).await;
    }
    tracing::debug!("Playback status listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::progress::{NoopReporter, RecordingReporter};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use url::Url;

    /// Counts live resources and remembers the highest count seen
    #[derive(Default)]
    struct LiveCounter {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    impl LiveCounter {
        fn acquire(&self) {
            let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn release(&self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockBackend {
        counter: Arc<LiveCounter>,
        failing: HashSet<String>,
        /// Loads of these filenames wait until notified
        gates: HashMap<String, Arc<Notify>>,
        started: StdMutex<Vec<String>>,
        load_started: Notify,
        sinks: StdMutex<HashMap<String, StatusSink>>,
        /// Resource operations ("play", "pause", "resume") that return an error
        broken_ops: Arc<StdMutex<HashSet<&'static str>>>,
    }

    impl MockBackend {
        fn failing(filenames: &[&str]) -> Self {
            Self {
                failing: filenames.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            }
        }

        fn gated(filenames: &[&str]) -> (Self, Vec<Arc<Notify>>) {
            let gates: Vec<Arc<Notify>> = filenames.iter().map(|_| Arc::new(Notify::new())).collect();
            let backend = Self {
                gates: filenames
                    .iter()
                    .map(|f| f.to_string())
                    .zip(gates.iter().cloned())
                    .collect(),
                ..Default::default()
            };
            (backend, gates)
        }
    }

    struct MockResource {
        counter: Arc<LiveCounter>,
        loaded: bool,
        broken_ops: Arc<StdMutex<HashSet<&'static str>>>,
    }

    impl MockResource {
        fn run(&self, op: &'static str) -> Result<(), PlaybackError> {
            if self.broken_ops.lock().unwrap().contains(op) {
                Err(PlaybackError::Backend(format!("{op} failed")))
            } else {
                Ok(())
            }
        }
    }

    impl Drop for MockResource {
        fn drop(&mut self) {
            if self.loaded {
                self.counter.release();
            }
        }
    }

    #[async_trait]
    impl AudioResource for MockResource {
        fn duration(&self) -> Option<Duration> {
            Some(Duration::from_secs(60))
        }

        async fn play(&mut self) -> Result<(), PlaybackError> {
            self.run("play")
        }

        async fn pause(&mut self) -> Result<(), PlaybackError> {
            self.run("pause")
        }

        async fn resume(&mut self) -> Result<(), PlaybackError> {
            self.run("resume")
        }

        async fn stop(&mut self) -> Result<(), PlaybackError> {
            Ok(())
        }

        async fn unload(&mut self) {
            if self.loaded {
                self.loaded = false;
                self.counter.release();
            }
        }
    }

    #[async_trait]
    impl AudioBackend for Arc<MockBackend> {
        type Resource = MockResource;

        async fn load(&self, url: &Url, sink: StatusSink) -> Result<MockResource, PlaybackError> {
            let filename = url
                .path_segments()
                .and_then(|mut s| s.next_back())
                .unwrap_or_default()
                .to_string();

            self.started.lock().unwrap().push(filename.clone());
            self.sinks.lock().unwrap().insert(filename.clone(), sink);
            self.load_started.notify_one();

            if let Some(gate) = self.gates.get(&filename) {
                gate.notified().await;
            }

            if self.failing.contains(&filename) {
                return Err(PlaybackError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                });
            }

            self.counter.acquire();
            Ok(MockResource {
                counter: self.counter.clone(),
                loaded: true,
                broken_ops: self.broken_ops.clone(),
            })
        }
    }

    impl MockBackend {
        fn break_op(&self, op: &'static str) {
            self.broken_ops.lock().unwrap().insert(op);
        }

        fn sink(&self, filename: &str) -> StatusSink {
            self.sinks.lock().unwrap()[filename].clone()
        }

        fn live(&self) -> usize {
            self.counter.live.load(Ordering::SeqCst)
        }

        fn peak(&self) -> usize {
            self.counter.peak.load(Ordering::SeqCst)
        }
    }

    fn controller(backend: &Arc<MockBackend>) -> PlaybackController<Arc<MockBackend>> {
        PlaybackController::new(
            backend.clone(),
            Endpoints::parse("http://localhost:5000").unwrap(),
            NoopReporter::shared(),
        )
    }

    async fn wait_for_state(
        controller: &PlaybackController<Arc<MockBackend>>,
        state: PlaybackState,
    ) -> PlaybackSnapshot {
        let mut rx = controller.subscribe();
        rx.wait_for(|s| s.state == state).await.unwrap().clone()
    }

    #[tokio::test]
    async fn play_loads_and_starts() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        let outcome = controller.play("a.mp3").await.unwrap();

        assert_eq!(outcome, PlayOutcome::Started);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.filename.as_deref(), Some("a.mp3"));
        assert_eq!(snapshot.duration, Some(Duration::from_secs(60)));
        assert_eq!(backend.live(), 1);
    }

    #[tokio::test]
    async fn play_same_podcast_twice_is_a_noop() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        let outcome = controller.play("a.mp3").await.unwrap();

        assert_eq!(outcome, PlayOutcome::AlreadyActive);
        assert_eq!(backend.started.lock().unwrap().len(), 1);
        assert_eq!(backend.live(), 1);
    }

    #[tokio::test]
    async fn play_same_podcast_while_paused_resumes() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        controller.pause().await.unwrap();
        let outcome = controller.play("a.mp3").await.unwrap();

        assert_eq!(outcome, PlayOutcome::Resumed);
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(backend.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn switching_podcasts_releases_the_previous_one() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        controller.play("b.mp3").await.unwrap();
        controller.play("a.mp3").await.unwrap();

        assert_eq!(controller.snapshot().filename.as_deref(), Some("a.mp3"));
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(backend.live(), 1);
        assert_eq!(backend.peak(), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_only_apply_in_matching_state() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        assert!(!controller.pause().await.unwrap());
        assert!(!controller.resume().await.unwrap());

        controller.play("a.mp3").await.unwrap();
        assert!(!controller.resume().await.unwrap());
        assert!(controller.pause().await.unwrap());
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert!(!controller.pause().await.unwrap());
        assert!(controller.resume().await.unwrap());
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn stop_releases_and_resets_position() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        backend.sink("a.mp3").send(PlaybackStatus::Progress {
            position: Duration::from_secs(5),
            duration: None,
        });
        let mut rx = controller.subscribe();
        rx.wait_for(|s| s.position == Duration::from_secs(5))
            .await
            .unwrap();

        assert!(controller.stop().await);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Stopped);
        assert_eq!(snapshot.position, Duration::ZERO);
        assert_eq!(snapshot.filename, None);
        assert_eq!(backend.live(), 0);
        assert!(!controller.stop().await);
    }

    #[tokio::test]
    async fn progress_is_clamped_to_duration() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        backend.sink("a.mp3").send(PlaybackStatus::Progress {
            position: Duration::from_secs(90),
            duration: None,
        });

        let mut rx = controller.subscribe();
        let snapshot = rx
            .wait_for(|s| s.position > Duration::ZERO)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.position, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn pause_resume_then_completion_ends_session() {
        let backend = Arc::new(MockBackend::default());
        let reporter = RecordingReporter::shared();
        let controller = PlaybackController::new(
            backend.clone(),
            Endpoints::parse("http://localhost:5000").unwrap(),
            reporter.clone(),
        );

        controller.play("a.mp3").await.unwrap();
        controller.pause().await.unwrap();
        controller.resume().await.unwrap();
        backend.sink("a.mp3").send(PlaybackStatus::Finished);

        let snapshot = wait_for_state(&controller, PlaybackState::Stopped).await;

        assert_eq!(snapshot.position, Duration::ZERO);
        assert_eq!(snapshot.filename, None);
        assert_eq!(backend.live(), 0);
        assert!(reporter.events().contains(&ProgressEvent::PlaybackFinished {
            filename: "a.mp3".to_string()
        }));
    }

    #[tokio::test]
    async fn failed_load_returns_to_idle_and_next_play_works() {
        let backend = Arc::new(MockBackend::failing(&["missing.mp3"]));
        let reporter = RecordingReporter::shared();
        let controller = PlaybackController::new(
            backend.clone(),
            Endpoints::parse("http://localhost:5000").unwrap(),
            reporter.clone(),
        );

        let result = controller.play("missing.mp3").await;

        assert!(matches!(result, Err(PlaybackError::HttpStatus { status: 404, .. })));
        assert_eq!(controller.snapshot(), PlaybackSnapshot::default());
        assert_eq!(backend.live(), 0);
        assert!(matches!(
            reporter.events().last(),
            Some(ProgressEvent::PlaybackFailed { filename, .. }) if filename == "missing.mp3"
        ));

        assert_eq!(controller.play("ok.mp3").await.unwrap(), PlayOutcome::Started);
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(backend.live(), 1);
    }

    fn recording_controller(
        backend: &Arc<MockBackend>,
    ) -> (PlaybackController<Arc<MockBackend>>, Arc<RecordingReporter>) {
        let reporter = RecordingReporter::shared();
        let controller = PlaybackController::new(
            backend.clone(),
            Endpoints::parse("http://localhost:5000").unwrap(),
            reporter.clone(),
        );
        (controller, reporter)
    }

    fn assert_torn_down(
        controller: &PlaybackController<Arc<MockBackend>>,
        backend: &MockBackend,
        reporter: &RecordingReporter,
    ) {
        assert_eq!(controller.snapshot(), PlaybackSnapshot::default());
        assert_eq!(backend.live(), 0);
        assert!(matches!(
            reporter.events().last(),
            Some(ProgressEvent::PlaybackFailed { filename, .. }) if filename == "a.mp3"
        ));
    }

    #[tokio::test]
    async fn failed_start_after_load_releases_the_resource() {
        let backend = Arc::new(MockBackend::default());
        backend.break_op("play");
        let (controller, reporter) = recording_controller(&backend);

        let result = controller.play("a.mp3").await;

        assert!(matches!(result, Err(PlaybackError::Backend(_))));
        assert_eq!(backend.peak(), 1);
        assert_torn_down(&controller, &backend, &reporter);
    }

    #[tokio::test]
    async fn failed_pause_releases_the_resource() {
        let backend = Arc::new(MockBackend::default());
        let (controller, reporter) = recording_controller(&backend);
        controller.play("a.mp3").await.unwrap();
        backend.break_op("pause");

        let result = controller.pause().await;

        assert!(matches!(result, Err(PlaybackError::Backend(_))));
        assert_torn_down(&controller, &backend, &reporter);
    }

    #[tokio::test]
    async fn failed_resume_releases_the_resource() {
        let backend = Arc::new(MockBackend::default());
        let (controller, reporter) = recording_controller(&backend);
        controller.play("a.mp3").await.unwrap();
        controller.pause().await.unwrap();
        backend.break_op("resume");

        let result = controller.resume().await;

        assert!(matches!(result, Err(PlaybackError::Backend(_))));
        assert_torn_down(&controller, &backend, &reporter);
    }

    #[tokio::test]
    async fn failed_resume_through_play_releases_the_resource() {
        let backend = Arc::new(MockBackend::default());
        let (controller, reporter) = recording_controller(&backend);
        controller.play("a.mp3").await.unwrap();
        controller.pause().await.unwrap();
        backend.break_op("resume");

        let result = controller.play("a.mp3").await;

        assert!(matches!(result, Err(PlaybackError::Backend(_))));
        assert_torn_down(&controller, &backend, &reporter);
    }

    #[tokio::test]
    async fn playback_error_status_tears_down() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        backend
            .sink("a.mp3")
            .send(PlaybackStatus::Error("decoder crashed".to_string()));

        let snapshot = wait_for_state(&controller, PlaybackState::Idle).await;
        assert_eq!(snapshot.filename, None);
        assert_eq!(backend.live(), 0);
    }

    #[tokio::test]
    async fn superseded_load_is_discarded() {
        let (backend, gates) = MockBackend::gated(&["a.mp3"]);
        let backend = Arc::new(backend);
        let controller = controller(&backend);

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.play("a.mp3").await }
        });
        backend.load_started.notified().await;

        let second = tokio::spawn({
            let controller = controller.clone();
            async move { controller.play("b.mp3").await }
        });
        // Let the second request invalidate the first before "a" finishes
        let mut rx = controller.subscribe();
        rx.wait_for(|s| s.filename.as_deref() == Some("b.mp3"))
            .await
            .unwrap();
        gates[0].notify_one();

        assert_eq!(first.await.unwrap().unwrap(), PlayOutcome::Superseded);
        assert_eq!(second.await.unwrap().unwrap(), PlayOutcome::Started);

        // A late status from "a" must not touch the "b" session
        backend.sink("a.mp3").send(PlaybackStatus::Finished);
        backend.sink("b.mp3").send(PlaybackStatus::Progress {
            position: Duration::from_secs(3),
            duration: None,
        });
        let snapshot = rx
            .wait_for(|s| s.position == Duration::from_secs(3))
            .await
            .unwrap()
            .clone();

        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.filename.as_deref(), Some("b.mp3"));
        assert_eq!(backend.live(), 1);
        assert_eq!(backend.peak(), 1);
    }

    #[tokio::test]
    async fn stop_during_load_discards_the_load() {
        let (backend, gates) = MockBackend::gated(&["a.mp3"]);
        let backend = Arc::new(backend);
        let controller = controller(&backend);

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.play("a.mp3").await }
        });
        backend.load_started.notified().await;

        assert!(controller.stop().await);
        gates[0].notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), PlayOutcome::Superseded);
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(backend.live(), 0);
    }

    #[tokio::test]
    async fn rapid_play_requests_keep_one_session() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        let handles: Vec<_> = ["a.mp3", "b.mp3", "a.mp3", "c.mp3", "b.mp3"]
            .into_iter()
            .map(|name| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.play(name).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(backend.live() <= 1);
        assert_eq!(backend.peak(), 1);
    }

    #[tokio::test]
    async fn shutdown_releases_resource() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        controller.pause().await.unwrap();
        controller.shutdown().await;

        assert_eq!(backend.live(), 0);
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn dropping_controller_releases_resource() {
        let backend = Arc::new(MockBackend::default());
        let controller = controller(&backend);

        controller.play("a.mp3").await.unwrap();
        assert_eq!(backend.live(), 1);
        drop(controller);

        assert_eq!(backend.live(), 0);
    }
}
