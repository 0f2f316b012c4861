// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};

use super::record::PodcastRecord;
use super::storage::{KeyValueStorage, decode_records, encode_records};

/// Storage key under which the podcast sequence is persisted
pub const LIBRARY_KEY: &str = "podcasts";

/// Snapshot of the podcast library
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryState {
    /// Podcasts in insertion order, which is also display order
    pub podcasts: Vec<PodcastRecord>,
    /// True until the persisted library has been restored
    pub loading: bool,
}

enum WriteCommand {
    Persist(Vec<PodcastRecord>),
    Flush(oneshot::Sender<()>),
}

/// Ordered, persisted list of produced podcasts
///
/// Cloning yields another handle to the same library. Mutations are visible
/// to readers immediately; persistence happens on a single writer task that
/// applies full snapshots in mutation order.
#[derive(Clone)]
pub struct LibraryStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<LibraryState>,
    storage: Arc<dyn KeyValueStorage>,
    writer: mpsc::UnboundedSender<WriteCommand>,
    /// Held for the whole restore so overlapping calls restore once
    restore: Mutex<()>,
}

impl LibraryStore {
    /// Create a store in the loading state.
    ///
    /// Must be called within a Tokio runtime; the writer task is spawned here.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage.clone(), rx));

        let (state, _) = watch::channel(LibraryState {
            podcasts: Vec::new(),
            loading: true,
        });

        Self {
            inner: Arc::new(Inner {
                state,
                storage,
                writer,
                restore: Mutex::new(()),
            }),
        }
    }

    /// Create a store and restore the persisted library
    pub async fn open(storage: Arc<dyn KeyValueStorage>) -> Self {
        let store = Self::new(storage);
        store.initialize().await;
        store
    }

    /// Restore the persisted library.
    ///
    /// A missing or unreadable library starts empty; failures are logged and
    /// never returned. Podcasts added before the restore finished are kept
    /// after the restored ones.
    pub async fn initialize(&self) {
        let _restoring = self.inner.restore.lock().await;
        if !self.is_loading() {
            tracing::debug!("Podcast library already initialized");
            return;
        }

        let restored = match self.inner.storage.get(LIBRARY_KEY).await {
            Ok(Some(json)) => match decode_records(&json) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(error = %e, "Stored podcast library is corrupt, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => {
                tracing::debug!("No stored podcast library, starting empty");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read podcast library, starting empty");
                Vec::new()
            }
        };

        let writer = &self.inner.writer;
        self.inner.state.send_if_modified(|state| {
            if !state.loading {
                tracing::debug!("Podcast library restored elsewhere, discarding");
                return false;
            }

            let pending = std::mem::replace(&mut state.podcasts, restored);
            state.loading = false;

            if !pending.is_empty() {
                state.podcasts.extend(pending);
                persist(writer, &state.podcasts);
            }

            tracing::info!(count = state.podcasts.len(), "Podcast library restored");
            true
        });
    }

    /// Append a podcast and schedule the library to be persisted
    pub fn add(&self, filename: impl Into<String>) -> PodcastRecord {
        let record = PodcastRecord::new(filename);
        let writer = &self.inner.writer;

        self.inner.state.send_modify(|state| {
            state.podcasts.push(record.clone());

            // Writing before the restore would clobber the stored library;
            // initialize persists the merged list instead.
            if !state.loading {
                persist(writer, &state.podcasts);
            }
        });

        tracing::info!(filename = %record.filename, "Podcast added to library");
        record
    }

    /// The podcasts in display order
    pub fn list(&self) -> Vec<PodcastRecord> {
        self.inner.state.borrow().podcasts.clone()
    }

    pub fn state(&self) -> LibraryState {
        self.inner.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Observe every change to the library
    pub fn subscribe(&self) -> watch::Receiver<LibraryState> {
        self.inner.state.subscribe()
    }

    /// Wait until every scheduled write has been applied
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.inner.writer.send(WriteCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Queue a snapshot for the writer task
fn persist(writer: &mpsc::UnboundedSender<WriteCommand>, podcasts: &[PodcastRecord]) {
    if writer
        .send(WriteCommand::Persist(podcasts.to_vec()))
        .is_err()
    {
        tracing::warn!(
            count = podcasts.len(),
            "Library writer has stopped, podcast library not persisted"
        );
    }
}

async fn run_writer(
    storage: Arc<dyn KeyValueStorage>,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Persist(records) => {
                let result = match encode_records(&records) {
                    Ok(json) => storage.set(LIBRARY_KEY, &json).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => tracing::debug!(count = records.len(), "Podcast library persisted"),
                    Err(e) => tracing::warn!(error = %e, "Failed to persist podcast library"),
                }
            }
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
