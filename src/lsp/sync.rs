// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Per-document event ordering.
//!
//! Every open document gets one worker task fed by an unbounded channel.
//! The read loop pushes events in arrival order, so events for one uri are
//! applied strictly in order while different documents proceed in parallel.
//! A worker started by a reopen waits for the previous worker of the same
//! uri to finish its close first. Each queued event holds a
//! [`TaskTrackerToken`] until it has been applied and published, which lets
//! shutdown wait for queued work to drain.

use lsp_types::Uri;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, warn};

use crate::document::{DocumentStore, Snapshot, SyncError};

use super::publisher::Publisher;

/// A synchronization event for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// `textDocument/didOpen`.
    Open {
        /// Client language id.
        language_id: String,
        /// Full text.
        text: String,
        /// Initial version.
        version: i32,
    },
    /// `textDocument/didChange` with full text.
    Change {
        /// Full new text.
        text: String,
        /// New version.
        version: i32,
    },
    /// `textDocument/didSave`.
    Save,
    /// `textDocument/didClose`.
    Close,
}

impl DocumentEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Change { .. } => "change",
            Self::Save => "save",
            Self::Close => "close",
        }
    }
}

type Queued = (DocumentEvent, TaskTrackerToken);

struct Worker {
    sender: mpsc::UnboundedSender<Queued>,
    handle: JoinHandle<()>,
}

/// Routes document events to per-uri workers.
pub struct SyncQueues {
    queues: HashMap<Uri, Worker>,
    /// Workers still draining a close, keyed by uri.
    closing: HashMap<Uri, JoinHandle<()>>,
    store: Arc<Mutex<DocumentStore>>,
    publisher: Publisher,
    tracker: TaskTracker,
}

impl SyncQueues {
    /// Creates the router. Queued work is counted by `tracker`.
    #[must_use]
    pub fn new(store: Arc<Mutex<DocumentStore>>, publisher: Publisher, tracker: TaskTracker) -> Self {
        Self {
            queues: HashMap::new(),
            closing: HashMap::new(),
            store,
            publisher,
            tracker,
        }
    }

    /// Queues an event behind every earlier event for the same uri.
    ///
    /// Events other than open for a uri that is not open are logged and
    /// dropped.
    pub fn dispatch(&mut self, uri: Uri, event: DocumentEvent) {
        let is_open = matches!(event, DocumentEvent::Open { .. });
        let is_close = matches!(event, DocumentEvent::Close);

        if !is_open && !self.queues.contains_key(&uri) {
            warn!(
                "Ignoring {} for {}: {}",
                event.name(),
                uri.as_str(),
                SyncError::UnknownDocument(uri.as_str().to_string())
            );
            return;
        }

        if !self.queues.contains_key(&uri) {
            let worker = self.spawn_worker(uri.clone());
            self.queues.insert(uri.clone(), worker);
        }
        let Some(worker) = self.queues.get(&uri) else {
            return;
        };

        if worker.sender.send((event, self.tracker.token())).is_err() {
            warn!("Document worker for {} is gone", uri.as_str());
            self.queues.remove(&uri);
            return;
        }

        if is_close && let Some(worker) = self.queues.remove(&uri) {
            // Dropping the sender ends the worker once the close is applied.
            drop(worker.sender);
            self.closing.retain(|_, handle| !handle.is_finished());
            self.closing.insert(uri, worker.handle);
        }
    }

    /// Number of documents with a live queue.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.queues.len()
    }

    fn spawn_worker(&mut self, uri: Uri) -> Worker {
        let (sender, rx) = mpsc::unbounded_channel();
        let previous = self.closing.remove(&uri);
        debug!("Starting document worker for {}", uri.as_str());
        let handle = tokio::spawn(run_worker(
            uri,
            previous,
            rx,
            Arc::clone(&self.store),
            self.publisher.clone(),
        ));
        Worker { sender, handle }
    }
}

async fn run_worker(
    uri: Uri,
    previous: Option<JoinHandle<()>>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    store: Arc<Mutex<DocumentStore>>,
    publisher: Publisher,
) {
    if let Some(previous) = previous
        && let Err(e) = previous.await
    {
        warn!("Previous worker for {} failed: {}", uri.as_str(), e);
    }

    while let Some((event, _token)) = rx.recv().await {
        let name = event.name();
        match apply(&store, &uri, event).await {
            Ok(Some(snapshot)) => {
                if let Err(e) = publisher.publish(&snapshot).await {
                    warn!("Skipping diagnostics for {}: {}", uri.as_str(), e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Dropped {} event: {}", name, e),
        }
    }
    debug!("Document worker for {} finished", uri.as_str());
}

/// Applies one event. Returns the snapshot to publish, if any.
async fn apply(
    store: &Mutex<DocumentStore>,
    uri: &Uri,
    event: DocumentEvent,
) -> Result<Option<Snapshot>, SyncError> {
    let mut store = store.lock().await;
    match event {
        DocumentEvent::Open {
            language_id,
            text,
            version,
        } => Ok(Some(store.open(uri.clone(), language_id, text, version))),
        DocumentEvent::Change { text, version } => store.change(uri, text, version).map(Some),
        DocumentEvent::Save => store.save(uri).map(|_| None),
        DocumentEvent::Close => store.close(uri).map(|()| None),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use crate::analyzer::{MatchMode, WordAnalyzer};
    use crate::lsp::outbound::Outbound;
    use crate::lsp::transport::{FrameReader, FrameWriter};
    use serde_json::Value;

    struct Harness {
        queues: SyncQueues,
        store: Arc<Mutex<DocumentStore>>,
        tracker: TaskTracker,
        wire: FrameReader<tokio::io::DuplexStream>,
    }

    fn harness() -> Harness {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let analyzer =
            Arc::new(WordAnalyzer::new(["badword1"], MatchMode::WholeWord, false).unwrap());
        let publisher = Publisher::new(analyzer, Outbound::new(FrameWriter::new(client)));
        let store = Arc::new(Mutex::new(DocumentStore::new()));
        let tracker = TaskTracker::new();
        Harness {
            queues: SyncQueues::new(Arc::clone(&store), publisher, tracker.clone()),
            store,
            tracker,
            wire: FrameReader::new(server),
        }
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn open(text: &str, version: i32) -> DocumentEvent {
        DocumentEvent::Open {
            language_id: "plaintext".to_string(),
            text: text.to_string(),
            version,
        }
    }

    fn change(text: &str, version: i32) -> DocumentEvent {
        DocumentEvent::Change {
            text: text.to_string(),
            version,
        }
    }

    async fn settle(tracker: &TaskTracker) {
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    async fn next_publish(wire: &mut FrameReader<tokio::io::DuplexStream>) -> Value {
        serde_json::from_slice(&wire.read_message().await.unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_events_apply_in_order() {
        let mut h = harness();
        let a = uri("file:///tmp/a.txt");

        h.queues.dispatch(a.clone(), open("badword1", 1));
        for version in 2..=20 {
            h.queues
                .dispatch(a.clone(), change(&format!("text {version}"), version));
        }
        settle(&h.tracker).await;

        let snapshot = h.store.lock().await.get(&a).unwrap();
        assert_eq!(snapshot.version, 20);
        assert_eq!(&*snapshot.text, "text 20");

        let first = next_publish(&mut h.wire).await;
        assert_eq!(first["params"]["version"], 1);
        assert_eq!(first["params"]["diagnostics"].as_array().unwrap().len(), 1);
        for version in 2..=20 {
            let publish = next_publish(&mut h.wire).await;
            assert_eq!(publish["params"]["version"], version);
            assert_eq!(publish["params"]["diagnostics"], serde_json::json!([]));
        }
    }

    #[tokio::test]
    async fn test_change_before_open_is_dropped() {
        let mut h = harness();
        let a = uri("file:///tmp/a.txt");

        h.queues.dispatch(a.clone(), change("badword1", 2));
        h.queues.dispatch(a.clone(), DocumentEvent::Save);
        h.queues.dispatch(a.clone(), DocumentEvent::Close);
        settle(&h.tracker).await;

        assert_eq!(h.queues.open_count(), 0);
        assert!(h.store.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_queue() {
        let mut h = harness();
        let a = uri("file:///tmp/a.txt");

        h.queues.dispatch(a.clone(), open("x", 1));
        assert_eq!(h.queues.open_count(), 1);
        h.queues.dispatch(a.clone(), DocumentEvent::Close);
        assert_eq!(h.queues.open_count(), 0);
        settle(&h.tracker).await;

        assert!(h.store.lock().await.get(&a).is_none());
    }

    #[tokio::test]
    async fn test_distinct_documents_are_independent() {
        let mut h = harness();
        let a = uri("file:///tmp/a.txt");
        let b = uri("file:///tmp/b.txt");

        h.queues.dispatch(a.clone(), open("badword1", 1));
        h.queues.dispatch(b.clone(), open("fine", 1));
        h.queues.dispatch(b.clone(), change("badword1 badword1", 2));
        settle(&h.tracker).await;

        let store = h.store.lock().await;
        assert_eq!(&*store.get(&a).unwrap().text, "badword1");
        assert_eq!(store.get(&b).unwrap().version, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reopen_waits_for_earlier_close() {
        let mut h = harness();
        let uris: Vec<Uri> = (0..200)
            .map(|i| uri(&format!("file:///tmp/doc{i}.txt")))
            .collect();

        for u in &uris {
            h.queues.dispatch(u.clone(), open("first", 1));
            h.queues.dispatch(u.clone(), DocumentEvent::Close);
            h.queues.dispatch(u.clone(), open("second", 1));
            h.queues.dispatch(u.clone(), DocumentEvent::Close);
            h.queues.dispatch(u.clone(), open("third", 1));
            h.queues.dispatch(u.clone(), change("fourth", 2));
        }

        // Drain publishes so the duplex buffer never stalls the workers
        let mut wire = h.wire;
        let expected = uris.len() * 4;
        let drain = tokio::spawn(async move {
            for _ in 0..expected {
                next_publish(&mut wire).await;
            }
        });
        settle(&h.tracker).await;
        drain.await.unwrap();

        let store = h.store.lock().await;
        assert_eq!(store.len(), uris.len());
        for u in &uris {
            let snapshot = store.get(u).unwrap();
            assert_eq!(snapshot.version, 2, "{}", u.as_str());
            assert_eq!(&*snapshot.text, "fourth");
        }
    }

    #[tokio::test]
    async fn test_close_reopen_change_publish_sequence() {
        let mut h = harness();
        let a = uri("file:///tmp/a.txt");

        h.queues.dispatch(a.clone(), open("badword1", 1));
        h.queues.dispatch(a.clone(), DocumentEvent::Save);
        h.queues.dispatch(a.clone(), DocumentEvent::Close);
        h.queues.dispatch(a.clone(), open("clean", 1));
        h.queues
            .dispatch(a.clone(), change("badword1 badword1", 2));
        settle(&h.tracker).await;

        let snapshot = h.store.lock().await.get(&a).unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(&*snapshot.text, "badword1 badword1");

        let expected = [(1, 1), (1, 0), (2, 2)];
        for (version, count) in expected {
            let publish = next_publish(&mut h.wire).await;
            assert_eq!(publish["params"]["uri"], "file:///tmp/a.txt");
            assert_eq!(publish["params"]["version"], version);
            assert_eq!(
                publish["params"]["diagnostics"].as_array().unwrap().len(),
                count
            );
        }
    }

    #[tokio::test]
    async fn test_save_and_close_right_after_open() {
        let mut h = harness();
        let a = uri("file:///tmp/a.txt");
        let b = uri("file:///tmp/b.txt");

        h.queues.dispatch(a.clone(), open("badword1", 1));
        h.queues.dispatch(a.clone(), DocumentEvent::Save);
        h.queues.dispatch(a.clone(), DocumentEvent::Close);
        settle(&h.tracker).await;
        assert!(h.store.lock().await.is_empty());

        let publish = next_publish(&mut h.wire).await;
        assert_eq!(publish["params"]["uri"], "file:///tmp/a.txt");
        assert_eq!(publish["params"]["version"], 1);

        // Save and close publish nothing, so the next frame belongs to b
        h.queues.dispatch(b.clone(), open("fine", 3));
        settle(&h.tracker).await;
        let publish = next_publish(&mut h.wire).await;
        assert_eq!(publish["params"]["uri"], "file:///tmp/b.txt");
        assert_eq!(publish["params"]["version"], 3);
        assert_eq!(h.store.lock().await.len(), 1);
    }
}
