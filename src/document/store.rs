// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use lsp_types::Uri;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Rejected synchronization event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The document was never opened, or has been closed.
    #[error("document is not open: {0}")]
    UnknownDocument(String),
    /// The change does not advance the stored version.
    #[error("stale version {received} for {uri} (stored {stored})")]
    StaleVersion {
        /// Document uri.
        uri: String,
        /// Version currently stored.
        stored: i32,
        /// Version carried by the rejected event.
        received: i32,
    },
    /// The change carried a range; only full-text sync is supported.
    #[error("incremental change rejected for {0}; server advertises full sync")]
    IncrementalChange(String),
}

/// Immutable view of a document at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Document uri.
    pub uri: Uri,
    /// Client-supplied version.
    pub version: i32,
    /// Full text at this version.
    pub text: Arc<str>,
}

/// Tracks the state of an open document.
#[derive(Debug)]
struct OpenDocument {
    version: i32,
    language_id: String,
    text: Arc<str>,
}

/// Holds the full text of every open document.
///
/// Text is only ever replaced as a whole. The store performs no I/O and
/// knows nothing about diagnostics; callers decide what to publish based on
/// the returned [`Snapshot`].
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<Uri, OpenDocument>,
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a document. Re-opening an open uri replaces it.
    pub fn open(&mut self, uri: Uri, language_id: String, text: String, version: i32) -> Snapshot {
        let text: Arc<str> = Arc::from(text);
        let doc = OpenDocument {
            version,
            language_id,
            text: Arc::clone(&text),
        };

        if self.documents.insert(uri.clone(), doc).is_some() {
            warn!("Document reopened without close: {}", uri.as_str());
        } else {
            debug!("Opened document: {} (v{})", uri.as_str(), version);
        }

        Snapshot { uri, version, text }
    }

    /// Replaces a document's text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownDocument`] if the uri is not open and
    /// [`SyncError::StaleVersion`] if `version` is not greater than the
    /// stored version.
    pub fn change(&mut self, uri: &Uri, text: String, version: i32) -> Result<Snapshot, SyncError> {
        let doc = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| SyncError::UnknownDocument(uri.as_str().to_string()))?;

        if version <= doc.version {
            return Err(SyncError::StaleVersion {
                uri: uri.as_str().to_string(),
                stored: doc.version,
                received: version,
            });
        }

        doc.version = version;
        doc.text = Arc::from(text);
        trace!("Changed document: {} (v{})", uri.as_str(), version);

        Ok(Snapshot {
            uri: uri.clone(),
            version,
            text: Arc::clone(&doc.text),
        })
    }

    /// Records a save.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownDocument`] if the uri is not open.
    pub fn save(&self, uri: &Uri) -> Result<Snapshot, SyncError> {
        let doc = self
            .documents
            .get(uri)
            .ok_or_else(|| SyncError::UnknownDocument(uri.as_str().to_string()))?;
        debug!(
            "Saved document: {} ({}, v{})",
            uri.as_str(),
            doc.language_id,
            doc.version
        );
        Ok(Snapshot {
            uri: uri.clone(),
            version: doc.version,
            text: Arc::clone(&doc.text),
        })
    }

    /// Closes a document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownDocument`] if the uri is not open.
    pub fn close(&mut self, uri: &Uri) -> Result<(), SyncError> {
        let doc = self
            .documents
            .remove(uri)
            .ok_or_else(|| SyncError::UnknownDocument(uri.as_str().to_string()))?;
        debug!("Closed document: {} ({})", uri.as_str(), doc.language_id);
        Ok(())
    }

    /// Returns the current snapshot of an open document.
    #[must_use]
    pub fn get(&self, uri: &Uri) -> Option<Snapshot> {
        self.documents.get(uri).map(|doc| Snapshot {
            uri: uri.clone(),
            version: doc.version,
            text: Arc::clone(&doc.text),
        })
    }

    /// Number of open documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no documents are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_open_and_get() {
        let mut store = DocumentStore::new();
        let a = uri("file:///tmp/a.txt");

        let snapshot = store.open(a.clone(), "plaintext".to_string(), "hello".to_string(), 1);
        assert_eq!(&*snapshot.text, "hello");
        assert_eq!(snapshot.version, 1);
        assert_eq!(store.get(&a), Some(snapshot));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_change_replaces_text() {
        let mut store = DocumentStore::new();
        let a = uri("file:///tmp/a.txt");
        store.open(a.clone(), "plaintext".to_string(), "old".to_string(), 1);

        let snapshot = store.change(&a, "new".to_string(), 2).unwrap();
        assert_eq!(&*snapshot.text, "new");
        assert_eq!(&*store.get(&a).unwrap().text, "new");
    }

    #[test]
    fn test_change_before_open_is_rejected() {
        let mut store = DocumentStore::new();
        let a = uri("file:///tmp/a.txt");

        assert!(matches!(
            store.change(&a, "text".to_string(), 2),
            Err(SyncError::UnknownDocument(_))
        ));
        assert!(matches!(store.save(&a), Err(SyncError::UnknownDocument(_))));
        assert!(matches!(store.close(&a), Err(SyncError::UnknownDocument(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_version_is_dropped() {
        let mut store = DocumentStore::new();
        let a = uri("file:///tmp/a.txt");
        store.open(a.clone(), "plaintext".to_string(), "v3".to_string(), 3);

        let err = store.change(&a, "v3 again".to_string(), 3).unwrap_err();
        assert_eq!(
            err,
            SyncError::StaleVersion {
                uri: a.as_str().to_string(),
                stored: 3,
                received: 3,
            }
        );
        assert!(store.change(&a, "v2".to_string(), 2).is_err());
        assert_eq!(&*store.get(&a).unwrap().text, "v3");
    }

    #[test]
    fn test_close_removes_document() {
        let mut store = DocumentStore::new();
        let a = uri("file:///tmp/a.txt");
        store.open(a.clone(), "plaintext".to_string(), "x".to_string(), 1);

        assert!(store.save(&a).is_ok());
        store.close(&a).unwrap();
        assert!(store.get(&a).is_none());
        assert!(store.close(&a).is_err());
    }

    #[test]
    fn test_old_snapshot_survives_change() {
        let mut store = DocumentStore::new();
        let a = uri("file:///tmp/a.txt");
        let before = store.open(a.clone(), "plaintext".to_string(), "before".to_string(), 1);
        store.change(&a, "after".to_string(), 2).unwrap();

        assert_eq!(&*before.text, "before");
    }
}
