// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Correlates client responses with server-initiated requests.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use super::outbound::{Outbound, OutboundError};
use super::protocol::{RequestId, RequestMessage, ResponseError, ResponseMessage};

/// Failure of a server-initiated request.
#[derive(Debug, Error)]
pub enum CorrelatorError {
    /// The session ended before the client answered.
    #[error("request cancelled: session ended")]
    Cancelled,
    /// The request could not be sent.
    #[error(transparent)]
    Send(#[from] OutboundError),
    /// The client answered with an error.
    #[error("client error {}: {}", .0.code, .0.message)]
    Remote(ResponseError),
    /// The result did not have the expected shape.
    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

type PendingMap = HashMap<RequestId, oneshot::Sender<ResponseMessage>>;

/// Assigns ids to outbound requests and routes responses back to them.
pub struct Correlator {
    next_id: AtomicI64,
    pending: Mutex<PendingMap>,
    outbound: Outbound,
}

impl Correlator {
    /// Creates a correlator sending through `outbound`.
    #[must_use]
    pub fn new(outbound: Outbound) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    /// Sends a request to the client and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelatorError`] if sending fails, the client answers with
    /// an error, the result does not decode, or the session ends first.
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, CorrelatorError> {
        let id = RequestId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = RequestMessage::new(id.clone(), method, serde_json::to_value(params)?);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.outbound.request(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        let response = rx.await.map_err(|_| CorrelatorError::Cancelled)?;

        if let Some(error) = response.error {
            return Err(CorrelatorError::Remote(error));
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    /// Routes a response to its pending request.
    ///
    /// Returns false if no request with that id is pending.
    pub async fn resolve(&self, response: ResponseMessage) -> bool {
        let Some(id) = response.id.clone() else {
            warn!("Received response without id: {:?}", response.error);
            return false;
        };

        let Some(sender) = self.pending.lock().await.remove(&id) else {
            warn!("Received response for unknown request id: {}", id);
            return false;
        };

        if sender.send(response).is_err() {
            debug!("Requester for id {} stopped waiting", id);
        }
        true
    }

    /// Fails every pending request with [`CorrelatorError::Cancelled`].
    ///
    /// Returns the number of requests cancelled.
    pub async fn cancel_all(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        pending.clear();
        count
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use crate::lsp::transport::{FrameReader, FrameWriter};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn correlator() -> (Arc<Correlator>, FrameReader<tokio::io::DuplexStream>) {
        let (client, server) = tokio::io::duplex(4096);
        let outbound = Outbound::new(FrameWriter::new(client));
        (Arc::new(Correlator::new(outbound)), FrameReader::new(server))
    }

    #[tokio::test]
    async fn test_response_resolves_request() {
        let (correlator, mut wire) = correlator();

        let requester = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move {
                correlator
                    .request::<_, Value>("workspace/configuration", json!({"items": []}))
                    .await
            })
        };

        let sent: Value = serde_json::from_slice(&wire.read_message().await.unwrap().unwrap()).unwrap();
        assert_eq!(sent["method"], "workspace/configuration");
        assert_eq!(sent["id"], 1);

        let answered = correlator
            .resolve(ResponseMessage::success(RequestId::Number(1), json!([{"x": 1}])))
            .await;
        assert!(answered);

        let result = requester.await.unwrap().unwrap();
        assert_eq!(result, json!([{"x": 1}]));
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_remote_error() {
        let (correlator, mut wire) = correlator();
        let requester = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.request::<_, Value>("x/y", Value::Null).await })
        };
        wire.read_message().await.unwrap();

        correlator
            .resolve(ResponseMessage::error(Some(RequestId::Number(1)), -32601, "nope"))
            .await;
        assert!(matches!(
            requester.await.unwrap(),
            Err(CorrelatorError::Remote(e)) if e.code == -32601
        ));
    }

    #[tokio::test]
    async fn test_unknown_response_is_ignored() {
        let (correlator, _wire) = correlator();
        let answered = correlator
            .resolve(ResponseMessage::success(RequestId::Number(99), Value::Null))
            .await;
        assert!(!answered);
    }

    #[tokio::test]
    async fn test_cancel_all_fails_pending() {
        let (correlator, mut wire) = correlator();
        let requester = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.request::<_, Value>("x/y", Value::Null).await })
        };
        wire.read_message().await.unwrap();

        assert_eq!(correlator.cancel_all().await, 1);
        assert!(matches!(
            requester.await.unwrap(),
            Err(CorrelatorError::Cancelled)
        ));
    }
}
