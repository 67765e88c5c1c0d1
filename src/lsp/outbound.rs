// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use super::protocol::{NotificationMessage, RequestMessage, ResponseMessage};
use super::transport::FrameWriter;

/// Failure to deliver a message to the client.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// The message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The write failed; the connection is now considered lost.
    #[error("failed to write message: {0}")]
    Write(#[source] std::io::Error),
    /// An earlier write failed.
    #[error("connection to client lost")]
    ConnectionLost,
}

/// Cloneable handle for sending JSON-RPC messages to the client.
///
/// The first failed write cancels [`Outbound::connection_lost`] so the read
/// loop can end the session.
#[derive(Clone)]
pub struct Outbound {
    writer: FrameWriter,
    lost: CancellationToken,
}

impl Outbound {
    /// Wraps a frame writer.
    #[must_use]
    pub fn new(writer: FrameWriter) -> Self {
        Self {
            writer,
            lost: CancellationToken::new(),
        }
    }

    /// Token cancelled once the connection is lost.
    #[must_use]
    pub fn connection_lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    /// Sends a response.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError`] if the message cannot be delivered.
    pub async fn respond(&self, response: &ResponseMessage) -> Result<(), OutboundError> {
        self.send(response).await
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError`] if the message cannot be delivered.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), OutboundError> {
        let notification = NotificationMessage::new(method, serde_json::to_value(params)?);
        self.send(&notification).await
    }

    /// Sends a request. Correlating the response is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError`] if the message cannot be delivered.
    pub async fn request(&self, request: &RequestMessage) -> Result<(), OutboundError> {
        self.send(request).await
    }

    async fn send<T: Serialize>(&self, message: &T) -> Result<(), OutboundError> {
        if self.lost.is_cancelled() {
            return Err(OutboundError::ConnectionLost);
        }

        let body = serde_json::to_vec(message)?;
        trace!("Sending: {}", String::from_utf8_lossy(&body));

        if let Err(e) = self.writer.write_message(&body).await {
            error!("Write to client failed: {}", e);
            self.lost.cancel();
            return Err(OutboundError::Write(e));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use crate::lsp::protocol::RequestId;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_notify_writes_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        let outbound = Outbound::new(FrameWriter::new(client));

        outbound
            .notify("window/logMessage", serde_json::json!({"type": 3, "message": "hi"}))
            .await
            .unwrap();
        drop(outbound);

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        let (header, body) = out.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["method"], "window/logMessage");
        assert!(value.get("id").is_none());
    }

    #[tokio::test]
    async fn test_write_failure_marks_connection_lost() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let outbound = Outbound::new(FrameWriter::new(client));
        let lost = outbound.connection_lost();

        let response = ResponseMessage::success(RequestId::Number(1), serde_json::Value::Null);
        assert!(matches!(
            outbound.respond(&response).await,
            Err(OutboundError::Write(_))
        ));
        assert!(lost.is_cancelled());
        assert!(matches!(
            outbound.respond(&response).await,
            Err(OutboundError::ConnectionLost)
        ));
    }
}
