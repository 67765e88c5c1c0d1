// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Content-Length message framing.
//!
//! Each frame is a block of `Name: Value` header lines terminated by an
//! empty line, followed by exactly `Content-Length` bytes of payload:
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"initialize", ...}
//! ```

use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

/// Largest accepted header block.
const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Largest accepted payload.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 8192;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Unrecoverable framing failure. Stream alignment is lost.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The header block has no `Content-Length`.
    #[error("missing Content-Length header")]
    MissingContentLength,
    /// `Content-Length` is not a decimal byte count.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
    /// A header line is not `Name: Value` or not UTF-8.
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),
    /// No header terminator within the header size limit.
    #[error("header block exceeds {MAX_HEADER_SIZE} bytes")]
    HeaderTooLarge,
    /// The payload exceeds the size limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Announced payload size.
        size: usize,
        /// Size limit.
        max: usize,
    },
    /// The stream closed inside a frame.
    #[error("stream ended mid-frame with {buffered} bytes buffered")]
    UnexpectedEof {
        /// Bytes of the incomplete frame.
        buffered: usize,
    },
    /// The underlying read failed.
    #[error("transport read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracts one complete frame payload from the front of `buffer`.
///
/// Returns `Ok(None)` if more bytes are needed. On success the frame is
/// removed from the buffer.
///
/// # Errors
///
/// Returns [`FramingError`] if the header block is malformed.
pub fn try_parse_message(buffer: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
    let Some(header_end) = buffer
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
    else {
        if buffer.len() > MAX_HEADER_SIZE {
            return Err(FramingError::HeaderTooLarge);
        }
        return Ok(None);
    };

    if header_end > MAX_HEADER_SIZE {
        return Err(FramingError::HeaderTooLarge);
    }

    let headers = std::str::from_utf8(&buffer[..header_end])
        .map_err(|_| FramingError::MalformedHeader("header block is not UTF-8".to_string()))?;

    let mut content_length = None;
    for line in headers.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FramingError::MalformedHeader(line.to_string()))?;

        if name.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            let length = value
                .parse::<usize>()
                .map_err(|_| FramingError::InvalidContentLength(value.to_string()))?;
            content_length = Some(length);
        }
    }

    let content_length = content_length.ok_or(FramingError::MissingContentLength)?;
    if content_length > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge {
            size: content_length,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let header_len = header_end + HEADER_TERMINATOR.len();
    if buffer.len() < header_len + content_length {
        trace!(
            "Incomplete frame: need {} more bytes",
            header_len + content_length - buffer.len()
        );
        return Ok(None);
    }

    buffer.advance(header_len);
    Ok(Some(buffer.split_to(content_length).freeze()))
}

/// Reads frames from a byte stream, buffering partial frames across reads.
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a byte stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Reads the next frame payload.
    ///
    /// Returns `Ok(None)` when the stream closes on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] on malformed headers, on a stream that ends
    /// mid-frame, or on a read failure.
    pub async fn read_message(&mut self) -> Result<Option<Bytes>, FramingError> {
        loop {
            if let Some(payload) = try_parse_message(&mut self.buffer)? {
                return Ok(Some(payload));
            }

            self.buffer.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(FramingError::UnexpectedEof {
                    buffered: self.buffer.len(),
                });
            }
        }
    }
}

/// Boxed output stream shared by every writer handle.
type Writer = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Writes frames to a byte stream.
///
/// Clones share one lock, held for a whole frame, so concurrent writers
/// never interleave partial frames.
#[derive(Clone)]
pub struct FrameWriter {
    inner: Writer,
}

impl FrameWriter {
    /// Wraps an output stream.
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes one framed payload and flushes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the write or flush fails.
    pub async fn write_message(&self, payload: &[u8]) -> std::io::Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        let mut frame = Vec::with_capacity(header.len() + payload.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(payload);

        let mut writer = self.inner.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn frame(body: &str) -> String {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body)
    }

    #[test]
    fn test_parse_complete_message() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let mut buffer = BytesMut::from(frame(body).as_str());

        let result = try_parse_message(&mut buffer).unwrap();
        assert_eq!(result.as_deref(), Some(body.as_bytes()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_incomplete_header() {
        let mut buffer = BytesMut::from("Content-Length: 10\r\n");
        assert!(try_parse_message(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_parse_incomplete_body() {
        let raw = "Content-Length: 100\r\n\r\n{\"partial\":";
        let mut buffer = BytesMut::from(raw);
        assert!(try_parse_message(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), raw.len(), "partial frame stays buffered");
    }

    #[test]
    fn test_parse_multiple_messages() {
        let body1 = r#"{"jsonrpc":"2.0","id":1}"#;
        let body2 = r#"{"jsonrpc":"2.0","id":2}"#;
        let raw = format!("{}{}", frame(body1), frame(body2));
        let mut buffer = BytesMut::from(raw.as_str());

        let first = try_parse_message(&mut buffer).unwrap();
        assert_eq!(first.as_deref(), Some(body1.as_bytes()));
        let second = try_parse_message(&mut buffer).unwrap();
        assert_eq!(second.as_deref(), Some(body2.as_bytes()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_case_insensitive_and_extra_headers() {
        let body = r#"{"test":true}"#;
        let raw = format!(
            "content-length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut buffer = BytesMut::from(raw.as_str());

        let result = try_parse_message(&mut buffer).unwrap();
        assert_eq!(result.as_deref(), Some(body.as_bytes()));
    }

    #[test]
    fn test_length_counts_bytes_not_chars() {
        let body = r#"{"text":"😀"}"#;
        let mut buffer = BytesMut::from(frame(body).as_str());
        let result = try_parse_message(&mut buffer).unwrap().unwrap();
        assert_eq!(result.len(), body.len());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_missing_content_length() {
        let mut buffer = BytesMut::from("Content-Type: x\r\n\r\n{}");
        assert!(matches!(
            try_parse_message(&mut buffer),
            Err(FramingError::MissingContentLength)
        ));
    }

    #[test]
    fn test_invalid_content_length() {
        let mut buffer = BytesMut::from("Content-Length: ten\r\n\r\n{}");
        assert!(matches!(
            try_parse_message(&mut buffer),
            Err(FramingError::InvalidContentLength(v)) if v == "ten"
        ));
    }

    #[test]
    fn test_malformed_header_line() {
        let mut buffer = BytesMut::from("garbage\r\n\r\n{}");
        assert!(matches!(
            try_parse_message(&mut buffer),
            Err(FramingError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_header_too_large() {
        let mut buffer = BytesMut::from("X".repeat(MAX_HEADER_SIZE + 1).as_str());
        assert!(matches!(
            try_parse_message(&mut buffer),
            Err(FramingError::HeaderTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_reader_yields_frames_then_end_of_stream() {
        let raw = format!("{}{}", frame("{\"a\":1}"), frame("{\"b\":2}"));
        let mut reader = FrameReader::new(raw.as_bytes());

        assert_eq!(
            reader.read_message().await.unwrap().as_deref(),
            Some(&b"{\"a\":1}"[..])
        );
        assert_eq!(
            reader.read_message().await.unwrap().as_deref(),
            Some(&b"{\"b\":2}"[..])
        );
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_eof_mid_frame() {
        let raw = "Content-Length: 50\r\n\r\n{\"cut\":";
        let mut reader = FrameReader::new(raw.as_bytes());
        assert!(matches!(
            reader.read_message().await,
            Err(FramingError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn test_reader_buffers_across_reads() {
        let (mut client, server) = tokio::io::duplex(8);
        let body = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
        let raw = frame(body);

        let writer = tokio::spawn(async move {
            client.write_all(raw.as_bytes()).await.unwrap();
        });

        let mut reader = FrameReader::new(server);
        let payload = reader.read_message().await.unwrap().unwrap();
        assert_eq!(&payload[..], body.as_bytes());
        writer.await.unwrap();
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_frames_payload() {
        let (client, mut server) = tokio::io::duplex(1024);
        let writer = FrameWriter::new(client);
        writer.write_message(b"{\"x\":1}").await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Content-Length: 7\r\n\r\n{\"x\":1}");
    }
}
