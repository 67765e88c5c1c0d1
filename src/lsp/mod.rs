// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Correlation of server-initiated requests with client responses.
pub mod correlator;
/// Lifecycle gate deciding which messages are legal.
pub mod lifecycle;
/// Serialized writer handle for messages to the client.
pub mod outbound;
/// LSP message protocol definitions.
pub mod protocol;
/// Diagnostic computation and publishing.
pub mod publisher;
/// Session loop and message dispatch.
pub mod server;
/// Per-document ordered event queues.
pub mod sync;
/// Content-Length message framing.
pub mod transport;

pub use lifecycle::{ExitStatus, Lifecycle, LifecycleState};
pub use publisher::{PublishError, Publisher};
pub use server::{Server, SessionError};
pub use transport::{FrameReader, FrameWriter, FramingError};
