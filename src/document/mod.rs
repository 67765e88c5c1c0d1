// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Offset to LSP position mapping.
pub mod position;
/// Full-text document storage.
pub mod store;

pub use position::{LineIndex, PositionError};
pub use store::{DocumentStore, Snapshot, SyncError};
