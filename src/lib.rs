// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! wordlint is a minimal language server that flags configured words.
//!
//! It speaks LSP over stdio, keeps the full text of every open document and
//! republishes the complete diagnostic set after each open or change.

/// Analyzer interface and the word-list analyzer.
pub mod analyzer;
/// Layered configuration.
pub mod config;
/// Open documents and position mapping.
pub mod document;
/// Protocol engine: framing, lifecycle, routing and publishing.
pub mod lsp;
