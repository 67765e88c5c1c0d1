// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Pluggable text analyzers.
//!
//! An [`Analyzer`] turns the full text of a document into a list of
//! [`Finding`]s addressed by byte offsets. It is rerun from scratch on every
//! publish and must not keep state between scans.

/// Word-list analyzer.
pub mod words;

use lsp_types::DiagnosticSeverity;
use serde::Deserialize;
use thiserror::Error;

pub use words::{MatchMode, WordAnalyzer};

/// Scanner failure. The publish for the affected document is skipped.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// A configured pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },
    /// The scan itself failed.
    #[error("scan failed: {0}")]
    Scan(String),
}

/// A single match in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Byte offset of the first matched character.
    pub start: usize,
    /// Byte offset one past the last matched character.
    pub end: usize,
    /// Diagnostic severity.
    pub severity: DiagnosticSeverity,
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable code.
    pub code: Option<String>,
}

/// Scans document text for findings.
pub trait Analyzer: Send + Sync {
    /// Source tag attached to every diagnostic.
    fn source(&self) -> &str;

    /// Scans the complete text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be scanned.
    fn scan(&self, text: &str) -> Result<Vec<Finding>, AnalyzerError>;
}

/// Configurable diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported as an error.
    Error,
    /// Reported as a warning.
    #[default]
    Warning,
    /// Reported as information.
    Information,
    /// Reported as a hint.
    Hint,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::ERROR,
            Severity::Warning => Self::WARNING,
            Severity::Information => Self::INFORMATION,
            Severity::Hint => Self::HINT,
        }
    }
}
