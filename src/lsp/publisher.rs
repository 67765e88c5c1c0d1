// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Turns analyzer findings into `textDocument/publishDiagnostics`.

use lsp_types::notification::{Notification, PublishDiagnostics};
use lsp_types::{Diagnostic, NumberOrString, PublishDiagnosticsParams};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::document::{LineIndex, PositionError, Snapshot};

use super::outbound::{Outbound, OutboundError};

/// A publish that did not happen.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The analyzer failed; earlier diagnostics stay on the client.
    #[error("analyzer failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    /// The analyzer returned a span that does not address the text.
    #[error("finding {start}..{end} is outside the text: {source}")]
    Span {
        /// Finding start offset.
        start: usize,
        /// Finding end offset.
        end: usize,
        /// Mapping failure.
        #[source]
        source: PositionError,
    },
    /// The notification could not be delivered.
    #[error(transparent)]
    Send(#[from] OutboundError),
}

/// Scans documents and publishes their complete diagnostic set.
#[derive(Clone)]
pub struct Publisher {
    analyzer: Arc<dyn Analyzer>,
    outbound: Outbound,
}

impl Publisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(analyzer: Arc<dyn Analyzer>, outbound: Outbound) -> Self {
        Self { analyzer, outbound }
    }

    /// Computes the diagnostics for `text` from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Analyzer`] if the scan fails and
    /// [`PublishError::Span`] if a finding does not fit the text.
    pub fn diagnostics(&self, text: &str) -> Result<Vec<Diagnostic>, PublishError> {
        let findings = self.analyzer.scan(text)?;
        let index = LineIndex::new(text);

        findings
            .into_iter()
            .map(|finding| {
                let range = index
                    .range(finding.start, finding.end)
                    .map_err(|source| PublishError::Span {
                        start: finding.start,
                        end: finding.end,
                        source,
                    })?;

                Ok(Diagnostic {
                    range,
                    severity: Some(finding.severity),
                    code: finding.code.map(NumberOrString::String),
                    source: Some(self.analyzer.source().to_string()),
                    message: finding.message,
                    ..Diagnostic::default()
                })
            })
            .collect()
    }

    /// Publishes the full diagnostic set for a snapshot, empty if clean.
    ///
    /// Returns the number of diagnostics sent.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the diagnostics cannot be computed or sent.
    /// Nothing is sent in that case.
    pub async fn publish(&self, snapshot: &Snapshot) -> Result<usize, PublishError> {
        let diagnostics = self.diagnostics(&snapshot.text)?;
        let count = diagnostics.len();

        let params = PublishDiagnosticsParams::new(
            snapshot.uri.clone(),
            diagnostics,
            Some(snapshot.version),
        );
        self.outbound.notify(PublishDiagnostics::METHOD, params).await?;

        debug!(
            "Published {} diagnostics for {} (v{})",
            count,
            snapshot.uri.as_str(),
            snapshot.version
        );
        Ok(count)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use crate::analyzer::{Finding, MatchMode, WordAnalyzer};
    use crate::lsp::transport::{FrameReader, FrameWriter};
    use lsp_types::{DiagnosticSeverity, Position, Range};
    use serde_json::Value;

    struct FailingAnalyzer;

    impl Analyzer for FailingAnalyzer {
        fn source(&self) -> &str {
            "failing"
        }

        fn scan(&self, _text: &str) -> Result<Vec<Finding>, AnalyzerError> {
            Err(AnalyzerError::Scan("boom".to_string()))
        }
    }

    struct OutOfRangeAnalyzer;

    impl Analyzer for OutOfRangeAnalyzer {
        fn source(&self) -> &str {
            "broken"
        }

        fn scan(&self, text: &str) -> Result<Vec<Finding>, AnalyzerError> {
            Ok(vec![Finding {
                start: 0,
                end: text.len() + 10,
                severity: DiagnosticSeverity::HINT,
                message: "too long".to_string(),
                code: None,
            }])
        }
    }

    fn snapshot(text: &str, version: i32) -> Snapshot {
        Snapshot {
            uri: "file:///tmp/a.txt".parse().unwrap(),
            version,
            text: Arc::from(text),
        }
    }

    fn publisher(analyzer: Arc<dyn Analyzer>) -> (Publisher, FrameReader<tokio::io::DuplexStream>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let outbound = Outbound::new(FrameWriter::new(client));
        (Publisher::new(analyzer, outbound), FrameReader::new(server))
    }

    fn word_analyzer() -> Arc<dyn Analyzer> {
        Arc::new(
            WordAnalyzer::new(["badword1", "badword2"], MatchMode::WholeWord, false)
                .unwrap()
                .with_code(Some("faulty-word".to_string())),
        )
    }

    #[test]
    fn test_diagnostics_use_line_positions() {
        let (publisher, _wire) = publisher(word_analyzer());
        let diagnostics = publisher
            .diagnostics("foo badword1 bar\nbadword2 baz")
            .unwrap();

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics[0].range,
            Range::new(Position::new(0, 4), Position::new(0, 12))
        );
        assert_eq!(diagnostics[0].message, "badword1");
        assert_eq!(
            diagnostics[1].range,
            Range::new(Position::new(1, 0), Position::new(1, 8))
        );
        assert_eq!(diagnostics[1].message, "badword2");
        assert_eq!(diagnostics[1].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diagnostics[1].source.as_deref(), Some("wordlint"));
        assert_eq!(
            diagnostics[1].code,
            Some(NumberOrString::String("faulty-word".to_string()))
        );
    }

    #[test]
    fn test_utf16_columns_in_diagnostics() {
        let (publisher, _wire) = publisher(word_analyzer());
        let diagnostics = publisher.diagnostics("😀 badword1").unwrap();
        assert_eq!(
            diagnostics[0].range,
            Range::new(Position::new(0, 3), Position::new(0, 11))
        );
    }

    #[tokio::test]
    async fn test_publish_sends_full_set() {
        let (publisher, mut wire) = publisher(word_analyzer());
        let sent = publisher
            .publish(&snapshot("badword1\nbadword2", 4))
            .await
            .unwrap();
        assert_eq!(sent, 2);

        let message: Value =
            serde_json::from_slice(&wire.read_message().await.unwrap().unwrap()).unwrap();
        assert_eq!(message["method"], "textDocument/publishDiagnostics");
        assert_eq!(message["params"]["uri"], "file:///tmp/a.txt");
        assert_eq!(message["params"]["version"], 4);
        assert_eq!(message["params"]["diagnostics"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clean_text_publishes_empty_list() {
        let (publisher, mut wire) = publisher(word_analyzer());
        assert_eq!(publisher.publish(&snapshot("clean text only", 2)).await.unwrap(), 0);

        let message: Value =
            serde_json::from_slice(&wire.read_message().await.unwrap().unwrap()).unwrap();
        assert_eq!(message["params"]["diagnostics"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_analyzer_failure_skips_publish() {
        let (publisher, _wire) = publisher(Arc::new(FailingAnalyzer));
        assert!(matches!(
            publisher.publish(&snapshot("anything", 1)).await,
            Err(PublishError::Analyzer(_))
        ));
    }

    #[test]
    fn test_out_of_range_finding_is_an_error() {
        let (publisher, _wire) = publisher(Arc::new(OutOfRangeAnalyzer));
        assert!(matches!(
            publisher.diagnostics("short"),
            Err(PublishError::Span { start: 0, end: 15, .. })
        ));
    }
}
