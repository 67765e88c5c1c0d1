// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use lsp_types::DiagnosticSeverity;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::warn;

use super::{Analyzer, AnalyzerError, Finding};

/// How configured words are matched against document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Only matches not touching a letter or digit on either side.
    #[default]
    WholeWord,
    /// Every occurrence, including inside longer words. Occurrences may overlap.
    Substring,
}

#[derive(Debug)]
struct WordRule {
    word: String,
    pattern: Regex,
}

/// Flags every occurrence of a fixed list of words.
#[derive(Debug)]
pub struct WordAnalyzer {
    rules: Vec<WordRule>,
    mode: MatchMode,
    source: String,
    severity: DiagnosticSeverity,
    code: Option<String>,
}

impl WordAnalyzer {
    /// Source tag used when none is configured.
    pub const DEFAULT_SOURCE: &'static str = "wordlint";

    /// Builds an analyzer for `words`. Empty words are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::InvalidPattern`] if a word cannot be compiled.
    pub fn new<I, S>(words: I, mode: MatchMode, case_sensitive: bool) -> Result<Self, AnalyzerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rules = Vec::new();
        for word in words {
            let word = word.into();
            if word.is_empty() {
                warn!("Ignoring empty word in word list");
                continue;
            }
            let pattern = RegexBuilder::new(&regex::escape(&word))
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|source| AnalyzerError::InvalidPattern {
                    pattern: word.clone(),
                    source,
                })?;
            rules.push(WordRule { word, pattern });
        }

        Ok(Self {
            rules,
            mode,
            source: Self::DEFAULT_SOURCE.to_string(),
            severity: DiagnosticSeverity::WARNING,
            code: None,
        })
    }

    /// Sets the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the severity of every finding.
    #[must_use]
    pub const fn with_severity(mut self, severity: DiagnosticSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the code attached to every finding.
    #[must_use]
    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code.filter(|c| !c.is_empty());
        self
    }

    /// Number of active words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.rules.len()
    }

    fn finding(&self, rule: &WordRule, start: usize, end: usize) -> Finding {
        Finding {
            start,
            end,
            severity: self.severity,
            message: rule.word.clone(),
            code: self.code.clone(),
        }
    }
}

impl Analyzer for WordAnalyzer {
    fn source(&self) -> &str {
        &self.source
    }

    fn scan(&self, text: &str) -> Result<Vec<Finding>, AnalyzerError> {
        let mut findings = Vec::new();

        for rule in &self.rules {
            let mut at = 0;
            while let Some(m) = rule.pattern.find_at(text, at) {
                match self.mode {
                    MatchMode::WholeWord if is_whole_word(text, m.start(), m.end()) => {
                        findings.push(self.finding(rule, m.start(), m.end()));
                        at = m.end();
                    }
                    MatchMode::WholeWord => at = next_char(text, m.start()),
                    MatchMode::Substring => {
                        findings.push(self.finding(rule, m.start(), m.end()));
                        at = next_char(text, m.start());
                    }
                }
            }
        }

        findings.sort_by_key(|f| (f.start, f.end));
        Ok(findings)
    }
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

fn next_char(text: &str, offset: usize) -> usize {
    offset + text[offset..].chars().next().map_or(1, char::len_utf8)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn spans(analyzer: &WordAnalyzer, text: &str) -> Vec<(usize, usize, String)> {
        analyzer
            .scan(text)
            .unwrap()
            .into_iter()
            .map(|f| (f.start, f.end, f.message))
            .collect()
    }

    fn default_words(mode: MatchMode) -> WordAnalyzer {
        WordAnalyzer::new(["badword1", "badword2"], mode, false).unwrap()
    }

    #[test]
    fn test_whole_word_matches() {
        let analyzer = default_words(MatchMode::WholeWord);
        let found = spans(&analyzer, "foo badword1 bar\nbadword2 baz");
        assert_eq!(
            found,
            vec![
                (4, 12, "badword1".to_string()),
                (17, 25, "badword2".to_string())
            ]
        );
    }

    #[test]
    fn test_whole_word_rejects_embedded() {
        let analyzer = default_words(MatchMode::WholeWord);
        assert!(spans(&analyzer, "xbadword1 badword1y badword1badword1").is_empty());
        assert_eq!(spans(&analyzer, "(badword1).").len(), 1);
        assert_eq!(spans(&analyzer, "badword1_x").len(), 1);
    }

    #[test]
    fn test_substring_matches_inside_words() {
        let analyzer = default_words(MatchMode::Substring);
        let found = spans(&analyzer, "xbadword1y");
        assert_eq!(found, vec![(1, 9, "badword1".to_string())]);
    }

    #[test]
    fn test_substring_allows_overlap() {
        let analyzer = WordAnalyzer::new(["aa"], MatchMode::Substring, true).unwrap();
        let found: Vec<_> = spans(&analyzer, "aaa").into_iter().map(|(s, e, _)| (s, e)).collect();
        assert_eq!(found, vec![(0, 2), (1, 3)]);
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let analyzer = default_words(MatchMode::WholeWord);
        assert_eq!(spans(&analyzer, "BadWord1").len(), 1);

        let strict = WordAnalyzer::new(["badword1"], MatchMode::WholeWord, true).unwrap();
        assert!(spans(&strict, "BadWord1").is_empty());
    }

    #[test]
    fn test_findings_sorted_by_offset() {
        let analyzer = default_words(MatchMode::WholeWord);
        let found = spans(&analyzer, "badword2 badword1 badword2");
        let starts: Vec<_> = found.iter().map(|(s, _, _)| *s).collect();
        assert_eq!(starts, vec![0, 9, 18]);
    }

    #[test]
    fn test_non_ascii_neighbours() {
        let analyzer = default_words(MatchMode::WholeWord);
        // 'é' is alphanumeric, '😀' is not
        assert!(spans(&analyzer, "ébadword1").is_empty());
        assert_eq!(spans(&analyzer, "😀badword1😀"), vec![(4, 12, "badword1".to_string())]);
    }

    #[test]
    fn test_settings_applied() {
        let analyzer = WordAnalyzer::new(["", "badword1"], MatchMode::WholeWord, false)
            .unwrap()
            .with_source("checker")
            .with_severity(DiagnosticSeverity::ERROR)
            .with_code(Some("faulty-word".to_string()));

        assert_eq!(analyzer.word_count(), 1);
        assert_eq!(analyzer.source(), "checker");
        let finding = &analyzer.scan("badword1").unwrap()[0];
        assert_eq!(finding.severity, DiagnosticSeverity::ERROR);
        assert_eq!(finding.code.as_deref(), Some("faulty-word"));
    }

    #[test]
    fn test_empty_code_means_none() {
        let analyzer = default_words(MatchMode::WholeWord).with_code(Some(String::new()));
        assert_eq!(analyzer.scan("badword1").unwrap()[0].code, None);
    }
}
