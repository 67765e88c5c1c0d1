/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::analyzer::{MatchMode, Severity, WordAnalyzer};

const DEFAULT_WORDS: [&str; 2] = ["badword1", "badword2"];
const DEFAULT_CODE: &str = "faulty-word";

/// Analyzer settings merged from every configuration layer.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Words to flag (default: badword1, badword2)
    #[serde(default = "default_words")]
    pub words: Vec<String>,

    /// Whole-word or substring matching
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Match case exactly (default: false)
    #[serde(default)]
    pub case_sensitive: bool,

    /// Severity of every diagnostic
    #[serde(default)]
    pub severity: Severity,

    /// Diagnostic source tag
    #[serde(default = "default_source")]
    pub source: String,

    /// Diagnostic code; empty for none
    #[serde(default = "default_code")]
    pub code: Option<String>,
}

fn default_words() -> Vec<String> {
    DEFAULT_WORDS.iter().map(ToString::to_string).collect()
}

fn default_source() -> String {
    WordAnalyzer::DEFAULT_SOURCE.to_string()
}

#[allow(
    clippy::unnecessary_wraps,
    reason = "serde default must match the field type"
)]
fn default_code() -> Option<String> {
    Some(DEFAULT_CODE.to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            words: default_words(),
            match_mode: MatchMode::default(),
            case_sensitive: false,
            severity: Severity::default(),
            source: default_source(),
            code: default_code(),
        }
    }
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or a value
    /// has the wrong type.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let user_file = dirs::config_dir().map(|dir| dir.join("wordlint").join("config.toml"));
        Self::load_layers(
            user_file,
            explicit_file,
            config::Environment::with_prefix("WORDLINT"),
        )
    }

    fn load_layers(
        user_file: Option<PathBuf>,
        explicit_file: Option<PathBuf>,
        environment: config::Environment,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("words", DEFAULT_WORDS.to_vec())?
            .set_default("match_mode", "whole-word")?
            .set_default("case_sensitive", false)?
            .set_default("severity", "warning")?
            .set_default("source", WordAnalyzer::DEFAULT_SOURCE)?
            .set_default("code", DEFAULT_CODE)?;

        // 2. Load from user config directory (~/.config/wordlint/config.toml)
        if let Some(config_path) = user_file
            && config_path.exists()
        {
            builder = builder.add_source(config::File::from(config_path));
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (WORDLINT_WORDS=a,b, etc.)
        builder = builder.add_source(
            environment
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("words"),
        );

        let config = builder
            .build()
            .context("Failed to build configuration")?;

        config.try_deserialize().context("Failed to deserialize configuration")
    }

    /// Build the word analyzer described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a word cannot be compiled into a pattern.
    pub fn analyzer(&self) -> Result<WordAnalyzer> {
        let analyzer = WordAnalyzer::new(self.words.iter().cloned(), self.match_mode, self.case_sensitive)
            .context("Failed to compile word list")?
            .with_source(self.source.clone())
            .with_severity(self.severity.into())
            .with_code(self.code.clone());

        if analyzer.word_count() == 0 {
            tracing::warn!("Word list is empty; no diagnostics will be reported");
        }

        Ok(analyzer)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::with_prefix("WORDLINT").source(Some(map))
    }

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::load_layers(None, None, env(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.words, vec!["badword1", "badword2"]);
        assert_eq!(config.code.as_deref(), Some("faulty-word"));
    }

    #[test]
    fn test_explicit_file_overrides_user_file() {
        let user = toml_file("words = [\"alpha\"]\ncase_sensitive = true\n");
        let explicit = toml_file("words = [\"beta\", \"gamma\"]\nmatch_mode = \"substring\"\n");

        let config = Config::load_layers(
            Some(user.path().to_path_buf()),
            Some(explicit.path().to_path_buf()),
            env(&[]),
        )
        .unwrap();

        assert_eq!(config.words, vec!["beta", "gamma"]);
        assert_eq!(config.match_mode, MatchMode::Substring);
        assert!(config.case_sensitive);
    }

    #[test]
    fn test_missing_user_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_layers(
            Some(dir.path().join("wordlint").join("config.toml")),
            None,
            env(&[]),
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_environment_wins_over_files() {
        let explicit = toml_file("severity = \"hint\"\nwords = [\"file\"]\n");
        let config = Config::load_layers(
            None,
            Some(explicit.path().to_path_buf()),
            env(&[
                ("WORDLINT_SEVERITY", "error"),
                ("WORDLINT_WORDS", "one,two"),
            ]),
        )
        .unwrap();

        assert_eq!(config.severity, Severity::Error);
        assert_eq!(config.words, vec!["one", "two"]);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let explicit = toml_file("match_mode = \"fuzzy\"\n");
        assert!(Config::load_layers(None, Some(explicit.path().to_path_buf()), env(&[])).is_err());
    }

    #[test]
    fn test_analyzer_from_config() {
        let config = Config {
            words: vec!["Foo".to_string()],
            severity: Severity::Error,
            code: Some(String::new()),
            ..Config::default()
        };
        let analyzer = config.analyzer().unwrap();
        let findings = analyzer.scan("a foo b").unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, lsp_types::DiagnosticSeverity::ERROR);
        assert_eq!(findings[0].code, None);
        assert_eq!(analyzer.source(), "wordlint");
    }
}
