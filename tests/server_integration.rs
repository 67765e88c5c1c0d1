// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests driving the wordlint binary over stdio.
//!
//! Each test spawns the server with an isolated config directory and talks
//! Content-Length framed JSON-RPC to it.

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ServerProcess {
    fn spawn(config_home: &Path, args: &[&str]) -> Result<Self> {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_wordlint"));
        cmd.args(args)
            .arg("--stdio")
            // Isolate from user-level config
            .env("XDG_CONFIG_HOME", config_home)
            .env("RUST_LOG", "wordlint=debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().context("Failed to spawn wordlint")?;
        let stdin = child.stdin.take().context("Failed to get stdin")?;
        let stdout = BufReader::new(child.stdout.take().context("Failed to get stdout")?);

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
        })
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_mut().context("stdin already closed")?;
        stdin.write_all(bytes).context("Failed to write to stdin")?;
        stdin.flush().context("Failed to flush stdin")?;
        Ok(())
    }

    fn send(&mut self, message: &Value) -> Result<()> {
        let body = message.to_string();
        let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        self.write_raw(frame.as_bytes())
    }

    fn request(&mut self, id: i64, method: &str, params: Value) -> Result<()> {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
    }

    fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        self.send(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
    }

    fn recv(&mut self) -> Result<Value> {
        let mut content_length = None;
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                bail!("Server closed stdout");
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = Some(value.trim().parse::<usize>()?);
            }
        }

        let len = content_length.context("Missing Content-Length")?;
        let mut body = vec![0; len];
        self.stdout.read_exact(&mut body)?;
        serde_json::from_slice(&body).context("Failed to parse JSON message")
    }

    fn initialize(&mut self) -> Result<Value> {
        self.request(
            1,
            "initialize",
            json!({
                "processId": null,
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "1.0"}
            }),
        )?;
        let response = self.recv()?;
        self.notify("initialized", json!({}))?;
        Ok(response)
    }

    fn open(&mut self, uri: &str, text: &str) -> Result<()> {
        self.notify(
            "textDocument/didOpen",
            json!({"textDocument": {
                "uri": uri, "languageId": "plaintext", "version": 1, "text": text
            }}),
        )
    }

    fn close_stdin(&mut self) {
        self.stdin = None;
    }

    fn wait(mut self) -> Result<Option<i32>> {
        self.close_stdin();
        Ok(self.child.wait()?.code())
    }
}

#[test]
fn test_open_change_shutdown_exit() -> Result<()> {
    let home = tempfile::tempdir()?;
    let mut server = ServerProcess::spawn(home.path(), &[])?;

    let response = server.initialize()?;
    assert_eq!(response["id"], 1);
    assert_eq!(
        response["result"]["capabilities"]["textDocumentSync"]["change"],
        1
    );

    server.open("file:///tmp/a.txt", "foo badword1 bar\nbadword2 baz")?;
    let publish = server.recv()?;
    assert_eq!(publish["method"], "textDocument/publishDiagnostics");
    let diagnostics = publish["params"]["diagnostics"]
        .as_array()
        .context("diagnostics is not an array")?;
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0]["range"]["start"], json!({"line": 0, "character": 4}));
    assert_eq!(diagnostics[0]["range"]["end"], json!({"line": 0, "character": 12}));
    assert_eq!(diagnostics[1]["range"]["start"], json!({"line": 1, "character": 0}));
    assert_eq!(diagnostics[1]["range"]["end"], json!({"line": 1, "character": 8}));
    assert_eq!(diagnostics[0]["code"], "faulty-word");

    server.notify(
        "textDocument/didChange",
        json!({
            "textDocument": {"uri": "file:///tmp/a.txt", "version": 2},
            "contentChanges": [{"text": "nothing to see"}]
        }),
    )?;
    let publish = server.recv()?;
    assert_eq!(publish["params"]["diagnostics"], json!([]));

    server.request(2, "shutdown", Value::Null)?;
    let response = server.recv()?;
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"], Value::Null);

    server.notify("exit", Value::Null)?;
    assert_eq!(server.wait()?, Some(0));
    Ok(())
}

#[test]
fn test_exit_without_shutdown_is_status_1() -> Result<()> {
    let home = tempfile::tempdir()?;
    let mut server = ServerProcess::spawn(home.path(), &[])?;
    server.initialize()?;
    server.notify("exit", Value::Null)?;
    assert_eq!(server.wait()?, Some(1));
    Ok(())
}

#[test]
fn test_eof_is_status_1() -> Result<()> {
    let home = tempfile::tempdir()?;
    let mut server = ServerProcess::spawn(home.path(), &[])?;
    server.initialize()?;
    assert_eq!(server.wait()?, Some(1));
    Ok(())
}

#[test]
fn test_malformed_frame_is_status_1() -> Result<()> {
    let home = tempfile::tempdir()?;
    let mut server = ServerProcess::spawn(home.path(), &[])?;
    server.write_raw(b"Content-Type: application/json\r\n\r\n{}")?;
    assert_eq!(server.wait()?, Some(1));
    Ok(())
}

#[test]
fn test_request_before_initialize_keeps_session() -> Result<()> {
    let home = tempfile::tempdir()?;
    let mut server = ServerProcess::spawn(home.path(), &[])?;

    server.request(5, "shutdown", Value::Null)?;
    let response = server.recv()?;
    assert_eq!(response["id"], 5);
    assert_eq!(response["error"]["code"], -32002);

    let response = server.initialize()?;
    assert!(response.get("result").is_some(), "Init failed: {response:?}");

    server.request(6, "shutdown", Value::Null)?;
    server.recv()?;
    server.notify("exit", Value::Null)?;
    assert_eq!(server.wait()?, Some(0));
    Ok(())
}

#[test]
fn test_config_file_and_cli_words() -> Result<()> {
    let home = tempfile::tempdir()?;
    let config_dir = home.path().join("wordlint");
    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(
        config_dir.join("config.toml"),
        "words = [\"legacy\"]\nseverity = \"error\"\ncode = \"\"\n",
    )?;

    // User config from XDG_CONFIG_HOME only
    let mut server = ServerProcess::spawn(home.path(), &[])?;
    server.initialize()?;
    server.open("file:///tmp/b.txt", "legacy code, badword1")?;
    let publish = server.recv()?;
    let diagnostics = publish["params"]["diagnostics"]
        .as_array()
        .context("diagnostics is not an array")?;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["message"], "legacy");
    assert_eq!(diagnostics[0]["severity"], 1);
    assert!(diagnostics[0].get("code").is_none());
    server.notify("exit", Value::Null)?;
    server.wait()?;

    // CLI words replace the configured list
    let mut server = ServerProcess::spawn(
        home.path(),
        &["--word", "code", "--match-mode", "substring"],
    )?;
    server.initialize()?;
    server.open("file:///tmp/b.txt", "legacy code, barcode")?;
    let publish = server.recv()?;
    let diagnostics = publish["params"]["diagnostics"]
        .as_array()
        .context("diagnostics is not an array")?;
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.iter().all(|d| d["message"] == "code"));
    server.notify("exit", Value::Null)?;
    server.wait()?;
    Ok(())
}

#[test]
fn test_version_flag() -> Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_wordlint"))
        .arg("--version")
        .output()
        .context("Failed to run wordlint --version")?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("wordlint "), "unexpected: {stdout}");
    Ok(())
}
