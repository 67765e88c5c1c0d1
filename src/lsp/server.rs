// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The session loop: reads frames, gates them through the lifecycle and
//! routes them to handlers.

use lsp_types::{
    CancelParams, ClientInfo, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, InitializeResult, NumberOrString,
    PositionEncodingKind, SaveOptions, ServerCapabilities, ServerInfo, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextDocumentSyncOptions, TextDocumentSyncSaveOptions,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::analyzer::Analyzer;
use crate::document::{DocumentStore, SyncError};

use super::correlator::Correlator;
use super::lifecycle::{ExitStatus, Lifecycle};
use super::outbound::{Outbound, OutboundError};
use super::protocol::{
    INTERNAL_ERROR, Incoming, METHOD_NOT_FOUND, NotificationMessage, REQUEST_CANCELLED, RequestId,
    RequestMessage, ResponseMessage,
};
use super::publisher::Publisher;
use super::sync::{DocumentEvent, SyncQueues};
use super::transport::{FrameReader, FrameWriter, FramingError};

/// A failure that ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The inbound byte stream lost frame alignment.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// The client can no longer be written to.
    #[error("transport write failed: {0}")]
    TransportWrite(#[from] OutboundError),
}

/// A language server bound to one analyzer.
pub struct Server {
    analyzer: Arc<dyn Analyzer>,
    name: String,
    version: String,
}

impl Server {
    /// Creates a server reporting the package name and version.
    #[must_use]
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            analyzer,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Overrides the version sent in `serverInfo`.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Runs one session until `exit` or end of input.
    ///
    /// Returns the exit status the process should report.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the input framing breaks or the output
    /// can no longer be written.
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<ExitStatus, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut reader = FrameReader::new(input);
        let outbound = Outbound::new(FrameWriter::new(output));
        let lost = outbound.connection_lost();
        let mut session = Session::new(self, outbound);

        let result = loop {
            let frame = tokio::select! {
                () = lost.cancelled() => break Err(SessionError::TransportWrite(OutboundError::ConnectionLost)),
                frame = reader.read_message() => frame,
            };

            let payload = match frame {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    info!("Client closed the input stream");
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            };

            match session.handle(&payload).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let status = session.finish().await;
        result.map(|()| status)
    }
}

enum Flow {
    Continue,
    Exit,
}

type InFlight = Arc<StdMutex<HashMap<RequestId, CancellationToken>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, HashMap<RequestId, CancellationToken>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Session {
    lifecycle: Lifecycle,
    outbound: Outbound,
    correlator: Correlator,
    queues: SyncQueues,
    tracker: TaskTracker,
    in_flight: InFlight,
    shutdown: Option<JoinHandle<()>>,
    shutdown_id: Option<RequestId>,
    server_info: ServerInfo,
}

impl Session {
    fn new(server: &Server, outbound: Outbound) -> Self {
        let tracker = TaskTracker::new();
        let store = Arc::new(Mutex::new(DocumentStore::new()));
        let publisher = Publisher::new(Arc::clone(&server.analyzer), outbound.clone());

        Self {
            lifecycle: Lifecycle::new(),
            correlator: Correlator::new(outbound.clone()),
            queues: SyncQueues::new(store, publisher, tracker.clone()),
            outbound,
            tracker,
            in_flight: Arc::new(StdMutex::new(HashMap::new())),
            shutdown: None,
            shutdown_id: None,
            server_info: ServerInfo {
                name: server.name.clone(),
                version: Some(server.version.clone()),
            },
        }
    }

    async fn handle(&mut self, payload: &[u8]) -> Result<Flow, SessionError> {
        trace!("Received: {}", String::from_utf8_lossy(payload));

        match Incoming::decode(payload) {
            Ok(Incoming::Request(request)) => {
                self.handle_request(request).await?;
                Ok(Flow::Continue)
            }
            Ok(Incoming::Notification(notification)) => Ok(self.handle_notification(notification)),
            Ok(Incoming::Response(response)) => {
                self.correlator.resolve(response).await;
                Ok(Flow::Continue)
            }
            Err(e) => {
                warn!("Rejecting message: {}", e);
                self.outbound
                    .respond(&ResponseMessage::error(e.id(), e.code(), e.to_string()))
                    .await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_request(&mut self, request: RequestMessage) -> Result<(), OutboundError> {
        if let Err(rejection) = self.lifecycle.admit_request(&request.method) {
            debug!(
                "Rejecting {} (id {}): {}",
                request.method, request.id, rejection.message
            );
            return self
                .outbound
                .respond(&ResponseMessage::error(
                    Some(request.id),
                    rejection.code,
                    rejection.message,
                ))
                .await;
        }

        match request.method.as_str() {
            "initialize" => {
                let result = self.initialize(&request.params);
                let response = match serde_json::to_value(result) {
                    Ok(value) => ResponseMessage::success(request.id, value),
                    Err(e) => ResponseMessage::error(Some(request.id), INTERNAL_ERROR, e.to_string()),
                };
                self.outbound.respond(&response).await
            }
            "shutdown" => {
                self.spawn_shutdown(request.id);
                Ok(())
            }
            method => {
                debug!("Unknown request method: {}", method);
                self.outbound
                    .respond(&ResponseMessage::error(
                        Some(request.id),
                        METHOD_NOT_FOUND,
                        format!("method not found: {method}"),
                    ))
                    .await
            }
        }
    }

    fn initialize(&self, params: &Value) -> InitializeResult {
        let client = params
            .get("clientInfo")
            .and_then(|v| serde_json::from_value::<ClientInfo>(v.clone()).ok());
        match client {
            Some(ClientInfo { name, version }) => info!(
                "Initializing for {} {}",
                name,
                version.as_deref().unwrap_or("(unknown version)")
            ),
            None => info!("Initializing for unnamed client"),
        }

        InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(PositionEncodingKind::UTF16),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..TextDocumentSyncOptions::default()
                    },
                )),
                experimental: Some(serde_json::json!({ "diagnosticProvider": "push" })),
                ..ServerCapabilities::default()
            },
            server_info: Some(self.server_info.clone()),
        }
    }

    /// Answers `shutdown` once every queued document event has settled.
    fn spawn_shutdown(&mut self, id: RequestId) {
        let token = CancellationToken::new();
        lock_in_flight(&self.in_flight).insert(id.clone(), token.clone());
        self.shutdown_id = Some(id.clone());

        self.tracker.close();
        let tracker = self.tracker.clone();
        let outbound = self.outbound.clone();
        let in_flight = Arc::clone(&self.in_flight);

        self.shutdown = Some(tokio::spawn(async move {
            let settled = tokio::select! {
                () = tracker.wait() => true,
                () = token.cancelled() => false,
            };

            // Whichever side removes the entry first decides the outcome.
            let committed = lock_in_flight(&in_flight).remove(&id).is_some();
            let response = if settled && committed {
                info!("Shutdown requested; pending work settled");
                ResponseMessage::success(id, Value::Null)
            } else {
                ResponseMessage::error(Some(id), REQUEST_CANCELLED, "request cancelled")
            };

            if let Err(e) = outbound.respond(&response).await {
                warn!("Failed to answer shutdown: {}", e);
            }
        }));
    }

    fn handle_notification(&mut self, notification: NotificationMessage) -> Flow {
        let method = notification.method.as_str();

        if let Err(reason) = self.lifecycle.admit_notification(method) {
            debug!("Dropping {}: {}", method, reason);
            return Flow::Continue;
        }

        match method {
            "exit" => return Flow::Exit,
            "initialized" => info!("Client initialized"),
            "textDocument/didOpen" => {
                if let Some(params) = parse::<DidOpenTextDocumentParams>(method, notification.params) {
                    let doc = params.text_document;
                    self.queues.dispatch(
                        doc.uri,
                        DocumentEvent::Open {
                            language_id: doc.language_id,
                            text: doc.text,
                            version: doc.version,
                        },
                    );
                }
            }
            "textDocument/didChange" => {
                if let Some(params) = parse::<DidChangeTextDocumentParams>(method, notification.params)
                {
                    self.did_change(params);
                }
            }
            "textDocument/didSave" => {
                if let Some(params) = parse::<DidSaveTextDocumentParams>(method, notification.params) {
                    self.queues
                        .dispatch(params.text_document.uri, DocumentEvent::Save);
                }
            }
            "textDocument/didClose" => {
                if let Some(params) = parse::<DidCloseTextDocumentParams>(method, notification.params)
                {
                    self.queues
                        .dispatch(params.text_document.uri, DocumentEvent::Close);
                }
            }
            "$/cancelRequest" => {
                if let Some(params) = parse::<CancelParams>(method, notification.params) {
                    self.cancel(&params.id);
                }
            }
            m if m.starts_with("$/") => trace!("Ignoring {}", m),
            m => debug!("Ignoring unknown notification: {}", m),
        }

        Flow::Continue
    }

    fn did_change(&mut self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        if params.content_changes.iter().any(|c| c.range.is_some()) {
            warn!("{}", SyncError::IncrementalChange(uri.as_str().to_string()));
            return;
        }

        // Full-text changes replace each other; only the last one counts.
        let Some(change) = params.content_changes.into_iter().last() else {
            warn!("Ignoring change without content for {}", uri.as_str());
            return;
        };

        self.queues.dispatch(
            uri,
            DocumentEvent::Change {
                text: change.text,
                version: params.text_document.version,
            },
        );
    }

    fn cancel(&mut self, id: &NumberOrString) {
        let id = match id {
            NumberOrString::Number(n) => RequestId::Number(i64::from(*n)),
            NumberOrString::String(s) => RequestId::String(s.clone()),
        };

        let Some(token) = lock_in_flight(&self.in_flight).remove(&id) else {
            trace!("Cancel for request {} that is not in flight", id);
            return;
        };

        debug!("Cancelling request {}", id);
        token.cancel();

        if self.shutdown_id.as_ref() == Some(&id) {
            info!("Shutdown cancelled by client; resuming");
            self.shutdown_id = None;
            self.lifecycle.cancel_shutdown();
            self.tracker.reopen();
        }
    }

    /// Lets the shutdown answer go out and fails pending outbound requests.
    async fn finish(mut self) -> ExitStatus {
        if let Some(shutdown) = self.shutdown.take()
            && let Err(e) = shutdown.await
        {
            warn!("Shutdown handler failed: {}", e);
        }

        let cancelled = self.correlator.cancel_all().await;
        if cancelled > 0 {
            debug!("Cancelled {} pending requests", cancelled);
        }

        let status = self.lifecycle.exit_status();
        info!(
            "Session ended in state {:?} ({} open documents)",
            self.lifecycle.state(),
            self.queues.open_count()
        );
        status
    }
}

fn parse<T: DeserializeOwned>(method: &str, params: Value) -> Option<T> {
    match serde_json::from_value(params) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!("Dropping {} with invalid params: {}", method, e);
            None
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerError, Finding, MatchMode, WordAnalyzer};
    use crate::lsp::protocol::{INVALID_REQUEST, PARSE_ERROR, SERVER_NOT_INITIALIZED};
    use serde_json::json;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    struct Client {
        writer: WriteHalf<DuplexStream>,
        reader: FrameReader<ReadHalf<DuplexStream>>,
        session: JoinHandle<Result<ExitStatus, SessionError>>,
    }

    impl Client {
        fn start() -> Self {
            let analyzer = WordAnalyzer::new(["badword1", "badword2"], MatchMode::WholeWord, false)
                .unwrap()
                .with_code(Some("faulty-word".to_string()));
            Self::start_with(Arc::new(analyzer))
        }

        fn start_with(analyzer: Arc<dyn Analyzer>) -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let (server_read, server_write) = tokio::io::split(server);
            let (client_read, client_write) = tokio::io::split(client);

            let server = Server::new(analyzer);
            let session = tokio::spawn(async move { server.run(server_read, server_write).await });

            Self {
                writer: client_write,
                reader: FrameReader::new(client_read),
                session,
            }
        }

        async fn send_raw(&mut self, body: &[u8]) {
            let header = format!("Content-Length: {}\r\n\r\n", body.len());
            self.writer.write_all(header.as_bytes()).await.unwrap();
            self.writer.write_all(body).await.unwrap();
        }

        async fn send(&mut self, message: Value) {
            self.send_raw(&serde_json::to_vec(&message).unwrap()).await;
        }

        async fn request(&mut self, id: i64, method: &str, params: Value) {
            self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
                .await;
        }

        async fn notify(&mut self, method: &str, params: Value) {
            self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
                .await;
        }

        async fn recv(&mut self) -> Value {
            serde_json::from_slice(&self.reader.read_message().await.unwrap().unwrap()).unwrap()
        }

        async fn initialize(&mut self) {
            self.request(1, "initialize", json!({"processId": null, "capabilities": {}}))
                .await;
            let response = self.recv().await;
            assert_eq!(response["id"], 1);
            self.notify("initialized", json!({})).await;
        }

        async fn open(&mut self, uri: &str, text: &str, version: i32) {
            self.notify(
                "textDocument/didOpen",
                json!({"textDocument": {
                    "uri": uri, "languageId": "plaintext", "version": version, "text": text
                }}),
            )
            .await;
        }

        async fn change(&mut self, uri: &str, text: &str, version: i32) {
            self.notify(
                "textDocument/didChange",
                json!({
                    "textDocument": {"uri": uri, "version": version},
                    "contentChanges": [{"text": text}]
                }),
            )
            .await;
        }

        async fn finish(mut self) -> ExitStatus {
            self.notify("exit", Value::Null).await;
            self.session.await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_initialize_advertises_capabilities() {
        let mut client = Client::start();
        client
            .request(
                1,
                "initialize",
                json!({"capabilities": {}, "clientInfo": {"name": "test", "version": "1"}}),
            )
            .await;
        let response = client.recv().await;

        let caps = &response["result"]["capabilities"];
        assert_eq!(caps["textDocumentSync"]["change"], 1);
        assert_eq!(caps["textDocumentSync"]["openClose"], true);
        assert_eq!(caps["positionEncoding"], "utf-16");
        assert_eq!(caps["experimental"]["diagnosticProvider"], "push");
        assert_eq!(response["result"]["serverInfo"]["name"], "wordlint");

        assert_eq!(client.finish().await, ExitStatus::Abnormal);
    }

    #[tokio::test]
    async fn test_open_publishes_diagnostics() {
        let mut client = Client::start();
        client.initialize().await;
        client
            .open("file:///tmp/a.txt", "foo badword1 bar\nbadword2 baz", 1)
            .await;

        let publish = client.recv().await;
        assert_eq!(publish["method"], "textDocument/publishDiagnostics");
        assert_eq!(publish["params"]["uri"], "file:///tmp/a.txt");
        let diagnostics = publish["params"]["diagnostics"].as_array().unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics[0]["range"],
            json!({"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 12}})
        );
        assert_eq!(diagnostics[0]["message"], "badword1");
        assert_eq!(diagnostics[0]["source"], "wordlint");
        assert_eq!(diagnostics[0]["code"], "faulty-word");
        assert_eq!(
            diagnostics[1]["range"],
            json!({"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 8}})
        );

        client.change("file:///tmp/a.txt", "all clean now", 2).await;
        let publish = client.recv().await;
        assert_eq!(publish["params"]["version"], 2);
        assert_eq!(publish["params"]["diagnostics"], json!([]));

        client.finish().await;
    }

    #[tokio::test]
    async fn test_request_before_initialize() {
        let mut client = Client::start();
        client.request(7, "shutdown", Value::Null).await;
        let response = client.recv().await;
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], SERVER_NOT_INITIALIZED);

        // The session survives and still accepts initialize
        client.initialize().await;
        client.finish().await;
    }

    #[tokio::test]
    async fn test_unknown_method_and_second_initialize() {
        let mut client = Client::start();
        client.initialize().await;

        client.request(2, "textDocument/hover", json!({})).await;
        let response = client.recv().await;
        assert_eq!(response["id"], 2);
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        client.request(3, "initialize", json!({"capabilities": {}})).await;
        let response = client.recv().await;
        assert_eq!(response["error"]["code"], INVALID_REQUEST);

        client.finish().await;
    }

    #[tokio::test]
    async fn test_invalid_json_gets_parse_error() {
        let mut client = Client::start();
        client.send_raw(b"{not json").await;
        let response = client.recv().await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        client.finish().await;
    }

    #[tokio::test]
    async fn test_malformed_request_is_answered_with_its_id() {
        let mut client = Client::start();
        client.initialize().await;
        client.send(json!({"id": 5, "method": "shutdown"})).await;
        let response = client.recv().await;
        assert_eq!(response["id"], 5);
        assert_eq!(response["error"]["code"], INVALID_REQUEST);

        // The rejected shutdown never took effect
        client.open("file:///tmp/a.txt", "badword1", 1).await;
        let publish = client.recv().await;
        assert_eq!(publish["method"], "textDocument/publishDiagnostics");
        assert_eq!(client.finish().await, ExitStatus::Abnormal);
    }

    #[tokio::test]
    async fn test_change_before_open_publishes_nothing() {
        let mut client = Client::start();
        client.initialize().await;
        client.change("file:///tmp/ghost.txt", "badword1", 2).await;

        client.request(9, "shutdown", Value::Null).await;
        let response = client.recv().await;
        assert_eq!(response["id"], 9);
        assert_eq!(response["result"], Value::Null);
        assert_eq!(client.finish().await, ExitStatus::Clean);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_pending_publishes() {
        let mut client = Client::start();
        client.initialize().await;
        for i in 0..5 {
            client
                .open(&format!("file:///tmp/{i}.txt"), "badword1", 1)
                .await;
        }
        client.request(2, "shutdown", Value::Null).await;

        for _ in 0..5 {
            let publish = client.recv().await;
            assert_eq!(publish["method"], "textDocument/publishDiagnostics");
        }
        let response = client.recv().await;
        assert_eq!(response["id"], 2);
        assert!(response.get("error").is_none());

        // Work is refused once shutdown has been received
        client.request(3, "textDocument/hover", json!({})).await;
        assert_eq!(client.recv().await["error"]["code"], INVALID_REQUEST);

        assert_eq!(client.finish().await.code(), 0);
    }

    #[tokio::test]
    async fn test_incremental_change_is_rejected() {
        let mut client = Client::start();
        client.initialize().await;
        client.open("file:///tmp/a.txt", "clean", 1).await;
        assert_eq!(client.recv().await["params"]["version"], 1);

        client
            .notify(
                "textDocument/didChange",
                json!({
                    "textDocument": {"uri": "file:///tmp/a.txt", "version": 2},
                    "contentChanges": [{
                        "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 0}},
                        "text": "badword1 "
                    }]
                }),
            )
            .await;
        client.change("file:///tmp/a.txt", "badword1", 3).await;

        let publish = client.recv().await;
        assert_eq!(publish["params"]["version"], 3);
        client.finish().await;
    }

    /// Holds every scan until the paired sender sends or is dropped.
    struct GatedAnalyzer {
        inner: WordAnalyzer,
        gate: StdMutex<std::sync::mpsc::Receiver<()>>,
    }

    impl GatedAnalyzer {
        fn new(gate: std::sync::mpsc::Receiver<()>) -> Self {
            Self {
                inner: WordAnalyzer::new(["badword1"], MatchMode::WholeWord, false).unwrap(),
                gate: StdMutex::new(gate),
            }
        }
    }

    impl Analyzer for GatedAnalyzer {
        fn source(&self) -> &str {
            self.inner.source()
        }

        fn scan(&self, text: &str) -> Result<Vec<Finding>, AnalyzerError> {
            let _ = self.gate.lock().unwrap().recv();
            self.inner.scan(text)
        }
    }

    /// Sends `shutdown` (id 2) while a publish is held, then cancels it.
    async fn cancelled_shutdown() -> Client {
        let (release, gate) = std::sync::mpsc::channel();
        let mut client = Client::start_with(Arc::new(GatedAnalyzer::new(gate)));
        client.initialize().await;
        client.open("file:///tmp/a.txt", "badword1", 1).await;
        client.request(2, "shutdown", Value::Null).await;
        client
            .notify("$/cancelRequest", json!({"id": 2}))
            .await;

        let response = client.recv().await;
        assert_eq!(response["id"], 2);
        assert_eq!(response["error"]["code"], REQUEST_CANCELLED);

        drop(release);
        let publish = client.recv().await;
        assert_eq!(publish["method"], "textDocument/publishDiagnostics");
        assert_eq!(publish["params"]["version"], 1);
        client
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_shutdown_resumes_session() {
        let mut client = cancelled_shutdown().await;

        client.change("file:///tmp/a.txt", "clean", 2).await;
        assert_eq!(client.recv().await["params"]["version"], 2);

        client.request(3, "shutdown", Value::Null).await;
        let response = client.recv().await;
        assert_eq!(response["id"], 3);
        assert_eq!(response["result"], Value::Null);
        assert_eq!(client.finish().await, ExitStatus::Clean);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exit_after_cancelled_shutdown_is_abnormal() {
        let client = cancelled_shutdown().await;
        assert_eq!(client.finish().await, ExitStatus::Abnormal);
    }

    #[tokio::test]
    async fn test_cancel_for_unknown_request_is_ignored() {
        let mut client = Client::start();
        client.initialize().await;
        client.notify("$/cancelRequest", json!({"id": 42})).await;
        client.request(2, "shutdown", Value::Null).await;
        assert_eq!(client.recv().await["result"], Value::Null);
        assert_eq!(client.finish().await, ExitStatus::Clean);
    }

    #[test]
    #[allow(clippy::panic, reason = "Poisons the lock on purpose")]
    fn test_poisoned_in_flight_map_keeps_tracking() {
        let in_flight: InFlight = Arc::default();
        let shared = Arc::clone(&in_flight);
        let poisoner = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("poison the in-flight map");
        });
        assert!(poisoner.join().is_err());
        assert!(in_flight.is_poisoned());

        let token = CancellationToken::new();
        lock_in_flight(&in_flight).insert(RequestId::Number(1), token.clone());
        let removed = lock_in_flight(&in_flight).remove(&RequestId::Number(1));
        assert!(removed.is_some());
        assert!(lock_in_flight(&in_flight).is_empty());
    }

    #[tokio::test]
    async fn test_eof_without_exit_is_abnormal() {
        let mut client = Client::start();
        client.initialize().await;
        client.writer.shutdown().await.unwrap();
        assert_eq!(client.session.await.unwrap().unwrap(), ExitStatus::Abnormal);
    }

    #[tokio::test]
    async fn test_broken_frame_ends_session() {
        let mut client = Client::start();
        client
            .writer
            .write_all(b"Content-Length: nope\r\n\r\n{}")
            .await
            .unwrap();
        assert!(matches!(
            client.session.await.unwrap(),
            Err(SessionError::Framing(FramingError::InvalidContentLength(_)))
        ));
    }
}
