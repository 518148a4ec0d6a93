//! End-to-end DAP tests: a scripted client talks to the server over
//! in-memory streams, replaying the indexed / not_indexed fixture.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};
use varlens_cli::config::VarlensConfig;
use varlens_cli::dap::run_dap_server_on;
use varlens_core::snapshot::SnapshotEngine;
use varlens_core::NativeEngine;
use varlens_rt::InspectionSession;

// =============================================================================
// Helper: in-memory transport
// =============================================================================

struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(bytes) => {
                    self.pending = bytes;
                    self.pos = 0;
                }
                // Client hung up.
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct ChannelWriter(Sender<Vec<u8>>);

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.0
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Helper: scripted client
// =============================================================================

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(name)
}

fn fixture_session() -> InspectionSession {
    let config = VarlensConfig::load_from(&fixture("varlens.toml")).expect("fixture config");
    let registry = config.build_registry().expect("fixture formatters");
    let snapshot =
        SnapshotEngine::load(&fixture("indexed_children.json")).expect("fixture snapshot");
    let engine: Arc<dyn NativeEngine> = Arc::new(snapshot);
    InspectionSession::new(engine, registry, config.session_options())
}

struct Client {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    seq: i64,
    events: Vec<Value>,
    server: Option<JoinHandle<()>>,
}

impl Client {
    fn start() -> Self {
        let (to_server, server_in) = mpsc::channel();
        let (server_out, from_server) = mpsc::channel();
        let server = thread::spawn(move || {
            let reader = ChannelReader {
                rx: server_in,
                pending: Vec::new(),
                pos: 0,
            };
            run_dap_server_on(
                BufReader::new(reader),
                BufWriter::new(ChannelWriter(server_out)),
                fixture_session(),
            );
        });
        Client {
            tx: Some(to_server),
            rx: from_server,
            buf: Vec::new(),
            seq: 0,
            events: Vec::new(),
            server: Some(server),
        }
    }

    fn send(&mut self, command: &str, arguments: Option<Value>) -> i64 {
        self.seq += 1;
        let mut msg = json!({ "seq": self.seq, "type": "request", "command": command });
        if let Some(arguments) = arguments {
            msg["arguments"] = arguments;
        }
        let body = msg.to_string();
        let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        self.tx
            .as_ref()
            .expect("client open")
            .send(frame.into_bytes())
            .expect("server alive");
        self.seq
    }

    fn next_message(&mut self) -> Value {
        loop {
            if let Some(msg) = self.take_frame() {
                return msg;
            }
            let chunk = self
                .rx
                .recv_timeout(Duration::from_secs(5))
                .expect("server answered in time");
            self.buf.extend_from_slice(&chunk);
        }
    }

    fn take_frame(&mut self) -> Option<Value> {
        let text = std::str::from_utf8(&self.buf).ok()?;
        let header_end = text.find("\r\n\r\n")?;
        let length: usize = text[..header_end]
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .and_then(|n| n.trim().parse().ok())?;
        let body_start = header_end + 4;
        if self.buf.len() < body_start + length {
            return None;
        }
        let body: Vec<u8> = self.buf.drain(..body_start + length).skip(body_start).collect();
        Some(serde_json::from_slice(&body).expect("valid json from server"))
    }

    /// Send a request and return its response, queueing events seen meanwhile.
    fn request(&mut self, command: &str, arguments: Option<Value>) -> Value {
        let seq = self.send(command, arguments);
        loop {
            let msg = self.next_message();
            if msg["type"] == "response" && msg["request_seq"] == seq {
                return msg;
            }
            if msg["type"] == "event" {
                self.events.push(msg);
            }
        }
    }

    fn wait_event(&mut self, name: &str) -> Value {
        if let Some(pos) = self.events.iter().position(|e| e["event"] == name) {
            return self.events.remove(pos);
        }
        loop {
            let msg = self.next_message();
            if msg["type"] == "event" && msg["event"] == name {
                return msg;
            }
            if msg["type"] == "event" {
                self.events.push(msg);
            }
        }
    }

    /// Handshake up to the first stop.
    fn launch(&mut self) {
        let init = self.request(
            "initialize",
            Some(json!({
                "adapterID": "varlens-test",
                "linesStartAt1": true,
                "columnsStartAt1": true
            })),
        );
        assert_eq!(init["success"], true);
        self.wait_event("initialized");
        assert_eq!(self.request("launch", Some(json!({})))["success"], true);
        assert_eq!(self.request("configurationDone", None)["success"], true);
        let stopped = self.wait_event("stopped");
        assert_eq!(stopped["body"]["reason"], "breakpoint");
    }

    fn locals_reference(&mut self) -> i64 {
        let scopes = self.request("scopes", Some(json!({ "frameId": 0 })));
        assert_eq!(scopes["body"]["scopes"][0]["name"], "Locals");
        scopes["body"]["scopes"][0]["variablesReference"]
            .as_i64()
            .expect("locals reference")
    }

    fn variables(&mut self, arguments: Value) -> Vec<Value> {
        let resp = self.request("variables", Some(arguments));
        assert_eq!(resp["success"], true);
        resp["body"]["variables"].as_array().cloned().unwrap_or_default()
    }

    fn console(&mut self, command: &str) -> String {
        let args = json!({ "expression": command, "context": "repl" });
        let resp = self.request("evaluate", Some(args));
        assert_eq!(resp["success"], true);
        resp["body"]["result"].as_str().unwrap_or_default().to_string()
    }

    fn finish(mut self) {
        self.request("disconnect", Some(json!({})));
        self.tx.take();
        if let Some(server) = self.server.take() {
            server.join().expect("server thread");
        }
    }
}

// =============================================================================
// Indexed / not_indexed children
// =============================================================================

#[test]
fn indexed_variables_only_for_indexed_formatter() {
    let mut client = Client::start();
    client.launch();

    let locals = client.locals_reference();
    let vars = client.variables(json!({ "variablesReference": locals }));
    assert_eq!(vars.len(), 2);

    let indexed = &vars[0];
    assert_eq!(indexed["name"], "indexed");
    assert_eq!(indexed["indexedVariables"], 1);
    assert_ne!(indexed["variablesReference"], 0);

    let not_indexed = &vars[1];
    assert_eq!(not_indexed["name"], "not_indexed");
    assert!(not_indexed.get("indexedVariables").is_none());

    assert_eq!(client.console("`formatter size-calls"), "['Indexed']");
    let counters = client.console("`formatter counters");
    assert!(counters.contains("IndexedFormatter: size=1 materialize=0"), "{}", counters);
    assert!(!counters.contains("NotIndexedFormatter"), "{}", counters);

    client.finish();
}

#[test]
fn expanding_window_materializes_requested_children() {
    let mut client = Client::start();
    client.launch();

    let locals = client.locals_reference();
    let vars = client.variables(json!({ "variablesReference": locals }));
    let indexed = vars[0]["variablesReference"].as_i64().expect("expandable");

    let children =
        client.variables(json!({ "variablesReference": indexed, "start": 0, "count": 1 }));
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["name"], "i");
    assert_eq!(children[0]["value"], "1");
    assert_eq!(children[0]["variablesReference"], 0);

    let counters = client.console("`formatter counters");
    assert!(counters.contains("IndexedFormatter: size=1 materialize=1"), "{}", counters);

    client.finish();
}

// =============================================================================
// Stops
// =============================================================================

#[test]
fn stale_reference_after_step_is_empty() {
    let mut client = Client::start();
    client.launch();

    let old_locals = client.locals_reference();
    client.variables(json!({ "variablesReference": old_locals }));

    assert_eq!(client.request("next", Some(json!({ "threadId": 1 })))["success"], true);
    let stopped = client.wait_event("stopped");
    assert_eq!(stopped["body"]["reason"], "step");

    let stale = client.variables(json!({ "variablesReference": old_locals }));
    assert!(stale.is_empty());
    let output = client.wait_event("output");
    assert!(output["body"]["output"]
        .as_str()
        .unwrap_or_default()
        .contains(&old_locals.to_string()));

    let fresh = client.locals_reference();
    let vars = client.variables(json!({ "variablesReference": fresh }));
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0]["indexedVariables"], 1);
    assert_eq!(client.console("`formatter size-calls"), "['Indexed', 'Indexed']");

    assert_eq!(client.request("continue", Some(json!({ "threadId": 1 })))["success"], true);
    client.wait_event("terminated");

    client.finish();
}

#[test]
fn evaluate_paths_and_errors() {
    let mut client = Client::start();
    client.launch();

    let args = json!({ "expression": "not_indexed.i", "frameId": 0 });
    let resp = client.request("evaluate", Some(args));
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["result"], "2");

    let missing = client.request("evaluate", Some(json!({ "expression": "nope", "frameId": 0 })));
    assert_eq!(missing["success"], false);

    let threads = client.request("threads", None);
    assert_eq!(threads["body"]["threads"][0]["id"], 1);
    let trace = client.request("stackTrace", Some(json!({ "threadId": 1 })));
    assert_eq!(trace["body"]["stackFrames"][0]["name"], "main");

    client.finish();
}
