// src/io/serial/transport.rs
//
// Gateway serial transport: one port used for both directions.
//
// Two worker threads share nothing but channels and atomics:
// - reader: timed reads -> LineFramer -> RawMessage -> unbounded channel
// - writer: bounded command channel (recv_timeout) -> NDJSON line -> port
//
// `poll` is a non-blocking `try_recv`. `stop` clears the running flag and waits
// for each thread up to `join_timeout_ms`; a thread that does not exit in time
// is detached and logged, never waited on forever.

use serde::Serialize;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::framer::{encode_line, LineFramer};
use super::utils::SerialSettings;
use crate::io::{InputPort, OutgoingCommand, OutputPort, RawMessage};

/// Pending outgoing commands before `send` starts failing.
const SEND_QUEUE_DEPTH: usize = 100;

/// How long the writer blocks on an empty queue before rechecking `running`.
const WRITER_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Stats
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    rx_messages: AtomicU64,
    tx_messages: AtomicU64,
    rx_errors: AtomicU64,
    tx_errors: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SerialStats {
    pub rx_messages: u64,
    pub tx_messages: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

impl Counters {
    fn snapshot(&self) -> SerialStats {
        SerialStats {
            rx_messages: self.rx_messages.load(Ordering::Relaxed),
            tx_messages: self.tx_messages.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct SerialTransport {
    settings: SerialSettings,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    counters: Arc<Counters>,
    rx: Option<mpsc::UnboundedReceiver<RawMessage>>,
    tx: Option<std_mpsc::SyncSender<OutgoingCommand>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            rx: None,
            tx: None,
            reader: None,
            writer: None,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    pub fn stats(&self) -> SerialStats {
        self.counters.snapshot()
    }

    /// Spawn the reader and writer over the given port halves.
    fn spawn_workers<R, W>(&mut self, read_half: R, write_half: W)
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = std_mpsc::sync_channel(SEND_QUEUE_DEPTH);

        self.running.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let connected = self.connected.clone();
        let counters = self.counters.clone();
        self.reader = Some(std::thread::spawn(move || {
            reader_loop(read_half, running, counters, msg_tx);
            connected.store(false, Ordering::SeqCst);
        }));

        let running = self.running.clone();
        let counters = self.counters.clone();
        self.writer = Some(std::thread::spawn(move || {
            writer_loop(write_half, running, counters, cmd_rx);
        }));

        self.rx = Some(msg_rx);
        self.tx = Some(cmd_tx);
    }

    fn join_with_timeout(&self, name: &str, handle: JoinHandle<()>) {
        let deadline = Instant::now() + Duration::from_millis(self.settings.join_timeout_ms);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tlog!("[serial] {} thread did not exit within {} ms, detaching", name, self.settings.join_timeout_ms);
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            tlog!("[serial] {} thread panicked", name);
        }
    }
}

impl InputPort for SerialTransport {
    fn start(&mut self) -> bool {
        if self.running.load(Ordering::SeqCst) {
            return true;
        }

        let port = match self.settings.open() {
            Ok(p) => p,
            Err(e) => {
                tlog!("[serial] Failed to open {}: {}", self.settings.port, e);
                return false;
            }
        };
        let write_half = match port.try_clone() {
            Ok(p) => p,
            Err(e) => {
                tlog!("[serial] Failed to clone {} for writing: {}", self.settings.port, e);
                return false;
            }
        };

        self.spawn_workers(port, write_half);
        tlog!(
            "[serial] Opened {} at {} baud ({})",
            self.settings.port,
            self.settings.baud_rate,
            self.settings.line_format()
        );
        true
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the sender wakes the writer immediately
        self.tx = None;

        if let Some(handle) = self.reader.take() {
            self.join_with_timeout("reader", handle);
        }
        if let Some(handle) = self.writer.take() {
            self.join_with_timeout("writer", handle);
        }

        if self.rx.take().is_some() {
            tlog!("[serial] Closed {}", self.settings.port);
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    fn poll(&mut self) -> Option<RawMessage> {
        self.rx.as_mut()?.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        format!("Serial({})", self.settings.port)
    }
}

impl OutputPort for SerialTransport {
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        match tx.try_send(command.clone()) {
            Ok(()) => true,
            Err(e) => {
                self.counters.tx_errors.fetch_add(1, Ordering::Relaxed);
                tlog!("[serial] Send queue rejected {}: {}", command.command_type, e);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        format!("Serial({})", self.settings.port)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Worker Loops
// ============================================================================

/// Read until stopped, disconnected, or the receiver goes away.
fn reader_loop<R: Read>(
    mut port: R,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    out: mpsc::UnboundedSender<RawMessage>,
) {
    let mut framer = LineFramer::default();
    let mut buf = [0u8; 1024];

    while running.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {
                tlog!("[serial] Port reported EOF");
                break;
            }
            Ok(n) => {
                for frame in framer.feed(&buf[..n]) {
                    if frame.oversized {
                        counters.rx_errors.fetch_add(1, Ordering::Relaxed);
                        tlog!("[serial] Dropped oversized line ({} bytes)", frame.bytes.len());
                        continue;
                    }
                    let line = String::from_utf8_lossy(&frame.bytes);
                    match RawMessage::from_line(&line) {
                        Ok(msg) => {
                            if out.send(msg).is_err() {
                                return;
                            }
                            counters.rx_messages.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            counters.rx_errors.fetch_add(1, Ordering::Relaxed);
                            tlog!("[serial] Malformed line: {}", e);
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Timeout is expected for serial reads
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                counters.rx_errors.fetch_add(1, Ordering::Relaxed);
                tlog!("[serial] Read error: {}", e);
                break;
            }
        }
    }
}

/// Drain the command queue until stopped or every sender is gone.
fn writer_loop<W: Write>(
    mut port: W,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    commands: std_mpsc::Receiver<OutgoingCommand>,
) {
    loop {
        match commands.recv_timeout(WRITER_POLL) {
            Ok(cmd) => {
                let line = cmd.to_gateway_json().to_string();
                let result = port
                    .write_all(&encode_line(&line))
                    .and_then(|_| port.flush());
                match result {
                    Ok(()) => {
                        counters.tx_messages.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.tx_errors.fetch_add(1, Ordering::Relaxed);
                        tlog!("[serial] Write error: {}", e);
                    }
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
