// src/io/mock.rs
//
// In-memory ports for tests and headless development.
//
// MockInputPort hands out injected frames, MockOutputPort records what was
// sent, LogOutputPort writes "would send" lines instead of touching hardware.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

use crate::io::{InputPort, OutgoingCommand, OutputPort, RawMessage};

// ============================================================================
// Input
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MockInputStats {
    pub injected: u64,
    pub polled: u64,
    pub pending: usize,
}

/// Input port fed programmatically. Polls return nothing until started.
#[derive(Debug, Default)]
pub struct MockInputPort {
    queue: VecDeque<RawMessage>,
    started: bool,
    injected: u64,
    polled: u64,
}

impl MockInputPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, message: RawMessage) {
        self.queue.push_back(message);
        self.injected += 1;
    }

    pub fn inject_many(&mut self, messages: impl IntoIterator<Item = RawMessage>) {
        for message in messages {
            self.inject(message);
        }
    }

    /// Inject a frame in gateway form (`{"id": N, "d": {...}}`).
    pub fn inject_gateway_json(&mut self, raw: &Value) {
        self.inject(RawMessage::from_gateway_json(raw));
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> MockInputStats {
        MockInputStats {
            injected: self.injected,
            polled: self.polled,
            pending: self.queue.len(),
        }
    }

    /// Drop queued frames and zero the counters. The started flag is kept.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.injected = 0;
        self.polled = 0;
    }
}

impl InputPort for MockInputPort {
    fn start(&mut self) -> bool {
        self.started = true;
        true
    }

    fn stop(&mut self) {
        self.started = false;
        self.queue.clear();
    }

    fn poll(&mut self) -> Option<RawMessage> {
        if !self.started {
            return None;
        }
        let message = self.queue.pop_front()?;
        self.polled += 1;
        Some(message)
    }

    fn is_connected(&self) -> bool {
        self.started
    }

    fn name(&self) -> String {
        "MockInput".to_string()
    }
}

// ============================================================================
// Output
// ============================================================================

/// Output port that records every accepted command.
#[derive(Debug)]
pub struct MockOutputPort {
    connected: bool,
    sent: Vec<OutgoingCommand>,
}

impl Default for MockOutputPort {
    fn default() -> Self {
        Self {
            connected: true,
            sent: Vec::new(),
        }
    }
}

impl MockOutputPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[OutgoingCommand] {
        &self.sent
    }

    pub fn last(&self) -> Option<&OutgoingCommand> {
        self.sent.last()
    }

    pub fn commands_of(&self, device_id: u32) -> Vec<&OutgoingCommand> {
        self.sent.iter().filter(|c| c.device_id == device_id).collect()
    }

    pub fn commands_of_type(&self, command_type: &str) -> Vec<&OutgoingCommand> {
        self.sent
            .iter()
            .filter(|c| c.command_type == command_type)
            .collect()
    }

    /// A disconnected mock rejects sends.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl OutputPort for MockOutputPort {
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        if !self.connected {
            return false;
        }
        self.sent.push(command.clone());
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn name(&self) -> String {
        "MockOutput".to_string()
    }
}

/// Development sink: logs each command and reports success.
#[derive(Debug)]
pub struct LogOutputPort {
    prefix: String,
    send_count: u64,
}

impl Default for LogOutputPort {
    fn default() -> Self {
        Self::new("[WOULD SEND]")
    }
}

impl LogOutputPort {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            send_count: 0,
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count
    }
}

impl OutputPort for LogOutputPort {
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        self.send_count += 1;
        tlog!(
            "{} device={} cmd={} payload={}",
            self.prefix,
            command.device_id,
            command.command_type,
            command.payload
        );
        true
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        "LogOutput".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_only_polls_when_started() {
        let mut port = MockInputPort::new();
        port.inject(RawMessage::new(1, 0.0, json!({})));
        assert_eq!(port.poll(), None);
        assert!(!port.is_connected());

        assert!(port.start());
        assert!(port.poll().is_some());
        assert_eq!(port.poll(), None);
        assert_eq!(
            port.stats(),
            MockInputStats { injected: 1, polled: 1, pending: 0 }
        );
    }

    #[test]
    fn test_input_fifo_and_stop_clears() {
        let mut port = MockInputPort::new();
        port.start();
        port.inject_gateway_json(&json!({"id": 2, "d": {"m": "190"}}));
        port.inject_many(vec![
            RawMessage::new(1, 1.0, json!({})),
            RawMessage::new(110, 2.0, json!({})),
        ]);
        assert_eq!(port.pending_count(), 3);
        assert_eq!(port.poll().map(|m| m.device_id), Some(2));

        port.stop();
        assert_eq!(port.pending_count(), 0);
        port.start();
        assert_eq!(port.poll(), None);
    }

    #[test]
    fn test_input_reset_zeroes_counters() {
        let mut port = MockInputPort::new();
        port.start();
        port.inject(RawMessage::new(1, 0.0, json!({})));
        port.poll();
        port.reset();
        assert_eq!(port.stats(), MockInputStats::default());
        assert!(port.is_connected());
    }

    #[test]
    fn test_output_records_and_filters() {
        let mut port = MockOutputPort::new();
        assert!(port.send(&OutgoingCommand::new(2, "beep", json!({}))));
        assert!(port.send(&OutgoingCommand::new(110, "E", json!({"t": "E"}))));

        assert_eq!(port.commands().len(), 2);
        assert_eq!(port.last().map(|c| c.device_id), Some(110));
        assert_eq!(port.commands_of(2).len(), 1);
        assert_eq!(port.commands_of_type("E").len(), 1);

        port.clear();
        assert!(port.last().is_none());
    }

    #[test]
    fn test_output_rejects_when_disconnected() {
        let mut port = MockOutputPort::new();
        port.set_connected(false);
        assert!(!port.send(&OutgoingCommand::new(2, "beep", json!({}))));
        assert!(port.commands().is_empty());
    }

    #[test]
    fn test_log_output_counts() {
        let mut port = LogOutputPort::default();
        assert!(port.send(&OutgoingCommand::new(110, "S", json!({"t": "S"}))));
        assert_eq!(port.send_count(), 1);
        assert!(port.is_connected());
    }
}
