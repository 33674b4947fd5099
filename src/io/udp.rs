// src/io/udp.rs
//
// UDP mirror for satellites and dev tools, plus a fan-out output port.
//
// Each datagram is one compact NDJSON line `{"id": N, "d": {...}}\n`. Targets
// can filter on device id so a satellite emulator only sees its own traffic.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::net::UdpSocket;

use crate::io::{now_secs, IoError, OutgoingCommand, OutputPort};

/// A UDP destination (`[[udp.targets]]` in the config file).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpTarget {
    pub host: String,
    pub port: u16,
    /// Empty means every device
    #[serde(default)]
    pub device_ids: BTreeSet<u32>,
}

impl UdpTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            device_ids: BTreeSet::new(),
        }
    }

    pub fn with_devices(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.device_ids = ids.into_iter().collect();
        self
    }

    pub fn accepts(&self, device_id: u32) -> bool {
        self.device_ids.is_empty() || self.device_ids.contains(&device_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UdpStats {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub errors: u64,
    pub last_send_time: f64,
}

pub struct UdpMirrorPort {
    socket: Option<UdpSocket>,
    targets: Vec<UdpTarget>,
    stats: UdpStats,
}

impl UdpMirrorPort {
    /// Bind an ephemeral local socket. `broadcast` enables SO_BROADCAST.
    pub fn bind(broadcast: bool) -> Result<Self, IoError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        if broadcast {
            socket.set_broadcast(true)?;
        }
        Ok(Self {
            socket: Some(socket),
            targets: Vec::new(),
            stats: UdpStats::default(),
        })
    }

    pub fn add_target(&mut self, target: UdpTarget) {
        let devices = if target.device_ids.is_empty() {
            "all".to_string()
        } else {
            format!("{:?}", target.device_ids)
        };
        tlog!("[udp] Added target {}:{} (devices: {})", target.host, target.port, devices);
        self.targets.push(target);
    }

    /// Remove the first target matching host and port.
    pub fn remove_target(&mut self, host: &str, port: u16) -> bool {
        match self.targets.iter().position(|t| t.host == host && t.port == port) {
            Some(i) => {
                self.targets.remove(i);
                tlog!("[udp] Removed target {}:{}", host, port);
                true
            }
            None => false,
        }
    }

    pub fn targets(&self) -> &[UdpTarget] {
        &self.targets
    }

    /// Send a bare payload for a device, bypassing command construction.
    pub fn send_raw(&mut self, device_id: u32, payload: Value) -> bool {
        self.send(&OutgoingCommand::new(device_id, "raw", payload))
    }

    pub fn stats(&self) -> &UdpStats {
        &self.stats
    }

    pub fn close(&mut self) {
        self.socket = None;
    }

    /// Wire form of one datagram.
    pub fn encode(command: &OutgoingCommand) -> Vec<u8> {
        let mut line = json!({ "id": command.device_id, "d": command.payload }).to_string();
        line.push('\n');
        line.into_bytes()
    }
}

impl OutputPort for UdpMirrorPort {
    /// True if at least one target received the datagram.
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };
        if self.targets.is_empty() {
            return false;
        }

        let data = Self::encode(command);
        let mut sent = 0;
        for target in self.targets.iter().filter(|t| t.accepts(command.device_id)) {
            match socket.send_to(&data, (target.host.as_str(), target.port)) {
                Ok(n) => {
                    sent += 1;
                    self.stats.bytes_sent += n as u64;
                }
                Err(e) => {
                    self.stats.errors += 1;
                    tlog!("[udp] Failed to send to {}:{}: {}", target.host, target.port, e);
                }
            }
        }

        if sent > 0 {
            self.stats.messages_sent += 1;
            self.stats.last_send_time = now_secs();
        }
        sent > 0
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some() && !self.targets.is_empty()
    }

    fn name(&self) -> String {
        format!("UdpMirror({} targets)", self.targets.len())
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Sends every command to all inner ports.
#[derive(Default)]
pub struct MultiOutputPort {
    ports: Vec<Box<dyn OutputPort>>,
}

impl MultiOutputPort {
    pub fn new(ports: Vec<Box<dyn OutputPort>>) -> Self {
        Self { ports }
    }

    pub fn add_port(&mut self, port: Box<dyn OutputPort>) {
        tlog!("[udp] Added output port: {}", port.name());
        self.ports.push(port);
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl OutputPort for MultiOutputPort {
    /// True if any inner port succeeded. Every port is tried.
    fn send(&mut self, command: &OutgoingCommand) -> bool {
        self.ports
            .iter_mut()
            .fold(false, |ok, port| port.send(command) || ok)
    }

    fn is_connected(&self) -> bool {
        self.ports.iter().any(|p| p.is_connected())
    }

    fn name(&self) -> String {
        let names: Vec<String> = self.ports.iter().map(|p| p.name()).collect();
        format!("MultiOutput({})", names.join(", "))
    }
}

// ============================================================================
// Tests
// ============================================================================
