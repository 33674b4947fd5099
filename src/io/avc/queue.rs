// src/io/avc/queue.rs
//
// Rate-limited outgoing command queue. Never sleeps: a caller that is rate
// limited gets `None` and tries again on a later tick.

use std::collections::VecDeque;

use super::commands::AvcCommand;

/// Default minimum gap between two sends.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 50;

#[derive(Debug)]
pub struct CommandQueue {
    /// Sorted by descending priority; equal priorities keep arrival order
    entries: VecDeque<(i32, AvcCommand)>,
    min_interval: f64,
    last_send_time: Option<f64>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL_MS)
    }
}

impl CommandQueue {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            min_interval: min_interval_ms as f64 / 1000.0,
            last_send_time: None,
        }
    }

    /// Add a command. Higher priority is sent first.
    pub fn enqueue(&mut self, command: AvcCommand, priority: i32) {
        let at = self
            .entries
            .iter()
            .position(|(p, _)| *p < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, (priority, command));
    }

    /// Next command if one is pending and the rate limit allows it.
    /// `now` is in seconds.
    pub fn get_next(&mut self, now: f64) -> Option<AvcCommand> {
        if self.entries.is_empty() {
            return None;
        }
        if let Some(last) = self.last_send_time {
            if now - last < self.min_interval {
                return None;
            }
        }
        let (_, command) = self.entries.pop_front()?;
        self.last_send_time = Some(now);
        Some(command)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
