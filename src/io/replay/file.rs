// src/io/replay/file.rs
//
// Replays a recorded gateway session (NDJSON, one frame per line) through the
// InputPort interface.
//
// The whole file is loaded up front. Each entry keeps its time relative to the
// first entry's `ts`; `poll` hands out the next entry once the virtual clock has
// reached it. Entries are delivered one per poll, in order, never skipped.
//
// Every time-dependent operation has an `*_at(Instant)` form so playback can be
// driven deterministically.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::Value;

use super::control::{PlaybackControl, PlaybackState};
use crate::io::{InputPort, IoError, RawMessage};

/// One recorded frame.
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// Logged `ts` (ms), 0 when absent
    pub timestamp_ms: f64,
    /// Seconds since the first entry
    pub relative_time: f64,
    pub message: RawMessage,
}

type PositionCallback = Box<dyn FnMut(usize, usize)>;

pub struct FileReplayPort {
    path: PathBuf,
    entries: Vec<LogEntry>,
    control: PlaybackControl,
    position: usize,
    loop_playback: bool,
    realtime: bool,
    messages_played: u64,
    skipped_lines: u64,
    on_position_change: Option<PositionCallback>,
}

impl FileReplayPort {
    pub fn new(path: impl Into<PathBuf>, speed: f64, loop_playback: bool, realtime: bool) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            control: PlaybackControl::new(speed, Instant::now()),
            position: 0,
            loop_playback,
            realtime,
            messages_played: 0,
            skipped_lines: 0,
            on_position_change: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load the log file. Blank lines and lines that are not JSON objects are
    /// skipped. Returns the number of entries loaded.
    pub fn load(&mut self) -> Result<usize, IoError> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| IoError::connection(self.path.display().to_string(), e.to_string()))?;

        self.entries.clear();
        self.skipped_lines = 0;
        let mut first_ts: Option<f64> = None;

        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(line) {
                Ok(v @ Value::Object(_)) => v,
                Ok(_) => {
                    self.skipped_lines += 1;
                    tlog!("[replay] Line {}: not a JSON object", line_num + 1);
                    continue;
                }
                Err(e) => {
                    self.skipped_lines += 1;
                    tlog!("[replay] Line {}: invalid JSON: {}", line_num + 1, e);
                    continue;
                }
            };

            let ts = value.get("ts").and_then(Value::as_f64).unwrap_or(0.0);
            let first = *first_ts.get_or_insert(ts);
            self.entries.push(LogEntry {
                timestamp_ms: ts,
                relative_time: (ts - first) / 1000.0,
                message: RawMessage::from_gateway_json(&value),
            });
        }

        tlog!(
            "[replay] Loaded {} entries from {} ({} skipped)",
            self.entries.len(),
            self.path.display(),
            self.skipped_lines
        );
        Ok(self.entries.len())
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Start from the beginning, loading the file if needed.
    pub fn start_at(&mut self, now: Instant) -> bool {
        if self.entries.is_empty() {
            if let Err(e) = self.load() {
                tlog!("[replay] {}", e);
                return false;
            }
            if self.entries.is_empty() {
                tlog!("[replay] {} has no entries", self.path.display());
                return false;
            }
        }
        self.position = 0;
        self.messages_played = 0;
        self.control.set_state(PlaybackState::Playing);
        self.control.anchor(0.0, now);
        tlog!(
            "[replay] Started playback: {} entries, {:.1}s duration, {}x",
            self.entries.len(),
            self.duration(),
            self.control.speed()
        );
        true
    }

    pub fn pause_at(&mut self, now: Instant) {
        self.control.pause(now);
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    /// Resume from pause, or restart from the current position when stopped.
    pub fn resume_at(&mut self, now: Instant) {
        if self.entries.is_empty() {
            return;
        }
        match self.control.state() {
            PlaybackState::Playing => {}
            PlaybackState::Paused => {
                self.control.unpause(now);
            }
            PlaybackState::Stopped => {
                if self.position >= self.entries.len() {
                    self.position = 0;
                }
                let rel = self.entries[self.position].relative_time;
                self.control.anchor(rel, now);
                self.control.set_state(PlaybackState::Playing);
            }
        }
    }

    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    pub fn toggle_at(&mut self, now: Instant) {
        if self.control.is_playing() {
            self.pause_at(now);
        } else {
            self.resume_at(now);
        }
    }

    pub fn toggle(&mut self) {
        self.toggle_at(Instant::now());
    }

    /// Jump to an entry index (clamped). Timing continues from that entry.
    pub fn seek_at(&mut self, index: usize, now: Instant) {
        if self.entries.is_empty() {
            return;
        }
        self.position = index.min(self.entries.len() - 1);
        let rel = self.entries[self.position].relative_time;
        self.control.anchor(rel, now);
        self.notify_position();
    }

    pub fn seek(&mut self, index: usize) {
        self.seek_at(index, Instant::now());
    }

    /// Jump to the first entry at or after `seconds`, else the last entry.
    pub fn seek_time_at(&mut self, seconds: f64, now: Instant) {
        if self.entries.is_empty() {
            return;
        }
        let index = self
            .entries
            .iter()
            .position(|e| e.relative_time >= seconds)
            .unwrap_or(self.entries.len() - 1);
        self.seek_at(index, now);
    }

    pub fn seek_time(&mut self, seconds: f64) {
        self.seek_time_at(seconds, Instant::now());
    }

    /// Return the entry at the current position and advance by `count`,
    /// ignoring timing.
    pub fn step_forward(&mut self, count: usize) -> Option<RawMessage> {
        let message = self.entries.get(self.position)?.message.clone();
        self.position = (self.position + count).min(self.entries.len());
        self.notify_position();
        Some(message)
    }

    /// Move back by `count` and return the entry there.
    pub fn step_backward(&mut self, count: usize) -> Option<RawMessage> {
        self.position = self.position.saturating_sub(count);
        self.notify_position();
        self.entries.get(self.position).map(|e| e.message.clone())
    }

    pub fn set_speed_at(&mut self, speed: f64, now: Instant) -> Result<(), String> {
        self.control.set_speed(speed, now)
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), String> {
        self.set_speed_at(speed, Instant::now())
    }

    pub fn set_loop(&mut self, loop_playback: bool) {
        self.loop_playback = loop_playback;
    }

    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = realtime;
    }

    /// Called with (position, total) whenever the position moves.
    pub fn set_position_callback<F>(&mut self, callback: F)
    where
        F: FnMut(usize, usize) + 'static,
    {
        self.on_position_change = Some(Box::new(callback));
    }

    fn notify_position(&mut self) {
        let total = self.entries.len();
        if let Some(cb) = self.on_position_change.as_mut() {
            cb(self.position, total);
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Next due entry as of `now`, or `None` when not yet due / not playing.
    pub fn poll_at(&mut self, now: Instant) -> Option<RawMessage> {
        if !self.control.is_playing() {
            return None;
        }

        if self.position >= self.entries.len() {
            if self.loop_playback && !self.entries.is_empty() {
                self.position = 0;
                self.control.anchor(0.0, now);
            } else {
                self.control.stop();
                tlog!("[replay] Playback finished ({} messages)", self.messages_played);
                return None;
            }
        }

        let entry = &self.entries[self.position];
        if self.realtime && self.control.is_pacing_enabled() && entry.relative_time > self.control.elapsed(now) {
            return None;
        }

        let message = entry.message.clone();
        self.position += 1;
        self.messages_played += 1;
        self.notify_position();
        Some(message)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.control.state()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn messages_played(&self) -> u64 {
        self.messages_played
    }

    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    pub fn speed(&self) -> f64 {
        self.control.speed()
    }

    /// 0.0..=1.0
    pub fn progress(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.position as f64 / self.entries.len() as f64
    }

    /// Recording length in seconds.
    pub fn duration(&self) -> f64 {
        self.entries.last().map(|e| e.relative_time).unwrap_or(0.0)
    }

    /// Recording time of the next entry, or the duration at the end.
    pub fn current_time(&self) -> f64 {
        self.entries
            .get(self.position)
            .map(|e| e.relative_time)
            .unwrap_or_else(|| self.duration())
    }

    pub fn status(&self) -> String {
        format!(
            "[{}] Position: {}/{}",
            self.control.state().as_str(),
            self.position,
            self.entries.len()
        )
    }
}

impl InputPort for FileReplayPort {
    fn start(&mut self) -> bool {
        self.start_at(Instant::now())
    }

    fn stop(&mut self) {
        self.control.stop();
        self.position = 0;
    }

    fn poll(&mut self) -> Option<RawMessage> {
        self.poll_at(Instant::now())
    }

    fn is_connected(&self) -> bool {
        !self.entries.is_empty()
    }

    fn name(&self) -> String {
        let file = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("FileReplay({})", file)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;
    use std::time::Duration;

    /// Ten CAN frames 100 ms apart starting at ts=5000.
    fn ten_entry_log() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "{{\"id\":1,\"ts\":{},\"seq\":{},\"d\":{{\"i\":\"0x03B\"}}}}", 5000 + i * 100, i).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_load_skips_blank_and_invalid_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"id\":2,\"ts\":1000,\"d\":{{}}}}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "[1,2]").unwrap();
        writeln!(file, "{{\"id\":1,\"ts\":2500,\"d\":{{}}}}").unwrap();
        file.flush().unwrap();

        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        assert_eq!(port.load().unwrap(), 2);
        assert_eq!(port.skipped_lines(), 2);
        assert!((port.duration() - 1.5).abs() < 1e-9);
        assert!((port.entries()[1].message.timestamp - 2.5).abs() < 1e-9);
        assert!(port.is_connected());
    }

    #[test]
    fn test_missing_file_fails_start() {
        let mut port = FileReplayPort::new("/nonexistent/cyberdeck.ndjson", 1.0, false, true);
        assert!(!port.start());
        assert!(!port.is_connected());
        assert!(port.poll().is_none());
    }

    #[test]
    fn test_realtime_pacing() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        let t0 = Instant::now();
        assert!(port.start_at(t0));

        assert_eq!(port.poll_at(t0).unwrap().sequence, Some(0));
        assert!(port.poll_at(t0 + ms(50)).is_none());
        assert_eq!(port.poll_at(t0 + ms(100)).unwrap().sequence, Some(1));
        // Late poll still delivers one entry at a time, in order
        assert_eq!(port.poll_at(t0 + ms(450)).unwrap().sequence, Some(2));
        assert_eq!(port.poll_at(t0 + ms(450)).unwrap().sequence, Some(3));
        assert_eq!(port.position(), 4);
        assert_eq!(port.status(), "[PLAYING] Position: 4/10");
    }

    #[test]
    fn test_pause_excluded_from_timing_at_double_speed() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 2.0, false, true);
        let t0 = Instant::now();
        assert!(port.start_at(t0));

        // Unpaused at 2x: entry i is due at i * 50 ms
        for i in 0..5u64 {
            assert!(i == 0 || port.poll_at(t0 + ms(i * 50 - 1)).is_none());
            assert_eq!(port.poll_at(t0 + ms(i * 50)).unwrap().sequence, Some(i));
        }

        port.pause_at(t0 + ms(220));
        assert_eq!(port.state(), PlaybackState::Paused);
        assert!(port.poll_at(t0 + ms(900)).is_none());
        port.resume_at(t0 + ms(1220));

        // One second paused: the rest keep their 50 ms spacing, shifted by 1 s
        for i in 5..10u64 {
            assert!(port.poll_at(t0 + ms(1000 + i * 50 - 1)).is_none());
            assert_eq!(port.poll_at(t0 + ms(1000 + i * 50)).unwrap().sequence, Some(i));
        }

        assert!(port.poll_at(t0 + ms(5000)).is_none());
        assert_eq!(port.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_seek_recomputes_timing() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        let t0 = Instant::now();
        port.start_at(t0);

        port.seek_at(6, t0 + ms(10));
        assert_eq!(port.poll_at(t0 + ms(10)).unwrap().sequence, Some(6));
        assert!(port.poll_at(t0 + ms(109)).is_none());
        assert_eq!(port.poll_at(t0 + ms(110)).unwrap().sequence, Some(7));

        port.seek_at(99, t0 + ms(200));
        assert_eq!(port.position(), 9);

        port.seek_time_at(0.25, t0 + ms(300));
        assert_eq!(port.position(), 3);
        port.seek_time_at(42.0, t0 + ms(300));
        assert_eq!(port.position(), 9);
    }

    #[test]
    fn test_seek_while_paused_stays_paused() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        let t0 = Instant::now();
        port.start_at(t0);
        port.pause_at(t0 + ms(10));
        port.seek_at(4, t0 + ms(500));
        assert!(port.poll_at(t0 + ms(600)).is_none());

        port.resume_at(t0 + ms(2000));
        assert_eq!(port.poll_at(t0 + ms(2000)).unwrap().sequence, Some(4));
        assert!(port.poll_at(t0 + ms(2099)).is_none());
        assert_eq!(port.poll_at(t0 + ms(2100)).unwrap().sequence, Some(5));
    }

    #[test]
    fn test_instant_mode_and_loop() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, true, false);
        let t0 = Instant::now();
        port.start_at(t0);

        for i in 0..10u64 {
            assert_eq!(port.poll_at(t0).unwrap().sequence, Some(i));
        }
        // Loops back to the first entry
        assert_eq!(port.poll_at(t0).unwrap().sequence, Some(0));
        assert_eq!(port.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_speed_zero_disables_pacing() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 0.0, false, true);
        let t0 = Instant::now();
        port.start_at(t0);
        for i in 0..10u64 {
            assert_eq!(port.poll_at(t0).unwrap().sequence, Some(i));
        }
        assert!(port.poll_at(t0).is_none());
    }

    #[test]
    fn test_resume_from_stopped_continues_at_position() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        let t0 = Instant::now();
        port.start_at(t0);
        port.poll_at(t0);
        port.poll_at(t0 + ms(100));
        port.control.stop();

        port.resume_at(t0 + ms(5000));
        assert_eq!(port.state(), PlaybackState::Playing);
        assert_eq!(port.poll_at(t0 + ms(5000)).unwrap().sequence, Some(2));
    }

    #[test]
    fn test_toggle() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        let t0 = Instant::now();
        port.start_at(t0);
        port.toggle_at(t0 + ms(10));
        assert_eq!(port.state(), PlaybackState::Paused);
        port.toggle_at(t0 + ms(20));
        assert_eq!(port.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stepping_and_callback() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, true);
        port.load().unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        port.set_position_callback(move |pos, total| sink.borrow_mut().push((pos, total)));

        assert_eq!(port.step_forward(3).unwrap().sequence, Some(0));
        assert_eq!(port.position(), 3);
        assert_eq!(port.step_backward(1).unwrap().sequence, Some(2));
        assert_eq!(port.step_forward(50).unwrap().sequence, Some(2));
        assert_eq!(port.position(), 10);
        assert!(port.step_forward(1).is_none());
        assert!((port.progress() - 1.0).abs() < 1e-9);
        assert!((port.current_time() - 0.9).abs() < 1e-9);

        assert_eq!(*seen.borrow(), vec![(3, 10), (2, 10), (10, 10)]);
    }

    #[test]
    fn test_stop_resets_position() {
        let file = ten_entry_log();
        let mut port = FileReplayPort::new(file.path(), 1.0, false, false);
        port.start();
        port.poll();
        port.stop();
        assert_eq!(port.position(), 0);
        assert_eq!(port.state(), PlaybackState::Stopped);
        assert!(port.poll().is_none());
        assert!(port.name().starts_with("FileReplay("));
    }
}
