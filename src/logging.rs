// src/logging.rs
//
// Data-plane log. Every line is `HH:MM:SS.mmm [component] message` on stderr
// and, once a log directory is configured, in a per-run twin log as well.
//
// Component tags in use:
//   [ingress] [egress] [store] [rules] [twin]   pipeline
//   [serial] [replay] [udp]                     ports
//   [config] [settings] [main]                  startup

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name of the link that always points at the current run's log.
pub const LATEST_LOG: &str = "twin-latest.log";

/// Sink shared by every `tlog!` call. `None` means stderr only.
pub static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// File name for a run started now, e.g. `twin-20261016-143501.log`.
pub fn run_log_name() -> String {
    chrono::Local::now().format("twin-%Y%m%d-%H%M%S.log").to_string()
}

/// Start mirroring log lines into a new run log under `log_dir`.
/// Returns the path of the file.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir).map_err(|e| format!("Cannot create {}: {}", log_dir.display(), e))?;

    let name = run_log_name();
    let path = log_dir.join(&name);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Cannot open {}: {}", path.display(), e))?;

    #[cfg(unix)]
    {
        let link = log_dir.join(LATEST_LOG);
        let _ = std::fs::remove_file(&link);
        if let Err(e) = std::os::unix::fs::symlink(&name, &link) {
            eprintln!("{} [logging] No {} link: {}", stamp(), LATEST_LOG, e);
        }
    }

    match LOG_FILE.lock() {
        Ok(mut sink) => *sink = Some(file),
        Err(_) => return Err("Log sink lock poisoned".to_string()),
    }

    // Not tlog!: the sink lock must not be re-entered here
    eprintln!("{} [logging] Twin log: {}", stamp(), path.display());
    Ok(path)
}

/// Back to stderr only. Safe to call when file logging never started.
pub fn stop_file_logging() {
    if let Ok(mut sink) = LOG_FILE.lock() {
        if sink.take().is_some() {
            eprintln!("{} [logging] Twin log closed", stamp());
        }
    }
}

/// `tlog!("[component] ...", args)`: timestamped line to stderr and the run log.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let line = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        eprintln!("{}", line);
        if let Ok(mut sink) = $crate::logging::LOG_FILE.lock() {
            if let Some(file) = sink.as_mut() {
                let _ = writeln!(file, "{}", line);
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_name_shape() {
        let name = run_log_name();
        assert!(name.starts_with("twin-"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "twin-20261016-143501.log".len());
    }

    #[test]
    fn test_run_log_receives_component_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_file_logging(dir.path()).unwrap();
        tlog!("[ingress] processed {} frames", 42);
        stop_file_logging();
        tlog!("[egress] after close");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[ingress] processed 42 frames"));
        assert!(!contents.contains("[egress] after close"));

        #[cfg(unix)]
        assert!(dir.path().join(LATEST_LOG).exists());

        // Closing twice is harmless
        stop_file_logging();
    }
}
