// src/main.rs
//
// Runner: `cyberdeck [config.toml]`. Without a config file the twin starts in
// development mode with defaults.

use std::path::PathBuf;
use std::time::Duration;

use cyberdeck_lib::{create_virtual_twin, logging, tlog, TwinConfig};

const TICK: Duration = Duration::from_millis(10);
const STATS_INTERVAL_TICKS: u64 = 1000;

fn main() {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match TwinConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tlog!("[main] {}", e);
                std::process::exit(2);
            }
        },
        None => TwinConfig::default(),
    };

    if let Some(dir) = &config.log_dir {
        if let Err(e) = logging::init_file_logging(dir) {
            tlog!("[main] File logging disabled: {}", e);
        }
    }

    let mut twin = match create_virtual_twin(&config) {
        Ok(twin) => twin,
        Err(e) => {
            tlog!("[main] Failed to create twin: {}", e);
            std::process::exit(1);
        }
    };

    if !twin.start() {
        tlog!("[main] Input port failed to start");
        std::process::exit(1);
    }

    let mut ticks: u64 = 0;
    loop {
        twin.update();
        ticks += 1;
        if ticks % STATS_INTERVAL_TICKS == 0 {
            let ingress = twin.ingress.stats();
            let egress = twin.egress.stats();
            tlog!(
                "[main] in={} (can={} avc={} err={}) out={} (fail={})",
                ingress.messages_received,
                ingress.can_messages,
                ingress.avc_messages,
                ingress.errors,
                egress.commands_sent,
                egress.send_failures
            );
        }
        if !twin.ingress.is_connected() {
            tlog!("[main] Input disconnected, stopping");
            break;
        }
        std::thread::sleep(TICK);
    }

    twin.stop();
    logging::stop_file_logging();
}
