// src/twin/factory.rs
//
// Builds a complete `VirtualTwin` for an execution mode:
//
//   production   SerialTransport shared by ingress and egress
//   development  FileReplayPort (or a mock input) -> LogOutputPort, mirrored
//                to UDP targets when any are configured
//   test         MockInputPort / MockOutputPort, reachable through `test_ports`
//
// Wiring order matters: the rules engine subscribes before egress so that
// rule cascades are settled by the time output handlers see a state.

use std::cell::RefCell;
use std::rc::Rc;

use super::egress::EgressController;
use super::ingress::IngressController;
use super::vfd_output::register_vfd_handlers;
use crate::config::{ExecutionMode, TwinConfig};
use crate::io::mock::{LogOutputPort, MockInputPort, MockOutputPort};
use crate::io::replay::FileReplayPort;
use crate::io::serial::SerialTransport;
use crate::io::udp::{MultiOutputPort, UdpMirrorPort};
use crate::io::{now_secs, InputPort, IoError, OutputPort};
use crate::rules::{ActiveFuelRule, FuelConsumptionRule, LpgSignal, ParkSpeedRule, RulesEngine, VfdDisplayRule};
use crate::settings::{JsonSettingsLoader, SettingsLoader};
use crate::state::{Action, ActionSource, StateSlice, Store};

/// Mock ports kept by a test-mode twin.
#[derive(Clone)]
pub struct TestPorts {
    pub input: Rc<RefCell<MockInputPort>>,
    pub output: Rc<RefCell<MockOutputPort>>,
}

pub struct VirtualTwin {
    pub store: Store,
    pub ingress: IngressController,
    pub egress: EgressController,
    rules: Rc<RefCell<RulesEngine>>,
    lpg_signal: LpgSignal,
    mode: ExecutionMode,
    test_ports: Option<TestPorts>,
    running: bool,
}

impl VirtualTwin {
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn rules(&self) -> &Rc<RefCell<RulesEngine>> {
        &self.rules
    }

    /// Raised by whatever listens to the LPG controller.
    pub fn lpg_signal(&self) -> LpgSignal {
        self.lpg_signal.clone()
    }

    pub fn test_ports(&self) -> Option<&TestPorts> {
        self.test_ports.as_ref()
    }

    pub fn start(&mut self) -> bool {
        if self.running {
            return true;
        }
        self.running = self.ingress.start();
        if self.running {
            tlog!("[twin] Started in {:?} mode", self.mode);
        }
        self.running
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.ingress.stop();
        self.running = false;
        tlog!("[twin] Stopped");
    }

    /// One tick: drain pending input and send one paced bus-A command if due.
    /// Returns the number of input messages processed.
    pub fn update(&mut self) -> usize {
        let processed = self.ingress.update(&mut self.store);
        self.egress.pump_queue(now_secs());
        processed
    }

    /// Dispatch a user action (sent to the bus by egress).
    pub fn dispatch(&mut self, action: Action) {
        self.store.dispatch(action);
    }
}

type Ports = (Box<dyn InputPort>, Box<dyn OutputPort>, Option<TestPorts>);

fn production_ports(config: &TwinConfig) -> Ports {
    tlog!(
        "[twin] Production: serial {} @ {} ({})",
        config.serial.port,
        config.serial.baud_rate,
        config.serial.line_format()
    );
    let serial = Rc::new(RefCell::new(SerialTransport::new(config.serial.clone())));
    (Box::new(serial.clone()), Box::new(serial), None)
}

fn development_ports(config: &TwinConfig) -> Result<Ports, IoError> {
    let input: Box<dyn InputPort> = match &config.replay.file {
        Some(path) => {
            if !path.exists() {
                return Err(IoError::configuration(format!(
                    "Replay file not found: {}",
                    path.display()
                )));
            }
            tlog!("[twin] Development: replaying {}", path.display());
            // Loaded by the port on start
            Box::new(FileReplayPort::new(
                path.clone(),
                config.replay.speed,
                config.replay.loop_playback,
                config.replay.realtime,
            ))
        }
        None => {
            tlog!("[twin] Development: no replay file, using mock input");
            Box::new(MockInputPort::new())
        }
    };

    let output: Box<dyn OutputPort> = if config.udp.targets.is_empty() {
        Box::new(LogOutputPort::default())
    } else {
        let mut udp = UdpMirrorPort::bind(false)?;
        for target in &config.udp.targets {
            udp.add_target(target.clone());
        }
        let mut multi = MultiOutputPort::default();
        multi.add_port(Box::new(LogOutputPort::default()));
        multi.add_port(Box::new(udp));
        Box::new(multi)
    };

    Ok((input, output, None))
}

fn mock_ports() -> Ports {
    let ports = TestPorts {
        input: Rc::new(RefCell::new(MockInputPort::new())),
        output: Rc::new(RefCell::new(MockOutputPort::new())),
    };
    (
        Box::new(ports.input.clone()),
        Box::new(ports.output.clone()),
        Some(ports),
    )
}

/// Build a fully wired twin. Ports are not started; call `start`.
pub fn create_virtual_twin(config: &TwinConfig) -> Result<VirtualTwin, IoError> {
    config
        .validate()
        .map_err(|e| IoError::configuration(e.to_string()))?;

    let (input, output, test_ports) = match config.mode {
        ExecutionMode::Production => production_ports(config),
        ExecutionMode::Development => development_ports(config)?,
        ExecutionMode::Test => mock_ports(),
    };

    let mut store = Store::default();
    store.set_verbose(config.pipeline.verbose);

    let mut engine = RulesEngine::new(config.pipeline.max_cascades);
    engine.set_debug(config.pipeline.verbose);
    let active_fuel = ActiveFuelRule::new();
    let lpg_signal = active_fuel.signal();
    engine.register(ParkSpeedRule);
    engine.register(active_fuel);
    engine.register(FuelConsumptionRule);
    engine.register(VfdDisplayRule::new());
    let rules = Rc::new(RefCell::new(engine));
    store.subscribe(StateSlice::All, rules.clone());

    let ingress = IngressController::new(input).with_max_messages(config.pipeline.max_messages_per_update);

    let egress = EgressController::with_min_interval(output, config.pipeline.command_min_interval_ms);
    register_vfd_handlers(&egress);
    if config.pipeline.log_commands {
        egress.set_command_log_callback(|cmd, direction| {
            tlog!("[twin] {} {} -> {}: {}", direction, cmd.command_type, cmd.device_id, cmd.payload);
        });
    }
    egress.attach(&mut store);

    if let Some(path) = &config.settings_file {
        match JsonSettingsLoader::new(path).load() {
            Ok(settings) => {
                store.dispatch(Action::batch(settings.startup_actions(), ActionSource::Internal));
                tlog!("[twin] Restored settings from {}", path.display());
            }
            Err(e) => tlog!("[twin] Settings not restored: {}", e),
        }
    }

    tlog!(
        "[twin] Created ({:?}): input={}, output={}, rules={:?}",
        config.mode,
        ingress.input_name(),
        egress.output_name(),
        rules.borrow().rule_names()
    );

    Ok(VirtualTwin {
        store,
        ingress,
        egress,
        rules,
        lpg_signal,
        mode: config.mode,
        test_ports,
        running: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{RawMessage, DEVICE_AVC, DEVICE_CAN, DEVICE_SYSTEM, DEVICE_VFD};
    use crate::state::{ActionKind, FuelType, GearPosition};
    use serde_json::json;
    use std::io::Write;

    fn test_config() -> TwinConfig {
        TwinConfig {
            mode: ExecutionMode::Test,
            ..TwinConfig::default()
        }
    }

    fn can(id: &str, data: &[u8]) -> RawMessage {
        RawMessage::new(DEVICE_CAN, 0.0, json!({"i": id, "d": data}))
    }

    #[test]
    fn test_test_mode_wiring() {
        let twin = create_virtual_twin(&test_config()).unwrap();
        assert_eq!(twin.mode(), ExecutionMode::Test);
        assert!(twin.test_ports().is_some());
        let names = twin.rules().borrow().rule_names();
        assert_eq!(names.len(), 4);
        // High priority first, Low last
        assert_eq!(names[0], "ParkSpeedRule");
        assert_eq!(names[3], "VfdDisplayRule");
        assert_eq!(twin.egress.handler_names().len(), 3);
    }

    #[test]
    fn test_gateway_frames_reach_state() {
        let mut twin = create_virtual_twin(&test_config()).unwrap();
        let ports = twin.test_ports().unwrap().clone();
        assert!(twin.start());

        ports.input.borrow_mut().inject_many(vec![
            RawMessage::new(DEVICE_SYSTEM, 0.0, json!({"msg": "GATEWAY_READY", "ver": "2.0"})),
            // 0x038: rpm 40*32, engine running
            can("0x038", &[0, 40, 0, 0, 0, 0, 0]),
        ]);
        assert_eq!(twin.update(), 2);

        let state = twin.store.state();
        assert!(state.connection.connected);
        assert_eq!(state.vehicle.rpm, 1280);
        // Engine start selected petrol through the rules
        assert_eq!(state.vehicle.active_fuel, FuelType::Petrol);
        // Vehicle data is never echoed to bus-A, but the VFD is fed
        let output = ports.output.borrow();
        assert!(output.commands_of(DEVICE_AVC).is_empty());
        assert!(!output.commands_of(DEVICE_VFD).is_empty());
    }

    #[test]
    fn test_park_rule_runs_inside_twin() {
        let mut twin = create_virtual_twin(&test_config()).unwrap();
        twin.dispatch(Action::gateway(ActionKind::SetGear(GearPosition::Park)));
        twin.dispatch(Action::gateway(ActionKind::SetSpeed(40.0)));
        assert_eq!(twin.store.state().vehicle.speed_kmh, 0.0);
    }

    #[test]
    fn test_ui_action_sent_to_bus() {
        let mut twin = create_virtual_twin(&test_config()).unwrap();
        let ports = twin.test_ports().unwrap().clone();
        twin.dispatch(Action::ui(ActionKind::SetFanSpeed(3)));

        let output = ports.output.borrow();
        let sent = output.commands_of(DEVICE_AVC);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command_type, "set_fan_speed");
        assert_eq!(twin.egress.stats().avc_commands, 1);
    }

    #[test]
    fn test_settings_restored_without_bus_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"audio": {"volume": 40}, "climate": {"fan_speed": 2}}"#).unwrap();

        let config = TwinConfig {
            settings_file: Some(path),
            ..test_config()
        };
        let twin = create_virtual_twin(&config).unwrap();
        assert_eq!(twin.store.state().audio.volume, 40);
        assert_eq!(twin.store.state().climate.fan_speed, 2);
        let output = twin.test_ports().unwrap().output.borrow();
        assert!(output.commands_of(DEVICE_AVC).is_empty());
    }

    #[test]
    fn test_development_replay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 0, "ts": 1000, "d": {{"msg": "GATEWAY_READY", "ver": "1.0"}}}}"#).unwrap();
        writeln!(file, r#"{{"id": 1, "ts": 1010, "d": {{"i": "0x5A4", "d": [0, 27]}}}}"#).unwrap();

        let mut config = TwinConfig::default();
        config.replay.file = Some(file.path().to_path_buf());
        config.replay.realtime = false;
        config.pipeline.log_commands = false;

        let mut twin = create_virtual_twin(&config).unwrap();
        assert!(twin.test_ports().is_none());
        assert!(twin.start());
        assert_eq!(twin.update(), 2);
        assert!(twin.store.state().connection.connected);
        assert_eq!(twin.store.state().vehicle.fuel_level, 27);
        twin.stop();
        assert!(!twin.is_running());
    }

    #[test]
    fn test_missing_replay_file_is_rejected() {
        let mut config = TwinConfig::default();
        config.replay.file = Some("/nonexistent/drive.ndjson".into());
        assert!(create_virtual_twin(&config).is_err());
    }
}
