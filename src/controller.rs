//! Operator-facing controller.
//!
//! Takes the front end's raw intents (field text, selected port, button
//! presses), runs them through validation, encoding and the serial link, and
//! reports every result to the log. Each intent returns an [`Outcome`] for
//! display; no error escapes as anything else.

use crate::command_encoder::{self as encoder, Mode, Run, WireCommand};
use crate::config_loader::Settings;
use crate::log_lifecycle::{LogError, LogFileState, LogLifecycle};
use crate::serial_link::{self, LinkError, SerialLink, SerialPortTransport, Transport};
use crate::validator::{self, PWM_COUNT, ROBOMAS_COUNT};
use log::Level;
use serde::Serialize;

/// Result of one operator intent, ready to show in a status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

#[derive(Debug)]
pub struct Controller<T: Transport = SerialPortTransport> {
    port: String,
    ports: Vec<String>,
    mode: Mode,
    link: SerialLink<T>,
    log: LogLifecycle,
}

impl Controller<SerialPortTransport> {
    pub fn from_settings(settings: &Settings) -> Self {
        let log = LogLifecycle::new(&settings.log_file, settings.log_enabled)
            .with_settle_delay(settings.delete_settle);
        let mut controller = Self::new(SerialLink::open_default(), log);
        if let Some(port) = &settings.default_port {
            controller.select_port(port);
        }
        controller
    }
}

impl<T: Transport> Controller<T> {
    pub fn new(link: SerialLink<T>, log: LogLifecycle) -> Self {
        Self {
            port: String::new(),
            ports: Vec::new(),
            mode: Mode::default(),
            link,
            log,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn select_port(&mut self, port: &str) {
        self.port = port.trim().to_string();
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn link(&self) -> &SerialLink<T> {
        &self.link
    }

    pub fn log_state(&self) -> &LogFileState {
        self.log.state()
    }

    pub fn log_size_label(&self) -> String {
        self.log.size_label()
    }

    fn report(&mut self, message: String) -> Outcome {
        self.log.append(&message, Level::Info);
        Outcome::ok(message)
    }

    fn fail(&mut self, message: String) -> Outcome {
        self.log.append(&message, Level::Error);
        Outcome::failed(format!("Error: {}", message))
    }

    /// Stream sink only; used where appending would recreate the log file.
    fn notice(&self, level: Level, success: bool, message: String) -> Outcome {
        log::log!(level, "{}", message);
        Outcome { success, message }
    }

    fn transmit(&mut self, command: WireCommand, status: String) -> Outcome {
        match self.link.send(&self.port, &command) {
            Ok(()) => self.report(status),
            Err(LinkError::NoPortSelected) => {
                self.notice(Level::Warn, false, "Warning: No serial port selected".to_string())
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn refresh_ports(&mut self) -> Outcome {
        self.ports = serial_link::available_ports();
        self.report(format!("Port list refreshed ({} found)", self.ports.len()))
    }

    /// Mode is switched locally even without a port; the board is only told
    /// when one is selected.
    pub fn switch_mode(&mut self, mode: Mode) -> Outcome {
        self.mode = mode;
        if self.port.is_empty() {
            return self.report(format!("Switched to {} mode (no serial port selected)", mode));
        }
        self.transmit(encoder::mode_switch(mode), format!("Switched to {} mode", mode))
    }

    pub fn set_can_id(&mut self, text: &str) -> Outcome {
        match validator::validate_can_id(text) {
            Ok(id) => self.transmit(encoder::set_can_id(id), format!("Set CAN ID: {}", id)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn set_count(&mut self, text: &str) -> Outcome {
        match validator::validate_count(text) {
            Ok(n) => self.transmit(encoder::set_count(n), format!("Set Robomas count: {}", n)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn send_all_pwm<S: AsRef<str>>(&mut self, texts: &[S; PWM_COUNT]) -> Outcome {
        match validator::validate_pwm_set(texts) {
            Ok(set) => self.transmit(
                encoder::set_all_pwm(&set),
                format!("Sent PWM values: {:?}", set.values()),
            ),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn send_all_robomas<S: AsRef<str>>(&mut self, texts: &[S; ROBOMAS_COUNT]) -> Outcome {
        match validator::validate_robomas_set(texts) {
            Ok(set) => self.transmit(
                encoder::set_all_robomas(&set),
                format!("Sent Robomas values: {:?}", set.values()),
            ),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn broadcast_pwm(&mut self, text: &str) -> Outcome {
        match validator::validate_pwm(text) {
            Ok(v) => self.transmit(encoder::broadcast(v), format!("Sent PWM value: {}", v)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn broadcast_robomas(&mut self, text: &str) -> Outcome {
        match validator::validate_robomas(text) {
            Ok(v) => self.transmit(encoder::broadcast(v), format!("Sent Robomas value: {}", v)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    /// Newline-terminated scalar understood by the single-value firmware
    pub fn send_legacy(&mut self, text: &str) -> Outcome {
        match validator::validate_pwm(text) {
            Ok(v) => self.transmit(encoder::legacy_scalar(v), format!("Sent value: {}", v)),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn start(&mut self) -> Outcome {
        self.transmit(encoder::run(Run::Start), "Sent command: i".to_string())
    }

    pub fn stop(&mut self) -> Outcome {
        self.transmit(encoder::run(Run::Stop), "Sent command: o".to_string())
    }

    pub fn set_log_enabled(&mut self, enabled: bool) -> Outcome {
        self.log.set_enabled(enabled);
        if enabled {
            self.report("Log file enabled".to_string())
        } else {
            self.report("Log file disabled".to_string())
        }
    }

    pub fn clear_log(&mut self) -> Outcome {
        match self.log.clear() {
            Ok(()) => self.report("Log file cleared".to_string()),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn delete_log(&mut self) -> Outcome {
        match self.log.delete() {
            Ok(()) => self.notice(Level::Info, true, "Log file deleted".to_string()),
            Err(e @ LogError::NotFound(_)) => self.notice(Level::Warn, false, e.to_string()),
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn open_log(&mut self) -> Outcome {
        match self.log.open_in_viewer() {
            Ok(()) => self.report("Log file opened".to_string()),
            Err(e @ LogError::NotFound(_)) => self.notice(Level::Warn, false, e.to_string()),
            Err(e) => self.fail(e.to_string()),
        }
    }
}
