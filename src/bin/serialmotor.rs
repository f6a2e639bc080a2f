/// Serial Motor Controller front end
///
/// One-shot commands, or `shell` to drive a single live session from stdin.
///
/// Run with: cargo run --bin serialmotor -- --port /dev/ttyACM0 pwm 100 -200 300 0

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use serialmotor::command_encoder::Mode;
use serialmotor::config_loader;
use serialmotor::controller::{Controller, Outcome};
use serialmotor::logging;
use serialmotor::validator::{PWM_COUNT, ROBOMAS_COUNT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send commands to the motor controller over serial", long_about = None)]
struct Args {
    /// Serial port (overrides DEFAULT_PORT and SERIAL_MOTOR_PORT)
    #[arg(long, short)]
    port: Option<String>,
    /// Config file (defaults to serial_motor.yaml next to Cargo.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Do not write the log file for this run
    #[arg(long = "no-log-file", default_value_t = false)]
    no_log_file: bool,
    /// Print each outcome as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    #[arg(long)]
    debug: bool,
    #[command(subcommand)]
    command: Cmd,
}

/// One line typed into `shell`
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List available serial ports
    Ports,
    /// Select the serial port for the following commands
    Port { name: String },
    /// Switch controller mode (md / mr)
    Mode {
        #[arg(value_enum)]
        mode: Mode,
    },
    /// Set the CAN ID (1-4)
    CanId { id: String },
    /// Set the number of Robomas motors in use (1-8)
    Count { count: String },
    /// Send all four PWM values
    Pwm {
        #[arg(num_args = PWM_COUNT, required = true, allow_negative_numbers = true)]
        values: Vec<String>,
    },
    /// Send up to eight Robomas values; missing ones are sent as 0
    Robomas {
        #[arg(num_args = 0..=ROBOMAS_COUNT, allow_negative_numbers = true)]
        values: Vec<String>,
    },
    /// Send one PWM value to every channel
    AllPwm {
        #[arg(allow_negative_numbers = true)]
        value: String,
    },
    /// Send one Robomas value to every motor
    AllRobomas {
        #[arg(allow_negative_numbers = true, default_value = "")]
        value: String,
    },
    /// Newline-terminated value for the single-value firmware
    Legacy {
        #[arg(allow_negative_numbers = true)]
        value: String,
    },
    /// Start (i)
    Start,
    /// Stop (o)
    Stop,
    /// Log file management
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
    /// Show port, mode and log file state
    Status,
    /// Read commands line by line from stdin
    Shell,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum LogAction {
    Size,
    Enable,
    Disable,
    Clear,
    Delete,
    Open,
}

fn pad_robomas(values: Vec<String>) -> [String; ROBOMAS_COUNT] {
    let mut fields: [String; ROBOMAS_COUNT] = Default::default();
    for (slot, value) in fields.iter_mut().zip(values) {
        *slot = value;
    }
    fields
}

fn run_command(controller: &mut Controller, command: Cmd) -> Outcome {
    match command {
        Cmd::Ports => {
            let outcome = controller.refresh_ports();
            for port in controller.ports() {
                println!("{}", port);
            }
            outcome
        }
        Cmd::Port { name } => {
            controller.select_port(&name);
            Outcome { success: true, message: format!("Selected port {}", controller.port()) }
        }
        Cmd::Mode { mode } => controller.switch_mode(mode),
        Cmd::CanId { id } => controller.set_can_id(&id),
        Cmd::Count { count } => controller.set_count(&count),
        Cmd::Pwm { values } => match <[String; PWM_COUNT]>::try_from(values) {
            Ok(fields) => controller.send_all_pwm(&fields),
            Err(values) => Outcome {
                success: false,
                message: format!("Error: expected {} PWM values, got {}", PWM_COUNT, values.len()),
            },
        },
        Cmd::Robomas { values } => controller.send_all_robomas(&pad_robomas(values)),
        Cmd::AllPwm { value } => controller.broadcast_pwm(&value),
        Cmd::AllRobomas { value } => controller.broadcast_robomas(&value),
        Cmd::Legacy { value } => controller.send_legacy(&value),
        Cmd::Start => controller.start(),
        Cmd::Stop => controller.stop(),
        Cmd::Log { action } => match action {
            LogAction::Size => Outcome { success: true, message: format!("Size: {}", controller.log_size_label()) },
            LogAction::Enable => controller.set_log_enabled(true),
            LogAction::Disable => controller.set_log_enabled(false),
            LogAction::Clear => controller.clear_log(),
            LogAction::Delete => controller.delete_log(),
            LogAction::Open => controller.open_log(),
        },
        Cmd::Status => {
            let log = controller.log_state();
            let message = format!(
                "port={} mode={} log={} enabled={} attached={} size={}",
                if controller.port().is_empty() { "-" } else { controller.port() },
                controller.mode(),
                log.path().display(),
                log.enabled(),
                log.is_attached(),
                controller.log_size_label(),
            );
            Outcome { success: true, message }
        }
        Cmd::Shell => Outcome { success: false, message: "Error: shell cannot be nested".to_string() },
    }
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
    } else if outcome.success {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
    Ok(())
}

fn run_shell(controller: &mut Controller, json: bool) -> Result<bool> {
    let stdin = io::stdin();
    let mut all_ok = true;
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.first().copied() {
            None => {}
            Some(w) if w.starts_with('#') => {}
            Some("quit") | Some("exit") => break,
            Some(_) => match ShellLine::try_parse_from(words.iter().copied()) {
                Ok(parsed) => {
                    let outcome = run_command(controller, parsed.command);
                    all_ok &= outcome.success;
                    print_outcome(&outcome, json)?;
                }
                Err(e) => {
                    all_ok = false;
                    eprintln!("{}", e.render());
                }
            },
        }
        print!("> ");
        io::stdout().flush()?;
    }
    println!();
    Ok(all_ok)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = config_loader::load_settings(args.config.as_deref())?;
    if args.debug {
        settings.log_level = log::LevelFilter::Debug;
    }
    if args.no_log_file {
        settings.log_enabled = false;
    }
    if let Some(port) = &args.port {
        settings.default_port = Some(port.clone());
    }
    logging::init_stream_logger(settings.log_level)?;

    let mut controller = Controller::from_settings(&settings);
    let ok = match args.command {
        Cmd::Shell => run_shell(&mut controller, args.json)?,
        command => {
            let outcome = run_command(&mut controller, command);
            print_outcome(&outcome, args.json)?;
            outcome.success
        }
    };

    // Release the log handle before exiting with a status code
    drop(controller);
    if !ok {
        return Err(anyhow!("command failed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_values_parse_as_positionals() {
        let args = Args::try_parse_from(["serialmotor", "--port", "COM3", "pwm", "100", "-200", "300", "0"]).unwrap();
        match args.command {
            Cmd::Pwm { values } => assert_eq!(values, vec!["100", "-200", "300", "0"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(args.port.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_pwm_needs_four_values() {
        assert!(Args::try_parse_from(["serialmotor", "pwm", "1", "2", "3"]).is_err());
    }

    #[test]
    fn test_robomas_padding() {
        let padded = pad_robomas(vec!["5".into(), "-6".into()]);
        assert_eq!(padded[0], "5");
        assert_eq!(padded[1], "-6");
        assert!(padded[2..].iter().all(String::is_empty));
    }

    #[test]
    fn test_shell_line_parsing() {
        let line = ShellLine::try_parse_from(["mode", "robomas"]).unwrap();
        assert!(matches!(line.command, Cmd::Mode { mode: Mode::Robomas }));
        let line = ShellLine::try_parse_from(["log", "clear"]).unwrap();
        assert!(matches!(line.command, Cmd::Log { action: LogAction::Clear }));
    }

    #[test]
    fn test_port_and_status_commands() {
        let line = ShellLine::try_parse_from(["port", "/dev/ttyUSB0"]).unwrap();
        assert!(matches!(line.command, Cmd::Port { ref name } if name == "/dev/ttyUSB0"));
        let line = ShellLine::try_parse_from(["status"]).unwrap();
        assert!(matches!(line.command, Cmd::Status));
    }
}
