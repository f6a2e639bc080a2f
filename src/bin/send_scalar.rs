/// Minimal one-shot sender for the single-value firmware
///
/// Run with: cargo run --bin send_scalar -- /dev/ttyACM0 -1200
///           cargo run --bin send_scalar -- /dev/ttyACM0 i

use anyhow::{Context, Result};
use clap::Parser;

use serialmotor::command_encoder::{self as encoder, Run};
use serialmotor::serial_link::SerialLink;
use serialmotor::validator::{validate_pwm, PWM_MAX_VALUE, PWM_MIN_VALUE};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port, e.g. /dev/ttyACM0 or COM3
    port: String,
    /// -25000~25000, or 'i' (start) / 'o' (stop)
    #[arg(allow_negative_numbers = true)]
    value: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let command = match args.value.as_str() {
        "i" => encoder::run(Run::Start),
        "o" => encoder::run(Run::Stop),
        other => match validate_pwm(other) {
            Ok(v) => encoder::legacy_scalar(v),
            Err(e) => {
                log::error!("{} ({}~{} or i/o)", e, PWM_MIN_VALUE, PWM_MAX_VALUE);
                std::process::exit(1);
            }
        },
    };

    let mut link = SerialLink::open_default();
    link.send(&args.port, &command)
        .with_context(|| format!("sending {:?} to {}", command.as_str(), args.port))?;
    log::info!("Sent {:?} to {}", command.as_str(), args.port);
    Ok(())
}
