/// Serial Motor Controller Library
///
/// Shared modules for the command-line front ends

pub mod command_encoder;
pub mod config_loader;
pub mod controller;
pub mod log_lifecycle;
pub mod logging;
pub mod serial_link;
pub mod validator;
