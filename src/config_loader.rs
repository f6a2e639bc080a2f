use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use gethostname::gethostname;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::log_lifecycle::{DEFAULT_SETTLE_DELAY, LOG_FILE_NAME};
use crate::logging::parse_level;

pub const CONFIG_FILE_NAME: &str = "serial_motor.yaml";
pub const ENV_CONFIG: &str = "SERIAL_MOTOR_CONFIG";
pub const ENV_PORT: &str = "SERIAL_MOTOR_PORT";
pub const ENV_LOG_FILE: &str = "SERIAL_MOTOR_LOG_FILE";

/// One block of settings; keys match serial_motor.yaml exactly
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct HostSettings {
    #[serde(rename = "DEFAULT_PORT", default)]
    pub default_port: Option<String>,
    #[serde(rename = "LOG_FILE", default)]
    pub log_file: Option<PathBuf>,
    #[serde(rename = "LOG_ENABLED", default)]
    pub log_enabled: Option<bool>,
    #[serde(rename = "LOG_LEVEL", default)]
    pub log_level: Option<String>,
    #[serde(rename = "DELETE_SETTLE_MS", default)]
    pub delete_settle_ms: Option<u64>,
}

impl HostSettings {
    /// Fill unset keys from `fallback`
    fn or(self, fallback: &HostSettings) -> HostSettings {
        HostSettings {
            default_port: self.default_port.or_else(|| fallback.default_port.clone()),
            log_file: self.log_file.or_else(|| fallback.log_file.clone()),
            log_enabled: self.log_enabled.or(fallback.log_enabled),
            log_level: self.log_level.or_else(|| fallback.log_level.clone()),
            delete_settle_ms: self.delete_settle_ms.or(fallback.delete_settle_ms),
        }
    }
}

/// Top-level layout: shared defaults plus optional per-hostname overrides.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub defaults: HostSettings,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSettings>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_port: Option<String>,
    pub log_file: PathBuf,
    pub log_enabled: bool,
    pub log_level: LevelFilter,
    pub delete_settle: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        ConfigFile::default().resolve("")
    }
}

impl ConfigFile {
    pub fn resolve(&self, hostname: &str) -> Settings {
        let merged = match self.hosts.get(hostname) {
            Some(host) => host.clone().or(&self.defaults),
            None => self.defaults.clone(),
        };
        Settings {
            default_port: merged.default_port.filter(|p| !p.trim().is_empty()),
            log_file: merged.log_file.unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME)),
            log_enabled: merged.log_enabled.unwrap_or(true),
            log_level: merged.log_level.as_deref().map(parse_level).unwrap_or(LevelFilter::Info),
            delete_settle: merged
                .delete_settle_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SETTLE_DELAY),
        }
    }
}

impl Settings {
    /// Environment wins over YAML for the port and the log path
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.trim().is_empty()) {
            self.default_port = Some(port);
        }
        if let Some(path) = lookup(ENV_LOG_FILE).filter(|p| !p.trim().is_empty()) {
            self.log_file = PathBuf::from(path);
        }
        self
    }
}

pub fn parse_config(yaml: &str) -> Result<ConfigFile> {
    if yaml.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    let cfg: ConfigFile = serde_yaml::from_str(yaml)?;
    Ok(cfg)
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let file = File::open(path)
        .map_err(|e| anyhow!("Missing required {} at {:?}: {}", CONFIG_FILE_NAME, path, e))?;
    let cfg: ConfigFile = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(cfg)
}

/// Load settings for this host.
///
/// An explicitly named config file (argument or `SERIAL_MOTOR_CONFIG`) must
/// exist. The default `serial_motor.yaml` next to Cargo.toml is optional;
/// built-in defaults apply without it.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let _ = dotenv();

    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(ENV_CONFIG).map(PathBuf::from));
    let cfg = match named {
        Some(path) => load_config_file(&path)?,
        None => {
            let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(CONFIG_FILE_NAME);
            if path.exists() {
                load_config_file(&path)?
            } else {
                ConfigFile::default()
            }
        }
    };

    let hostname = gethostname().to_string_lossy().to_string();
    let settings = cfg.resolve(&hostname).apply_overrides(|key| env::var(key).ok());
    log::debug!(target: "config_loader", "Settings for {}: {:?}", hostname, settings);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
DEFAULT_PORT: /dev/ttyACM0
LOG_FILE: serial_gui.log
LOG_LEVEL: info
hosts:
  bench-pc:
    DEFAULT_PORT: COM3
    LOG_ENABLED: false
    DELETE_SETTLE_MS: 250
"#;

    #[test]
    fn test_defaults_without_file() {
        let s = Settings::default();
        assert_eq!(s.default_port, None);
        assert_eq!(s.log_file, PathBuf::from("serial_gui.log"));
        assert!(s.log_enabled);
        assert_eq!(s.log_level, LevelFilter::Info);
        assert_eq!(s.delete_settle, Duration::from_millis(100));
        assert_eq!(parse_config("").unwrap().resolve("anything"), s);
    }

    #[test]
    fn test_host_block_overrides_defaults() {
        let cfg = parse_config(SAMPLE).unwrap();

        let bench = cfg.resolve("bench-pc");
        assert_eq!(bench.default_port.as_deref(), Some("COM3"));
        assert!(!bench.log_enabled);
        assert_eq!(bench.delete_settle, Duration::from_millis(250));
        assert_eq!(bench.log_file, PathBuf::from("serial_gui.log"));

        let other = cfg.resolve("laptop");
        assert_eq!(other.default_port.as_deref(), Some("/dev/ttyACM0"));
        assert!(other.log_enabled);
    }

    #[test]
    fn test_env_overrides() {
        let s = parse_config(SAMPLE).unwrap().resolve("laptop").apply_overrides(|key| match key {
            ENV_PORT => Some("/dev/ttyUSB9".to_string()),
            ENV_LOG_FILE => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(s.default_port.as_deref(), Some("/dev/ttyUSB9"));
        assert_eq!(s.log_file, PathBuf::from("serial_gui.log"));
    }

    #[test]
    fn test_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"LOG_FILE: /tmp/motor.log\nLOG_LEVEL: debug\n").unwrap();
        let s = load_settings(Some(file.path())).unwrap();
        assert_eq!(s.log_file, PathBuf::from("/tmp/motor.log"));
        assert_eq!(s.log_level, LevelFilter::Debug);

        assert!(load_settings(Some(Path::new("/nonexistent/serial_motor.yaml"))).is_err());
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        assert!(parse_config("LOG_ENABLED: [not, a, bool]").is_err());
    }
}
