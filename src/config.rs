//! YAML configuration loading.
//!
//! ```yaml
//! collector:
//!   host: 127.0.0.1
//!   port: 5000
//!   delay_after_init_and_peer_ups: 5
//! router_data:
//!   master_directory_path: ./master
//!   processed_directory_path: ./processed
//!   ignore_timestamp_interval_abnormality: false
//!   timestamp_interval_limit: 20
//!   max_queue_size: 10000
//! logging:
//!   level: info
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_COLLECTOR_PORT: u16 = 5000;
const DEFAULT_PEER_UP_DELAY_SECS: u64 = 5;
const DEFAULT_TIMESTAMP_INTERVAL_LIMIT_MINUTES: i64 = 20;
const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;

/// Complete configuration. The `collector` section is the only mandatory
/// part; everything else has working defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    collector: Option<CollectorConfig>,
    #[serde(default)]
    pub router_data: RouterDataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let collector = self.collector.as_ref().ok_or(ConfigError::MissingCollector)?;
        if collector.host.trim().is_empty() {
            return Err(ConfigError::MissingCollectorHost);
        }
        Ok(())
    }

    /// The collector section. Valid after [`Config::load`].
    pub fn collector(&self) -> &CollectorConfig {
        self.collector
            .as_ref()
            .expect("configuration was validated at load time")
    }
}

/// Where and how to feed the BMP stream.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait between the Peer-Up burst and the RIB flood so the
    /// collector can register peers first.
    #[serde(default = "default_peer_up_delay")]
    pub delay_after_init_and_peer_ups: u64,
}

impl CollectorConfig {
    pub fn peer_up_delay(&self) -> Duration {
        Duration::from_secs(self.delay_after_init_and_peer_ups)
    }
}

/// Archive staging directories and replay limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterDataConfig {
    pub master_directory_path: PathBuf,
    pub processed_directory_path: PathBuf,
    /// When true, a continuity anomaly only logs a warning instead of
    /// withholding the newer file.
    pub ignore_timestamp_interval_abnormality: bool,
    /// Maximum permitted gap, in minutes, between consecutive UPDATES files.
    pub timestamp_interval_limit: i64,
    /// Capacity of the encoder-to-writer message queue.
    pub max_queue_size: usize,
    /// Translate BGP4MP state changes away from Established into BMP
    /// Peer-Down notifications.
    pub emit_peer_down: bool,
}

impl Default for RouterDataConfig {
    fn default() -> Self {
        RouterDataConfig {
            master_directory_path: PathBuf::from("./master"),
            processed_directory_path: PathBuf::from("./processed"),
            ignore_timestamp_interval_abnormality: false,
            timestamp_interval_limit: DEFAULT_TIMESTAMP_INTERVAL_LIMIT_MINUTES,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            emit_peer_down: true,
        }
    }
}

impl RouterDataConfig {
    pub fn master_dir(&self, router: &str) -> PathBuf {
        self.master_directory_path.join(router)
    }

    pub fn processed_dir(&self, router: &str) -> PathBuf {
        self.processed_directory_path.join(router)
    }
}

/// Logging setup. `level` accepts any tracing EnvFilter directive string,
/// so per-subsystem levels like `info,mrt2bmp::sync=debug` work.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the rotating `openbmp-mrt2bmp_<router>.log` file; logs
    /// go to stderr only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            directory: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_COLLECTOR_PORT
}

fn default_peer_up_delay() -> u64 {
    DEFAULT_PEER_UP_DELAY_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config() {
        let config = parse("collector:\n  host: 127.0.0.1\n").unwrap();
        assert_eq!(config.collector().host, "127.0.0.1");
        assert_eq!(config.collector().port, 5000);
        assert_eq!(config.collector().delay_after_init_and_peer_ups, 5);
        assert_eq!(config.router_data.timestamp_interval_limit, 20);
        assert_eq!(config.router_data.max_queue_size, 10_000);
        assert!(!config.router_data.ignore_timestamp_interval_abnormality);
        assert!(config.router_data.emit_peer_down);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
collector:
  host: collector.example.net
  port: 5001
  delay_after_init_and_peer_ups: 1
router_data:
  master_directory_path: /var/lib/mrt2bmp/master
  processed_directory_path: /var/lib/mrt2bmp/processed
  ignore_timestamp_interval_abnormality: true
  timestamp_interval_limit: 30
  max_queue_size: 500
  emit_peer_down: false
logging:
  level: "info,mrt2bmp::sync=debug"
  directory: /var/log/mrt2bmp
"#;
        let config = parse(yaml).unwrap();
        assert_eq!(config.collector().port, 5001);
        assert_eq!(config.router_data.timestamp_interval_limit, 30);
        assert!(config.router_data.ignore_timestamp_interval_abnormality);
        assert!(!config.router_data.emit_peer_down);
        assert_eq!(
            config.router_data.master_dir("rrc00"),
            PathBuf::from("/var/lib/mrt2bmp/master/rrc00")
        );
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/var/log/mrt2bmp"))
        );
    }

    #[test]
    fn test_missing_collector_section() {
        assert!(matches!(
            parse("router_data:\n  max_queue_size: 5\n"),
            Err(ConfigError::MissingCollector)
        ));
    }

    #[test]
    fn test_missing_collector_host() {
        assert!(matches!(
            parse("collector:\n  host: \"\"\n"),
            Err(ConfigError::MissingCollectorHost)
        ));
    }
}
