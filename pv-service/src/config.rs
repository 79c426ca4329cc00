//! TOML configuration.
//!
//! ```toml
//! [broker]
//! host = "localhost"
//! port = 5672
//!
//! [pv_service]
//! output_dir = "."
//! csv_enabled = true
//! logger_enabled = true
//! columns = ["meter_id", "time_s", "meter_power_value_w", "pv_power_value_kw", "sum_meter_pv_w"]
//!
//! [meter]
//! interval_ms = 1000
//! count = 1
//!
//! [metrics]
//! bind_addr = "127.0.0.1:9100"
//! ```
//!
//! Loading never fails: anything missing or invalid in `[broker]` falls back
//! to its default with a warning, and so does an unreadable file.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use pv_client::domain::Column;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "pv-sim.toml";
pub const CONFIG_ENV_VAR: &str = "PV_SIM_CONFIG";

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 5672;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvServiceConfig {
    pub output_dir: PathBuf,
    pub csv_enabled: bool,
    pub logger_enabled: bool,
    pub columns: Vec<Column>,
}

impl Default for PvServiceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            csv_enabled: true,
            logger_enabled: true,
            columns: Column::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterConfig {
    pub interval_ms: u64,
    pub count: usize,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub pv_service: PvServiceConfig,
    pub meter: MeterConfig,
    pub metrics: Option<MetricsConfig>,
}

/// A setting that was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFallback {
    pub key: &'static str,
    pub reason: String,
}

impl ConfigFallback {
    fn new(key: &'static str, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }
}

impl AppConfig {
    /// Explicit path, else `$PV_SIM_CONFIG`, else `pv-sim.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        match explicit {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        }
    }

    /// Loads the configuration and logs one warning per fallback.
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = Self::resolve_path(explicit);
        let (cfg, fallbacks) = Self::read(&path);
        for f in &fallbacks {
            tracing::warn!(
                file = %path.display(),
                key = f.key,
                reason = %f.reason,
                "configuration fallback, default settings used"
            );
        }
        tracing::info!(host = %cfg.broker.host, port = cfg.broker.port, "broker settings");
        cfg
    }

    pub fn read(path: &Path) -> (Self, Vec<ConfigFallback>) {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) => (
                Self::default(),
                vec![ConfigFallback::new("file", format!("cannot read configuration file: {e}"))],
            ),
        }
    }

    pub fn from_toml_str(contents: &str) -> (Self, Vec<ConfigFallback>) {
        let mut fallbacks = Vec::new();

        let table: toml::Table = match contents.parse() {
            Ok(t) => t,
            Err(e) => {
                fallbacks.push(ConfigFallback::new("file", format!("invalid TOML: {e}")));
                return (Self::default(), fallbacks);
            }
        };

        let broker = match table.get("broker") {
            Some(toml::Value::Table(section)) => broker_from_section(section, &mut fallbacks),
            Some(_) => {
                fallbacks.push(ConfigFallback::new("broker", "\"broker\" is not a section"));
                BrokerConfig::default()
            }
            None => {
                fallbacks.push(ConfigFallback::new("broker", "no \"broker\" section"));
                BrokerConfig::default()
            }
        };

        let pv_service = section_or_default(&table, "pv_service", &mut fallbacks);
        let meter = section_or_default(&table, "meter", &mut fallbacks);
        let metrics = match table.get("metrics") {
            None => None,
            Some(v) => match v.clone().try_into::<MetricsConfig>() {
                Ok(m) => Some(m),
                Err(e) => {
                    fallbacks.push(ConfigFallback::new("metrics", e.to_string()));
                    None
                }
            },
        };

        (
            Self {
                broker,
                pv_service,
                meter,
                metrics,
            },
            fallbacks,
        )
    }
}

fn broker_from_section(section: &toml::Table, fallbacks: &mut Vec<ConfigFallback>) -> BrokerConfig {
    let defaults = BrokerConfig::default();

    let host = match section.get("host") {
        Some(toml::Value::String(h)) if !h.trim().is_empty() => h.trim().to_string(),
        Some(other) => {
            fallbacks.push(ConfigFallback::new("broker.host", format!("invalid host {other}")));
            defaults.host
        }
        None => {
            fallbacks.push(ConfigFallback::new("broker.host", "missing"));
            defaults.host
        }
    };

    let port = match section.get("port") {
        Some(toml::Value::Integer(p)) => match u16::try_from(*p) {
            Ok(port) if port != 0 => port,
            _ => {
                fallbacks.push(ConfigFallback::new(
                    "broker.port",
                    format!("port {p} out of range"),
                ));
                defaults.port
            }
        },
        Some(other) => {
            fallbacks.push(ConfigFallback::new("broker.port", format!("invalid port {other}")));
            defaults.port
        }
        None => {
            fallbacks.push(ConfigFallback::new("broker.port", "missing"));
            defaults.port
        }
    };

    BrokerConfig { host, port }
}

fn section_or_default<T>(
    table: &toml::Table,
    key: &'static str,
    fallbacks: &mut Vec<ConfigFallback>,
) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match table.get(key) {
        None => T::default(),
        Some(v) => v.clone().try_into().unwrap_or_else(|e: toml::de::Error| {
            fallbacks.push(ConfigFallback::new(key, e.to_string()));
            T::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_is_read() {
        let (cfg, fallbacks) = AppConfig::from_toml_str(
            r#"
            [broker]
            host = "192.168.74.98"
            port = 12345

            [pv_service]
            output_dir = "/var/lib/pv"
            logger_enabled = false
            columns = ["time_s", "sum_meter_pv_w"]

            [meter]
            interval_ms = 250
            count = 3

            [metrics]
            bind_addr = "127.0.0.1:9100"
            "#,
        );

        assert!(fallbacks.is_empty(), "{fallbacks:?}");
        assert_eq!(
            cfg.broker,
            BrokerConfig {
                host: "192.168.74.98".to_string(),
                port: 12345
            }
        );
        assert_eq!(cfg.pv_service.output_dir, PathBuf::from("/var/lib/pv"));
        assert!(cfg.pv_service.csv_enabled);
        assert!(!cfg.pv_service.logger_enabled);
        assert_eq!(cfg.pv_service.columns, vec![Column::TimeS, Column::SumMeterPvW]);
        assert_eq!(cfg.meter, MeterConfig { interval_ms: 250, count: 3 });
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9100");
    }

    #[test]
    fn missing_file_falls_back_with_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, fallbacks) = AppConfig::read(&dir.path().join("absent.toml"));

        assert_eq!(cfg, AppConfig::default());
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].key, "file");
    }

    #[test]
    fn missing_broker_section_falls_back_with_one_warning() {
        let (cfg, fallbacks) = AppConfig::from_toml_str("[meter]\ncount = 2\n");

        assert_eq!(cfg.broker, BrokerConfig::default());
        assert_eq!(cfg.meter.count, 2);
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].key, "broker");
    }

    #[test]
    fn invalid_port_falls_back_but_keeps_host() {
        let (cfg, fallbacks) =
            AppConfig::from_toml_str("[broker]\nhost = \"broker.local\"\nport = 123456\n");

        assert_eq!(cfg.broker.host, "broker.local");
        assert_eq!(cfg.broker.port, DEFAULT_BROKER_PORT);
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].key, "broker.port");
    }

    #[test]
    fn unknown_column_falls_back_to_all_columns() {
        let (cfg, fallbacks) = AppConfig::from_toml_str(
            "[broker]\nhost = \"h\"\nport = 1\n[pv_service]\ncolumns = [\"kwh\"]\n",
        );

        assert_eq!(cfg.pv_service, PvServiceConfig::default());
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].key, "pv_service");
    }

    #[test]
    fn unparsable_file_uses_defaults() {
        let (cfg, fallbacks) = AppConfig::from_toml_str("[broker\nhost=");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(fallbacks[0].key, "file");
    }

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("custom.toml");
        assert_eq!(AppConfig::resolve_path(Some(p)), PathBuf::from("custom.toml"));
    }
}
