use anyhow::{ensure, Context, Result};
use config::{Config, File as ConfigFile};
use peerbook_addrbook::{AddressBookConfig, Endpoint, DEFAULT_SAVE_INTERVAL, MAX_SAVE_INTERVAL};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_ADDRBOOK_FILE: &str = "addrbook.json";

/// Node settings resolved from file, environment, and command line.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub addrbook_file: String,
    pub save_interval: Duration,
    pub listen_addresses: Vec<String>,
    pub seed_peers: Vec<String>,
    pub log_level: String,
    pub log_format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            addrbook_file: DEFAULT_ADDRBOOK_FILE.to_string(),
            save_interval: DEFAULT_SAVE_INTERVAL,
            listen_addresses: Vec::new(),
            seed_peers: Vec::new(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load settings from an optional TOML file layered under `PEERBOOK_*`
    /// environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("PEERBOOK"));
        let config = builder.build().context("build configuration")?;

        Self::from_config(&config)
    }

    fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();

        let save_interval = match get_string_value(config, &["save_interval_secs"]) {
            Some(value) => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("invalid save_interval_secs {value:?}"))?;
                ensure!(
                    (1..=MAX_SAVE_INTERVAL.as_secs()).contains(&secs),
                    "save_interval_secs must be between 1 and {}, got {}",
                    MAX_SAVE_INTERVAL.as_secs(),
                    secs
                );
                Duration::from_secs(secs)
            }
            None => defaults.save_interval,
        };

        Ok(Self {
            data_dir: get_string_value(config, &["data_dir"])
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            addrbook_file: get_string_value(config, &["addrbook_file"])
                .unwrap_or(defaults.addrbook_file),
            save_interval,
            listen_addresses: get_list_value(config, "listen_addresses"),
            seed_peers: get_list_value(config, "seed_peers"),
            log_level: get_string_value(config, &["log_level"]).unwrap_or(defaults.log_level),
            log_format: get_string_value(config, &["log_format"]).unwrap_or(defaults.log_format),
        })
    }

    /// Absolute location of the address book snapshot. A relative
    /// `addrbook_file` is resolved against `data_dir`.
    pub fn addrbook_path(&self) -> PathBuf {
        let file = PathBuf::from(&self.addrbook_file);
        if file.is_absolute() {
            file
        } else {
            self.data_dir.join(file)
        }
    }

    pub fn addrbook_config(&self) -> AddressBookConfig {
        AddressBookConfig::new(self.addrbook_path()).with_save_interval(self.save_interval)
    }

    pub fn listen_endpoints(&self) -> Vec<Endpoint> {
        parse_endpoints("listen address", &self.listen_addresses)
    }

    pub fn seed_endpoints(&self) -> Vec<Endpoint> {
        parse_endpoints("seed peer", &self.seed_peers)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("peerbook"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

// Accepts either a TOML array or a comma-separated string (environment).
fn get_list_value(config: &Config, key: &str) -> Vec<String> {
    if let Ok(values) = config.get_array(key) {
        return values
            .into_iter()
            .filter_map(|value| value.into_string().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
    }

    split_list(&get_string_value(config, &[key]).unwrap_or_default())
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_endpoints(kind: &str, values: &[String]) -> Vec<Endpoint> {
    values
        .iter()
        .filter_map(|value| match value.parse::<Endpoint>() {
            Ok(endpoint) => Some(endpoint),
            Err(err) => {
                warn!("Ignoring invalid {} {:?}: {}", kind, value, err);
                None
            }
        })
        .collect()
}
