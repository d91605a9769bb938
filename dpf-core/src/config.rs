// MIT License
// Copyright 2023--present dpf-core developers

//! Service and operator configuration.
//!
//! [`ServiceConfig`] is passed explicitly to the service constructor; nothing
//! in this crate reads the environment unless [`ServiceConfig::from_env`] is
//! called. It can also be loaded from TOML:
//!
//! ```toml
//! host = "10.0.0.5"
//! port = 50054
//! connect_timeout_ms = 5000
//! load_default_plugins = true
//! configuration = "release"
//! log_level = "debug"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Value;

/// Build flavour of the server's native plugins (selects the `D` suffixed
/// debug libraries on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    #[default]
    Release,
    Debug,
}

impl std::str::FromStr for BuildConfiguration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(BuildConfiguration::Release),
            "debug" => Ok(BuildConfiguration::Debug),
            other => Err(Error::Config(format!("unknown build configuration \"{other}\""))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Readiness deadline when connecting.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Load the mapdl and mesh operator plugins right after connecting.
    #[serde(default = "default_true")]
    pub load_default_plugins: bool,

    #[serde(default)]
    pub configuration: BuildConfiguration,

    /// Filter directive used by [`crate::logging::init_logging`].
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    50054
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            load_default_plugins: true,
            configuration: BuildConfiguration::default(),
            log_level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults overridden by `DPF_IP`, `DPF_PORT` and `DPF_CONFIGURATION`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup("DPF_IP") {
            config.host = host;
        }
        if let Some(port) = lookup("DPF_PORT") {
            config.port = port
                .parse()
                .map_err(|e| Error::Config(format!("invalid DPF_PORT \"{port}\": {e}")))?;
        }
        if let Some(flavour) = lookup("DPF_CONFIGURATION") {
            config.configuration = flavour.parse()?;
        }
        Ok(config)
    }
}

/// A scalar option in an operator's execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
}

impl ConfigValue {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Int(i) => Value::Int32(*i),
            ConfigValue::Double(d) => Value::Double(*d),
            ConfigValue::String(s) => Value::String(s.clone()),
        }
    }

    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ConfigValue::Bool(*b)),
            Value::Int32(i) => Some(ConfigValue::Int(*i)),
            Value::Double(d) => Some(ConfigValue::Double(*d)),
            Value::String(s) => Some(ConfigValue::String(s.clone())),
            _ => None,
        }
    }
}

/// Key-value execution configuration sent when an operator is instantiated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorConfig(BTreeMap<String, ConfigValue>);

impl OperatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) -> &mut Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, ConfigValue)> for OperatorConfig {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.endpoint(), "127.0.0.1:50054");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn toml_overrides() {
        let config = ServiceConfig::from_toml_str(
            r#"
            host = "10.0.0.5"
            port = 6000
            connect_timeout_ms = 250
            load_default_plugins = false
            configuration = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint(), "10.0.0.5:6000");
        assert_eq!(config.connect_timeout(), Duration::from_millis(250));
        assert!(!config.load_default_plugins);
        assert_eq!(config.configuration, BuildConfiguration::Debug);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn bad_toml_is_an_error() {
        let err = ServiceConfig::from_toml_str("port = \"x\"").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpf.toml");
        let mut config = ServiceConfig::default();
        config.port = 50100;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(ServiceConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn env_lookup() {
        let config = ServiceConfig::from_lookup(|k| match k {
            "DPF_IP" => Some("192.168.1.2".into()),
            "DPF_PORT" => Some("50055".into()),
            "DPF_CONFIGURATION" => Some("Debug".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.endpoint(), "192.168.1.2:50055");
        assert_eq!(config.configuration, BuildConfiguration::Debug);

        let err = ServiceConfig::from_lookup(|k| (k == "DPF_PORT").then(|| "abc".into()));
        assert!(err.is_err());
    }

    #[test]
    fn operator_config_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            config: OperatorConfig,
        }
        let doc: Doc = toml::from_str(
            r#"
            [config]
            mutex = false
            num_threads = 4
            tolerance = 0.5
            location = "Nodal"
            "#,
        )
        .unwrap();
        assert_eq!(doc.config.get("mutex"), Some(&ConfigValue::Bool(false)));
        assert_eq!(doc.config.get("num_threads"), Some(&ConfigValue::Int(4)));
        assert_eq!(doc.config.get("tolerance"), Some(&ConfigValue::Double(0.5)));
        assert_eq!(
            doc.config.get("location"),
            Some(&ConfigValue::String("Nodal".into()))
        );
    }
}
