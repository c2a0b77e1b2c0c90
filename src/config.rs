//! Configuration System using Figment
//!
//! Strongly-typed configuration for the application and the instruments it
//! talks to. Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables (prefixed with `RUSTDAQ_`, nested keys split on `__`)
//!
//! ```toml
//! [application]
//! name = "lab bench"
//! log_level = "info"
//! log_format = "pretty"
//!
//! [[instruments]]
//! id = "lockin"
//! type = "sr844"
//! resource = "GPIB0::8::INSTR"
//!
//! [[instruments]]
//! id = "synth"
//! type = "hm8133"
//! resource = "GPIB0::20::INSTR"
//! timeout_ms = 2000
//! ```
//!
//! # Environment Variable Overrides
//!
//! ```text
//! RUSTDAQ_APPLICATION__LOG_LEVEL=debug
//! RUSTDAQ_APPLICATION__LOG_FORMAT=json
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{AppResult, DaqError};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, coloured when attached to a terminal
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Supported instrument drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Stanford Research SR844 lock-in amplifier
    Sr844,
    /// HAMEG HM8133 RF synthesizer
    Hm8133,
}

impl InstrumentKind {
    /// Terminator the instrument expects after each command and sends after
    /// each response.
    pub fn default_terminator(&self) -> &'static str {
        match self {
            InstrumentKind::Sr844 => "\n",
            InstrumentKind::Hm8133 => ";",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Sr844 => write!(f, "SR844"),
            InstrumentKind::Hm8133 => write!(f, "HM8133"),
        }
    }
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument identifier
    pub id: String,
    /// Driver to use
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
    /// VISA resource string (e.g., "GPIB0::8::INSTR")
    pub resource: String,
    /// I/O timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Override of the command terminator
    #[serde(default)]
    pub write_terminator: Option<String>,
    /// Override of the response terminator
    #[serde(default)]
    pub read_terminator: Option<String>,
    /// Whether this instrument is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InstrumentDefinition {
    /// Effective command terminator
    pub fn write_terminator(&self) -> &str {
        self.write_terminator
            .as_deref()
            .unwrap_or_else(|| self.kind.default_terminator())
    }

    /// Effective response terminator
    pub fn read_terminator(&self) -> &str {
        self.read_terminator
            .as_deref()
            .unwrap_or_else(|| self.kind.default_terminator())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    5000
}

fn default_enabled() -> bool {
    true
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Settings {
    /// Load configuration from `config/default.toml` and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/default.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables take precedence over the file. The result is
    /// validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::extract(Figment::new().merge(Toml::file(path.as_ref())))
    }

    /// Load configuration from a TOML string, still honouring the environment
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> AppResult<Self> {
        let settings: Self = figment
            .merge(Env::prefixed("RUSTDAQ_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Instrument IDs are non-empty and unique
    /// - Each instrument has a resource string and a non-zero timeout
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let mut ids = HashSet::new();
        for instrument in &self.instruments {
            if instrument.id.trim().is_empty() {
                return Err(DaqError::Configuration(
                    "Instrument 'id' cannot be empty".to_string(),
                ));
            }
            if !ids.insert(instrument.id.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate instrument ID: '{}'",
                    instrument.id
                )));
            }
            if instrument.resource.trim().is_empty() {
                return Err(DaqError::Configuration(format!(
                    "{} instrument '{}': 'resource' cannot be empty",
                    instrument.kind, instrument.id
                )));
            }
            if instrument.timeout_ms == 0 {
                return Err(DaqError::Configuration(format!(
                    "{} instrument '{}': 'timeout_ms' must be greater than 0",
                    instrument.kind, instrument.id
                )));
            }
        }

        Ok(())
    }

    /// Instruments with `enabled = true`
    pub fn enabled_instruments(&self) -> Vec<&InstrumentDefinition> {
        self.instruments.iter().filter(|i| i.enabled).collect()
    }

    /// Look up an instrument by id
    pub fn instrument(&self, id: &str) -> Option<&InstrumentDefinition> {
        self.instruments.iter().find(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const BENCH: &str = r#"
        [application]
        name = "bench"
        log_level = "debug"

        [[instruments]]
        id = "lockin"
        type = "sr844"
        resource = "GPIB0::8::INSTR"

        [[instruments]]
        id = "synth"
        type = "hm8133"
        resource = "GPIB0::20::INSTR"
        timeout_ms = 2000
        enabled = false
    "#;

    #[test]
    #[serial]
    fn test_config_validation_valid() {
        let settings = Settings::from_toml_str(BENCH).unwrap();
        assert_eq!(settings.application.name, "bench");
        assert_eq!(settings.application.log_format, LogFormat::Pretty);
        assert_eq!(settings.instruments.len(), 2);

        let lockin = settings.instrument("lockin").unwrap();
        assert_eq!(lockin.kind, InstrumentKind::Sr844);
        assert_eq!(lockin.timeout_ms, 5000);
        assert!(lockin.enabled);
    }

    #[test]
    #[serial]
    fn test_default_terminators_per_kind() {
        let settings = Settings::from_toml_str(BENCH).unwrap();
        let lockin = settings.instrument("lockin").unwrap();
        let synth = settings.instrument("synth").unwrap();
        assert_eq!(lockin.write_terminator(), "\n");
        assert_eq!(synth.write_terminator(), ";");
        assert_eq!(synth.read_terminator(), ";");
    }

    #[test]
    #[serial]
    fn test_enabled_instruments_filter() {
        let settings = Settings::from_toml_str(BENCH).unwrap();
        let enabled: Vec<_> = settings
            .enabled_instruments()
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(enabled, vec!["lockin"]);
    }

    #[test]
    #[serial]
    fn test_invalid_log_level() {
        let toml = r#"
            [application]
            name = "bench"
            log_level = "verbose"
        "#;
        let err = Settings::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    #[serial]
    fn test_duplicate_instrument_ids() {
        let toml = r#"
            [application]
            name = "bench"

            [[instruments]]
            id = "lockin"
            type = "sr844"
            resource = "GPIB0::8::INSTR"

            [[instruments]]
            id = "lockin"
            type = "sr844"
            resource = "GPIB0::9::INSTR"
        "#;
        let err = Settings::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate instrument ID"));
    }

    #[test]
    #[serial]
    fn test_empty_resource_rejected() {
        let toml = r#"
            [application]
            name = "bench"

            [[instruments]]
            id = "synth"
            type = "hm8133"
            resource = ""
        "#;
        let err = Settings::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("'resource' cannot be empty"));
    }

    #[test]
    #[serial]
    fn test_unknown_instrument_type_is_load_error() {
        let toml = r#"
            [application]
            name = "bench"

            [[instruments]]
            id = "scope"
            type = "ds1054z"
            resource = "TCPIP0::10.0.0.2::INSTR"
        "#;
        assert!(matches!(
            Settings::from_toml_str(toml),
            Err(DaqError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BENCH.as_bytes()).unwrap();

        std::env::set_var("RUSTDAQ_APPLICATION__LOG_FORMAT", "json");
        let loaded = Settings::load_from(file.path());
        std::env::remove_var("RUSTDAQ_APPLICATION__LOG_FORMAT");

        let settings = loaded.unwrap();
        assert_eq!(settings.application.log_format, LogFormat::Json);
        assert_eq!(settings.application.log_level, "debug");
    }
}
