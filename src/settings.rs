//! Settings

use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::taxes::FlatRateTaxSettings;

/// Settings loading errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error reading the settings file
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Compact, human-readable logs.
    #[default]
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (compact, json)
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Checkout pipeline settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CheckoutSettings {
    /// Hosts storefront redirect URLs may point at. `*` allows any host, a
    /// leading dot allows every subdomain.
    pub allowed_client_hosts: Vec<String>,

    /// New orders start unfulfilled instead of waiting for confirmation.
    pub automatically_confirm_all_new_orders: bool,

    /// Catalog prices include taxes.
    pub include_taxes_in_prices: bool,

    /// Logging
    pub logging: LoggingSettings,

    /// Flat-rate tax table; no taxes are charged without one.
    pub taxes: Option<FlatRateTaxSettings>,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            allowed_client_hosts: Vec::new(),
            automatically_confirm_all_new_orders: true,
            include_taxes_in_prices: true,
            logging: LoggingSettings::default(),
            taxes: None,
        }
    }
}

impl CheckoutSettings {
    /// Parse settings from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Yaml`] if the document is malformed.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        Ok(serde_norway::from_str(yaml)?)
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }
}
