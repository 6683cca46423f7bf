//! Form configuration.
//!
//! `FormConfig::default()` describes the diode form as served. A TOML file
//! can override any subset of it:
//!
//! ```toml
//! endpoint = "/diode/calculate/"
//! gating_field = "Ileak"
//!
//! [selector]
//! field = "Vapp"
//! min = -1.0
//! max = 1.0
//! step = 0.05
//!
//! [dependencies]
//! ni = ["Vbi"]
//! Vapp = ["Wn"]
//! ```

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::dependency::DependencyGraph;
use crate::selector::{MAX_OPTIONS, option_count};

pub const MAX_PRECISION: usize = 9;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Recompute endpoint, relative to the service origin.
    pub endpoint: String,
    /// Page the device selector navigates to.
    pub base_path: String,
    /// Device constants endpoint, relative to the service origin.
    pub constants_path: String,
    pub credential_cookie: String,
    pub credential_header: String,
    /// Id of the device selection control.
    pub device_control: String,
    /// Query parameter carrying the selected device.
    pub device_param: String,
    pub default_device: String,
    /// Field whose non-empty blur unlocks the stepped selector.
    pub gating_field: String,
    pub selector: SelectorConfig,
    pub dependencies: DependencyGraph,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            endpoint: "/diode/calculate/".to_string(),
            base_path: "/diode".to_string(),
            constants_path: "/diode/diode/constants".to_string(),
            credential_cookie: "csrftoken".to_string(),
            credential_header: "X-CSRFToken".to_string(),
            device_control: "deviceSelect".to_string(),
            device_param: "diode".to_string(),
            default_device: "1N4148".to_string(),
            gating_field: "Ileak".to_string(),
            selector: SelectorConfig::default(),
            dependencies: DependencyGraph::diode_form(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub field: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Decimal places of option values and labels.
    pub precision: usize,
    pub unit: String,
    pub initial: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            field: "Vapp".to_string(),
            min: -1.0,
            max: 1.0,
            step: 0.05,
            precision: 2,
            unit: "V".to_string(),
            initial: 0.0,
        }
    }
}

impl FormConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let selector = &self.selector;
        if !(selector.step.is_finite() && selector.step > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "selector step must be positive, got {}",
                selector.step
            )));
        }
        if !(selector.min.is_finite() && selector.max.is_finite()) || selector.min > selector.max {
            return Err(ConfigError::Invalid(format!(
                "selector range [{}, {}] is empty",
                selector.min, selector.max
            )));
        }
        if option_count(selector.min, selector.max, selector.step).is_none() {
            return Err(ConfigError::Invalid(format!(
                "selector range [{}, {}] at step {} exceeds {MAX_OPTIONS} options",
                selector.min, selector.max, selector.step
            )));
        }
        if selector.precision > MAX_PRECISION {
            return Err(ConfigError::Invalid(format!(
                "selector precision {} exceeds {MAX_PRECISION}",
                selector.precision
            )));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint is empty".to_string()));
        }
        Ok(())
    }

    /// URL the device selector navigates to, e.g. `/diode/?diode=led`.
    pub fn navigation_url(&self, device: &str) -> String {
        format!(
            "{}/?{}={}",
            self.base_path.trim_end_matches('/'),
            self.device_param,
            device
        )
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(error) => write!(f, "cannot read config: {error}"),
            ConfigError::Toml(error) => write!(f, "cannot parse config: {error}"),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(error) => Some(error),
            ConfigError::Toml(error) => Some(error),
            ConfigError::Invalid(_) => None,
        }
    }
}
