//! Model configuration: the JSON file describing a notebook's fans.
//!
//! Keys are PascalCase so existing model files can be used unchanged.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::FanControlError;

fn default_poll_interval() -> u64 {
    3000
}

/// Thermal and register-width settings shared by every fan of a model.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub notebook_model: String,

    /// Control loop period in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub ec_poll_interval: u64,

    /// Access registers as 16-bit words instead of bytes.
    #[serde(default)]
    pub read_write_words: bool,

    pub critical_temperature: f32,

    pub critical_temperature_offset: f32,

    pub fan_configurations: Vec<FanConfiguration>,
}

/// Hardware description of one fan.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct FanConfiguration {
    #[serde(default)]
    pub fan_display_name: Option<String>,

    pub read_register: u8,

    pub write_register: u8,

    pub min_speed_value: i32,

    pub max_speed_value: i32,

    /// Read-back values use their own scale (`min/max_speed_value_read`).
    #[serde(default)]
    pub independent_read_min_max_values: bool,

    #[serde(default)]
    pub min_speed_value_read: i32,

    #[serde(default)]
    pub max_speed_value_read: i32,

    #[serde(default)]
    pub reset_required: bool,

    #[serde(default)]
    pub fan_speed_reset_value: i32,

    #[serde(default)]
    pub temperature_thresholds: Vec<TemperatureThreshold>,

    #[serde(default)]
    pub fan_speed_percentage_overrides: Vec<FanSpeedPercentageOverride>,
}

/// Temperature band mapped to a fan speed percentage.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TemperatureThreshold {
    /// Selected once the temperature reaches this value.
    pub up_threshold: f32,
    /// Left once the temperature falls below this value.
    pub down_threshold: f32,
    pub fan_speed: f32,
}

/// Which conversion direction a calibration override applies to.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideTargetOperation {
    Read,
    Write,
    #[default]
    #[serde(alias = "Both")]
    ReadWrite,
}

impl OverrideTargetOperation {
    pub fn applies_to_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn applies_to_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A calibration point that replaces the linear percentage/raw mapping.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FanSpeedPercentageOverride {
    pub fan_speed_percentage: f32,
    pub fan_speed_value: i32,
    #[serde(default)]
    pub target_operation: OverrideTargetOperation,
}

impl FanConfiguration {
    /// Display name, falling back to `"Fan {index}"`.
    pub fn display_name(&self, index: usize) -> String {
        match self.fan_display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Fan {}", index),
        }
    }

    /// Raw bounds used to interpret read-back values.
    pub fn read_range(&self) -> (i32, i32) {
        if self.independent_read_min_max_values {
            (self.min_speed_value_read, self.max_speed_value_read)
        } else {
            (self.min_speed_value, self.max_speed_value)
        }
    }
}

impl ModelConfig {
    /// Parse and validate a model configuration file.
    pub fn load(path: &Path) -> Result<Self, FanControlError> {
        let content = fs::read_to_string(path).map_err(|error| {
            FanControlError::Configuration(format!("{}: {}", path.display(), error))
        })?;
        let config = Self::from_json(&content)?;
        debug!(
            "loaded model '{}' with {} fan(s) from {}",
            config.notebook_model,
            config.fan_configurations.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, FanControlError> {
        let config: ModelConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Largest raw value a register can hold with the configured width.
    pub fn max_raw_value(&self) -> i32 {
        if self.read_write_words {
            u16::MAX as i32
        } else {
            u8::MAX as i32
        }
    }

    pub fn validate(&self) -> Result<(), FanControlError> {
        if self.fan_configurations.is_empty() {
            return Err(invalid("FanConfigurations", "at least one fan is required"));
        }
        if self.ec_poll_interval == 0 {
            return Err(invalid("EcPollInterval", "must be greater than 0"));
        }
        if self.critical_temperature_offset < 0.0 {
            return Err(invalid("CriticalTemperatureOffset", "must not be negative"));
        }

        for (index, fan) in self.fan_configurations.iter().enumerate() {
            self.validate_fan(index, fan)?;
        }
        Ok(())
    }

    fn validate_fan(&self, index: usize, fan: &FanConfiguration) -> Result<(), FanControlError> {
        let field = |name: &str| format!("FanConfigurations[{}].{}", index, name);
        let max_raw = self.max_raw_value();
        let check_raw = |name: &str, value: i32| {
            if (0..=max_raw).contains(&value) {
                Ok(())
            } else {
                Err(invalid(&field(name), &format!("{} not in 0..={}", value, max_raw)))
            }
        };

        check_raw("MinSpeedValue", fan.min_speed_value)?;
        check_raw("MaxSpeedValue", fan.max_speed_value)?;
        if fan.min_speed_value == fan.max_speed_value {
            return Err(invalid(&field("MaxSpeedValue"), "must differ from MinSpeedValue"));
        }

        if fan.independent_read_min_max_values {
            check_raw("MinSpeedValueRead", fan.min_speed_value_read)?;
            check_raw("MaxSpeedValueRead", fan.max_speed_value_read)?;
            if fan.min_speed_value_read == fan.max_speed_value_read {
                return Err(invalid(
                    &field("MaxSpeedValueRead"),
                    "must differ from MinSpeedValueRead",
                ));
            }
        }

        if fan.reset_required {
            check_raw("FanSpeedResetValue", fan.fan_speed_reset_value)?;
        }

        if self.read_write_words {
            if fan.write_register == u8::MAX {
                return Err(invalid(&field("WriteRegister"), "no room for a word"));
            }
            if fan.read_register == u8::MAX {
                return Err(invalid(&field("ReadRegister"), "no room for a word"));
            }
        }

        if fan.temperature_thresholds.is_empty() {
            return Err(invalid(&field("TemperatureThresholds"), "must not be empty"));
        }
        for (n, threshold) in fan.temperature_thresholds.iter().enumerate() {
            let name = format!("TemperatureThresholds[{}]", n);
            if threshold.down_threshold > threshold.up_threshold {
                return Err(invalid(&field(&name), "DownThreshold exceeds UpThreshold"));
            }
            if !(0.0..=100.0).contains(&threshold.fan_speed) {
                return Err(invalid(&field(&name), "FanSpeed not in 0..=100"));
            }
        }

        for (n, entry) in fan.fan_speed_percentage_overrides.iter().enumerate() {
            let name = format!("FanSpeedPercentageOverrides[{}]", n);
            check_raw(&name, entry.fan_speed_value)?;
            if !(0.0..=100.0).contains(&entry.fan_speed_percentage) {
                return Err(invalid(&field(&name), "FanSpeedPercentage not in 0..=100"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> FanControlError {
    FanControlError::Configuration(format!("{}: {}", field, reason))
}
