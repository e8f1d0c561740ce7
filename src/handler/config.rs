use crate::indicators::MacdParameters;
use async_std::fs;
use kapacitor_udf::proto::{option_value::Value, Option as ProtoOption, OptionInfo, OptionValue, ValueType};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MacdOptionError {
    #[error("Invalid type for '{0}' option")]
    InvalidOptionType(String),
    #[error("Missing value for '{0}' option")]
    MissingOptionValue(String),
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("Period '{0}' must be positive, got {1}")]
    NonPositivePeriod(String, i64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {}", .0.display(), .1)]
    Read(PathBuf, #[source] io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Options a MACD node accepts from a TICKscript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MacdOptions {
    pub short_period: u32,
    pub long_period: u32,
    pub signal_period: u32,
    pub field: String,
    pub as_field: String,
    pub ticker_field: String,
}

impl MacdOptions {
    /// Applies the options of an `InitRequest` on top of `base`.
    ///
    /// Options the TICKscript leaves out keep their value from `base`, so a
    /// handler seeded from the config file only loses the settings Kapacitor
    /// overrides.
    ///
    /// # Arguments
    ///
    /// * `base` - The options in effect before the request.
    /// * `options` - The proto options sent by Kapacitor.
    ///
    /// # Returns
    ///
    /// The merged options, or the first option that failed to parse.
    pub fn from_proto_options(
        base: &MacdOptions,
        options: &[ProtoOption],
    ) -> Result<Self, MacdOptionError> {
        let mut macd_options = base.clone();

        for option in options {
            let value = option
                .values
                .first()
                .ok_or_else(|| MacdOptionError::MissingOptionValue(option.name.clone()))?;

            match option.name.as_str() {
                "short" => macd_options.short_period = period_value(&option.name, value)?,
                "long" => macd_options.long_period = period_value(&option.name, value)?,
                "signal" => macd_options.signal_period = period_value(&option.name, value)?,
                "field" => macd_options.field = string_value(&option.name, value)?,
                "as" => macd_options.as_field = string_value(&option.name, value)?,
                "ticker_field" => macd_options.ticker_field = string_value(&option.name, value)?,
                _ => {
                    return Err(MacdOptionError::UnknownOption(option.name.clone()));
                }
            }
        }

        Ok(macd_options)
    }

    pub fn to_option_info(&self) -> HashMap<String, OptionInfo> {
        let int_options = ["short", "long", "signal"];
        let string_options = ["field", "as", "ticker_field"];

        int_options
            .iter()
            .map(|name| (name, ValueType::Int))
            .chain(string_options.iter().map(|name| (name, ValueType::String)))
            .map(|(name, value_type)| {
                (
                    name.to_string(),
                    OptionInfo {
                        value_types: vec![value_type as i32],
                    },
                )
            })
            .collect()
    }

    pub fn to_proto_options(&self) -> Vec<ProtoOption> {
        vec![
            int_option("short", self.short_period),
            int_option("long", self.long_period),
            int_option("signal", self.signal_period),
            string_option("field", &self.field),
            string_option("as", &self.as_field),
            string_option("ticker_field", &self.ticker_field),
        ]
    }

    pub fn parameters(&self) -> MacdParameters {
        MacdParameters::new(
            self.short_period as usize,
            self.long_period as usize,
            self.signal_period as usize,
        )
    }

    pub fn signal_field(&self) -> String {
        format!("{}_signal", self.as_field)
    }

    pub fn histogram_field(&self) -> String {
        format!("{}_histogram", self.as_field)
    }

    pub fn crossover_field(&self) -> String {
        format!("{}_crossover", self.as_field)
    }
}

impl Default for MacdOptions {
    fn default() -> Self {
        let params = MacdParameters::default();
        Self {
            short_period: params.short_period as u32,
            long_period: params.long_period as u32,
            signal_period: params.signal_period as u32,
            field: "value".to_string(),
            as_field: "macd".to_string(),
            ticker_field: "ticker".to_string(),
        }
    }
}

fn period_value(name: &str, value: &OptionValue) -> Result<u32, MacdOptionError> {
    match value.value {
        Some(Value::IntValue(v)) if v > 0 && v <= i64::from(u32::MAX) => Ok(v as u32),
        Some(Value::IntValue(v)) => Err(MacdOptionError::NonPositivePeriod(name.to_string(), v)),
        _ => Err(MacdOptionError::InvalidOptionType(name.to_string())),
    }
}

fn string_value(name: &str, value: &OptionValue) -> Result<String, MacdOptionError> {
    match value.value {
        Some(Value::StringValue(ref v)) => Ok(v.clone()),
        _ => Err(MacdOptionError::InvalidOptionType(name.to_string())),
    }
}

fn int_option(name: &str, value: u32) -> ProtoOption {
    ProtoOption {
        name: name.to_string(),
        values: vec![OptionValue {
            r#type: ValueType::Int as i32,
            value: Some(Value::IntValue(i64::from(value))),
        }],
    }
}

fn string_option(name: &str, value: &str) -> ProtoOption {
    ProtoOption {
        name: name.to_string(),
        values: vec![OptionValue {
            r#type: ValueType::String as i32,
            value: Some(Value::StringValue(value.to_string())),
        }],
    }
}

/// Settings loaded from the optional TOML config file.
///
/// ```toml
/// socket = "/var/run/kapacitor/macd.sock"
///
/// [defaults]
/// short_period = 8
/// long_period = 17
/// signal_period = 9
/// field = "close"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UdfConfig {
    pub socket: Option<PathBuf>,
    pub defaults: MacdOptions,
}

impl UdfConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => return Err(ConfigError::Read(path, e)),
        };
        Self::from_toml_str(&contents)
    }
}
