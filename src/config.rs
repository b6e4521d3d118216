// Runtime settings layered from an optional TOML file and WINDGRAPH_* variables

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub aggregate: AggregateSettings,
    pub data: DataSettings,
}

/// Inputs to the windowed aggregator that templates do not carry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregateSettings {
    /// Station logging interval, e.g. `minutes=5`; the unit of smoothing decay
    pub log_interval: String,
    /// Column holding wind direction in degrees
    pub direction_field: String,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        AggregateSettings {
            log_interval: "minutes=5".to_string(),
            direction_field: "wind_dir".to_string(),
        }
    }
}

/// How CSV data files are read
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub timestamp_column: String,
    pub timestamp_format: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        DataSettings {
            timestamp_column: "idx".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl Settings {
    /// Load settings; a missing `path` means defaults plus environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder.add_source(environment()).build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// `WINDGRAPH_AGGREGATE__LOG_INTERVAL` sets `aggregate.log_interval`
fn environment() -> config::Environment {
    config::Environment::with_prefix("WINDGRAPH")
        .prefix_separator("_")
        .separator("__")
}
