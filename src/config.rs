//! Instrument configuration.
//!
//! One TOML file covers the whole core. Every section and every field
//! has a default, so a partial file (or none at all) yields a working
//! configuration; the CLI overrides the device endpoint on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::position::AltitudeSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InstrumentConfig {
    pub device: DeviceConfig,
    pub position: PositionConfig,
    pub task: TaskConfig,
    pub airspace: AirspaceConfig,
    pub traffic: TrafficConfig,
}

/// Connection to the GPS/Flarm sensor stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    /// No line for this long counts as a dead connection
    pub read_timeout_seconds: u64,
    /// Initial delay between reconnection attempts (exponential backoff)
    pub retry_delay_seconds: u64,
    /// Cap for the exponential backoff
    pub max_retry_delay_seconds: u64,
    /// Consecutive failed connection attempts before giving up
    pub max_retries: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4353,
            read_timeout_seconds: 10,
            retry_delay_seconds: 1,
            max_retry_delay_seconds: 60,
            max_retries: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub altitude_source: AltitudeSource,
    /// Fixes older than this suspend engine evaluation; 0 disables the
    /// check
    pub stale_fix_seconds: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            altitude_source: AltitudeSource::Gps,
            stale_fix_seconds: 10,
        }
    }
}

/// Default task point scheme dimensions, used by task editors when the
/// point does not carry explicit ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub cylinder_radius_m: f64,
    pub sector_inner_radius_m: f64,
    pub sector_outer_radius_m: f64,
    pub sector_angle_deg: f64,
    pub line_length_m: f64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            cylinder_radius_m: 500.0,
            sector_inner_radius_m: 0.0,
            sector_outer_radius_m: 3_000.0,
            sector_angle_deg: 90.0,
            line_length_m: 1_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirspaceConfig {
    pub lateral_near_m: f64,
    pub lateral_very_near_m: f64,
    pub vertical_near_m: f64,
    pub vertical_very_near_m: f64,
    /// Re-alert suppression window per volume
    pub cooldown_seconds: u64,
}

impl Default for AirspaceConfig {
    fn default() -> Self {
        Self {
            lateral_near_m: 2_000.0,
            lateral_very_near_m: 600.0,
            vertical_near_m: 350.0,
            vertical_very_near_m: 100.0,
            cooldown_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Quiet targets are dropped after this long
    pub expiry_seconds: u64,
    /// A status sentence after this much traffic silence clears the table
    pub silence_seconds: u64,
    pub max_targets: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: 5,
            silence_seconds: 4,
            max_targets: 50,
        }
    }
}

impl InstrumentConfig {
    /// Load from a TOML file; missing sections and fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = InstrumentConfig::default();
        assert_eq!(config.device.port, 4353);
        assert_eq!(config.position.altitude_source, AltitudeSource::Gps);
        assert_eq!(config.airspace.cooldown_seconds, 30);
        assert_eq!(config.traffic.max_targets, 50);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[device]
host = "flarm.local"

[position]
altitude_source = "baro"
"#
        )
        .unwrap();

        let config = InstrumentConfig::load(file.path()).unwrap();
        assert_eq!(config.device.host, "flarm.local");
        // Unspecified fields keep their defaults
        assert_eq!(config.device.port, 4353);
        assert_eq!(config.position.altitude_source, AltitudeSource::Baro);
        assert_eq!(config.task.cylinder_radius_m, 500.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = InstrumentConfig::load(Path::new("/nonexistent/vario.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not toml at all [[[").unwrap();
        assert!(InstrumentConfig::load(file.path()).is_err());
    }
}
