// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Loaded once at startup from TOML and immutable afterwards.
//! Default path: `/etc/fangov/config.toml`

use crate::boost::{BoostConfig, BoostPlan};
use crate::curve::{self, CurvePoint, DutyCurve};
use crate::emergency::{EmergencyConfig, EmergencyGovernor};
use crate::hardware::HardwareConfig;
use crate::metrics::MetricsConfig;
use crate::sensors::SensorConfig;
use crate::trend::DEFAULT_TREND_MARGIN;
use crate::{DEFAULT_MIN_DUTY, Error, MAX_DUTY, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fangov/config.toml";

/// Default daemon socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/run/fangov.sock";

/// Default delay between ticks in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub control: ControlConfig,

    /// Temperature -> duty cycle points.
    #[serde(default = "curve::default_curve")]
    pub curve: Vec<CurvePoint>,

    /// Fan banks and the sensor driving each one.
    #[serde(default = "default_banks")]
    pub banks: Vec<BankConfig>,

    #[serde(default)]
    pub boost: BoostConfig,

    #[serde(default)]
    pub emergency: EmergencyConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub hardware: HardwareConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Delay between ticks, in milliseconds. Also the startup settle time.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Path for the Unix domain socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Whether to hand fans back to the firmware on daemon exit.
    #[serde(default = "default_true")]
    pub restore_on_exit: bool,

    /// Host tag for metrics. Defaults to the system hostname.
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            restore_on_exit: true,
            host: None,
        }
    }
}

impl DaemonConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Control loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Floor for every duty cycle, in percent.
    #[serde(default = "default_min_duty")]
    pub min_duty: u8,

    /// Duty cycle driven during the startup settle period.
    #[serde(default = "default_startup_duty")]
    pub startup_duty: u8,

    /// Temperature movement that forces a rewrite even at the same duty.
    #[serde(default = "default_min_temp_delta")]
    pub min_temp_delta: f64,

    /// Noise margin for trend detection.
    #[serde(default = "default_trend_margin")]
    pub trend_margin: f64,

    /// Sensor driving boosts (typically memory).
    #[serde(default = "default_critical_sensor")]
    pub critical_sensor: String,

    /// Critical readings below this are treated as bogus.
    #[serde(default = "default_plausible_min")]
    pub plausible_min: f64,

    /// Consecutive bogus critical readings before all fans go to 100%.
    #[serde(default = "default_max_critical_failures")]
    pub max_critical_failures: u32,

    /// Demote routine per-bank logging while in emergency mode.
    #[serde(default = "default_true")]
    pub quiet_during_emergency: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            min_duty: default_min_duty(),
            startup_duty: default_startup_duty(),
            min_temp_delta: default_min_temp_delta(),
            trend_margin: default_trend_margin(),
            critical_sensor: default_critical_sensor(),
            plausible_min: default_plausible_min(),
            max_critical_failures: default_max_critical_failures(),
            quiet_during_emergency: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankConfig {
    /// 1-based bank id as addressed by the hardware
    pub id: u8,
    /// Logical sensor name whose temperature drives this bank's curve
    pub sensor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            control: ControlConfig::default(),
            curve: curve::default_curve(),
            banks: default_banks(),
            boost: BoostConfig::default(),
            emergency: EmergencyConfig::default(),
            sensors: SensorConfig::default(),
            hardware: HardwareConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Check everything that can be checked without touching hardware.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.tick_interval_ms == 0 {
            return Err(Error::config("tick_interval_ms must be greater than 0"));
        }

        let c = &self.control;
        if c.min_duty > MAX_DUTY || c.startup_duty > MAX_DUTY {
            return Err(Error::config(format!(
                "min_duty and startup_duty must be at most {MAX_DUTY}%"
            )));
        }
        if !(c.min_temp_delta >= 0.0) || !(c.trend_margin >= 0.0) {
            return Err(Error::config(
                "min_temp_delta and trend_margin must be non-negative",
            ));
        }
        if !c.plausible_min.is_finite() {
            return Err(Error::config("plausible_min must be finite"));
        }
        if c.critical_sensor.is_empty() {
            return Err(Error::config("critical_sensor must be set"));
        }

        DutyCurve::build(&self.curve, c.min_duty)?;
        EmergencyGovernor::new(&self.emergency)?;
        BoostPlan::build(&self.boost)?;

        if self.banks.is_empty() {
            return Err(Error::config("at least one fan bank is required"));
        }
        let mut ids = BTreeSet::new();
        for bank in &self.banks {
            if bank.id == 0 {
                return Err(Error::config("bank ids start at 1"));
            }
            if !ids.insert(bank.id) {
                return Err(Error::config(format!("duplicate bank id {}", bank.id)));
            }
            if bank.sensor.is_empty() {
                return Err(Error::config(format!("bank {} has no sensor", bank.id)));
            }
        }
        for target in &self.boost.targets {
            if !ids.contains(&target.bank) {
                return Err(Error::config(format!(
                    "boost target references unknown bank {}",
                    target.bank
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse and validate a TOML document.
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(contents).map_err(|e| Error::config(format!("failed to parse: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
    let config = parse_config(&contents)?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Render a config as TOML, e.g. to print the defaults.
pub fn to_toml(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| Error::config(format!("failed to serialize: {e}")))
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_banks() -> Vec<BankConfig> {
    vec![
        BankConfig {
            id: 1,
            sensor: "cpu1".to_string(),
        },
        BankConfig {
            id: 2,
            sensor: "cpu2".to_string(),
        },
    ]
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_duty() -> u8 {
    DEFAULT_MIN_DUTY
}

fn default_startup_duty() -> u8 {
    MAX_DUTY
}

fn default_min_temp_delta() -> f64 {
    1.0
}

fn default_trend_margin() -> f64 {
    DEFAULT_TREND_MARGIN
}

fn default_critical_sensor() -> String {
    "ram".to_string()
}

fn default_plausible_min() -> f64 {
    30.0
}

fn default_max_critical_failures() -> u32 {
    3
}
