// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sources.
//!
//! A source returns whatever named readings it could obtain this tick.
//! Malformed or missing values are simply left out; the control loop
//! decides how to cope with absent sensors.

use crate::hwmon::{self, TempSensor};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Command;

/// One temperature sample for one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemperatureReading {
    /// Logical sensor name, e.g. "cpu1" or "ram"
    pub name: String,
    /// Degrees Celsius
    pub temp_c: f64,
}

impl TemperatureReading {
    pub fn new(name: impl Into<String>, temp_c: f64) -> Self {
        Self {
            name: name.into(),
            temp_c,
        }
    }
}

pub trait SensorSource {
    /// Sample every sensor. `Err` means nothing could be read at all.
    fn read(&mut self) -> Result<Vec<TemperatureReading>>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where temperatures come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum SensorConfig {
    /// Read `tempN_input` files under /sys/class/hwmon.
    #[serde(rename = "hwmon")]
    Hwmon {
        /// Logical name -> hwmon sensor id (e.g. "ram" = "hwmon2/temp3")
        sensors: BTreeMap<String, String>,
    },

    /// Run a command and parse its stdout.
    #[serde(rename = "command")]
    Command {
        #[serde(default = "default_program")]
        program: String,
        #[serde(default = "default_args")]
        args: Vec<String>,
        /// Raw sensor name -> logical name
        #[serde(default)]
        names: BTreeMap<String, String>,
    },
}

/// Defaults map Supermicro SDR labels. Other boards list their own
/// labels under `[sensors.names]`.
impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Command {
            program: default_program(),
            args: default_args(),
            names: BTreeMap::from([
                ("CPU1 Temp".to_string(), "cpu1".to_string()),
                ("CPU2 Temp".to_string(), "cpu2".to_string()),
                ("P1-DIMMA1 Temp".to_string(), "ram".to_string()),
            ]),
        }
    }
}

fn default_program() -> String {
    "ipmitool".to_string()
}

fn default_args() -> Vec<String> {
    ["sdr", "type", "temperature"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Build the configured source.
pub fn from_config(config: &SensorConfig) -> Result<Box<dyn SensorSource + Send>> {
    match config {
        SensorConfig::Hwmon { sensors } => Ok(Box::new(HwmonSensors::discover(sensors)?)),
        SensorConfig::Command {
            program,
            args,
            names,
        } => Ok(Box::new(CommandSensors::new(
            program.clone(),
            args.clone(),
            names.clone(),
        ))),
    }
}

// ---------------------------------------------------------------------------
// hwmon
// ---------------------------------------------------------------------------

pub struct HwmonSensors {
    sensors: Vec<(String, TempSensor)>,
}

impl HwmonSensors {
    /// Resolve configured hwmon ids. Ids that do not exist are logged and
    /// left out, which makes them permanently absent.
    pub fn discover(mapping: &BTreeMap<String, String>) -> Result<Self> {
        let found = hwmon::discover_temp_sensors()?;
        Ok(Self::resolve(mapping, &found))
    }

    pub fn resolve(mapping: &BTreeMap<String, String>, found: &[TempSensor]) -> Self {
        let mut sensors = Vec::new();
        for (name, id) in mapping {
            match found.iter().find(|s| &s.id == id) {
                Some(s) => sensors.push((name.clone(), s.clone())),
                None => log::warn!("Sensor '{name}': hwmon id '{id}' not found"),
            }
        }
        Self { sensors }
    }
}

impl SensorSource for HwmonSensors {
    fn read(&mut self) -> Result<Vec<TemperatureReading>> {
        Ok(self
            .sensors
            .iter()
            .filter_map(|(name, sensor)| {
                hwmon::read_temp_status(sensor)
                    .temp_c
                    .map(|t| TemperatureReading::new(name.clone(), t))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// External command (ipmitool and friends)
// ---------------------------------------------------------------------------

pub struct CommandSensors {
    program: String,
    args: Vec<String>,
    names: BTreeMap<String, String>,
}

impl CommandSensors {
    pub fn new(program: String, args: Vec<String>, names: BTreeMap<String, String>) -> Self {
        Self {
            program,
            args,
            names,
        }
    }
}

impl SensorSource for CommandSensors {
    fn read(&mut self) -> Result<Vec<TemperatureReading>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| Error::SensorUnavailable(format!("{} failed: {e}", self.program)))?;

        if !output.status.success() {
            return Err(Error::SensorUnavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_readings(
            &String::from_utf8_lossy(&output.stdout),
            &self.names,
        ))
    }
}

/// Parse sensor listing output.
///
/// Accepted line forms:
///   `CPU1 Temp | 30h | ok | 3.1 | 40 degrees C`  (ipmitool sdr)
///   `cpu1 = 40.5`
///   `cpu1: 40.5`
pub fn parse_readings(output: &str, names: &BTreeMap<String, String>) -> Vec<TemperatureReading> {
    output
        .lines()
        .filter_map(|line| {
            let (raw_name, raw_value) = split_line(line)?;
            let temp_c = parse_temp(raw_value)?;
            let name = names
                .get(raw_name)
                .cloned()
                .unwrap_or_else(|| normalize_name(raw_name));
            Some(TemperatureReading { name, temp_c })
        })
        .collect()
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.contains('|') {
        let mut cols = line.split('|').map(str::trim);
        let name = cols.next()?;
        let value = cols.last()?;
        return Some((name, value));
    }
    line.split_once('=')
        .or_else(|| line.split_once(':'))
        .map(|(n, v)| (n.trim(), v.trim()))
}

fn parse_temp(value: &str) -> Option<f64> {
    let t: f64 = value.split_whitespace().next()?.parse().ok()?;
    t.is_finite().then_some(t)
}

fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}
