// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Emergency override.
//!
//! Entered when any sensor exceeds its high threshold, left only once
//! every sensor is back at or below its low threshold. The gap between
//! the two is what keeps the override from flapping. A sensor that went
//! over its high threshold must report again, at or below its low
//! threshold, before the override can clear.

use crate::sensors::TemperatureReading;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_HIGH: f64 = 90.0;
pub const DEFAULT_LOW: f64 = 75.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Enter emergency above this.
    pub high: f64,
    /// Leave emergency at or below this.
    pub low: f64,
}

impl Thresholds {
    fn validate(&self, what: &str) -> Result<()> {
        if !self.high.is_finite() || !self.low.is_finite() {
            return Err(Error::config(format!("{what}: thresholds must be finite")));
        }
        if self.low >= self.high {
            return Err(Error::config(format!(
                "{what}: low threshold {} must be below high threshold {}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_low")]
    pub low: f64,
    /// Per-sensor overrides keyed by logical sensor name.
    #[serde(default)]
    pub sensors: BTreeMap<String, Thresholds>,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH,
            low: DEFAULT_LOW,
            sensors: BTreeMap::new(),
        }
    }
}

fn default_high() -> f64 {
    DEFAULT_HIGH
}

fn default_low() -> f64 {
    DEFAULT_LOW
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmergencyMode {
    #[default]
    Normal,
    Emergency,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Unchanged,
    Entered { sensor: String, temp_c: f64 },
    Cleared,
}

#[derive(Debug, Clone)]
pub struct EmergencyGovernor {
    default: Thresholds,
    overrides: BTreeMap<String, Thresholds>,
    mode: EmergencyMode,
    /// Sensors seen above their high threshold during this emergency
    tripped: BTreeSet<String>,
}

impl EmergencyGovernor {
    pub fn new(config: &EmergencyConfig) -> Result<Self> {
        let default = Thresholds {
            high: config.high,
            low: config.low,
        };
        default.validate("emergency")?;
        for (name, t) in &config.sensors {
            t.validate(&format!("emergency.sensors.{name}"))?;
        }
        Ok(Self {
            default,
            overrides: config.sensors.clone(),
            mode: EmergencyMode::Normal,
            tripped: BTreeSet::new(),
        })
    }

    pub fn thresholds_for(&self, sensor: &str) -> Thresholds {
        self.overrides.get(sensor).copied().unwrap_or(self.default)
    }

    pub fn mode(&self) -> EmergencyMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == EmergencyMode::Emergency
    }

    /// Sensors that have to read safe again before the emergency clears.
    pub fn tripped(&self) -> impl Iterator<Item = &str> {
        self.tripped.iter().map(String::as_str)
    }

    fn is_hot(&self, r: &TemperatureReading) -> bool {
        r.temp_c > self.thresholds_for(&r.name).high
    }

    /// Advance the state machine with this tick's readings.
    ///
    /// An active emergency never clears while a tripped sensor is
    /// missing from `readings`.
    pub fn evaluate(&mut self, readings: &[TemperatureReading]) -> Transition {
        let hot: Vec<&TemperatureReading> = readings.iter().filter(|r| self.is_hot(r)).collect();
        self.tripped.extend(hot.iter().map(|r| r.name.clone()));

        match self.mode {
            EmergencyMode::Normal => {
                match hot.first() {
                    Some(r) => {
                        self.mode = EmergencyMode::Emergency;
                        log::error!(
                            "EMERGENCY: {} at {:.1}°C exceeds {:.1}°C, forcing all fans to 100%",
                            r.name,
                            r.temp_c,
                            self.thresholds_for(&r.name).high
                        );
                        Transition::Entered {
                            sensor: r.name.clone(),
                            temp_c: r.temp_c,
                        }
                    }
                    None => Transition::Unchanged,
                }
            }
            EmergencyMode::Emergency => {
                let missing: Vec<&str> = self
                    .tripped()
                    .filter(|name| !readings.iter().any(|r| r.name == *name))
                    .collect();
                if !missing.is_empty() {
                    log::warn!("Emergency held: {} not reporting", missing.join(", "));
                    return Transition::Unchanged;
                }

                let safe = !readings.is_empty()
                    && readings
                        .iter()
                        .all(|r| r.temp_c <= self.thresholds_for(&r.name).low);
                if safe {
                    self.mode = EmergencyMode::Normal;
                    self.tripped.clear();
                    log::warn!("Emergency cleared: all sensors at or below their low thresholds");
                    Transition::Cleared
                } else {
                    Transition::Unchanged
                }
            }
        }
    }
}
