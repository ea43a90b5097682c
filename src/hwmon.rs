// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! hwmon sysfs access.
//!
//! Used both as a temperature source (`tempN_input`) and as a fan bank
//! backend (`pwmN` / `pwmN_enable`) on boards whose fan headers are
//! exposed through hwmon instead of a BMC.

use crate::MAX_DUTY;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// `pwmN_enable` value for manual control.
pub const PWM_MODE_MANUAL: u8 = 1;
/// `pwmN_enable` value for firmware control.
pub const PWM_MODE_AUTO: u8 = 2;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A discovered PWM output.
#[derive(Debug, Clone)]
pub struct Fan {
    /// Unique identifier, e.g. "hwmon3/pwm1"
    pub id: String,
    pub pwm_path: PathBuf,
    pub pwm_enable_path: PathBuf,
}

/// A discovered temperature sensor.
#[derive(Debug, Clone)]
pub struct TempSensor {
    /// Unique identifier, e.g. "hwmon3/temp1"
    pub id: String,
    pub label: Option<String>,
    /// Absolute path to the `tempN_input` file (millidegrees C)
    pub input_path: PathBuf,
    /// Name of the parent hwmon device
    pub hwmon_name: String,
}

/// Live reading for a temperature sensor.
#[derive(Debug, Clone)]
pub struct TempStatus {
    pub id: String,
    pub temp_c: Option<f64>,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

pub fn discover_fans() -> io::Result<Vec<Fan>> {
    discover_fans_in(Path::new(HWMON_ROOT))
}

pub fn discover_temp_sensors() -> io::Result<Vec<TempSensor>> {
    discover_temp_sensors_in(Path::new(HWMON_ROOT))
}

/// Scan an hwmon class directory for `pwmN` outputs.
pub fn discover_fans_in(root: &Path) -> io::Result<Vec<Fan>> {
    let mut fans = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let hwmon_dir = entry.path();
        let hwmon_basename = entry.file_name().to_string_lossy().to_string();

        for n in 1..=16 {
            let pwm_path = hwmon_dir.join(format!("pwm{n}"));
            if !pwm_path.exists() {
                break;
            }
            fans.push(Fan {
                id: format!("{hwmon_basename}/pwm{n}"),
                pwm_path,
                pwm_enable_path: hwmon_dir.join(format!("pwm{n}_enable")),
            });
        }
    }

    fans.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(fans)
}

/// Scan an hwmon class directory for `tempN_input` sensors.
pub fn discover_temp_sensors_in(root: &Path) -> io::Result<Vec<TempSensor>> {
    let mut sensors = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let hwmon_dir = entry.path();
        let hwmon_name = read_trimmed(&hwmon_dir.join("name")).unwrap_or_default();
        let hwmon_basename = entry.file_name().to_string_lossy().to_string();

        for n in 1..=32 {
            let input_path = hwmon_dir.join(format!("temp{n}_input"));
            if !input_path.exists() {
                break;
            }
            sensors.push(TempSensor {
                id: format!("{hwmon_basename}/temp{n}"),
                label: read_trimmed(&hwmon_dir.join(format!("temp{n}_label"))),
                input_path,
                hwmon_name: hwmon_name.clone(),
            });
        }
    }

    sensors.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sensors)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read a sensor. Unreadable or malformed files yield `temp_c: None`.
pub fn read_temp_status(sensor: &TempSensor) -> TempStatus {
    let temp_c = read_trimmed(&sensor.input_path)
        .and_then(|s| s.parse::<i64>().ok())
        .map(|millic| millic as f64 / 1000.0);

    TempStatus {
        id: sensor.id.clone(),
        temp_c,
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

pub fn set_pwm_enable(fan: &Fan, mode: u8) -> io::Result<()> {
    fs::write(&fan.pwm_enable_path, format!("{mode}"))
}

/// Set the raw PWM value. The fan must already be in manual mode.
pub fn set_pwm(fan: &Fan, value: u8) -> io::Result<()> {
    fs::write(&fan.pwm_path, format!("{value}"))
}

pub fn restore_automatic(fan: &Fan) -> io::Result<()> {
    set_pwm_enable(fan, PWM_MODE_AUTO)
}

/// Map a duty cycle percentage onto the 0-255 PWM range.
pub fn percent_to_pwm(percent: u8) -> u8 {
    let pct = percent.min(MAX_DUTY) as f64;
    (pct / MAX_DUTY as f64 * 255.0).round() as u8
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
