// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan bank backends.
//!
//! Every call is an idempotent "set" command, so retrying on the next
//! tick after a failure is always safe.

use crate::hwmon::{self, Fan};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::process::Command;

pub trait HardwareSink {
    /// Take fan control away from the firmware.
    fn set_manual_mode(&mut self) -> Result<()>;

    /// Drive `bank` (1-based) at `percent` duty.
    fn set_duty_cycle(&mut self, bank: u8, percent: u8) -> Result<()>;

    /// Hand fan control back to the firmware.
    fn restore_automatic(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sink")]
pub enum HardwareConfig {
    /// BMC raw commands through ipmitool. `{zone}` and `{duty}` in the
    /// argument templates are replaced with hex bytes.
    ///
    /// The default templates are Supermicro X9/X10 commands. Any other
    /// BMC (IBM IMM, iDRAC, ...) needs its own `manual_mode`, `set_duty`
    /// and `auto_mode` in `[hardware]`.
    #[serde(rename = "ipmitool")]
    IpmiTool {
        #[serde(default = "default_ipmitool")]
        program: String,
        #[serde(default = "default_manual_mode")]
        manual_mode: Vec<String>,
        #[serde(default = "default_set_duty")]
        set_duty: Vec<String>,
        #[serde(default = "default_auto_mode")]
        auto_mode: Vec<String>,
        /// Zone byte for bank 1.
        #[serde(default)]
        zone_offset: u8,
    },

    /// PWM outputs under /sys/class/hwmon.
    #[serde(rename = "hwmon")]
    Hwmon { banks: Vec<HwmonBank> },

    /// Log writes without touching hardware.
    #[serde(rename = "dry-run")]
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwmonBank {
    pub bank: u8,
    /// hwmon PWM id, e.g. "hwmon3/pwm1"
    pub pwm: String,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig::IpmiTool {
            program: default_ipmitool(),
            manual_mode: default_manual_mode(),
            set_duty: default_set_duty(),
            auto_mode: default_auto_mode(),
            zone_offset: 0,
        }
    }
}

fn default_ipmitool() -> String {
    "ipmitool".to_string()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// Supermicro X9/X10 style: "full" fan mode, then per-zone duty.
fn default_manual_mode() -> Vec<String> {
    strings(&["raw", "0x30", "0x45", "0x01", "0x01"])
}

fn default_set_duty() -> Vec<String> {
    strings(&["raw", "0x30", "0x70", "0x66", "0x01", "{zone}", "{duty}"])
}

fn default_auto_mode() -> Vec<String> {
    strings(&["raw", "0x30", "0x45", "0x01", "0x00"])
}

/// Build the configured sink. `dry_run` overrides whatever is configured.
pub fn from_config(config: &HardwareConfig, dry_run: bool) -> Result<Box<dyn HardwareSink + Send>> {
    if dry_run {
        return Ok(Box::new(DryRunSink));
    }
    match config {
        HardwareConfig::IpmiTool {
            program,
            manual_mode,
            set_duty,
            auto_mode,
            zone_offset,
        } => Ok(Box::new(IpmiToolSink {
            program: program.clone(),
            manual_mode: manual_mode.clone(),
            set_duty: set_duty.clone(),
            auto_mode: auto_mode.clone(),
            zone_offset: *zone_offset,
        })),
        HardwareConfig::Hwmon { banks } => {
            let fans = hwmon::discover_fans()?;
            Ok(Box::new(HwmonSink::resolve(banks, &fans)?))
        }
        HardwareConfig::DryRun => Ok(Box::new(DryRunSink)),
    }
}

// ---------------------------------------------------------------------------
// ipmitool
// ---------------------------------------------------------------------------

pub struct IpmiToolSink {
    program: String,
    manual_mode: Vec<String>,
    set_duty: Vec<String>,
    auto_mode: Vec<String>,
    zone_offset: u8,
}

impl IpmiToolSink {
    fn zone(&self, bank: u8) -> u8 {
        bank.saturating_sub(1).saturating_add(self.zone_offset)
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| Error::HardwareWrite(format!("{} failed: {e}", self.program)))?;

        log::trace!(
            "{} {}: {}",
            self.program,
            args.join(" "),
            String::from_utf8_lossy(&output.stdout).trim()
        );

        if !output.status.success() {
            return Err(Error::HardwareWrite(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Substitute `{zone}` and `{duty}` with `0xNN` bytes.
pub fn render_args(template: &[String], zone: u8, duty: u8) -> Vec<String> {
    template
        .iter()
        .map(|a| {
            a.replace("{zone}", &format!("0x{zone:02x}"))
                .replace("{duty}", &format!("0x{duty:02x}"))
        })
        .collect()
}

impl HardwareSink for IpmiToolSink {
    fn set_manual_mode(&mut self) -> Result<()> {
        self.run(&self.manual_mode)
    }

    fn set_duty_cycle(&mut self, bank: u8, percent: u8) -> Result<()> {
        self.run(&render_args(&self.set_duty, self.zone(bank), percent))
    }

    fn restore_automatic(&mut self) -> Result<()> {
        self.run(&self.auto_mode)
    }
}

// ---------------------------------------------------------------------------
// hwmon
// ---------------------------------------------------------------------------

pub struct HwmonSink {
    banks: Vec<(u8, Fan)>,
}

impl HwmonSink {
    /// Map banks to discovered PWM outputs. An unknown PWM id is a
    /// configuration error.
    pub fn resolve(banks: &[HwmonBank], fans: &[Fan]) -> Result<Self> {
        let banks = banks
            .iter()
            .map(|b| {
                fans.iter()
                    .find(|f| f.id == b.pwm)
                    .map(|f| (b.bank, f.clone()))
                    .ok_or_else(|| {
                        Error::config(format!("bank {}: unknown hwmon PWM '{}'", b.bank, b.pwm))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { banks })
    }

    fn fan(&self, bank: u8) -> Result<&Fan> {
        self.banks
            .iter()
            .find(|(id, _)| *id == bank)
            .map(|(_, f)| f)
            .ok_or_else(|| Error::HardwareWrite(format!("no PWM output for bank {bank}")))
    }
}

impl HardwareSink for HwmonSink {
    fn set_manual_mode(&mut self) -> Result<()> {
        let mut failed = Vec::new();
        for (bank, fan) in &self.banks {
            if let Err(e) = hwmon::set_pwm_enable(fan, hwmon::PWM_MODE_MANUAL) {
                log::warn!("Failed to enable manual mode for bank {bank} ({}): {e}", fan.id);
                failed.push(*bank);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::HardwareWrite(format!(
                "could not enable manual mode for banks {failed:?}"
            )))
        }
    }

    fn set_duty_cycle(&mut self, bank: u8, percent: u8) -> Result<()> {
        let fan = self.fan(bank)?;
        hwmon::set_pwm(fan, hwmon::percent_to_pwm(percent))
            .map_err(|e| Error::HardwareWrite(format!("bank {bank} ({}): {e}", fan.id)))
    }

    fn restore_automatic(&mut self) -> Result<()> {
        let mut failed = Vec::new();
        for (bank, fan) in &self.banks {
            if let Err(e) = hwmon::restore_automatic(fan) {
                log::warn!("Failed to restore automatic control for bank {bank}: {e}");
                failed.push(*bank);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::HardwareWrite(format!(
                "could not restore banks {failed:?}"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

pub struct DryRunSink;

impl HardwareSink for DryRunSink {
    fn set_manual_mode(&mut self) -> Result<()> {
        log::info!("[dry-run] manual fan mode");
        Ok(())
    }

    fn set_duty_cycle(&mut self, bank: u8, percent: u8) -> Result<()> {
        log::info!("[dry-run] bank {bank} -> {percent}%");
        Ok(())
    }

    fn restore_automatic(&mut self) -> Result<()> {
        log::info!("[dry-run] automatic fan mode");
        Ok(())
    }
}
