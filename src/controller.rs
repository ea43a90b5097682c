// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The control loop.
//!
//! One tick, in order:
//!   1. read sensors
//!   2. update the critical sensor trend
//!   3. interpolate a base duty per bank
//!   4. add boosts driven by the critical sensor
//!   5. evaluate the emergency override
//!   6. record metrics
//!   7. write changed duty cycles to hardware
//!
//! Nothing in a tick is fatal. State carried between ticks lives in
//! [`ControllerState`] and the [`EmergencyGovernor`].

use crate::boost::BoostPlan;
use crate::config::{BankConfig, Config, ControlConfig};
use crate::curve::DutyCurve;
use crate::emergency::EmergencyGovernor;
use crate::hardware::{self, HardwareSink};
use crate::limiter::{DutyCycleLimiter, FanBank};
use crate::metrics::{self, BankDuty, MetricsSink, TickSnapshot};
use crate::sensors::{self, SensorSource, TemperatureReading};
use crate::trend::{Trend, TrendState, TrendTracker};
use crate::{MAX_DUTY, Result};
use std::collections::BTreeMap;

/// Mutable state owned by the loop.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub banks: Vec<FanBank>,
    pub trend: TrendState,
    /// Consecutive ticks without a usable critical reading
    pub critical_failures: u32,
    /// Mirrors the emergency governor after each tick
    pub emergency: bool,
    pub tick: u64,
}

pub struct ControlLoop {
    curve: DutyCurve,
    boost: BoostPlan,
    governor: EmergencyGovernor,
    limiter: DutyCycleLimiter,
    tracker: TrendTracker,
    banks: Vec<BankConfig>,
    control: ControlConfig,
    host: String,
    state: ControllerState,
    sensors: Box<dyn SensorSource + Send>,
    hardware: Box<dyn HardwareSink + Send>,
    metrics: Vec<Box<dyn MetricsSink + Send>>,
}

impl ControlLoop {
    /// Compile the configuration. Any error here is a configuration error
    /// and must stop the daemon before the loop starts.
    pub fn new(
        config: &Config,
        host: impl Into<String>,
        sensors: Box<dyn SensorSource + Send>,
        hardware: Box<dyn HardwareSink + Send>,
        metrics: Vec<Box<dyn MetricsSink + Send>>,
    ) -> Result<Self> {
        config.validate()?;
        let control = config.control.clone();

        Ok(Self {
            curve: DutyCurve::build(&config.curve, control.min_duty)?,
            boost: BoostPlan::build(&config.boost)?,
            governor: EmergencyGovernor::new(&config.emergency)?,
            limiter: DutyCycleLimiter::new(control.min_temp_delta, control.min_duty),
            tracker: TrendTracker::new(control.trend_margin),
            banks: config.banks.clone(),
            host: host.into(),
            state: ControllerState {
                banks: config
                    .banks
                    .iter()
                    .map(|b| FanBank::new(b.id, control.startup_duty))
                    .collect(),
                trend: TrendState::default(),
                critical_failures: 0,
                emergency: false,
                tick: 0,
            },
            control,
            sensors,
            hardware,
            metrics,
        })
    }

    /// Build the loop with the collaborators named in `config`.
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        config.validate()?;
        let host = metrics::host_tag(config.daemon.host.as_deref());
        Self::new(
            config,
            host,
            sensors::from_config(&config.sensors)?,
            hardware::from_config(&config.hardware, dry_run)?,
            metrics::from_config(&config.metrics),
        )
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn emergency_active(&self) -> bool {
        self.state.emergency
    }

    /// Take manual control and drive every bank at the startup duty.
    /// Failures are logged; the loop will keep writing regardless.
    pub fn startup(&mut self) {
        log::info!(
            "Taking manual fan control, {} bank(s) to {}%",
            self.state.banks.len(),
            self.control.startup_duty
        );
        if let Err(e) = self.hardware.set_manual_mode() {
            log::error!("Failed to enable manual fan mode: {e}");
        }
        for bank in &self.state.banks {
            if let Err(e) = self.hardware.set_duty_cycle(bank.id, bank.duty) {
                log::error!("Bank {}: {e}", bank.id);
            }
        }
    }

    /// Hand fan control back to the firmware.
    pub fn restore(&mut self) {
        match self.hardware.restore_automatic() {
            Ok(()) => log::info!("Restored automatic fan control"),
            Err(e) => log::error!("Failed to restore automatic fan control: {e}"),
        }
    }

    /// Run one full tick and return what was decided.
    pub fn tick(&mut self) -> TickSnapshot {
        self.state.tick += 1;

        // 1. sensors
        let readings = self.acquire();

        // 2. critical sensor and trend
        let crit_name = self.control.critical_sensor.clone();
        let (critical_temp, trend) = match find(&readings, &crit_name) {
            Some(t) => {
                self.state.critical_failures = 0;
                (Some(t), self.state.trend.observe(&self.tracker, t))
            }
            None => {
                self.state.critical_failures = self.state.critical_failures.saturating_add(1);
                self.state.trend = TrendState::default();
                let fallback = max_temp(&readings);
                log::warn!(
                    "Critical sensor '{crit_name}' unavailable ({} tick(s)), using hottest other reading: {}",
                    self.state.critical_failures,
                    fmt_temp(fallback)
                );
                (fallback, Trend::Stable)
            }
        };
        let sensor_fault = self.state.critical_failures >= self.control.max_critical_failures.max(1);
        if sensor_fault {
            log::error!(
                "Critical sensor '{crit_name}' unusable for {} ticks, forcing all banks to {MAX_DUTY}%",
                self.state.critical_failures
            );
        }

        // 3. base curve per bank
        let hottest = max_temp(&readings);
        let mut duties = BTreeMap::new();
        let mut ref_temps = Vec::with_capacity(self.banks.len());
        for bank in &self.banks {
            let temp = find(&readings, &bank.sensor).or_else(|| {
                log::warn!(
                    "Bank {}: sensor '{}' unavailable, using hottest reading: {}",
                    bank.id,
                    bank.sensor,
                    fmt_temp(hottest)
                );
                hottest
            });
            let duty = temp.map_or(MAX_DUTY, |t| self.curve.interpolate(t));
            log::debug!("Bank {}: curve {}% at {}", bank.id, duty, fmt_temp(temp));
            duties.insert(bank.id, duty);
            ref_temps.push(temp);
        }

        // 4. boosts
        if let Some(crit) = critical_temp {
            for (bank, add) in self.boost.apply(crit, trend, &mut duties) {
                log::debug!("Bank {bank}: +{add}% boost ({crit_name} {crit:.1}°C, {trend})");
            }
        }

        // 5. emergency override
        self.governor.evaluate(&readings);
        let emergency = self.governor.is_active();
        self.state.emergency = emergency;
        if emergency {
            log::warn!("Emergency mode active: holding all banks at {MAX_DUTY}%");
        }
        let force_all = emergency || sensor_fault;
        if force_all {
            duties.values_mut().for_each(|d| *d = MAX_DUTY);
        }

        // Decide writes now so the metrics record reflects them.
        let plan: Vec<(u8, Option<f64>, bool)> = self
            .state
            .banks
            .iter()
            .zip(&ref_temps)
            .map(|(bank, temp)| {
                let duty = self.limiter.clamp(duties.get(&bank.id).copied().unwrap_or(MAX_DUTY));
                let write = match temp {
                    _ if force_all => true,
                    None => true,
                    Some(t) => self.limiter.should_apply(bank, duty, *t),
                };
                (duty, *temp, write)
            })
            .collect();

        // 6. metrics
        let snapshot = TickSnapshot {
            host: self.host.clone(),
            timestamp: metrics::unix_now(),
            tick: self.state.tick,
            temperatures: readings
                .iter()
                .map(|r| (r.name.clone(), r.temp_c))
                .collect(),
            critical_temp,
            trend,
            banks: self
                .state
                .banks
                .iter()
                .zip(&plan)
                .map(|(bank, (duty, _, write))| BankDuty {
                    bank: bank.id,
                    duty: *duty,
                    applied: *write,
                })
                .collect(),
            emergency,
            sensor_fault,
        };
        for sink in &mut self.metrics {
            if let Err(e) = sink.record(&snapshot) {
                log::warn!("{e}");
            }
        }

        // 7. hardware
        let quiet = emergency && self.control.quiet_during_emergency;
        for (bank, (duty, temp, write)) in self.state.banks.iter_mut().zip(plan) {
            if !write {
                continue;
            }
            let previous = bank.duty;
            let sent = self.limiter.apply(
                bank,
                duty,
                temp.unwrap_or(f64::NAN),
                self.hardware.as_mut(),
            );
            match sent {
                Ok(sent) if quiet || sent == previous => {
                    log::debug!("Bank {}: {sent}% at {}", bank.id, fmt_temp(temp));
                }
                Ok(sent) => {
                    log::info!(
                        "Bank {}: {previous}% -> {sent}% at {}",
                        bank.id,
                        fmt_temp(temp)
                    );
                }
                Err(e) => log::error!("Bank {}: {e}", bank.id),
            }
        }

        snapshot
    }

    /// Read sensors, dropping non-finite values and an implausible
    /// critical reading.
    fn acquire(&mut self) -> Vec<TemperatureReading> {
        let mut readings = match self.sensors.read() {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{e}; treating all sensors as absent");
                Vec::new()
            }
        };

        let crit_name = &self.control.critical_sensor;
        let plausible_min = self.control.plausible_min;
        readings.retain(|r| {
            if !r.temp_c.is_finite() {
                log::warn!("Sensor '{}' reported {}, ignoring", r.name, r.temp_c);
                return false;
            }
            if &r.name == crit_name && r.temp_c < plausible_min {
                log::warn!(
                    "Critical sensor '{}' reported implausible {:.1}°C (< {plausible_min:.1}°C)",
                    r.name,
                    r.temp_c
                );
                return false;
            }
            true
        });
        readings
    }
}

fn find(readings: &[TemperatureReading], name: &str) -> Option<f64> {
    readings.iter().find(|r| r.name == name).map(|r| r.temp_c)
}

fn max_temp(readings: &[TemperatureReading]) -> Option<f64> {
    readings.iter().map(|r| r.temp_c).reduce(f64::max)
}

fn fmt_temp(temp: Option<f64>) -> String {
    temp.map(|t| format!("{t:.1}°C"))
        .unwrap_or_else(|| "no reading".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::{Arc, Mutex};

    // -- fakes ---------------------------------------------------------------

    /// Readings shared with the test; `None` makes the read fail.
    #[derive(Clone, Default)]
    struct FakeSensors(Arc<Mutex<Option<Vec<TemperatureReading>>>>);

    impl FakeSensors {
        fn set(&self, readings: &[(&str, f64)]) {
            *self.0.lock().unwrap() = Some(
                readings
                    .iter()
                    .map(|&(n, t)| TemperatureReading::new(n, t))
                    .collect(),
            );
        }

        fn temps(&self, cpu1: f64, ram: f64, cpu2: f64) {
            self.set(&[("cpu1", cpu1), ("ram", ram), ("cpu2", cpu2)]);
        }

        fn fail(&self) {
            *self.0.lock().unwrap() = None;
        }
    }

    impl SensorSource for FakeSensors {
        fn read(&mut self) -> Result<Vec<TemperatureReading>> {
            self.0
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::SensorUnavailable("ipmitool timed out".to_string()))
        }
    }

    #[derive(Default)]
    struct FanLog {
        manual: bool,
        restored: bool,
        writes: Vec<(u8, u8)>,
        fail: bool,
    }

    #[derive(Clone, Default)]
    struct FakeFans(Arc<Mutex<FanLog>>);

    impl FakeFans {
        fn take_writes(&self) -> Vec<(u8, u8)> {
            std::mem::take(&mut self.0.lock().unwrap().writes)
        }
    }

    impl HardwareSink for FakeFans {
        fn set_manual_mode(&mut self) -> Result<()> {
            self.0.lock().unwrap().manual = true;
            Ok(())
        }

        fn set_duty_cycle(&mut self, bank: u8, percent: u8) -> Result<()> {
            let mut log = self.0.lock().unwrap();
            log.writes.push((bank, percent));
            if log.fail {
                return Err(Error::HardwareWrite("BMC not responding".to_string()));
            }
            Ok(())
        }

        fn restore_automatic(&mut self) -> Result<()> {
            self.0.lock().unwrap().restored = true;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeMetrics {
        records: Arc<Mutex<Vec<TickSnapshot>>>,
        fail: bool,
    }

    impl MetricsSink for FakeMetrics {
        fn record(&mut self, snapshot: &TickSnapshot) -> Result<()> {
            if self.fail {
                return Err(Error::MetricsWrite("disk full".to_string()));
            }
            self.records.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    struct Rig {
        ctl: ControlLoop,
        sensors: FakeSensors,
        fans: FakeFans,
        metrics: FakeMetrics,
    }

    fn rig_with(config: &Config, metrics: FakeMetrics) -> Rig {
        let sensors = FakeSensors::default();
        let fans = FakeFans::default();
        let mut ctl = ControlLoop::new(
            config,
            "node01",
            Box::new(sensors.clone()),
            Box::new(fans.clone()),
            vec![Box::new(metrics.clone())],
        )
        .unwrap();
        ctl.startup();
        fans.take_writes();
        Rig {
            ctl,
            sensors,
            fans,
            metrics,
        }
    }

    fn rig() -> Rig {
        rig_with(&Config::default(), FakeMetrics::default())
    }

    fn duties(snapshot: &TickSnapshot) -> Vec<u8> {
        snapshot.banks.iter().map(|b| b.duty).collect()
    }

    // -- tests ---------------------------------------------------------------

    #[test]
    fn test_startup_takes_manual_control_at_full_speed() {
        let sensors = FakeSensors::default();
        let fans = FakeFans::default();
        let mut ctl = ControlLoop::new(
            &Config::default(),
            "node01",
            Box::new(sensors),
            Box::new(fans.clone()),
            Vec::new(),
        )
        .unwrap();
        ctl.startup();
        assert!(fans.0.lock().unwrap().manual);
        assert_eq!(fans.take_writes(), vec![(1, 100), (2, 100)]);

        ctl.restore();
        assert!(fans.0.lock().unwrap().restored);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.curve.truncate(1);
        let result = ControlLoop::new(
            &config,
            "node01",
            Box::new(FakeSensors::default()),
            Box::new(FakeFans::default()),
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_quiet_system_settles_on_curve() {
        let mut r = rig();
        r.sensors.temps(40.0, 50.0, 40.0);

        let snap = r.ctl.tick();
        assert_eq!(duties(&snap), vec![15, 15]);
        assert!(!snap.emergency);
        assert!(!snap.sensor_fault);
        assert_eq!(snap.critical_temp, Some(50.0));
        assert_eq!(snap.trend, Trend::Stable);
        assert_eq!(snap.host, "node01");
        assert_eq!(snap.temperatures.len(), 3);
        assert_eq!(r.fans.take_writes(), vec![(1, 15), (2, 15)]);
        assert_eq!(r.ctl.state().banks[0].ref_temp, Some(40.0));
    }

    #[test]
    fn test_noise_does_not_cause_chatter() {
        let mut r = rig();
        r.sensors.temps(40.0, 50.0, 40.0);
        r.ctl.tick();
        r.fans.take_writes();

        r.sensors.temps(40.3, 50.2, 40.4);
        let snap = r.ctl.tick();
        assert!(snap.banks.iter().all(|b| !b.applied));
        assert!(r.fans.take_writes().is_empty());

        // Same duty, but the temperature moved a full degree.
        r.sensors.temps(41.0, 50.2, 40.4);
        r.ctl.tick();
        assert_eq!(r.fans.take_writes(), vec![(1, 16)]);
    }

    #[test]
    fn test_rising_memory_boosts_primary_bank_first() {
        let mut r = rig();
        r.sensors.temps(40.0, 50.0, 40.0);
        r.ctl.tick();

        r.sensors.temps(40.0, 58.0, 40.0);
        let snap = r.ctl.tick();
        assert_eq!(snap.trend, Trend::Rising);
        assert_eq!(duties(&snap), vec![25, 15]);

        r.sensors.temps(40.0, 66.0, 40.0);
        assert_eq!(duties(&r.ctl.tick()), vec![45, 25]);

        r.sensors.temps(40.0, 72.0, 40.0);
        let snap = r.ctl.tick();
        assert_eq!(duties(&snap), vec![55, 35]);
        assert!(!snap.emergency);
    }

    #[test]
    fn test_stable_memory_keeps_boost_falling_drops_it() {
        let mut r = rig();
        r.sensors.temps(40.0, 72.0, 40.0);
        // First observation is stable, which still earns a boost.
        assert_eq!(duties(&r.ctl.tick()), vec![55, 35]);

        r.sensors.temps(40.0, 70.0, 40.0);
        let snap = r.ctl.tick();
        assert_eq!(snap.trend, Trend::Falling);
        assert_eq!(duties(&snap), vec![15, 15]);
    }

    #[test]
    fn test_emergency_overrides_everything_until_safe() {
        let mut r = rig();
        r.sensors.temps(40.0, 72.0, 40.0);
        r.ctl.tick();
        r.fans.take_writes();

        r.sensors.temps(40.0, 91.0, 40.0);
        let snap = r.ctl.tick();
        assert!(snap.emergency);
        assert_eq!(duties(&snap), vec![100, 100]);
        assert_eq!(r.fans.take_writes(), vec![(1, 100), (2, 100)]);

        // Between the thresholds: stays latched and keeps writing.
        for ram in [89.0, 76.0, 84.0, 76.0] {
            r.sensors.temps(40.0, ram, 40.0);
            let snap = r.ctl.tick();
            assert!(snap.emergency, "cleared at {ram}");
            assert_eq!(duties(&snap), vec![100, 100]);
            assert_eq!(r.fans.take_writes(), vec![(1, 100), (2, 100)]);
        }

        r.sensors.temps(40.0, 74.0, 40.0);
        let snap = r.ctl.tick();
        assert!(!snap.emergency);
        assert_eq!(duties(&snap), vec![15, 15]);
        assert_eq!(r.fans.take_writes(), vec![(1, 15), (2, 15)]);
        assert!(!r.ctl.emergency_active());
    }

    #[test]
    fn test_emergency_holds_while_hot_sensor_is_missing() {
        let mut r = rig();
        r.sensors.temps(95.0, 60.0, 40.0);
        assert!(r.ctl.tick().emergency);

        r.sensors.set(&[("ram", 60.0), ("cpu2", 50.0)]);
        let snap = r.ctl.tick();
        assert!(snap.emergency);
        assert_eq!(duties(&snap), vec![100, 100]);
        assert!(r.ctl.state().emergency);

        r.sensors.temps(70.0, 60.0, 50.0);
        let snap = r.ctl.tick();
        assert!(!snap.emergency);
        assert!(!r.ctl.state().emergency);
    }

    #[test]
    fn test_emergency_holds_while_critical_is_implausible() {
        let mut r = rig();
        r.sensors.temps(40.0, 92.0, 40.0);
        assert!(r.ctl.tick().emergency);

        r.sensors.temps(40.0, 12.0, 40.0);
        let snap = r.ctl.tick();
        assert!(snap.emergency);
        assert_eq!(duties(&snap), vec![100, 100]);

        r.sensors.temps(40.0, 70.0, 40.0);
        assert!(!r.ctl.tick().emergency);
    }

    #[test]
    fn test_hot_cpu_triggers_emergency() {
        let mut r = rig();
        r.sensors.temps(92.0, 50.0, 40.0);
        let snap = r.ctl.tick();
        assert!(snap.emergency);
        assert_eq!(duties(&snap), vec![100, 100]);
    }

    #[test]
    fn test_missing_critical_falls_back_to_hottest_other() {
        let mut r = rig();
        r.sensors.set(&[("cpu1", 60.0), ("cpu2", 62.0)]);
        let snap = r.ctl.tick();
        assert_eq!(snap.critical_temp, Some(62.0));
        assert_eq!(snap.trend, Trend::Stable);
        // cpu1 60 -> 30 plus 20 boost at 62; cpu2 62 -> 33, below bank 2's threshold
        assert_eq!(duties(&snap), vec![50, 33]);
        assert!(!snap.sensor_fault);
        assert_eq!(r.ctl.state().critical_failures, 1);
    }

    #[test]
    fn test_trend_restarts_after_critical_outage() {
        let mut r = rig();
        r.sensors.temps(40.0, 50.0, 40.0);
        r.ctl.tick();

        r.sensors.set(&[("cpu1", 40.0), ("cpu2", 40.0)]);
        r.ctl.tick();
        assert_eq!(r.ctl.state().trend.previous, None);

        r.sensors.temps(40.0, 58.0, 40.0);
        let snap = r.ctl.tick();
        assert_eq!(snap.trend, Trend::Stable);
        assert_eq!(r.ctl.state().trend.previous, Some(58.0));
    }

    #[test]
    fn test_implausible_critical_is_replaced() {
        let mut r = rig();
        r.sensors.temps(60.0, 12.0, 62.0);
        let snap = r.ctl.tick();
        assert_eq!(snap.critical_temp, Some(62.0));
        assert!(!snap.temperatures.contains_key("ram"));
    }

    #[test]
    fn test_persistent_critical_outage_forces_full_speed() {
        let mut r = rig();
        r.sensors.set(&[("cpu1", 40.0), ("cpu2", 40.0)]);
        assert!(!r.ctl.tick().sensor_fault);
        assert!(!r.ctl.tick().sensor_fault);
        let snap = r.ctl.tick();
        assert!(snap.sensor_fault);
        assert!(!snap.emergency);
        assert_eq!(duties(&snap), vec![100, 100]);

        r.sensors.temps(40.0, 50.0, 40.0);
        let snap = r.ctl.tick();
        assert!(!snap.sensor_fault);
        assert_eq!(duties(&snap), vec![15, 15]);
        assert_eq!(r.ctl.state().critical_failures, 0);
    }

    #[test]
    fn test_sensor_read_failure_is_not_fatal() {
        let mut r = rig();
        r.sensors.temps(40.0, 50.0, 40.0);
        r.ctl.tick();
        r.fans.take_writes();

        r.sensors.fail();
        let snap = r.ctl.tick();
        assert!(snap.temperatures.is_empty());
        assert_eq!(snap.critical_temp, None);
        assert_eq!(duties(&snap), vec![100, 100]);
        assert_eq!(r.fans.take_writes(), vec![(1, 100), (2, 100)]);
        assert_eq!(r.ctl.state().banks[0].ref_temp, Some(40.0));
    }

    #[test]
    fn test_missing_bank_sensor_uses_hottest_reading() {
        let mut r = rig();
        r.sensors.set(&[("cpu1", 40.0), ("ram", 50.0)]);
        let snap = r.ctl.tick();
        assert_eq!(duties(&snap), vec![15, 20]);
        assert_eq!(r.ctl.state().banks[1].ref_temp, Some(50.0));
    }

    #[test]
    fn test_hardware_failure_does_not_roll_back_or_stop() {
        let mut r = rig();
        r.fans.0.lock().unwrap().fail = true;
        r.sensors.temps(40.0, 50.0, 40.0);
        let snap = r.ctl.tick();

        assert_eq!(r.fans.take_writes(), vec![(1, 15), (2, 15)]);
        assert_eq!(r.ctl.state().banks[0].duty, 15);
        assert_eq!(r.metrics.records.lock().unwrap().len(), 1);
        assert!(snap.banks.iter().all(|b| b.applied));

        r.fans.0.lock().unwrap().fail = false;
        r.sensors.temps(42.0, 50.0, 40.0);
        r.ctl.tick();
        assert_eq!(r.fans.take_writes(), vec![(1, 16)]);
    }

    #[test]
    fn test_metrics_every_tick_and_failures_are_not_fatal() {
        let mut r = rig();
        r.sensors.temps(40.0, 50.0, 40.0);
        r.ctl.tick();
        r.ctl.tick();
        let records = r.metrics.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tick, 2);
        assert!(records[1].banks.iter().all(|b| !b.applied));
        drop(records);

        let failing = FakeMetrics {
            fail: true,
            ..Default::default()
        };
        let mut r = rig_with(&Config::default(), failing);
        r.sensors.temps(40.0, 50.0, 40.0);
        r.ctl.tick();
        assert_eq!(r.fans.take_writes(), vec![(1, 15), (2, 15)]);
    }

    #[test]
    fn test_min_duty_floor_applies_to_output() {
        let mut config = Config::default();
        config.control.min_duty = 25;
        let mut r = rig_with(&config, FakeMetrics::default());
        r.sensors.temps(20.0, 40.0, 35.0);
        assert_eq!(duties(&r.ctl.tick()), vec![25, 25]);
    }
}
