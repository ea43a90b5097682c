// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Write suppression for fan banks.
//!
//! A duty cycle goes to hardware when it differs from what the bank is
//! already running at, or when the driving temperature has moved by at
//! least `min_temp_delta` since the last write.

use crate::hardware::HardwareSink;
use crate::{MAX_DUTY, Result};

/// Tracked state of one fan bank.
#[derive(Debug, Clone, PartialEq)]
pub struct FanBank {
    /// 1-based bank id
    pub id: u8,
    /// Duty cycle last sent to hardware
    pub duty: u8,
    /// Temperature that drove the last write, if any
    pub ref_temp: Option<f64>,
}

impl FanBank {
    pub fn new(id: u8, startup_duty: u8) -> Self {
        Self {
            id,
            duty: startup_duty,
            ref_temp: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DutyCycleLimiter {
    min_temp_delta: f64,
    min_duty: u8,
}

impl DutyCycleLimiter {
    pub fn new(min_temp_delta: f64, min_duty: u8) -> Self {
        Self {
            min_temp_delta,
            min_duty: min_duty.min(MAX_DUTY),
        }
    }

    pub fn clamp(&self, duty: u8) -> u8 {
        duty.clamp(self.min_duty, MAX_DUTY)
    }

    pub fn should_apply(&self, bank: &FanBank, duty: u8, ref_temp: f64) -> bool {
        if self.clamp(duty) != bank.duty {
            return true;
        }
        match bank.ref_temp {
            None => true,
            Some(prev) => (ref_temp - prev).abs() >= self.min_temp_delta,
        }
    }

    /// Record the new duty on `bank`, then write it through `sink`.
    ///
    /// The tracked state is updated even if the write fails; the next
    /// tick compares against it and resends if needed. Returns the duty
    /// that was sent.
    pub fn apply(
        &self,
        bank: &mut FanBank,
        duty: u8,
        ref_temp: f64,
        sink: &mut dyn HardwareSink,
    ) -> Result<u8> {
        let duty = self.clamp(duty);
        bank.duty = duty;
        if ref_temp.is_finite() {
            bank.ref_temp = Some(ref_temp);
        }
        sink.set_duty_cycle(bank.id, duty)?;
        Ok(duty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(u8, u8)>,
        fail: bool,
    }

    impl HardwareSink for Recorder {
        fn set_manual_mode(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_duty_cycle(&mut self, bank: u8, percent: u8) -> Result<()> {
            self.writes.push((bank, percent));
            if self.fail {
                return Err(Error::HardwareWrite("bmc busy".to_string()));
            }
            Ok(())
        }
    }

    fn bank_at(duty: u8, ref_temp: f64) -> FanBank {
        FanBank {
            id: 1,
            duty,
            ref_temp: Some(ref_temp),
        }
    }

    #[test]
    fn test_small_temp_change_same_duty_is_suppressed() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        assert!(!limiter.should_apply(&bank_at(20, 50.0), 20, 50.3));
        assert!(!limiter.should_apply(&bank_at(20, 50.0), 20, 49.1));
    }

    #[test]
    fn test_duty_change_is_applied() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        assert!(limiter.should_apply(&bank_at(20, 50.0), 25, 50.0));
    }

    #[test]
    fn test_temp_delta_at_threshold_is_applied() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        assert!(limiter.should_apply(&bank_at(20, 50.0), 20, 51.0));
        assert!(limiter.should_apply(&bank_at(20, 50.0), 20, 48.5));
    }

    #[test]
    fn test_first_write_always_applies() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        assert!(limiter.should_apply(&FanBank::new(1, 100), 100, 40.0));
    }

    #[test]
    fn test_requests_below_floor_compare_clamped() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        assert!(!limiter.should_apply(&bank_at(10, 30.0), 4, 30.2));
    }

    #[test]
    fn test_apply_clamps_and_writes_once() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        let mut sink = Recorder::default();
        let mut bank = bank_at(20, 50.0);

        assert_eq!(limiter.apply(&mut bank, 5, 35.0, &mut sink).unwrap(), 10);
        assert_eq!(bank, bank_at(10, 35.0));

        assert_eq!(limiter.apply(&mut bank, 150, 95.0, &mut sink).unwrap(), 100);
        assert_eq!(sink.writes, vec![(1, 10), (1, 100)]);
    }

    #[test]
    fn test_failed_write_keeps_tracked_state() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        let mut sink = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut bank = bank_at(20, 50.0);

        assert!(limiter.apply(&mut bank, 35, 60.0, &mut sink).is_err());
        assert_eq!(bank, bank_at(35, 60.0));
        assert_eq!(sink.writes.len(), 1);
    }

    #[test]
    fn test_non_finite_ref_temp_is_not_recorded() {
        let limiter = DutyCycleLimiter::new(1.0, 10);
        let mut sink = Recorder::default();
        let mut bank = bank_at(20, 50.0);
        limiter.apply(&mut bank, 100, f64::NAN, &mut sink).unwrap();
        assert_eq!(bank.ref_temp, Some(50.0));
        assert_eq!(bank.duty, 100);
    }
}
