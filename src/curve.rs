// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Duty-cycle curve compilation and interpolation.
//!
//! A curve maps temperature readings to fan duty cycles (percent). The
//! configured points are compiled once into line segments keyed by their
//! lower breakpoint, so interpolation is a binary search plus one line
//! equation.

use crate::{Error, MAX_DUTY, Result};
use serde::{Deserialize, Serialize};

/// A single configured point on the curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    /// Temperature in degrees Celsius
    pub temp_c: f64,
    /// Duty cycle in percent (0-100)
    pub duty: u8,
}

/// Line between two adjacent points, valid from `breakpoint` upwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSegment {
    pub breakpoint: f64,
    pub slope: f64,
    pub intercept: f64,
}

impl CurveSegment {
    fn between(lo: &CurvePoint, hi: &CurvePoint) -> Self {
        let slope = (hi.duty as f64 - lo.duty as f64) / (hi.temp_c - lo.temp_c);
        Self {
            breakpoint: lo.temp_c,
            slope,
            intercept: lo.duty as f64 - slope * lo.temp_c,
        }
    }

    fn eval(&self, temp_c: f64) -> f64 {
        self.slope * temp_c + self.intercept
    }
}

/// Compiled, immutable duty-cycle curve.
#[derive(Debug, Clone)]
pub struct DutyCurve {
    segments: Vec<CurveSegment>,
    min_duty: u8,
}

impl DutyCurve {
    /// Compile `points` into segments. Points may be given in any order.
    ///
    /// Fails if fewer than two points are given, if two points share a
    /// temperature, or if a temperature/duty is out of range.
    pub fn build(points: &[CurvePoint], min_duty: u8) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::config("curve must have at least 2 points"));
        }
        if min_duty > MAX_DUTY {
            return Err(Error::config(format!(
                "minimum duty {min_duty}% exceeds {MAX_DUTY}%"
            )));
        }
        for p in points {
            if !p.temp_c.is_finite() {
                return Err(Error::config("curve temperatures must be finite"));
            }
            if p.duty > MAX_DUTY {
                return Err(Error::config(format!(
                    "curve duty {}% at {}°C exceeds {MAX_DUTY}%",
                    p.duty, p.temp_c
                )));
            }
        }

        let mut sorted = points.to_vec();
        sorted.sort_by(|a, b| a.temp_c.total_cmp(&b.temp_c));

        let segments = sorted
            .windows(2)
            .map(|w| {
                if w[1].temp_c <= w[0].temp_c {
                    Err(Error::config(format!(
                        "duplicate curve temperature {}°C",
                        w[0].temp_c
                    )))
                } else {
                    Ok(CurveSegment::between(&w[0], &w[1]))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments, min_duty })
    }

    pub fn segments(&self) -> &[CurveSegment] {
        &self.segments
    }

    pub fn min_duty(&self) -> u8 {
        self.min_duty
    }

    /// Duty cycle for `temp_c`, rounded and clamped to `[min_duty, 100]`.
    ///
    /// - Below the lowest breakpoint: the minimum duty
    /// - Above the highest breakpoint: the last segment, extrapolated
    /// - Otherwise: the segment of the highest breakpoint `<= temp_c`
    pub fn interpolate(&self, temp_c: f64) -> u8 {
        if temp_c.is_nan() {
            return MAX_DUTY;
        }

        let idx = self.segments.partition_point(|s| s.breakpoint <= temp_c);
        if idx == 0 {
            return self.min_duty;
        }

        let duty = self.segments[idx - 1].eval(temp_c).round();
        duty.clamp(self.min_duty as f64, MAX_DUTY as f64) as u8
    }
}

/// The stock server curve: quiet at idle, full speed at 90°C.
pub fn default_curve() -> Vec<CurvePoint> {
    [
        (30.0, 10),
        (40.0, 15),
        (50.0, 20),
        (60.0, 30),
        (70.0, 45),
        (80.0, 65),
        (90.0, 100),
    ]
    .into_iter()
    .map(|(temp_c, duty)| CurvePoint { temp_c, duty })
    .collect()
}
