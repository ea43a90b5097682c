// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Direction of travel of the critical sensor between two ticks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default noise margin in degrees.
pub const DEFAULT_TREND_MARGIN: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// Classifies movements smaller than `margin` as noise.
#[derive(Debug, Clone, Copy)]
pub struct TrendTracker {
    margin: f64,
}

impl TrendTracker {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    /// Returns the value to remember for next tick and the direction.
    ///
    /// With no previous observation the direction is always stable.
    pub fn update(&self, previous: Option<f64>, current: f64) -> (f64, Trend) {
        let trend = match previous {
            None => Trend::Stable,
            Some(prev) if current > prev + self.margin => Trend::Rising,
            Some(prev) if current < prev - self.margin => Trend::Falling,
            Some(_) => Trend::Stable,
        };
        (current, trend)
    }
}

impl Default for TrendTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_MARGIN)
    }
}

/// Persisted trend of the critical sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendState {
    pub previous: Option<f64>,
    pub direction: Trend,
}

impl TrendState {
    pub fn observe(&mut self, tracker: &TrendTracker, current: f64) -> Trend {
        let (previous, direction) = tracker.update(self.previous, current);
        self.previous = Some(previous);
        self.direction = direction;
        direction
    }
}
