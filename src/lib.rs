// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Closed-loop chassis fan governor.
//!
//! Each tick samples temperatures, maps them through a piecewise-linear
//! curve, adds boosts driven by a critical sensor, applies the emergency
//! override and finally writes duty cycles that actually changed.

pub mod boost;
pub mod config;
pub mod controller;
pub mod curve;
pub mod emergency;
pub mod error;
pub mod hardware;
pub mod hwmon;
pub mod limiter;
pub mod metrics;
pub mod protocol;
pub mod sensors;
pub mod trend;

pub use error::{Error, Result};

/// Lowest duty cycle that still moves air through the chassis.
pub const DEFAULT_MIN_DUTY: u8 = 10;

/// Highest duty cycle a bank can be driven to.
pub const MAX_DUTY: u8 = 100;
