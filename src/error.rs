// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error taxonomy for the governor.
//!
//! Only [`Error::Configuration`] is fatal, and only at startup. Everything
//! else is raised inside a tick and logged by the control loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed curve, boost or threshold configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A sensor read failed or produced nothing usable.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// A call into the fan hardware failed.
    #[error("hardware write failed: {0}")]
    HardwareWrite(String),

    /// A metrics record could not be written.
    #[error("metrics write failed: {0}")]
    MetricsWrite(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
