// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Client-daemon protocol over Unix domain sockets.
//!
//! Messages are newline-delimited JSON. The client sends a [`Request`]
//! and the daemon replies with a [`Response`]. After `subscribe` the
//! daemon keeps pushing a `status` message after every tick until the
//! client disconnects.

use crate::config::Config;
use crate::metrics::TickSnapshot;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests (TUI -> Daemon)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Latest tick snapshot.
    #[serde(rename = "get_status")]
    GetStatus,

    /// The configuration the daemon is running with.
    #[serde(rename = "get_config")]
    GetConfig,

    /// Push a status message after every tick.
    #[serde(rename = "subscribe")]
    Subscribe,
}

// ---------------------------------------------------------------------------
// Responses (Daemon -> TUI)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// `None` until the first tick has completed.
    #[serde(rename = "status")]
    Status { snapshot: Option<TickSnapshot> },

    #[serde(rename = "config")]
    Config { config: Box<Config> },

    #[serde(rename = "error")]
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Encode a message as a newline-delimited JSON string.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string(msg)?;
    s.push('\n');
    Ok(s)
}

/// Decode a message from a JSON string (newline-trimmed).
pub fn decode<'a, T: Deserialize<'a>>(s: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(s.trim())
}
