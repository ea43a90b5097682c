// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Per-tick metrics records and where they go.

use crate::trend::Trend;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Duty cycle of one bank after this tick's decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankDuty {
    pub bank: u8,
    /// Computed duty cycle in percent
    pub duty: u8,
    /// Whether it was written to hardware this tick
    pub applied: bool,
}

/// Everything decided in one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSnapshot {
    pub host: String,
    /// Unix seconds
    pub timestamp: u64,
    pub tick: u64,
    /// Valid readings, by sensor name
    pub temperatures: BTreeMap<String, f64>,
    /// Critical sensor value actually used (possibly a fallback)
    pub critical_temp: Option<f64>,
    pub trend: Trend,
    pub banks: Vec<BankDuty>,
    pub emergency: bool,
    /// The critical sensor has been unusable for too many ticks.
    pub sensor_fault: bool,
}

pub trait MetricsSink {
    fn record(&mut self, snapshot: &TickSnapshot) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Append one JSON object per tick to this file.
    #[serde(default)]
    pub path: Option<String>,
    /// Emit every record through the logger at debug level.
    #[serde(default = "default_log")]
    pub log: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: None,
            log: default_log(),
        }
    }
}

fn default_log() -> bool {
    true
}

pub fn from_config(config: &MetricsConfig) -> Vec<Box<dyn MetricsSink + Send>> {
    let mut sinks: Vec<Box<dyn MetricsSink + Send>> = Vec::new();
    if let Some(path) = &config.path {
        sinks.push(Box::new(JsonLinesMetrics::new(path)));
    }
    if config.log {
        sinks.push(Box::new(LogMetrics));
    }
    sinks
}

/// Host tag for metrics: the override if given, else the system hostname.
pub fn host_tag(configured: Option<&str>) -> String {
    if let Some(host) = configured {
        return host.to_string();
    }
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            log::warn!("Could not read hostname: {e}");
            "unknown".to_string()
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Appends newline-delimited JSON. The file is reopened for every record
/// so external rotation just works.
pub struct JsonLinesMetrics {
    path: PathBuf,
}

impl JsonLinesMetrics {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSink for JsonLinesMetrics {
    fn record(&mut self, snapshot: &TickSnapshot) -> Result<()> {
        let mut line = serde_json::to_string(snapshot)
            .map_err(|e| Error::MetricsWrite(format!("encode: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::MetricsWrite(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::MetricsWrite(format!("{}: {e}", self.path.display())))
    }
}

pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn record(&mut self, snapshot: &TickSnapshot) -> Result<()> {
        let duties = snapshot
            .banks
            .iter()
            .map(|b| format!("bank{}={}", b.bank, b.duty))
            .collect::<Vec<_>>()
            .join(",");
        let temps = snapshot
            .temperatures
            .iter()
            .map(|(name, t)| format!("{name}={t:.1}"))
            .collect::<Vec<_>>()
            .join(",");
        log::debug!(
            "fans,host={} {duties},{temps},emergency={}",
            snapshot.host,
            snapshot.emergency as u8
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn snapshot(tick: u64) -> TickSnapshot {
        TickSnapshot {
            host: "node01".to_string(),
            timestamp: 1_700_000_000,
            tick,
            temperatures: BTreeMap::from([
                ("cpu1".to_string(), 40.0),
                ("ram".to_string(), 50.0),
            ]),
            critical_temp: Some(50.0),
            trend: Trend::Stable,
            banks: vec![BankDuty {
                bank: 1,
                duty: 15,
                applied: true,
            }],
            emergency: false,
            sensor_fault: false,
        }
    }

    #[test]
    fn test_json_lines_appends_one_record_per_tick() {
        let path = std::env::temp_dir().join(format!("fangov-metrics-{}.jsonl", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut sink = JsonLinesMetrics::new(&path);
        sink.record(&snapshot(1)).unwrap();
        sink.record(&snapshot(2)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: TickSnapshot = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second, snapshot(2));
        assert!(lines[0].contains("\"trend\":\"stable\""));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unwritable_path_is_metrics_error() {
        let mut sink = JsonLinesMetrics::new("/nonexistent/dir/metrics.jsonl");
        assert!(matches!(
            sink.record(&snapshot(1)),
            Err(Error::MetricsWrite(_))
        ));
    }

    #[test]
    fn test_from_config() {
        assert_eq!(from_config(&MetricsConfig::default()).len(), 1);
        let config: MetricsConfig = toml::from_str("").unwrap();
        assert!(config.log);
        let config = MetricsConfig {
            path: None,
            log: false,
        };
        assert!(from_config(&config).is_empty());
        let config = MetricsConfig {
            path: Some("/tmp/x.jsonl".to_string()),
            log: true,
        };
        assert_eq!(from_config(&config).len(), 2);
    }

    #[test]
    fn test_host_override() {
        assert_eq!(host_tag(Some("rack4-u12")), "rack4-u12");
        assert!(!host_tag(None).is_empty());
    }
}
