// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Additive duty-cycle boosts driven by the critical sensor.
//!
//! Each boost target owns a threshold table. Targets are applied in the
//! order they are configured, so the bank nearest the heat source should
//! be listed first.

use crate::trend::Trend;
use crate::{Error, MAX_DUTY, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a boost table: at or above `temp_c`, add `boost` percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoostRule {
    pub temp_c: f64,
    pub boost: u8,
}

/// Boost rules sorted by ascending threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostTable {
    rules: Vec<BoostRule>,
}

impl BoostTable {
    pub fn build(rules: &[BoostRule]) -> Result<Self> {
        let mut sorted = rules.to_vec();
        for r in &sorted {
            if !r.temp_c.is_finite() {
                return Err(Error::config("boost thresholds must be finite"));
            }
            if r.boost > MAX_DUTY {
                return Err(Error::config(format!(
                    "boost {}% at {}°C exceeds {MAX_DUTY}%",
                    r.boost, r.temp_c
                )));
            }
        }
        sorted.sort_by(|a, b| a.temp_c.total_cmp(&b.temp_c));
        if let Some(w) = sorted.windows(2).find(|w| w[0].temp_c == w[1].temp_c) {
            return Err(Error::config(format!(
                "duplicate boost threshold {}°C",
                w[0].temp_c
            )));
        }
        Ok(Self { rules: sorted })
    }

    pub fn rules(&self) -> &[BoostRule] {
        &self.rules
    }

    /// Boost of the highest threshold `<= temp_c`, or 0.
    pub fn lookup(&self, temp_c: f64) -> u8 {
        match self.rules.partition_point(|r| r.temp_c <= temp_c) {
            0 => 0,
            idx => self.rules[idx - 1].boost,
        }
    }
}

/// Boost for the critical sensor. A falling temperature never earns a boost.
pub fn boost(critical_temp: f64, trend: Trend, table: &BoostTable) -> u8 {
    match trend {
        Trend::Falling => 0,
        Trend::Rising | Trend::Stable => table.lookup(critical_temp),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Boost settings as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    /// No boost at all unless the critical sensor is above this.
    #[serde(default = "default_eligible_above")]
    pub eligible_above: f64,

    /// Boost targets in priority order.
    #[serde(default)]
    pub targets: Vec<BoostTargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostTargetConfig {
    /// Fan bank receiving the boost.
    pub bank: u8,
    /// The critical sensor must exceed this for the target to be boosted.
    pub above: f64,
    pub rules: Vec<BoostRule>,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            eligible_above: default_eligible_above(),
            targets: vec![
                BoostTargetConfig {
                    bank: 1,
                    above: 55.0,
                    rules: rules(&[(55.0, 10), (60.0, 20), (65.0, 30), (70.0, 40)]),
                },
                BoostTargetConfig {
                    bank: 2,
                    above: 65.0,
                    rules: rules(&[(65.0, 10), (70.0, 20)]),
                },
            ],
        }
    }
}

fn default_eligible_above() -> f64 {
    55.0
}

fn rules(table: &[(f64, u8)]) -> Vec<BoostRule> {
    table
        .iter()
        .map(|&(temp_c, boost)| BoostRule { temp_c, boost })
        .collect()
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BoostTarget {
    pub bank: u8,
    pub above: f64,
    pub table: BoostTable,
}

/// Compiled boost targets, in priority order.
#[derive(Debug, Clone)]
pub struct BoostPlan {
    eligible_above: f64,
    targets: Vec<BoostTarget>,
}

impl BoostPlan {
    pub fn build(config: &BoostConfig) -> Result<Self> {
        if !config.eligible_above.is_finite() {
            return Err(Error::config("boost eligible_above must be finite"));
        }
        let targets = config
            .targets
            .iter()
            .map(|t| {
                if !t.above.is_finite() {
                    return Err(Error::config(format!(
                        "boost threshold for bank {} must be finite",
                        t.bank
                    )));
                }
                Ok(BoostTarget {
                    bank: t.bank,
                    above: t.above,
                    table: BoostTable::build(&t.rules)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            eligible_above: config.eligible_above,
            targets,
        })
    }

    pub fn targets(&self) -> &[BoostTarget] {
        &self.targets
    }

    /// Add boosts to `duties` (bank id -> duty). Returns the boosts that
    /// were actually added, in application order.
    pub fn apply(
        &self,
        critical_temp: f64,
        trend: Trend,
        duties: &mut BTreeMap<u8, u8>,
    ) -> Vec<(u8, u8)> {
        let mut applied = Vec::new();
        if !(critical_temp > self.eligible_above) {
            return applied;
        }

        for target in &self.targets {
            if !(critical_temp > target.above) {
                continue;
            }
            let add = boost(critical_temp, trend, &target.table);
            if add == 0 {
                continue;
            }
            if let Some(duty) = duties.get_mut(&target.bank) {
                *duty = duty.saturating_add(add).min(MAX_DUTY);
                applied.push((target.bank, add));
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BoostTable {
        BoostTable::build(&rules(&[(70.0, 40), (65.0, 30), (60.0, 20), (55.0, 10)])).unwrap()
    }

    #[test]
    fn test_boost_selects_highest_threshold() {
        let t = table();
        assert_eq!(boost(72.0, Trend::Rising, &t), 40);
        assert_eq!(boost(70.0, Trend::Rising, &t), 40);
        assert_eq!(boost(69.9, Trend::Stable, &t), 30);
        assert_eq!(boost(55.0, Trend::Stable, &t), 10);
        assert_eq!(boost(54.0, Trend::Rising, &t), 0);
    }

    #[test]
    fn test_falling_never_boosts() {
        let t = table();
        assert_eq!(boost(70.0, Trend::Falling, &t), 0);
        assert_eq!(boost(99.0, Trend::Falling, &t), 0);
    }

    #[test]
    fn test_table_rejects_duplicates_and_overflow() {
        assert!(BoostTable::build(&rules(&[(60.0, 10), (60.0, 20)])).is_err());
        assert!(BoostTable::build(&rules(&[(60.0, 101)])).is_err());
        assert!(BoostTable::build(&[]).unwrap().rules().is_empty());
    }

    fn duties(a: u8, b: u8) -> BTreeMap<u8, u8> {
        BTreeMap::from([(1, a), (2, b)])
    }

    #[test]
    fn test_plan_primary_before_secondary() {
        let plan = BoostPlan::build(&BoostConfig::default()).unwrap();

        let mut d = duties(20, 20);
        let applied = plan.apply(58.0, Trend::Rising, &mut d);
        assert_eq!(applied, vec![(1, 10)]);
        assert_eq!(d, duties(30, 20));

        let mut d = duties(20, 20);
        let applied = plan.apply(72.0, Trend::Rising, &mut d);
        assert_eq!(applied, vec![(1, 40), (2, 20)]);
        assert_eq!(d, duties(60, 40));
    }

    #[test]
    fn test_plan_respects_eligibility_and_trend() {
        let plan = BoostPlan::build(&BoostConfig::default()).unwrap();

        let mut d = duties(20, 20);
        assert!(plan.apply(55.0, Trend::Rising, &mut d).is_empty());
        assert!(plan.apply(72.0, Trend::Falling, &mut d).is_empty());
        assert_eq!(d, duties(20, 20));
    }

    #[test]
    fn test_plan_clamps_to_max() {
        let plan = BoostPlan::build(&BoostConfig::default()).unwrap();
        let mut d = duties(90, 95);
        plan.apply(75.0, Trend::Stable, &mut d);
        assert_eq!(d, duties(100, 100));
    }

    #[test]
    fn test_plan_skips_unknown_bank() {
        let plan = BoostPlan::build(&BoostConfig::default()).unwrap();
        let mut d = BTreeMap::from([(1, 20)]);
        assert_eq!(plan.apply(72.0, Trend::Rising, &mut d), vec![(1, 40)]);
    }
}
