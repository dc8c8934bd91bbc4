use crate::domain::client::RiskTolerance;
use crate::domain::recommendation::{AssetClass, RiskCategory, Vehicle};
use crate::engine::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Every policy constant the engine uses. Defaults are documented in DESIGN.md.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Share of a positive monthly surplus that may be invested.
    pub capacity_fraction: f64,
    pub risk: RiskPolicy,
    pub allocation: AllocationPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            capacity_fraction: 0.3,
            risk: RiskPolicy::default(),
            allocation: AllocationPolicy::default(),
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.capacity_fraction.is_finite() || !(0.0..=1.0).contains(&self.capacity_fraction) {
            return Err(AdvisorError::invalid_policy(format!(
                "capacity_fraction must be within [0, 1] (got {})",
                self.capacity_fraction
            )));
        }
        self.risk.validate()?;
        self.allocation.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceAnchors {
    pub conservative: i32,
    pub moderate: i32,
    pub aggressive: i32,
}

impl Default for ToleranceAnchors {
    fn default() -> Self {
        Self {
            conservative: 25,
            moderate: 50,
            aggressive: 75,
        }
    }
}

/// Inclusive lower bound of a score band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub lower_bound: u8,
    pub category: RiskCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeRule {
    /// Applies when age < below.
    pub below: u32,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRule {
    /// Applies when investment capacity / income >= min_share.
    pub min_share: f64,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRule {
    /// Applies when the emergency-fund ratio < below_months.
    pub below_months: f64,
    pub delta: i32,
}

/// Rule tables for the risk score. Rows are evaluated in order; the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub anchors: ToleranceAnchors,
    pub bands: Vec<ScoreBand>,
    pub age_rules: Vec<AgeRule>,
    pub age_fallback_delta: i32,
    pub capacity_rules: Vec<CapacityRule>,
    pub zero_capacity_delta: i32,
    pub emergency_rules: Vec<EmergencyRule>,
    pub undefined_emergency_delta: i32,
    /// Per-factor cap on |delta|; must stay below the narrowest band width.
    pub max_factor_delta: i32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            anchors: ToleranceAnchors::default(),
            bands: vec![
                ScoreBand {
                    lower_bound: 0,
                    category: RiskCategory::Conservative,
                },
                ScoreBand {
                    lower_bound: 34,
                    category: RiskCategory::Moderate,
                },
                ScoreBand {
                    lower_bound: 67,
                    category: RiskCategory::Aggressive,
                },
            ],
            age_rules: vec![
                AgeRule { below: 30, delta: 10 },
                AgeRule { below: 45, delta: 0 },
                AgeRule { below: 60, delta: -5 },
            ],
            age_fallback_delta: -10,
            capacity_rules: vec![
                CapacityRule {
                    min_share: 0.15,
                    delta: 10,
                },
                CapacityRule {
                    min_share: 0.06,
                    delta: 5,
                },
                CapacityRule {
                    min_share: 0.0,
                    delta: 0,
                },
            ],
            zero_capacity_delta: -5,
            emergency_rules: vec![
                EmergencyRule {
                    below_months: 3.0,
                    delta: -15,
                },
                EmergencyRule {
                    below_months: 6.0,
                    delta: -5,
                },
            ],
            undefined_emergency_delta: 0,
            max_factor_delta: 15,
        }
    }
}

impl RiskPolicy {
    pub fn anchor(&self, tolerance: RiskTolerance) -> i32 {
        match tolerance {
            RiskTolerance::Conservative => self.anchors.conservative,
            RiskTolerance::Moderate => self.anchors.moderate,
            RiskTolerance::Aggressive => self.anchors.aggressive,
        }
    }

    /// Category for a clamped score. Bands are validated to start at 0, so a match always
    /// exists; the first band is the fallback for an unvalidated table.
    pub fn category_for(&self, score: u8) -> RiskCategory {
        self.bands
            .iter()
            .rev()
            .find(|b| score >= b.lower_bound)
            .or_else(|| self.bands.first())
            .map(|b| b.category)
            .unwrap_or(RiskCategory::Conservative)
    }

    pub fn validate(&self) -> Result<()> {
        let first = self
            .bands
            .first()
            .ok_or_else(|| AdvisorError::invalid_policy("score bands must be non-empty"))?;
        if first.lower_bound != 0 {
            return Err(AdvisorError::invalid_policy(format!(
                "first score band must start at 0 (got {})",
                first.lower_bound
            )));
        }

        let mut narrowest = u32::MAX;
        for (i, band) in self.bands.iter().enumerate() {
            if band.lower_bound > 100 {
                return Err(AdvisorError::invalid_policy(format!(
                    "score band lower bound {} exceeds 100",
                    band.lower_bound
                )));
            }
            let upper = match self.bands.get(i + 1) {
                Some(next) => {
                    if next.lower_bound <= band.lower_bound {
                        return Err(AdvisorError::invalid_policy(
                            "score band lower bounds must be strictly increasing",
                        ));
                    }
                    if next.category <= band.category {
                        return Err(AdvisorError::invalid_policy(
                            "score band categories must increase with score",
                        ));
                    }
                    u32::from(next.lower_bound)
                }
                None => 101,
            };
            narrowest = narrowest.min(upper - u32::from(band.lower_bound));
        }

        if self.max_factor_delta < 0 || self.max_factor_delta as u32 >= narrowest {
            return Err(AdvisorError::invalid_policy(format!(
                "max_factor_delta must be within [0, {narrowest}) so one factor moves at most one tier (got {})",
                self.max_factor_delta
            )));
        }

        for anchor in [
            self.anchors.conservative,
            self.anchors.moderate,
            self.anchors.aggressive,
        ] {
            if !(0..=100).contains(&anchor) {
                return Err(AdvisorError::invalid_policy(format!(
                    "tolerance anchors must be within [0, 100] (got {anchor})"
                )));
            }
        }

        if self
            .capacity_rules
            .iter()
            .any(|r| !r.min_share.is_finite() || r.min_share < 0.0)
        {
            return Err(AdvisorError::invalid_policy(
                "capacity rule min_share must be finite and non-negative",
            ));
        }
        if self.emergency_rules.iter().any(|r| !r.below_months.is_finite()) {
            return Err(AdvisorError::invalid_policy(
                "emergency rule below_months must be finite",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSplit {
    pub asset_class: AssetClass,
    pub vehicle: Vehicle,
    /// Share of the asset class weight.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    pub table: BTreeMap<RiskCategory, BTreeMap<AssetClass, f64>>,
    /// Annual returns used for funding projections only.
    pub expected_returns: BTreeMap<AssetClass, f64>,
    pub vehicle_splits: Vec<VehicleSplit>,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        let row = |equity: f64, debt: f64, gold: f64, real_estate: f64| {
            BTreeMap::from([
                (AssetClass::Equity, equity),
                (AssetClass::Debt, debt),
                (AssetClass::Gold, gold),
                (AssetClass::RealEstate, real_estate),
            ])
        };

        let split = |asset_class, vehicle, share| VehicleSplit {
            asset_class,
            vehicle,
            share,
        };

        Self {
            table: BTreeMap::from([
                (RiskCategory::Conservative, row(0.30, 0.50, 0.10, 0.10)),
                (RiskCategory::Moderate, row(0.50, 0.30, 0.10, 0.10)),
                (RiskCategory::Aggressive, row(0.70, 0.20, 0.05, 0.05)),
            ]),
            expected_returns: row(0.11, 0.07, 0.06, 0.08),
            vehicle_splits: vec![
                split(AssetClass::Equity, Vehicle::EquityMutualFunds, 0.6),
                split(AssetClass::Equity, Vehicle::DirectEquity, 0.4),
                split(AssetClass::Debt, Vehicle::DebtMutualFunds, 0.6),
                split(AssetClass::Debt, Vehicle::GovernmentBonds, 0.2),
                split(AssetClass::Debt, Vehicle::CorporateFixedDeposits, 0.2),
                split(AssetClass::Gold, Vehicle::GoldEtfs, 1.0),
                split(AssetClass::RealEstate, Vehicle::RealEstate, 1.0),
            ],
        }
    }
}

impl AllocationPolicy {
    pub fn validate(&self) -> Result<()> {
        for category in [
            RiskCategory::Conservative,
            RiskCategory::Moderate,
            RiskCategory::Aggressive,
        ] {
            let row = self.table.get(&category).ok_or_else(|| {
                AdvisorError::invalid_policy(format!("allocation table has no row for {category}"))
            })?;

            let mut sum = 0.0;
            for (class, weight) in row {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(AdvisorError::invalid_policy(format!(
                        "{category} weight for {class:?} must be non-negative (got {weight})"
                    )));
                }
                let expected = self.expected_returns.get(class).ok_or_else(|| {
                    AdvisorError::invalid_policy(format!("no expected return for {class:?}"))
                })?;
                if !expected.is_finite() || *expected <= -1.0 {
                    return Err(AdvisorError::invalid_policy(format!(
                        "expected return for {class:?} must be finite and above -100% (got {expected})"
                    )));
                }
                sum += weight;
            }

            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(AdvisorError::invalid_policy(format!(
                    "{category} weights must sum to 1 (got {sum})"
                )));
            }
        }

        let weighted: BTreeSet<AssetClass> = self
            .table
            .values()
            .flat_map(|row| row.iter())
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(class, _)| *class)
            .collect();

        let mut split_sums = BTreeMap::<AssetClass, f64>::new();
        for split in &self.vehicle_splits {
            if !split.share.is_finite() || split.share < 0.0 {
                return Err(AdvisorError::invalid_policy(format!(
                    "vehicle share for {:?} must be non-negative (got {})",
                    split.vehicle, split.share
                )));
            }
            *split_sums.entry(split.asset_class).or_default() += split.share;
        }
        if let Some(class) = weighted.iter().find(|c| !split_sums.contains_key(*c)) {
            return Err(AdvisorError::invalid_policy(format!(
                "no vehicle splits for {class:?}, which has a non-zero weight"
            )));
        }
        for (class, sum) in split_sums {
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(AdvisorError::invalid_policy(format!(
                    "vehicle shares for {class:?} must sum to 1 (got {sum})"
                )));
            }
        }

        Ok(())
    }
}
