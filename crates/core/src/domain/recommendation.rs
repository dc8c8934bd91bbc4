use crate::domain::client::RiskTolerance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub client_id: String,
    pub generated_at: DateTime<Utc>,
    pub metrics: FinancialMetrics,
    pub risk_profile: RiskProfile,
    pub goals: Vec<Goal>,
    pub strategy: AllocationStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub emergency_cash: f64,
    pub monthly_surplus: f64,
    pub investment_capacity: f64,
    pub emergency_fund_ratio: EmergencyFundRatio,
    pub liquidity_needs: LiquidityNeeds,
}

/// Months of expenses covered by emergency cash.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyFundRatio {
    Months(f64),
    /// Expenses are zero, so there is no meaningful runway figure.
    Undefined,
}

impl EmergencyFundRatio {
    pub fn months(&self) -> Option<f64> {
        match self {
            Self::Months(m) => Some(*m),
            Self::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityNeeds {
    Low,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Conservative,
    Moderate,
    Aggressive,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub category: RiskCategory,
    /// 0..=100
    pub score: u8,
    pub stated_tolerance: RiskTolerance,
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: RiskFactorKind,
    pub delta: i32,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    StatedTolerance,
    Age,
    InvestmentCapacity,
    EmergencyFund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Retirement,
    Education,
    Home,
    Vehicle,
    EmergencyFund,
    Wedding,
    Travel,
    Wealth,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Position in the client's original goal list.
    pub index: usize,
    pub name: String,
    pub kind: GoalKind,
    pub target_amount: Option<f64>,
    pub horizon_months: Option<u32>,
    /// 1 is the most urgent.
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Debt,
    Gold,
    RealEstate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vehicle {
    EquityMutualFunds,
    DirectEquity,
    DebtMutualFunds,
    GovernmentBonds,
    CorporateFixedDeposits,
    GoldEtfs,
    RealEstate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleWeight {
    pub asset_class: AssetClass,
    pub vehicle: Vehicle,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationStrategy {
    pub category: RiskCategory,
    pub weights: BTreeMap<AssetClass, f64>,
    pub vehicles: Vec<VehicleWeight>,
    pub expected_annual_return: f64,
    pub monthly_investment: f64,
    pub capital_deployable: bool,
    pub funding_notes: Vec<FundingNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingNote {
    pub goal_index: usize,
    pub goal_name: String,
    pub projection: FundingProjection,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FundingProjection {
    Projected {
        months_to_target: u32,
        required_monthly_contribution: Option<f64>,
        on_track: Option<bool>,
    },
    Unavailable {
        reason: ProjectionUnavailable,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionUnavailable {
    NoDeployableCapital,
    MissingTarget,
    /// Contributions at the expected return never accumulate to the target.
    Unreachable,
}

/// Plain-language summary of a recommendation, written by a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    pub highlights: Vec<String>,
    pub cautions: Vec<String>,
}
